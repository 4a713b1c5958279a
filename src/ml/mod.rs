pub mod ml_model;
pub mod training;
pub mod evaluation;
pub mod export;
pub mod inference;
pub mod burn_backend;

pub use ml_model::{focal_loss, GestureClassifier, ModelConfig};
pub use training::{train, EpochSummary, GestureBatch, GestureBatcher, TrainedGestureModel, TrainingHistory};
pub use evaluation::evaluate;
pub use export::{export_model, model_to_bytes};
pub use inference::{GestureRecognizer, Prediction};
pub use burn_backend::BurnBackend;
