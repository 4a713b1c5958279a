//! 手ジェスチャー認識モデルの学習パイプライン
//!
//! データセットの取得・読み込み・分割から、学習・評価・エクスポートまでを扱います。

pub mod backend;
pub mod dataset;
pub mod error;
pub mod model;
pub mod pipeline;
#[cfg(feature = "ml")]
pub mod ml;

pub use backend::{EvaluationReport, GestureBackend};
pub use pipeline::{Pipeline, PipelineReport, PipelineStage};
