pub mod fetcher;
pub mod labels;
pub mod loader;
pub mod split;

pub use fetcher::{download_archive, extract_archive, fetch_dataset};
pub use labels::{list_labels, LabelMap, NONE_LABEL};
pub use loader::{load_and_normalize_image, normalize_image, GestureDataset, GestureSample};
pub use split::{split_point, DatasetSplits};
