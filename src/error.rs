//! ドメインエラー定義
//!
//! 呼び出し側やテストで判別が必要な失敗のみを型として定義します。
//! それ以外のI/Oエラー等は `anyhow` でコンテキスト付きで伝播させます。

use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::PipelineStage;

/// 設定値の検証エラー
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

/// データセット取得・読み込み・分割のエラー
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset directory not found: {}", .0.display())]
    MissingDirectory(PathBuf),

    #[error("no label directories found in {}", .0.display())]
    NoLabels(PathBuf),

    #[error("label set {labels:?} does not include a \"none\" label")]
    MissingNoneLabel { labels: Vec<String> },

    #[error("split fraction must be within [0, 1], got {0}")]
    InvalidFraction(f64),

    #[error("failed to read image {}: {source}", path.display())]
    UnreadableImage {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("download failed with HTTP status {status} for {url}")]
    HttpStatus { url: String, status: u16 },
}

/// 学習時のエラー
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("training set is empty")]
    EmptyTrainingSet,

    #[error("dataset has no classes")]
    NoClasses,

    #[error("loss diverged at epoch {epoch}: {loss}")]
    Diverged { epoch: usize, loss: f64 },
}

/// 評価時のエラー
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("test set is empty")]
    EmptyTestSet,

    #[error("batch size must be greater than zero")]
    ZeroBatchSize,
}

/// パイプラインの状態遷移エラー
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("stage out of order: expected {expected:?}, pipeline is at {actual:?}")]
    OutOfOrder {
        expected: PipelineStage,
        actual: PipelineStage,
    },

    #[error("missing {0} from previous stage")]
    MissingArtifact(&'static str),
}
