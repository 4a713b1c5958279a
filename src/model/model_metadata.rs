//! モデルメタデータの定義
//!
//! エクスポートしたバンドル（tar.gz）に同梱され、推論時に
//! ネットワーク構造の復元とクラスIDからラベル名への変換に使用されます。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::config::{ExportPrecision, GestureRecognizerOptions};

/// バンドル形式のバージョン
pub const BUNDLE_FORMAT_VERSION: u32 = 1;

/// モデルメタデータ
///
/// tar.gz形式で保存される情報：
/// - metadata.json: このメタデータ（JSON形式）
/// - labels.txt: クラスID順のラベル（1行1ラベル）
/// - model.bin: モデルの重み（バイナリ）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelMetadata {
    pub format_version: u32,

    /// クラスID順のラベル。先頭は常に "none"
    pub labels: Vec<String>,

    /// モデル入力サイズ（正方形の一辺）
    pub image_size: u32,

    /// 全結合層の幅（ネットワーク復元用）
    pub layer_widths: Vec<usize>,

    /// 学習時のドロップアウト率
    pub dropout_rate: f64,

    /// 重みの保存精度
    pub precision: ExportPrecision,

    pub num_epochs: u32,
    pub batch_size: u32,
    pub learning_rate: f64,
    pub lr_decay: f64,
    pub gamma: f64,

    /// 学習・検証に使用したサンプル数
    pub train_samples: usize,
    pub validation_samples: usize,

    /// モデルの学習時刻（ISO8601形式）
    pub trained_at: String,
}

impl ModelMetadata {
    /// 新しいメタデータを作成
    pub fn new(
        labels: Vec<String>,
        image_size: u32,
        options: &GestureRecognizerOptions,
        precision: ExportPrecision,
        train_samples: usize,
        validation_samples: usize,
    ) -> Self {
        let trained_at = chrono::Local::now().to_rfc3339();
        let hparams = &options.hparams;

        Self {
            format_version: BUNDLE_FORMAT_VERSION,
            labels,
            image_size,
            layer_widths: options.model_options.layer_widths.clone(),
            dropout_rate: options.model_options.dropout_rate,
            precision,
            num_epochs: hparams.epochs as u32,
            batch_size: hparams.batch_size as u32,
            learning_rate: hparams.learning_rate,
            lr_decay: hparams.lr_decay,
            gamma: hparams.gamma,
            train_samples,
            validation_samples,
            trained_at,
        }
    }

    pub fn num_classes(&self) -> usize {
        self.labels.len()
    }

    /// labels.txt の内容
    pub fn labels_file_contents(&self) -> String {
        let mut out = self.labels.join("\n");
        out.push('\n');
        out
    }

    /// メタデータをJSON文字列に変換
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize metadata to JSON")
    }

    /// JSON文字列からメタデータを生成
    pub fn from_json_string(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize metadata from JSON")
    }
}
