//! 学習バックエンドの抽象化
//!
//! パイプラインは学習・評価・エクスポートの3操作のみをバックエンドに依頼します。

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::dataset::GestureDataset;
use crate::model::config::GestureRecognizerOptions;

/// テストデータに対する評価結果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationReport {
    pub loss: f64,
    pub accuracy: f64,
}

/// 学習バックエンド
pub trait GestureBackend {
    /// 学習済みモデル
    type Model;

    /// 学習データと検証データからモデルを学習する
    fn fit(
        &self,
        train: &GestureDataset,
        validation: &GestureDataset,
        options: &GestureRecognizerOptions,
    ) -> Result<Self::Model>;

    /// テストデータで損失と正解率を計算する
    fn evaluate(
        &self,
        model: &Self::Model,
        test: &GestureDataset,
        batch_size: usize,
    ) -> Result<EvaluationReport>;

    /// モデルを `export_dir` に書き出し、作成したファイルのパスを返す
    fn export(&self, model: &Self::Model, export_dir: &Path) -> Result<PathBuf>;
}
