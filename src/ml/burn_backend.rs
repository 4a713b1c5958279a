//! Burnによる学習バックエンド

use anyhow::Result;
use std::path::{Path, PathBuf};

use burn::tensor::backend::AutodiffBackend;

use crate::backend::{EvaluationReport, GestureBackend};
use crate::dataset::GestureDataset;
use crate::ml::evaluation::evaluate;
use crate::ml::export::export_model;
use crate::ml::training::{train, TrainedGestureModel};
use crate::model::config::{ExportPrecision, ExportSettings, GestureRecognizerOptions};

/// 自動微分バックエンド `B` 上で学習し、推論用バックエンドのモデルを返す
pub struct BurnBackend<B: AutodiffBackend> {
    device: B::Device,
    precision: ExportPrecision,
    file_name: String,
}

impl<B: AutodiffBackend> BurnBackend<B> {
    pub fn new(device: B::Device, export: &ExportSettings) -> Self {
        Self {
            device,
            precision: export.precision,
            file_name: export.file_name.clone(),
        }
    }
}

impl<B: AutodiffBackend> GestureBackend for BurnBackend<B> {
    type Model = TrainedGestureModel<B::InnerBackend>;

    fn fit(
        &self,
        train_data: &GestureDataset,
        validation_data: &GestureDataset,
        options: &GestureRecognizerOptions,
    ) -> Result<Self::Model> {
        train::<B>(train_data, validation_data, options, &self.device)
    }

    fn evaluate(
        &self,
        model: &Self::Model,
        test_data: &GestureDataset,
        batch_size: usize,
    ) -> Result<EvaluationReport> {
        Ok(evaluate(model, test_data, batch_size)?)
    }

    fn export(&self, model: &Self::Model, export_dir: &Path) -> Result<PathBuf> {
        export_model(model, export_dir, self.precision, &self.file_name)
    }
}
