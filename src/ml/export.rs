//! 学習済みモデルのエクスポート
//!
//! 推論用の重みをバイナリ化し、メタデータと共に1つのバンドルとして書き出します。

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    record::{BinBytesRecorder, FullPrecisionSettings, HalfPrecisionSettings, Recorder},
    tensor::backend::Backend,
};

use crate::ml::training::TrainedGestureModel;
use crate::model::config::ExportPrecision;
use crate::model::{save_model_with_metadata, ModelMetadata};

/// モデルの重みをバイト列に変換する
pub fn model_to_bytes<B: Backend>(
    model: &TrainedGestureModel<B>,
    precision: ExportPrecision,
) -> Result<Vec<u8>> {
    let record = model.network.clone().into_record();
    let bytes = match precision {
        ExportPrecision::Full => {
            let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
            Recorder::<B>::record(&recorder, record, ())
        }
        ExportPrecision::Half => {
            let recorder = BinBytesRecorder::<HalfPrecisionSettings>::default();
            Recorder::<B>::record(&recorder, record, ())
        }
    }
    .map_err(|e| anyhow::anyhow!("モデル重みのシリアライズエラー: {:?}", e))?;
    Ok(bytes)
}

/// `export_dir/file_name` にバンドルを書き出し、そのパスを返す
pub fn export_model<B: Backend>(
    model: &TrainedGestureModel<B>,
    export_dir: &Path,
    precision: ExportPrecision,
    file_name: &str,
) -> Result<PathBuf> {
    std::fs::create_dir_all(export_dir)
        .with_context(|| format!("Failed to create {}", export_dir.display()))?;

    let model_binary = model_to_bytes(model, precision)?;
    let metadata = ModelMetadata::new(
        model.labels.labels().to_vec(),
        model.image_size,
        &model.options,
        precision,
        model.train_samples,
        model.validation_samples,
    );

    let output_path = export_dir.join(file_name);
    save_model_with_metadata(&output_path, &metadata, &model_binary)?;

    log::info!(
        "モデルをエクスポートしました: {} (重み {:.2} MB, {:?})",
        output_path.display(),
        model_binary.len() as f64 / 1024.0 / 1024.0,
        precision
    );
    Ok(output_path)
}
