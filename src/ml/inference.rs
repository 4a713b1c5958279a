//! エクスポート済みモデルによる推論

use anyhow::Result;
use std::path::Path;

use burn::{
    module::Module,
    record::{BinBytesRecorder, FullPrecisionSettings, HalfPrecisionSettings, Recorder},
    tensor::{backend::Backend, Tensor, TensorData},
};

use crate::dataset::load_and_normalize_image;
use crate::ml::{GestureClassifier, ModelConfig};
use crate::model::config::ExportPrecision;
use crate::model::{load_model_with_metadata, ModelMetadata};

/// 1画像の分類結果
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub class_id: usize,
    /// softmax後の確率
    pub score: f32,
}

/// 推論エンジン
pub struct GestureRecognizer<B: Backend> {
    network: GestureClassifier<B>,
    metadata: ModelMetadata,
    device: B::Device,
}

impl<B: Backend> GestureRecognizer<B> {
    /// バンドルを読み込んで推論エンジンを初期化
    pub fn load<P: AsRef<Path>>(task_path: P, device: &B::Device) -> Result<Self> {
        let (metadata, model_binary) = load_model_with_metadata(task_path.as_ref())?;

        let model_config = ModelConfig {
            num_classes: metadata.num_classes(),
            dropout: 0.0, // 推論時はドロップアウトなし
            image_size: metadata.image_size as usize,
            layer_widths: metadata.layer_widths.clone(),
        };
        let network = model_config.init::<B>(device);

        // 保存時と同じ精度設定で重みを復元
        let record = match metadata.precision {
            ExportPrecision::Full => {
                let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
                Recorder::<B>::load(&recorder, model_binary, device)
            }
            ExportPrecision::Half => {
                let recorder = BinBytesRecorder::<HalfPrecisionSettings>::default();
                Recorder::<B>::load(&recorder, model_binary, device)
            }
        }
        .map_err(|e| anyhow::anyhow!("モデル重みの読み込みエラー: {:?}", e))?;

        Ok(Self {
            network: network.load_record(record),
            metadata,
            device: device.clone(),
        })
    }

    /// 単一画像を分類
    pub fn classify_image<P: AsRef<Path>>(&self, image_path: P) -> Result<Prediction> {
        let size = self.metadata.image_size as usize;
        let image_data = load_and_normalize_image(image_path.as_ref(), self.metadata.image_size)?;

        let tensor = Tensor::<B, 4>::from_data(
            TensorData::new(image_data, [1, 3, size, size]),
            &self.device,
        );
        let scores = self
            .network
            .predict_proba(tensor)
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| anyhow::anyhow!("推論結果の取得エラー: {:?}", e))?;

        let (class_id, score) = scores
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .ok_or_else(|| anyhow::anyhow!("モデルの出力が空です"))?;

        let label = self
            .metadata
            .labels
            .get(class_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("クラスインデックス {} は範囲外です", class_id))?;

        Ok(Prediction {
            label,
            class_id,
            score,
        })
    }

    /// 複数画像をまとめて分類
    pub fn classify_batch(&self, image_paths: &[impl AsRef<Path>]) -> Result<Vec<Prediction>> {
        image_paths
            .iter()
            .map(|path| self.classify_image(path))
            .collect()
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}
