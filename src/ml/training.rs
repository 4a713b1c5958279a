//! モデル学習機能

use anyhow::{Context, Result};
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;

use burn::{
    data::dataloader::{batcher::Batcher, DataLoader, DataLoaderBuilder},
    module::{AutodiffModule, Module},
    optim::{AdamConfig, GradientsParams, Optimizer},
    record::{DefaultFileRecorder, FullPrecisionSettings},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor, TensorData,
    },
};

use crate::backend::EvaluationReport;
use crate::dataset::{GestureDataset, GestureSample, LabelMap};
use crate::error::{ConfigError, TrainingError};
use crate::ml::evaluation::evaluate_network;
use crate::ml::{focal_loss, GestureClassifier, ModelConfig};
use crate::model::config::GestureRecognizerOptions;

/// バッチデータ
#[derive(Clone, Debug)]
pub struct GestureBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
}

/// 前処理済みサンプルを積み上げてバッチテンソルを作る
#[derive(Clone)]
pub struct GestureBatcher<B: Backend> {
    image_size: usize,
    _marker: PhantomData<B>,
}

impl<B: Backend> GestureBatcher<B> {
    pub fn new(image_size: usize) -> Self {
        Self {
            image_size,
            _marker: PhantomData,
        }
    }
}

impl<B: Backend> Batcher<B, GestureSample, GestureBatch<B>> for GestureBatcher<B> {
    fn batch(&self, items: Vec<GestureSample>, device: &B::Device) -> GestureBatch<B> {
        let batch_size = items.len();
        let size = self.image_size;
        let mut pixels = Vec::with_capacity(batch_size * 3 * size * size);
        let mut targets = Vec::with_capacity(batch_size);

        for item in items {
            pixels.extend_from_slice(&item.pixels);
            targets.push(item.label as i64);
        }

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [batch_size, 3, size, size]),
            device,
        );
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets, [batch_size]), device);

        GestureBatch { images, targets }
    }
}

pub(crate) fn build_loader<B: Backend>(
    dataset: &GestureDataset,
    batch_size: usize,
    shuffle_seed: Option<u64>,
    device: B::Device,
) -> Arc<dyn DataLoader<B, GestureBatch<B>>> {
    let batcher = GestureBatcher::<B>::new(dataset.image_size() as usize);
    let builder = DataLoaderBuilder::<B, GestureSample, GestureBatch<B>>::new(batcher)
        .batch_size(batch_size)
        .num_workers(0)
        .set_device(device);

    let builder = match shuffle_seed {
        Some(seed) => builder.shuffle(seed),
        None => builder,
    };

    builder.build(dataset.clone())
}

/// 1エポック分の記録
#[derive(Debug, Clone, PartialEq)]
pub struct EpochSummary {
    /// 1始まりのエポック番号
    pub epoch: usize,
    pub learning_rate: f64,
    pub train_loss: f64,
    /// 検証データが空の場合は `None`
    pub validation: Option<EvaluationReport>,
}

/// 学習履歴
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochSummary>,
}

impl TrainingHistory {
    pub fn last(&self) -> Option<&EpochSummary> {
        self.epochs.last()
    }
}

/// 学習済みモデル（推論用バックエンド上の重みと付随情報）
#[derive(Debug, Clone)]
pub struct TrainedGestureModel<B: Backend> {
    pub network: GestureClassifier<B>,
    pub labels: LabelMap,
    pub image_size: u32,
    pub options: GestureRecognizerOptions,
    pub history: TrainingHistory,
    pub train_samples: usize,
    pub validation_samples: usize,
    pub device: B::Device,
}

#[derive(Default)]
struct TrainStats {
    loss_sum: f64,
    batches: usize,
}

impl TrainStats {
    fn record_loss(&mut self, loss: f64) {
        self.loss_sum += loss;
        self.batches += 1;
    }

    fn avg_loss(&self) -> f64 {
        if self.batches == 0 {
            0.0
        } else {
            self.loss_sum / self.batches as f64
        }
    }
}

/// 損失が有限であることを確認する（`epoch` は1始まり）
fn check_loss(epoch: usize, loss: f64) -> Result<f64, TrainingError> {
    if !loss.is_finite() {
        return Err(TrainingError::Diverged { epoch, loss });
    }
    Ok(loss)
}

fn checkpoint_dir(options: &GestureRecognizerOptions) -> PathBuf {
    options.hparams.export_dir.join("checkpoints")
}

/// モデル学習を実行
///
/// 学習率はエポックごとに `learning_rate * lr_decay^epoch` で減衰します。
/// 損失が有限でなくなった時点で中断します。
pub fn train<B: AutodiffBackend>(
    train_data: &GestureDataset,
    validation_data: &GestureDataset,
    options: &GestureRecognizerOptions,
    device: &B::Device,
) -> Result<TrainedGestureModel<B::InnerBackend>> {
    let hparams = &options.hparams;
    if train_data.is_empty() {
        return Err(TrainingError::EmptyTrainingSet.into());
    }
    let num_classes = train_data.num_classes();
    if num_classes == 0 {
        return Err(TrainingError::NoClasses.into());
    }

    let model_config =
        ModelConfig::from_options(num_classes, train_data.image_size(), &options.model_options);
    if !model_config.is_valid_input_size() {
        return Err(ConfigError::invalid(format!(
            "input size {} is too small for the classifier",
            model_config.image_size
        ))
        .into());
    }

    log::info!(
        "学習データ: {} 枚, 検証データ: {} 枚, クラス数: {}, 入力サイズ: {3}x{3}",
        train_data.len(),
        validation_data.len(),
        num_classes,
        train_data.image_size()
    );
    log::info!(
        "エポック数: {}, バッチサイズ: {}, 学習率: {} (減衰 {}), dropout={}",
        hparams.epochs,
        hparams.batch_size,
        hparams.learning_rate,
        hparams.lr_decay,
        model_config.dropout
    );

    let train_loader =
        build_loader::<B>(train_data, hparams.batch_size, Some(hparams.seed), device.clone());

    let mut model = model_config.init::<B>(device);
    let mut optimizer = AdamConfig::new().init::<B, GestureClassifier<B>>();
    let recorder = DefaultFileRecorder::<FullPrecisionSettings>::new();
    let mut history = TrainingHistory::default();

    if hparams.save_checkpoints {
        std::fs::create_dir_all(checkpoint_dir(options)).with_context(|| {
            format!("Failed to create {}", checkpoint_dir(options).display())
        })?;
    }

    for epoch in 0..hparams.epochs {
        let learning_rate = hparams.learning_rate_at(epoch);
        let mut stats = TrainStats::default();
        let mut loader_iter = train_loader.iter();

        while let Some(batch) = loader_iter.next() {
            let logits = model.forward(batch.images);
            let loss = focal_loss(logits, batch.targets, hparams.gamma).mean();
            let loss_value = check_loss(epoch + 1, loss.clone().into_scalar().elem())?;

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optimizer.step(learning_rate, model, grads);
            stats.record_loss(loss_value);
        }

        let validation = if validation_data.is_empty() {
            None
        } else {
            Some(evaluate_network(
                &model.valid(),
                validation_data,
                hparams.batch_size,
                hparams.gamma,
                device,
            )?)
        };

        let summary = EpochSummary {
            epoch: epoch + 1,
            learning_rate,
            train_loss: stats.avg_loss(),
            validation,
        };
        match &summary.validation {
            Some(report) => log::info!(
                "epoch {:>3}/{:<3} | lr: {:.6} | train_loss: {:.4} | val_loss: {:.4} | val_acc: {:>6.2}%",
                summary.epoch,
                hparams.epochs,
                learning_rate,
                summary.train_loss,
                report.loss,
                report.accuracy * 100.0
            ),
            None => log::info!(
                "epoch {:>3}/{:<3} | lr: {:.6} | train_loss: {:.4}",
                summary.epoch,
                hparams.epochs,
                learning_rate,
                summary.train_loss
            ),
        }
        history.epochs.push(summary);

        if hparams.save_checkpoints {
            let path = checkpoint_dir(options).join(format!("epoch-{}", epoch + 1));
            model
                .valid()
                .save_file(&path, &recorder)
                .map_err(|e| anyhow::anyhow!("チェックポイントの保存に失敗 {}: {:?}", path.display(), e))?;
            log::debug!("チェックポイントを保存しました: {}", path.display());
        }
    }

    Ok(TrainedGestureModel {
        network: model.valid(),
        labels: train_data.label_map().clone(),
        image_size: train_data.image_size(),
        options: options.clone(),
        history,
        train_samples: train_data.len(),
        validation_samples: validation_data.len(),
        device: device.clone(),
    })
}
