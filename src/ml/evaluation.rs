//! テストデータによるモデル評価

use burn::tensor::{backend::Backend, ElementConversion};

use crate::backend::EvaluationReport;
use crate::dataset::GestureDataset;
use crate::error::EvaluationError;
use crate::ml::training::{build_loader, TrainedGestureModel};
use crate::ml::{focal_loss, GestureClassifier};

#[derive(Default)]
struct EvalStats {
    loss_sum: f64,
    examples: usize,
    correct: usize,
}

impl EvalStats {
    fn report(&self) -> EvaluationReport {
        EvaluationReport {
            loss: self.loss_sum / self.examples as f64,
            accuracy: self.correct as f64 / self.examples as f64,
        }
    }
}

/// 学習済みモデルをテストデータで評価する
///
/// 損失はサンプル平均の学習時と同じ損失関数（Focal loss）、正解率はtop-1です。
/// 入力は変更しません。
pub fn evaluate<B: Backend>(
    model: &TrainedGestureModel<B>,
    test_data: &GestureDataset,
    batch_size: usize,
) -> Result<EvaluationReport, EvaluationError> {
    evaluate_network(
        &model.network,
        test_data,
        batch_size,
        model.options.hparams.gamma,
        &model.device,
    )
}

pub(crate) fn evaluate_network<B: Backend>(
    network: &GestureClassifier<B>,
    dataset: &GestureDataset,
    batch_size: usize,
    gamma: f64,
    device: &B::Device,
) -> Result<EvaluationReport, EvaluationError> {
    if batch_size == 0 {
        return Err(EvaluationError::ZeroBatchSize);
    }
    if dataset.is_empty() {
        return Err(EvaluationError::EmptyTestSet);
    }

    let loader = build_loader::<B>(dataset, batch_size, None, device.clone());
    let mut stats = EvalStats::default();
    let mut iter = loader.iter();

    while let Some(batch) = iter.next() {
        let [n] = batch.targets.dims();
        let logits = network.forward(batch.images);

        let loss_sum: f64 = focal_loss(logits.clone(), batch.targets.clone(), gamma)
            .sum()
            .into_scalar()
            .elem();
        let correct: i64 = logits
            .argmax(1)
            .reshape([n])
            .equal(batch.targets)
            .int()
            .sum()
            .into_scalar()
            .elem();

        stats.loss_sum += loss_sum;
        stats.examples += n;
        stats.correct += correct as usize;
    }

    Ok(stats.report())
}
