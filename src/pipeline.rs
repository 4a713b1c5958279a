//! 学習パイプライン
//!
//! 取得 → 読み込み → 分割 → 学習 → 評価 → エクスポート を順番に1回だけ実行します。
//! 各段階は前の段階の完了が前提で、分岐・再試行・巻き戻しはありません。
//! 途中で失敗した場合、それまでに生成されたファイルはそのまま残ります。

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::backend::{EvaluationReport, GestureBackend};
use crate::dataset::{fetch_dataset, list_labels, DatasetSplits, GestureDataset};
use crate::error::PipelineError;
use crate::model::config::PipelineConfig;

/// パイプラインの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineStage {
    Initial,
    Fetched,
    Loaded,
    Split,
    Trained,
    Evaluated,
    Exported,
}

/// 実行結果のまとめ
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
    pub labels: Vec<String>,
    /// (学習, 検証, テスト)
    pub split_sizes: (usize, usize, usize),
    pub evaluation: EvaluationReport,
    pub exported_path: PathBuf,
    pub exported_files: Vec<String>,
}

/// エクスポートディレクトリの内容（名前順）
pub fn list_export_dir(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in
        std::fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?
    {
        names.push(entry?.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

pub struct Pipeline<Bk: GestureBackend> {
    config: PipelineConfig,
    backend: Bk,
    stage: PipelineStage,
    labels: Vec<String>,
    dataset: Option<GestureDataset>,
    splits: Option<DatasetSplits>,
    model: Option<Bk::Model>,
    evaluation: Option<EvaluationReport>,
    exported_path: Option<PathBuf>,
}

impl<Bk: GestureBackend> Pipeline<Bk> {
    pub fn new(config: PipelineConfig, backend: Bk) -> Self {
        Self {
            config,
            backend,
            stage: PipelineStage::Initial,
            labels: Vec::new(),
            dataset: None,
            splits: None,
            model: None,
            evaluation: None,
            exported_path: None,
        }
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn model(&self) -> Option<&Bk::Model> {
        self.model.as_ref()
    }

    pub fn evaluation(&self) -> Option<EvaluationReport> {
        self.evaluation
    }

    fn expect_stage(&self, expected: PipelineStage) -> Result<(), PipelineError> {
        if self.stage != expected {
            return Err(PipelineError::OutOfOrder {
                expected,
                actual: self.stage,
            });
        }
        Ok(())
    }

    /// データセットをダウンロードして展開する
    pub fn fetch(&mut self) -> Result<()> {
        self.expect_stage(PipelineStage::Initial)?;
        let settings = &self.config.dataset;

        if settings.skip_download && settings.dataset_dir.is_dir() {
            log::info!(
                "既存のデータセットを使用します: {}",
                settings.dataset_dir.display()
            );
        } else {
            let archive_path = settings.extract_dir.join(&settings.archive_name);
            fetch_dataset(&settings.url, &archive_path, &settings.extract_dir)?;
        }

        self.stage = PipelineStage::Fetched;
        Ok(())
    }

    /// ラベルを列挙し、データセットを読み込む
    pub fn load(&mut self) -> Result<&[String]> {
        self.expect_stage(PipelineStage::Fetched)?;
        let settings = &self.config.dataset;

        let labels = list_labels(&settings.dataset_dir)?;
        println!("{:?}", labels);

        let dataset = GestureDataset::from_folder(&settings.dataset_dir, &settings.preprocessing)?;
        self.labels = labels;
        self.dataset = Some(dataset);
        self.stage = PipelineStage::Loaded;
        Ok(self.labels.as_slice())
    }

    /// 学習・検証・テストに分割する
    pub fn split(&mut self) -> Result<(usize, usize, usize)> {
        self.expect_stage(PipelineStage::Loaded)?;
        let dataset = self
            .dataset
            .as_ref()
            .ok_or(PipelineError::MissingArtifact("dataset"))?;

        let split = &self.config.split;
        let splits = DatasetSplits::new(dataset, split.train_fraction, split.validation_fraction)?;
        let sizes = splits.sizes();
        self.splits = Some(splits);
        self.stage = PipelineStage::Split;
        Ok(sizes)
    }

    /// 学習を実行する
    pub fn train(&mut self) -> Result<()> {
        self.expect_stage(PipelineStage::Split)?;
        let splits = self
            .splits
            .as_ref()
            .ok_or(PipelineError::MissingArtifact("dataset splits"))?;

        let model = self
            .backend
            .fit(&splits.train, &splits.validation, &self.config.options)?;
        self.model = Some(model);
        self.stage = PipelineStage::Trained;
        Ok(())
    }

    /// テストデータで評価する
    pub fn evaluate(&mut self) -> Result<EvaluationReport> {
        self.expect_stage(PipelineStage::Trained)?;
        let splits = self
            .splits
            .as_ref()
            .ok_or(PipelineError::MissingArtifact("dataset splits"))?;
        let model = self
            .model
            .as_ref()
            .ok_or(PipelineError::MissingArtifact("trained model"))?;

        let report = self
            .backend
            .evaluate(model, &splits.test, self.config.evaluation.batch_size)?;
        println!("Test loss:{}, Test accuracy:{}", report.loss, report.accuracy);

        self.evaluation = Some(report);
        self.stage = PipelineStage::Evaluated;
        Ok(report)
    }

    /// モデルをエクスポートし、エクスポートディレクトリの内容を返す
    pub fn export(&mut self) -> Result<Vec<String>> {
        self.expect_stage(PipelineStage::Evaluated)?;
        let model = self
            .model
            .as_ref()
            .ok_or(PipelineError::MissingArtifact("trained model"))?;

        let export_dir = &self.config.options.hparams.export_dir;
        let path = self.backend.export(model, export_dir)?;
        let files = list_export_dir(export_dir)?;
        println!("{:?}", files);

        self.exported_path = Some(path);
        self.stage = PipelineStage::Exported;
        Ok(files)
    }

    /// 全段階を順番に実行する
    pub fn run(mut self) -> Result<PipelineReport> {
        self.fetch()?;
        self.load()?;
        let split_sizes = self.split()?;
        self.train()?;
        let evaluation = self.evaluate()?;
        let exported_files = self.export()?;

        let exported_path = self
            .exported_path
            .take()
            .ok_or(PipelineError::MissingArtifact("exported model"))?;
        Ok(PipelineReport {
            labels: self.labels,
            split_sizes,
            evaluation,
            exported_path,
            exported_files,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fetcher::test_support::{build_zip, png_bytes, serve_once};
    use crate::dataset::loader::test_support::write_dataset;
    use crate::error::DatasetError;
    use crate::model::config::GestureRecognizerOptions;
    use std::collections::HashSet;

    /// 学習せずに件数だけを扱うバックエンド
    struct StubBackend;

    impl GestureBackend for StubBackend {
        type Model = Vec<usize>;

        fn fit(
            &self,
            train: &GestureDataset,
            validation: &GestureDataset,
            _options: &GestureRecognizerOptions,
        ) -> Result<Self::Model> {
            let train_ids: HashSet<_> = train.sample_ids().collect();
            assert!(validation.sample_ids().all(|id| !train_ids.contains(&id)));
            Ok(train.class_counts())
        }

        fn evaluate(
            &self,
            _model: &Self::Model,
            test: &GestureDataset,
            batch_size: usize,
        ) -> Result<EvaluationReport> {
            assert_eq!(batch_size, 1);
            Ok(EvaluationReport {
                loss: 0.25,
                accuracy: test.len() as f64 / 100.0,
            })
        }

        fn export(&self, model: &Self::Model, export_dir: &Path) -> Result<PathBuf> {
            std::fs::create_dir_all(export_dir)?;
            let path = export_dir.join("stub.bin");
            std::fs::write(&path, format!("{:?}", model))?;
            Ok(path)
        }
    }

    fn local_config(root: &Path) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.dataset.extract_dir = root.to_path_buf();
        config.dataset.dataset_dir = root.join("dataset");
        config.dataset.skip_download = true;
        config.dataset.preprocessing.image_size = 8;
        config.options.hparams.export_dir = root.join("exported_model");
        config
    }

    #[test]
    fn test_three_labels_hundred_images_each() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(
            &dir.path().join("dataset"),
            &[
                ("thumbs_up", [255, 0, 0], 100),
                ("thumbs_down", [0, 0, 255], 100),
                ("none", [0, 0, 0], 100),
            ],
        );

        let report = Pipeline::new(local_config(dir.path()), StubBackend)
            .run()
            .unwrap();

        let labels: HashSet<_> = report.labels.iter().map(String::as_str).collect();
        assert_eq!(report.labels.len(), 3);
        assert_eq!(labels, HashSet::from(["thumbs_up", "thumbs_down", "none"]));
        assert_eq!(report.split_sizes, (240, 30, 30));
        assert_eq!(report.evaluation.accuracy, 0.3);
        assert_eq!(report.exported_files, vec!["stub.bin"]);
        assert!(report.exported_path.is_file());
    }

    #[test]
    fn test_stages_advance_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(&dir.path().join("dataset"), &[("none", [0, 0, 0], 5), ("ok", [9, 9, 9], 5)]);
        let mut pipeline = Pipeline::new(local_config(dir.path()), StubBackend);

        assert_eq!(pipeline.stage(), PipelineStage::Initial);
        let err = pipeline.train().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::OutOfOrder {
                expected: PipelineStage::Split,
                actual: PipelineStage::Initial
            })
        ));

        pipeline.fetch().unwrap();
        assert_eq!(pipeline.stage(), PipelineStage::Fetched);
        assert_eq!(pipeline.load().unwrap(), &["none", "ok"]);
        assert_eq!(pipeline.split().unwrap(), (8, 1, 1));
        pipeline.train().unwrap();
        assert_eq!(pipeline.model().map(|counts| counts.iter().sum::<usize>()), Some(8));
        pipeline.evaluate().unwrap();
        pipeline.export().unwrap();
        assert_eq!(pipeline.stage(), PipelineStage::Exported);

        // 完了後にやり直すことはできない
        assert!(pipeline.fetch().is_err());
    }

    #[test]
    fn test_load_failure_stops_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(&dir.path().join("dataset"), &[("fist", [0, 0, 0], 2)]);
        let mut pipeline = Pipeline::new(local_config(dir.path()), StubBackend);

        pipeline.fetch().unwrap();
        let err = pipeline.load().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DatasetError>(),
            Some(DatasetError::MissingNoneLabel { .. })
        ));
        assert_eq!(pipeline.stage(), PipelineStage::Fetched);
        assert!(pipeline.split().is_err());
    }

    #[test]
    fn test_run_downloads_dataset() {
        let png = png_bytes([10, 200, 10]);
        let mut entries: Vec<(String, &[u8])> = Vec::new();
        for label in ["none", "victory"] {
            for i in 0..10 {
                entries.push((format!("dataset/{}/{}.png", label, i), png.as_slice()));
            }
        }
        let entries: Vec<(&str, &[u8])> = entries.iter().map(|(n, b)| (n.as_str(), *b)).collect();
        let url = serve_once("200 OK", build_zip(&entries));

        let dir = tempfile::tempdir().unwrap();
        let mut config = local_config(dir.path());
        config.dataset.skip_download = false;
        config.dataset.url = url;

        let report = Pipeline::new(config, StubBackend).run().unwrap();
        assert_eq!(report.labels, vec!["none", "victory"]);
        assert_eq!(report.split_sizes, (16, 2, 2));
        assert!(!dir.path().join("hand_gesture_recognition_dataset.zip").exists());
    }
}
