//! データセットの読み込みと前処理

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::dataset::labels::LabelMap;
use crate::error::DatasetError;
use crate::model::config::HandDataPreprocessingParams;

/// RGBチャネル数
pub const CHANNELS: usize = 3;

// ImageNetの平均と標準偏差
const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// 画像を読み込み、指定サイズの正方形にリサイズして正規化する
///
/// # 戻り値
/// - 正規化されたRGB画像データ (C, H, W) の順で平坦化
pub fn load_and_normalize_image(path: &Path, image_size: u32) -> Result<Vec<f32>, DatasetError> {
    let img = image::open(path).map_err(|source| DatasetError::UnreadableImage {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(normalize_image(&img, image_size))
}

/// デコード済み画像を正規化する
pub fn normalize_image(img: &image::DynamicImage, image_size: u32) -> Vec<f32> {
    let mut rgb = img.to_rgb8();
    if rgb.width() != image_size || rgb.height() != image_size {
        rgb = image::imageops::resize(
            &rgb,
            image_size,
            image_size,
            image::imageops::FilterType::Triangle,
        );
    }

    let size = image_size as usize;
    let mut data = Vec::with_capacity(CHANNELS * size * size);
    for channel in 0..CHANNELS {
        for y in 0..image_size {
            for x in 0..image_size {
                let value = rgb.get_pixel(x, y)[channel] as f32 / 255.0;
                data.push((value - MEAN[channel]) / STD[channel]);
            }
        }
    }
    data
}

/// 1サンプル（画像パス、クラスID、前処理済み画素）
#[derive(Clone, Debug)]
pub struct GestureSample {
    pub path: PathBuf,
    pub label: usize,
    pub pixels: Arc<[f32]>,
}

/// ジェスチャデータセット
///
/// サンプル本体は分割後のサブセット間で共有し、各サブセットは
/// インデックス範囲のみを保持します。サンプルの同一性は共有ストア内の
/// インデックスで判定できます（`sample_ids`）。
#[derive(Clone, Debug)]
pub struct GestureDataset {
    samples: Arc<Vec<GestureSample>>,
    labels: Arc<LabelMap>,
    image_size: u32,
    range: Range<usize>,
}

impl GestureDataset {
    /// ラベルごとのサブディレクトリから画像を読み込む
    ///
    /// 隠しファイル以外はすべて画像として読み込み、1枚でも失敗すると中断します。
    /// 空のラベルディレクトリはそのまま受け入れます（サンプル数0のクラスになる）。
    pub fn from_folder(dataset_dir: &Path, params: &HandDataPreprocessingParams) -> Result<Self> {
        let labels = LabelMap::from_directory(dataset_dir)?;
        let mut samples = Vec::new();

        for (class_id, class_name) in labels.labels().iter().enumerate() {
            let class_dir = dataset_dir.join(class_name);
            let mut paths = Vec::new();
            for entry in std::fs::read_dir(&class_dir)
                .with_context(|| format!("Failed to read {}", class_dir.display()))?
            {
                let entry = entry?;
                let path = entry.path();
                let hidden = entry.file_name().to_string_lossy().starts_with('.');
                if path.is_file() && !hidden {
                    paths.push(path);
                }
            }
            paths.sort();

            if paths.is_empty() {
                log::warn!("クラス '{}' に画像がありません", class_name);
            }
            log::info!("  クラス {}: {} ({} 枚)", class_id, class_name, paths.len());

            for path in paths {
                let pixels = load_and_normalize_image(&path, params.image_size)?;
                samples.push(GestureSample {
                    path,
                    label: class_id,
                    pixels: pixels.into(),
                });
            }
        }

        if params.shuffle {
            let mut rng = StdRng::seed_from_u64(params.seed);
            samples.shuffle(&mut rng);
        }

        log::info!(
            "{} サンプルを {} クラスから読み込みました",
            samples.len(),
            labels.len()
        );
        Ok(Self::from_samples(samples, labels, params.image_size))
    }

    /// 読み込み済みサンプルからデータセットを作成する
    pub fn from_samples(samples: Vec<GestureSample>, labels: LabelMap, image_size: u32) -> Self {
        let len = samples.len();
        Self {
            samples: Arc::new(samples),
            labels: Arc::new(labels),
            image_size,
            range: 0..len,
        }
    }

    /// 同じストアを共有する部分集合（`range` は自身の範囲に対する相対位置）
    pub(crate) fn subset(&self, range: Range<usize>) -> Self {
        let start = self.range.start + range.start;
        let end = self.range.start + range.end;
        debug_assert!(end <= self.range.end);
        Self {
            samples: self.samples.clone(),
            labels: self.labels.clone(),
            image_size: self.image_size,
            range: start..end,
        }
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    pub fn sample(&self, index: usize) -> Option<&GestureSample> {
        if index >= self.len() {
            return None;
        }
        self.samples.get(self.range.start + index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &GestureSample> {
        self.samples[self.range.clone()].iter()
    }

    /// 共有ストア内でのサンプルID
    pub fn sample_ids(&self) -> Range<usize> {
        self.range.clone()
    }

    pub fn label_map(&self) -> &LabelMap {
        &self.labels
    }

    pub fn num_classes(&self) -> usize {
        self.labels.len()
    }

    pub fn image_size(&self) -> u32 {
        self.image_size
    }

    /// クラスIDごとのサンプル数
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.num_classes()];
        for sample in self.iter() {
            counts[sample.label] += 1;
        }
        counts
    }
}

#[cfg(feature = "ml")]
impl burn::data::dataset::Dataset<GestureSample> for GestureDataset {
    fn get(&self, index: usize) -> Option<GestureSample> {
        self.sample(index).cloned()
    }

    fn len(&self) -> usize {
        self.range.len()
    }
}
