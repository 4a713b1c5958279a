//! パイプライン設定管理モジュール
//!
//! データセット取得元、前処理、ハイパーパラメータ、エクスポート設定などを
//! JSON形式で保存・読み込みします。設定ファイルが無い場合は既定値で動作します。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// 学習可能な最小入力サイズ（プーリング3段で1x1まで縮小されるため）
pub const MIN_IMAGE_SIZE: u32 = 8;

/// 計算デバイスの種類
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum DeviceType {
    /// WGPU (GPU) バックエンド
    Wgpu,
    /// NdArray (CPU) バックエンド
    Cpu,
}

impl Default for DeviceType {
    fn default() -> Self {
        DeviceType::Wgpu
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Wgpu => write!(f, "WGPU (GPU)"),
            DeviceType::Cpu => write!(f, "CPU (NdArray)"),
        }
    }
}

/// 手画像の前処理パラメータ
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HandDataPreprocessingParams {
    /// 読み込み後にサンプル順をシャッフルするか
    pub shuffle: bool,
    /// シャッフル用シード
    pub seed: u64,
    /// リサイズ後の一辺のピクセル数（正方形）
    pub image_size: u32,
}

impl Default for HandDataPreprocessingParams {
    fn default() -> Self {
        Self {
            shuffle: true,
            seed: 42,
            image_size: 64,
        }
    }
}

/// データセット取得設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetSettings {
    /// ZIPアーカイブのURL
    pub url: String,
    /// ダウンロードしたアーカイブの保存名
    pub archive_name: String,
    /// アーカイブの展開先
    pub extract_dir: PathBuf,
    /// ラベルごとのサブディレクトリを含むデータセットルート
    pub dataset_dir: PathBuf,
    /// データセットが既に存在する場合はダウンロードを省略する
    pub skip_download: bool,
    pub preprocessing: HandDataPreprocessingParams,
}

impl Default for DatasetSettings {
    fn default() -> Self {
        Self {
            url: "https://archive.org/download/hand_gestures_dataset/hand_gesture_recognition_dataset.zip".to_string(),
            archive_name: "hand_gesture_recognition_dataset.zip".to_string(),
            extract_dir: PathBuf::from("."),
            dataset_dir: PathBuf::from("dataset"),
            skip_download: false,
            preprocessing: HandDataPreprocessingParams::default(),
        }
    }
}

/// データセット分割設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitSettings {
    /// 全体に対する学習データの割合
    pub train_fraction: f64,
    /// 残りに対する検証データの割合（残りはテストデータ）
    pub validation_fraction: f64,
}

impl Default for SplitSettings {
    fn default() -> Self {
        Self {
            train_fraction: 0.8,
            validation_fraction: 0.5,
        }
    }
}

/// 学習ハイパーパラメータ
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HParams {
    /// 初期学習率
    pub learning_rate: f64,
    /// バッチサイズ
    pub batch_size: usize,
    /// エポック数
    pub epochs: usize,
    /// エポックごとの学習率減衰率（1.0で減衰なし）
    pub lr_decay: f64,
    /// Focal lossのガンマ（0でクロスエントロピーと等価）
    pub gamma: f64,
    /// バッチシャッフル用シード
    pub seed: u64,
    /// エクスポート先ディレクトリ
    pub export_dir: PathBuf,
    /// エポックごとに `<export_dir>/checkpoints` へ重みを保存するか
    pub save_checkpoints: bool,
}

impl Default for HParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            batch_size: 16,
            epochs: 20,
            lr_decay: 1.0,
            gamma: 2.0,
            seed: 42,
            export_dir: PathBuf::from("exported_model"),
            save_checkpoints: true,
        }
    }
}

impl HParams {
    /// 指定エポック（0始まり）で使う学習率
    pub fn learning_rate_at(&self, epoch: usize) -> f64 {
        self.learning_rate * self.lr_decay.powi(epoch as i32)
    }
}

/// モデル構造のオプション
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelOptions {
    /// 出力層直前のドロップアウト率
    pub dropout_rate: f64,
    /// 畳み込み特徴の後に追加する全結合層の幅
    pub layer_widths: Vec<usize>,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            dropout_rate: 0.1,
            layer_widths: Vec::new(),
        }
    }
}

/// 学習時に渡すオプション一式
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GestureRecognizerOptions {
    pub model_options: ModelOptions,
    pub hparams: HParams,
}

/// 評価設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationSettings {
    pub batch_size: usize,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self { batch_size: 1 }
    }
}

/// エクスポート時の重み精度
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExportPrecision {
    /// f32
    Full,
    /// f16（ファイルサイズ半減）
    Half,
}

impl Default for ExportPrecision {
    fn default() -> Self {
        ExportPrecision::Full
    }
}

/// エクスポート設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub precision: ExportPrecision,
    /// エクスポートディレクトリ内のバンドルファイル名
    pub file_name: String,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            precision: ExportPrecision::default(),
            file_name: "gesture_recognizer.task".to_string(),
        }
    }
}

/// パイプライン設定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// 計算デバイスの種類
    pub device_type: DeviceType,
    pub dataset: DatasetSettings,
    pub split: SplitSettings,
    pub options: GestureRecognizerOptions,
    pub evaluation: EvaluationSettings,
    pub export: ExportSettings,
}

impl PipelineConfig {
    /// 設定ファイルのデフォルトパス
    pub fn default_path() -> PathBuf {
        PathBuf::from("gesture_config.json")
    }

    /// 設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// デフォルトパスから設定を読み込む、存在しない場合はデフォルト設定を返す
    pub fn load_or_default() -> Self {
        Self::load_or_default_from(Self::default_path())
    }

    /// 指定パスから設定を読み込む、存在しないか壊れている場合はデフォルト設定を返す
    pub fn load_or_default_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("設定ファイルが存在しません。デフォルト設定を使用します");
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => {
                log::info!("設定ファイルを読み込みました: {}", path.display());
                config
            }
            Err(e) => {
                log::warn!(
                    "設定ファイルの読み込みに失敗しました ({}): {}。デフォルト設定を使用します",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// 設定を保存する
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 値の範囲を検証する
    pub fn validate(&self) -> Result<(), ConfigError> {
        let split = &self.split;
        for (name, value) in [
            ("split.train_fraction", split.train_fraction),
            ("split.validation_fraction", split.validation_fraction),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::invalid(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        let hparams = &self.options.hparams;
        if hparams.batch_size == 0 {
            return Err(ConfigError::invalid("hparams.batch_size must be positive"));
        }
        if hparams.epochs == 0 {
            return Err(ConfigError::invalid("hparams.epochs must be positive"));
        }
        if !(hparams.learning_rate > 0.0) {
            return Err(ConfigError::invalid("hparams.learning_rate must be positive"));
        }
        if !(hparams.lr_decay > 0.0) {
            return Err(ConfigError::invalid("hparams.lr_decay must be positive"));
        }
        if hparams.gamma < 0.0 {
            return Err(ConfigError::invalid("hparams.gamma must not be negative"));
        }

        let dropout = self.options.model_options.dropout_rate;
        if !(0.0..1.0).contains(&dropout) {
            return Err(ConfigError::invalid(format!(
                "model_options.dropout_rate must be within [0, 1), got {}",
                dropout
            )));
        }
        if self.options.model_options.layer_widths.contains(&0) {
            return Err(ConfigError::invalid("model_options.layer_widths must not contain 0"));
        }

        if self.dataset.preprocessing.image_size < MIN_IMAGE_SIZE {
            return Err(ConfigError::invalid(format!(
                "preprocessing.image_size must be at least {}",
                MIN_IMAGE_SIZE
            )));
        }
        if self.evaluation.batch_size == 0 {
            return Err(ConfigError::invalid("evaluation.batch_size must be positive"));
        }
        Ok(())
    }

    /// 設定情報を表示
    pub fn display(&self) {
        let hparams = &self.options.hparams;
        println!("=== パイプライン設定 ===");
        println!("計算デバイス: {}", self.device_type);
        println!("データセットURL: {}", self.dataset.url);
        println!("データセットディレクトリ: {}", self.dataset.dataset_dir.display());
        println!("入力サイズ: {0}x{0}", self.dataset.preprocessing.image_size);
        println!(
            "分割: 学習 {} / 残りを検証 {} : テスト {}",
            self.split.train_fraction,
            self.split.validation_fraction,
            1.0 - self.split.validation_fraction
        );
        println!("\n--- ハイパーパラメータ ---");
        println!("エポック数: {}", hparams.epochs);
        println!("バッチサイズ: {}", hparams.batch_size);
        println!("学習率: {} (減衰 {})", hparams.learning_rate, hparams.lr_decay);
        println!("ドロップアウト率: {}", self.options.model_options.dropout_rate);
        println!("エクスポート先: {}", hparams.export_dir.display());
        println!("========================\n");
    }
}
