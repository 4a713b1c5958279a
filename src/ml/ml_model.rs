//! ジェスチャ分類モデルの定義
//!
//! 手画像分類用のCNNと損失関数を提供します。

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
    },
    tensor::{
        activation::{log_softmax, relu, softmax},
        backend::Backend,
        Int, Tensor,
    },
};

use crate::model::config::{ModelOptions, MIN_IMAGE_SIZE};

const CONV_CHANNELS: [usize; 4] = [3, 16, 32, 64];

/// モデル設定
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// 分類クラス数
    pub num_classes: usize,
    /// 出力層直前のドロップアウト率
    #[config(default = 0.1)]
    pub dropout: f64,
    /// 入力画像サイズ（正方形）
    #[config(default = 64)]
    pub image_size: usize,
    /// 畳み込み特徴の後に挟む全結合層の幅
    pub layer_widths: Vec<usize>,
}

impl ModelConfig {
    /// 学習オプションから設定を作成
    pub fn from_options(num_classes: usize, image_size: u32, options: &ModelOptions) -> Self {
        Self {
            num_classes,
            dropout: options.dropout_rate,
            image_size: image_size as usize,
            layer_widths: options.layer_widths.clone(),
        }
    }

    /// 入力サイズがプーリング3段に耐えられるか
    pub fn is_valid_input_size(&self) -> bool {
        self.image_size >= MIN_IMAGE_SIZE as usize
    }

    /// モデルを初期化
    pub fn init<B: Backend>(&self, device: &B::Device) -> GestureClassifier<B> {
        let conv = |i: usize| -> Conv2d<B> {
            Conv2dConfig::new([CONV_CHANNELS[i], CONV_CHANNELS[i + 1]], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device)
        };

        let mut hidden: Vec<Linear<B>> = Vec::with_capacity(self.layer_widths.len());
        let mut width = CONV_CHANNELS[3];
        for &next in &self.layer_widths {
            hidden.push(LinearConfig::new(width, next).init(device));
            width = next;
        }

        log::debug!(
            "[Model] 入力 {0}x{0}, 特徴 {1}, 全結合 {2:?}, 出力 {3}",
            self.image_size,
            CONV_CHANNELS[3],
            self.layer_widths,
            self.num_classes
        );

        GestureClassifier {
            conv1: conv(0),
            conv2: conv(1),
            conv3: conv(2),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            hidden,
            dropout: DropoutConfig::new(self.dropout).init(),
            output: LinearConfig::new(width, self.num_classes).init(device),
        }
    }
}

/// ジェスチャ分類用CNNモデル
///
/// # アーキテクチャ
/// - {Conv 3x3 (same padding) + ReLU + MaxPool 2x2} x 3層 (3 -> 16 -> 32 -> 64)
/// - Global average pooling -> 64次元
/// - 全結合層 + ReLU（`layer_widths` の数だけ）
/// - Dropout
/// - 全結合: -> num_classes
#[derive(Module, Debug)]
pub struct GestureClassifier<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    conv3: Conv2d<B>,
    pool: MaxPool2d,
    global_pool: AdaptiveAvgPool2d,
    hidden: Vec<Linear<B>>,
    dropout: Dropout,
    output: Linear<B>,
}

impl<B: Backend> GestureClassifier<B> {
    /// 順伝播
    ///
    /// # 引数
    /// - `images`: バッチ画像 [batch_size, 3, size, size]
    ///
    /// # 戻り値
    /// - クラスごとのロジット [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, _, _, _] = images.dims();

        let x = self.pool.forward(relu(self.conv1.forward(images)));
        let x = self.pool.forward(relu(self.conv2.forward(x)));
        let x = self.pool.forward(relu(self.conv3.forward(x)));

        let x = self.global_pool.forward(x);
        let mut x = x.reshape([batch_size, CONV_CHANNELS[3]]);

        for layer in &self.hidden {
            x = relu(layer.forward(x));
        }

        let x = self.dropout.forward(x);
        self.output.forward(x)
    }

    /// クラスごとの確率 [batch_size, num_classes]
    pub fn predict_proba(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }
}

/// サンプルごとのFocal loss [batch_size]
///
/// `-(1 - p_t)^gamma * log(p_t)`。`gamma` が0のときはクロスエントロピーと一致します。
pub fn focal_loss<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 1, Int>,
    gamma: f64,
) -> Tensor<B, 1> {
    let [batch_size, _] = logits.dims();
    let log_pt = log_softmax(logits, 1)
        .gather(1, targets.reshape([batch_size, 1]))
        .reshape([batch_size]);

    if gamma == 0.0 {
        return log_pt.neg();
    }

    let modulating = log_pt
        .clone()
        .exp()
        .neg()
        .add_scalar(1.0)
        .clamp_min(0.0)
        .powf_scalar(gamma as f32);
    modulating.mul(log_pt).neg()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::{ElementConversion, TensorData};

    type B = NdArray<f32>;

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let config = ModelConfig {
            num_classes: 4,
            dropout: 0.1,
            image_size: 16,
            layer_widths: vec![32, 8],
        };
        let model = config.init::<B>(&device);
        let images = Tensor::<B, 4>::zeros([2, 3, 16, 16], &device);

        assert_eq!(model.forward(images.clone()).dims(), [2, 4]);

        let proba = model.predict_proba(images);
        let row_sum: f32 = proba.sum_dim(1).slice([0..1, 0..1]).into_scalar().elem();
        assert!((row_sum - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_focal_loss_matches_cross_entropy_at_gamma_zero() {
        let device = Default::default();
        let logits = Tensor::<B, 2>::from_data(
            TensorData::new(vec![2.0f32, 0.5, -1.0, 0.1, 0.2, 3.0], [2, 3]),
            &device,
        );
        let targets = Tensor::<B, 1, Int>::from_data(TensorData::new(vec![0i64, 2], [2]), &device);

        let focal: f32 = focal_loss(logits.clone(), targets.clone(), 0.0)
            .mean()
            .into_scalar()
            .elem();
        let ce: f32 = burn::nn::loss::CrossEntropyLossConfig::new()
            .init(&device)
            .forward(logits.clone(), targets.clone())
            .into_scalar()
            .elem();
        assert!((focal - ce).abs() < 1e-5);

        // gamma > 0 では正しく分類できているサンプルの損失が小さくなる
        let down_weighted: f32 = focal_loss(logits, targets, 2.0).mean().into_scalar().elem();
        assert!(down_weighted < focal);
        assert!(down_weighted > 0.0);
    }

    #[test]
    fn test_min_input_size() {
        let mut config = ModelConfig::new(2, Vec::new());
        assert!(config.is_valid_input_size());
        config.image_size = 4;
        assert!(!config.is_valid_input_size());
    }
}
