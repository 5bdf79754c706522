//! Xception Transfer-Learning Classifier
//!
//! Xception backbone (entry flow, middle flow, exit flow) built from
//! depthwise separable convolutions, followed by global max pooling and a
//! small dense head:
//!
//! ```text
//! input [B, 3, 299, 299]
//!   -> entry flow   (stem + 3 downsampling residual blocks)
//!   -> middle flow  (8 residual blocks at 728 channels)
//!   -> exit flow    (1 downsampling block + 2 separable convs to 2048)
//!   -> global max pool -> Dense(128, relu) -> Dense(4)
//! ```
//!
//! Dropout from training is identity at inference and is not part of the
//! module.

use burn::{
    module::{Ignored, Module},
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use super::config::{scaled, XceptionConfig};
use super::norm::FrozenBatchNorm;

/// Depthwise 3x3 convolution followed by a pointwise 1x1 convolution
#[derive(Module, Debug)]
pub struct SeparableConv2d<B: Backend> {
    pub depthwise: Conv2d<B>,
    pub pointwise: Conv2d<B>,
}

impl<B: Backend> SeparableConv2d<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let depthwise = Conv2dConfig::new([in_channels, in_channels], [3, 3])
            .with_groups(in_channels)
            .with_padding(PaddingConfig2d::Same)
            .with_bias(false)
            .init(device);
        let pointwise = Conv2dConfig::new([in_channels, out_channels], [1, 1])
            .with_bias(false)
            .init(device);

        Self { depthwise, pointwise }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.pointwise.forward(self.depthwise.forward(x))
    }
}

/// Residual block that halves the spatial size
///
/// `[relu] -> sep(mid) -> bn -> relu -> sep(out) -> bn -> maxpool`, added to a
/// strided 1x1 projection of the block input.
#[derive(Module, Debug)]
pub struct DownsampleBlock<B: Backend> {
    pub sep1: SeparableConv2d<B>,
    pub bn1: FrozenBatchNorm<B>,
    pub sep2: SeparableConv2d<B>,
    pub bn2: FrozenBatchNorm<B>,
    pub pool: MaxPool2d,
    pub shortcut: Conv2d<B>,
    pub shortcut_bn: FrozenBatchNorm<B>,
    relu: Relu,
    pre_activation: bool,
}

impl<B: Backend> DownsampleBlock<B> {
    pub fn new(
        in_channels: usize,
        mid_channels: usize,
        out_channels: usize,
        pre_activation: bool,
        epsilon: f64,
        device: &B::Device,
    ) -> Self {
        let shortcut = Conv2dConfig::new([in_channels, out_channels], [1, 1])
            .with_stride([2, 2])
            .with_bias(false)
            .init(device);

        Self {
            sep1: SeparableConv2d::new(in_channels, mid_channels, device),
            bn1: FrozenBatchNorm::new(mid_channels, epsilon, device),
            sep2: SeparableConv2d::new(mid_channels, out_channels, device),
            bn2: FrozenBatchNorm::new(out_channels, epsilon, device),
            pool: MaxPool2dConfig::new([3, 3]).with_strides([2, 2]).init(),
            shortcut,
            shortcut_bn: FrozenBatchNorm::new(out_channels, epsilon, device),
            relu: Relu::new(),
            pre_activation,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let residual = self.shortcut_bn.forward(self.shortcut.forward(x.clone()));

        let x = if self.pre_activation {
            self.relu.forward(x)
        } else {
            x
        };
        let x = self.bn1.forward(self.sep1.forward(x));
        let x = self.relu.forward(x);
        let x = self.bn2.forward(self.sep2.forward(x));
        let x = self.pool_same(x);

        x + residual
    }

    /// 3x3 stride 2 max pooling with "same" output size `ceil(n / 2)`
    ///
    /// Odd sides are padded by one on both ends, even sides only at the
    /// bottom and right, so window `i` always starts at input row `2i - pad`
    /// and lines up with the strided shortcut.
    pub fn pool_same(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, _, height, width] = x.dims();
        let before = |side: usize| side % 2;
        let padding = (before(width), 1, before(height), 1);

        self.pool.forward(x.pad(padding, f32::NEG_INFINITY))
    }
}

/// Middle-flow block: three pre-activated separable convs with identity skip
#[derive(Module, Debug)]
pub struct MiddleBlock<B: Backend> {
    pub convs: Vec<SeparableConv2d<B>>,
    pub norms: Vec<FrozenBatchNorm<B>>,
    relu: Relu,
}

impl<B: Backend> MiddleBlock<B> {
    pub fn new(channels: usize, epsilon: f64, device: &B::Device) -> Self {
        Self {
            convs: (0..3)
                .map(|_| SeparableConv2d::new(channels, channels, device))
                .collect(),
            norms: (0..3)
                .map(|_| FrozenBatchNorm::new(channels, epsilon, device))
                .collect(),
            relu: Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut out = x.clone();
        for (conv, norm) in self.convs.iter().zip(self.norms.iter()) {
            out = norm.forward(conv.forward(self.relu.forward(out)));
        }
        out + x
    }
}

/// Xception backbone with a dense classification head
#[derive(Module, Debug)]
pub struct XceptionClassifier<B: Backend> {
    // Entry flow stem
    pub stem_conv1: Conv2d<B>,
    pub stem_bn1: FrozenBatchNorm<B>,
    pub stem_conv2: Conv2d<B>,
    pub stem_bn2: FrozenBatchNorm<B>,

    // Entry flow residual blocks
    pub entry: Vec<DownsampleBlock<B>>,

    // Middle flow
    pub middle: Vec<MiddleBlock<B>>,

    // Exit flow
    pub exit_block: DownsampleBlock<B>,
    pub exit_sep1: SeparableConv2d<B>,
    pub exit_bn1: FrozenBatchNorm<B>,
    pub exit_sep2: SeparableConv2d<B>,
    pub exit_bn2: FrozenBatchNorm<B>,

    // Classifier head
    pub fc1: Linear<B>,
    pub fc2: Linear<B>,

    relu: Relu,
    config: Ignored<XceptionConfig>,
}

impl<B: Backend> XceptionClassifier<B> {
    /// Create a new classifier from configuration
    pub fn new(config: &XceptionConfig, device: &B::Device) -> Self {
        let d = config.width_divisor;
        let eps = config.bn_epsilon;
        let c = |channels: usize| scaled(channels, d);

        // Stem: 3 -> 32 (stride 2, valid) -> 64 (valid)
        let stem_conv1 = Conv2dConfig::new([3, c(32)], [3, 3])
            .with_stride([2, 2])
            .with_bias(false)
            .init(device);
        let stem_conv2 = Conv2dConfig::new([c(32), c(64)], [3, 3])
            .with_bias(false)
            .init(device);

        // Entry blocks: 64 -> 128 -> 256 -> 728, first one without leading relu
        let entry = vec![
            DownsampleBlock::new(c(64), c(128), c(128), false, eps, device),
            DownsampleBlock::new(c(128), c(256), c(256), true, eps, device),
            DownsampleBlock::new(c(256), c(728), c(728), true, eps, device),
        ];

        let middle = (0..config.middle_blocks)
            .map(|_| MiddleBlock::new(c(728), eps, device))
            .collect();

        Self {
            stem_conv1,
            stem_bn1: FrozenBatchNorm::new(c(32), eps, device),
            stem_conv2,
            stem_bn2: FrozenBatchNorm::new(c(64), eps, device),
            entry,
            middle,
            exit_block: DownsampleBlock::new(c(728), c(728), c(1024), true, eps, device),
            exit_sep1: SeparableConv2d::new(c(1024), c(1536), device),
            exit_bn1: FrozenBatchNorm::new(c(1536), eps, device),
            exit_sep2: SeparableConv2d::new(c(1536), c(2048), device),
            exit_bn2: FrozenBatchNorm::new(c(2048), eps, device),
            fc1: LinearConfig::new(config.feature_channels(), config.dense_units).init(device),
            fc2: LinearConfig::new(config.dense_units, config.num_classes).init(device),
            relu: Relu::new(),
            config: Ignored(config.clone()),
        }
    }

    /// Backbone features after global max pooling, shape [batch_size, channels]
    pub fn features(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.relu.forward(self.stem_bn1.forward(self.stem_conv1.forward(x)));
        let x = self.relu.forward(self.stem_bn2.forward(self.stem_conv2.forward(x)));

        let x = self.entry.iter().fold(x, |x, block| block.forward(x));
        let x = self.middle.iter().fold(x, |x, block| block.forward(x));

        let x = self.exit_block.forward(x);
        let x = self.relu.forward(self.exit_bn1.forward(self.exit_sep1.forward(x)));
        let x = self.relu.forward(self.exit_bn2.forward(self.exit_sep2.forward(x)));

        // Global max pooling: [B, C, H, W] -> [B, C]
        let [batch_size, channels, height, width] = x.dims();
        x.reshape([batch_size, channels, height * width])
            .max_dim(2)
            .reshape([batch_size, channels])
    }

    /// Forward pass returning logits of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.features(x);
        let x = self.relu.forward(self.fc1.forward(x));
        self.fc2.forward(x)
    }

    /// Configuration the network was built from
    pub fn config(&self) -> &XceptionConfig {
        &self.config.0
    }

    /// Get the number of output classes
    pub fn num_classes(&self) -> usize {
        self.config.0.num_classes
    }

    /// Expected input size (square)
    pub fn input_size(&self) -> usize {
        self.config.0.input_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    type TestBackend = NdArray;

    fn tiny_config() -> XceptionConfig {
        XceptionConfig::new()
            .with_input_size(71)
            .with_middle_blocks(1)
            .with_width_divisor(16)
    }

    #[test]
    fn test_xception_output_shape() {
        let device = Default::default();
        let model = XceptionClassifier::<TestBackend>::new(&tiny_config(), &device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 71, 71], &device);
        let output = model.forward(input);

        assert_eq!(output.dims(), [2, 4]);
        assert_eq!(model.num_classes(), 4);
        assert_eq!(model.input_size(), 71);
    }

    #[test]
    fn test_feature_width_follows_divisor() {
        let device = Default::default();
        let config = tiny_config();
        let model = XceptionClassifier::<TestBackend>::new(&config, &device);

        let input = Tensor::<TestBackend, 4>::ones([1, 3, 71, 71], &device);
        let features = model.features(input);

        assert_eq!(features.dims(), [1, config.feature_channels()]);
    }

    fn arange_map(side: usize, device: &<TestBackend as Backend>::Device) -> Tensor<TestBackend, 4> {
        let values: Vec<f32> = (0..side * side).map(|v| v as f32).collect();
        Tensor::from_data(TensorData::new(values, [1, 1, side, side]), device)
    }

    #[test]
    fn test_pool_same_even_pads_bottom_right() {
        let device = Default::default();
        let block = DownsampleBlock::<TestBackend>::new(1, 1, 1, true, 1e-3, &device);

        let pooled: Vec<f32> = block
            .pool_same(arange_map(4, &device))
            .into_data()
            .to_vec()
            .unwrap();
        assert_eq!(pooled, vec![10.0, 11.0, 14.0, 15.0]);
    }

    #[test]
    fn test_pool_same_odd_pads_both_sides() {
        let device = Default::default();
        let block = DownsampleBlock::<TestBackend>::new(1, 1, 1, true, 1e-3, &device);

        let pooled: Vec<f32> = block
            .pool_same(arange_map(5, &device))
            .into_data()
            .to_vec()
            .unwrap();
        assert_eq!(pooled, vec![6.0, 8.0, 9.0, 16.0, 18.0, 19.0, 21.0, 23.0, 24.0]);
    }

    #[test]
    fn test_downsample_block_even_input() {
        let device = Default::default();
        let block = DownsampleBlock::<TestBackend>::new(4, 8, 8, true, 1e-3, &device);

        let input = Tensor::<TestBackend, 4>::ones([1, 4, 74, 74], &device);
        assert_eq!(block.forward(input).dims(), [1, 8, 37, 37]);
    }

    #[test]
    fn test_downsample_block_halves_size() {
        let device = Default::default();
        let block = DownsampleBlock::<TestBackend>::new(4, 8, 8, true, 1e-3, &device);

        let input = Tensor::<TestBackend, 4>::ones([1, 4, 33, 33], &device);
        assert_eq!(block.forward(input).dims(), [1, 8, 17, 17]);
    }
}
