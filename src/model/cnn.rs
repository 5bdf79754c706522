//! Custom CNN Classifier
//!
//! A plain convolutional stack trained from scratch on MRI scans.
//! Four blocks of 3x3 convolution with "same" padding, ReLU and 2x2 max
//! pooling, then a flattened dense head.

use burn::{
    module::{Ignored, Module},
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use super::config::CustomCnnConfig;

/// Conv2d (same padding) -> ReLU -> MaxPool(2x2)
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub relu: Relu,
    pub pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    /// Create a new convolutional block
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);

        Self {
            conv,
            relu: Relu::new(),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }

    /// Forward pass through the block
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.relu.forward(x);
        self.pool.forward(x)
    }
}

/// Custom CNN tumor classifier
///
/// Architecture:
/// - 4 convolutional blocks with 512, 256, 128 and 64 filters
/// - Flatten
/// - Dense(256, relu) -> Dense(num_classes)
#[derive(Module, Debug)]
pub struct CustomCnn<B: Backend> {
    pub conv1: ConvBlock<B>,
    pub conv2: ConvBlock<B>,
    pub conv3: ConvBlock<B>,
    pub conv4: ConvBlock<B>,

    pub fc1: Linear<B>,
    pub fc2: Linear<B>,

    config: Ignored<CustomCnnConfig>,
}

impl<B: Backend> CustomCnn<B> {
    /// Create a new classifier from configuration
    pub fn new(config: &CustomCnnConfig, device: &B::Device) -> Self {
        let [f1, f2, f3, f4] = config.filters();

        Self {
            conv1: ConvBlock::new(3, f1, device),  // 224 -> 112
            conv2: ConvBlock::new(f1, f2, device), // 112 -> 56
            conv3: ConvBlock::new(f2, f3, device), // 56 -> 28
            conv4: ConvBlock::new(f3, f4, device), // 28 -> 14
            fc1: LinearConfig::new(config.flatten_features(), config.dense_units).init(device),
            fc2: LinearConfig::new(config.dense_units, config.num_classes).init(device),
            config: Ignored(config.clone()),
        }
    }

    /// Forward pass through the network
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, 3, height, width]
    ///
    /// # Returns
    /// * Logits tensor of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(x);
        let x = self.conv2.forward(x);
        let x = self.conv3.forward(x);
        let x = self.conv4.forward(x);

        // Flatten: [B, C, H, W] -> [B, C * H * W]
        let [batch_size, channels, height, width] = x.dims();
        let x = x.reshape([batch_size, channels * height * width]);

        let x = self.fc1.forward(x);
        let x = Relu::new().forward(x);
        self.fc2.forward(x)
    }

    /// Configuration the network was built from
    pub fn config(&self) -> &CustomCnnConfig {
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

    type TestBackend = NdArray;

    #[test]
    fn test_custom_cnn_output_shape() {
        let device = Default::default();
        let config = CustomCnnConfig::new()
            .with_input_size(32)
            .with_width_divisor(32)
            .with_dense_units(8);
        let model = CustomCnn::<TestBackend>::new(&config, &device);

        // Create dummy input: [batch=2, channels=3, height=32, width=32]
        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);
        let output = model.forward(input);

        assert_eq!(output.dims(), [2, 4]);
        assert_eq!(model.num_classes(), 4);
    }

    #[test]
    fn test_conv_block_halves_size() {
        let device = Default::default();
        let block = ConvBlock::<TestBackend>::new(3, 4, &device);

        let input = Tensor::<TestBackend, 4>::ones([1, 3, 16, 16], &device);
        assert_eq!(block.forward(input).dims(), [1, 4, 8, 8]);
    }
}
