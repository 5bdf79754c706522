//! Batch normalization with frozen statistics.
//!
//! The classifiers are inference-only, so normalization always uses the
//! stored running mean and variance, also when the model sits on the
//! autodiff backend for saliency.

use burn::{
    module::{Module, Param},
    tensor::{backend::Backend, Tensor},
};

/// Batch norm over the channel axis of an NCHW tensor
#[derive(Module, Debug)]
pub struct FrozenBatchNorm<B: Backend> {
    pub gamma: Param<Tensor<B, 1>>,
    pub beta: Param<Tensor<B, 1>>,
    pub running_mean: Param<Tensor<B, 1>>,
    pub running_var: Param<Tensor<B, 1>>,
    epsilon: f64,
}

impl<B: Backend> FrozenBatchNorm<B> {
    /// Identity-initialized batch norm for `channels` channels
    pub fn new(channels: usize, epsilon: f64, device: &B::Device) -> Self {
        Self {
            gamma: Param::from_tensor(Tensor::ones([channels], device)),
            beta: Param::from_tensor(Tensor::zeros([channels], device)),
            running_mean: Param::from_tensor(Tensor::zeros([channels], device)),
            running_var: Param::from_tensor(Tensor::ones([channels], device)),
            epsilon,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, channels, _, _] = x.dims();
        let shape = [1, channels, 1, 1];

        let mean = self.running_mean.val().reshape(shape);
        let std = self.running_var.val().add_scalar(self.epsilon).sqrt().reshape(shape);
        let gamma = self.gamma.val().reshape(shape);
        let beta = self.beta.val().reshape(shape);

        (x - mean) / std * gamma + beta
    }
}
