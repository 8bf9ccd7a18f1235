mod batch_norm;
mod channel_bias_add;
mod clip_grad;
mod conv2d;
mod leaky_relu;
mod permute;
mod sigmoid;
mod tanh;

pub use batch_norm::BatchNormOptions;
pub(in crate::nn) use batch_norm::BatchNorm2d;
pub(in crate::nn) use channel_bias_add::ChannelBiasAdd;
pub(in crate::nn) use clip_grad::ClipGrad;
pub(in crate::nn) use conv2d::Conv2d;
pub use conv2d::{Padding, Padding2d};
pub(in crate::nn) use leaky_relu::LeakyReLU;
pub(in crate::nn) use permute::Permute;
pub(in crate::nn) use sigmoid::Sigmoid;
pub(in crate::nn) use tanh::Tanh;
