//! # Conv Layer
//!
//! `conv_layer`在一个轻量的自研计算图（显式传入的`Graph`上下文、VJP反向传播）之上，
//! 提供“卷积 + 可选批归一化 + 激活 + 梯度裁剪”组合而成的卷积层`ConvLayer`。
//!

pub mod errors;
pub mod nn;
pub mod tensor;
pub mod utils;
