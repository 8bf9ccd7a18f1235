/*
 * @Author       : 老董
 * @Date         : 2026-03-05
 * @Description  : Layer 模块 - 组合 Node 构建卷积层
 *
 * Layer 不是新的抽象层，只是把若干节点按固定顺序接起来，并持有参数。
 */

mod config;
mod conv_layer;

pub use config::{Activation, ConvLayerConfig, DataFormat, ShapeTriple};
pub use conv_layer::{ConvLayer, OutputShape, ParamMap};
