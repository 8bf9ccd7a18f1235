/*
 * @Author       : 老董
 * @Date         : 2026-03-01
 * @Description  : 神经网络（neural network）部分：计算图、节点、变量句柄与卷积层
 */

mod display;
mod graph;
pub mod layer;
mod module;
mod nodes;
mod var;
mod var_ops;

pub(in crate::nn) use display::format_node_display;
pub use graph::{Graph, GraphError, GraphInner};
pub use layer::{ConvLayer, ConvLayerConfig};
pub use module::Module;
pub use nodes::{BatchNormOptions, NodeId, Padding, Padding2d};
pub use var::{Init, Var};
pub use var_ops::{VarActivationOps, VarConvOps, VarLossOps, VarShapeOps};

#[cfg(test)]
mod tests;
