mod input;
mod loss;
mod ops;
mod parameter;
mod state;

pub(in crate::nn) use input::Input;
pub(in crate::nn) use loss::*;
pub(in crate::nn) use ops::*;
pub use ops::{BatchNormOptions, Padding, Padding2d};
pub(in crate::nn) use parameter::Parameter;
pub(in crate::nn) use state::State;

use super::{NodeHandle, NodeId};
use crate::nn::GraphError;
use crate::nn::format_node_display;
use crate::tensor::Tensor;
use enum_dispatch::enum_dispatch;

#[enum_dispatch]
#[derive(Clone)]
pub(in crate::nn) enum NodeType {
    /*↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓叶子↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓*/
    Input(Input),
    Parameter(Parameter),
    State(State),
    /*↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑叶子↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑*/
    /*↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓算子↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓*/
    Conv2d(Conv2d),
    ChannelBiasAdd(ChannelBiasAdd),
    BatchNorm2d(BatchNorm2d),
    LeakyReLU(LeakyReLU),
    Tanh(Tanh),
    Sigmoid(Sigmoid),
    Permute(Permute),
    ClipGrad(ClipGrad),
    /*↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑算子↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑*/
    MseLoss(MseLoss),
}

impl NodeType {
    /// 叶子节点（输入/参数/状态）的值只能通过 set_value 设置
    pub(in crate::nn) const fn is_leaf(&self) -> bool {
        matches!(self, Self::Input(_) | Self::Parameter(_) | Self::State(_))
    }

    /// 反向传播时不接收梯度的节点
    pub(in crate::nn) const fn is_grad_sink(&self) -> bool {
        matches!(self, Self::Input(_) | Self::State(_))
    }
}

#[enum_dispatch(NodeType)]
pub(in crate::nn) trait TraitNode {
    fn id(&self) -> NodeId;

    fn set_id(&mut self, id: NodeId);

    fn name(&self) -> &str;

    fn set_name(&mut self, name: &str);

    /// 节点类型名，用于显示与自动命名
    fn type_name(&self) -> &'static str;

    fn display_node(&self) -> String {
        format_node_display(self.id(), self.name(), self.type_name())
    }

    /// 节点创建时即确定的输出形状
    fn value_expected_shape(&self) -> &[usize];

    // 根据父节点的值计算本节点的值（注意：由于该接口只在Graph中使用，所以实现时不用关心父节点的值是否已被计算，所有父节点的值已预先被计算过了）
    fn calc_value_by_parents(&mut self, parents: &[NodeHandle]) -> Result<(), GraphError>;

    fn value(&self) -> Option<&Tensor>;

    fn set_value(&mut self, _value: Option<&Tensor>) -> Result<(), GraphError> {
        Err(GraphError::InvalidOperation(format!(
            "{}的值不应该被手动设置",
            self.display_node()
        )))
    }

    /// 计算本节点对某个父节点的梯度（VJP）：给定上游梯度 dL/dself，返回 dL/dparent
    fn calc_grad_to_parent(
        &self,
        target_parent: &NodeHandle,
        upstream_grad: &Tensor,
        assistant_parent: Option<&NodeHandle>,
    ) -> Result<Tensor, GraphError>;

    fn grad(&self) -> Option<&Tensor>;

    fn set_grad(&mut self, grad: Option<&Tensor>) -> Result<(), GraphError>;

    fn clear_grad(&mut self) -> Result<(), GraphError> {
        self.set_grad(None)
    }

    /// 取出本次前向计算产生的状态回写（目标 State 节点 ID 与新值），取出后即清空
    fn take_state_updates(&mut self) -> Vec<(NodeId, Tensor)> {
        Vec::new()
    }
}

/// 取父节点的值，缺失时报计算错误
pub(in crate::nn::nodes::raw_node) fn parent_value<'a>(
    node_display: &str,
    parent: &'a NodeHandle,
) -> Result<&'a Tensor, GraphError> {
    parent.value().ok_or_else(|| {
        GraphError::ComputationError(format!(
            "{node_display}的父{parent}没有值。不该触及本错误，否则说明crate代码有问题"
        ))
    })
}
