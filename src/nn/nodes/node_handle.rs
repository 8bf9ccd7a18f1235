use super::NodeId;
use super::raw_node::{NodeType, TraitNode};
use crate::nn::GraphError;
use crate::tensor::Tensor;
use std::fmt;

/// 图中节点的句柄：原始节点 + 图层面的簿记（前向传播 id、detach 状态）
#[derive(Clone)]
pub(in crate::nn) struct NodeHandle {
    raw_node: NodeType,
    /// 最后一次参与的前向传播 id（用于单次前向传播内的去重）
    last_forward_pass_id: u64,
    /// 值最近一次变化时图的版本号，用于判断算子节点的值是否已过期
    value_version: u64,
    /// 被 detach 的节点不再向父节点传播梯度，自身也不再累积梯度
    is_detached: bool,
}

impl NodeHandle {
    pub(in crate::nn) fn new<T: Into<NodeType>>(raw_node: T) -> Self {
        Self {
            raw_node: raw_node.into(),
            last_forward_pass_id: 0,
            value_version: 0,
            is_detached: false,
        }
    }

    pub(in crate::nn) fn bind_id_and_name(&mut self, id: NodeId, name: &str) {
        self.raw_node.set_id(id);
        self.raw_node.set_name(name);
    }

    pub(in crate::nn) fn id(&self) -> NodeId {
        self.raw_node.id()
    }

    pub(in crate::nn) fn name(&self) -> &str {
        self.raw_node.name()
    }

    pub(in crate::nn) const fn node_type(&self) -> &NodeType {
        &self.raw_node
    }

    pub(in crate::nn) fn value_expected_shape(&self) -> &[usize] {
        self.raw_node.value_expected_shape()
    }

    // ========== 值 ==========

    pub(in crate::nn) fn value(&self) -> Option<&Tensor> {
        self.raw_node.value()
    }

    pub(in crate::nn) fn has_value(&self) -> bool {
        self.value().is_some()
    }

    /// 设置节点的值，非空时形状必须与节点创建时的预期形状一致
    pub(in crate::nn) fn set_value(&mut self, value: Option<&Tensor>) -> Result<(), GraphError> {
        if let Some(v) = value {
            let expected = self.value_expected_shape();
            if v.shape() != expected {
                return Err(GraphError::ShapeMismatch {
                    expected: expected.to_vec(),
                    got: v.shape().to_vec(),
                    message: format!("{}的新值形状与预期不符", self),
                });
            }
        }
        self.raw_node.set_value(value)
    }

    pub(in crate::nn) fn calc_value_by_parents(
        &mut self,
        parents: &[Self],
    ) -> Result<(), GraphError> {
        self.raw_node.calc_value_by_parents(parents)
    }

    pub(in crate::nn) fn take_state_updates(&mut self) -> Vec<(NodeId, Tensor)> {
        self.raw_node.take_state_updates()
    }

    // ========== 梯度 ==========

    pub(in crate::nn) fn calc_grad_to_parent(
        &self,
        target_parent: &Self,
        upstream_grad: &Tensor,
        assistant_parent: Option<&Self>,
    ) -> Result<Tensor, GraphError> {
        self.raw_node
            .calc_grad_to_parent(target_parent, upstream_grad, assistant_parent)
    }

    pub(in crate::nn) fn grad(&self) -> Option<&Tensor> {
        self.raw_node.grad()
    }

    pub(in crate::nn) fn set_grad(&mut self, grad: Option<&Tensor>) -> Result<(), GraphError> {
        self.raw_node.set_grad(grad)
    }

    pub(in crate::nn) fn clear_grad(&mut self) -> Result<(), GraphError> {
        self.raw_node.clear_grad()
    }

    // ========== 图簿记 ==========

    pub(in crate::nn) const fn last_forward_pass_id(&self) -> u64 {
        self.last_forward_pass_id
    }

    pub(in crate::nn) const fn set_last_forward_pass_id(&mut self, id: u64) {
        self.last_forward_pass_id = id;
    }

    pub(in crate::nn) const fn value_version(&self) -> u64 {
        self.value_version
    }

    pub(in crate::nn) const fn set_value_version(&mut self, version: u64) {
        self.value_version = version;
    }

    pub(in crate::nn) const fn is_detached(&self) -> bool {
        self.is_detached
    }

    pub(in crate::nn) const fn set_detached(&mut self, detached: bool) {
        self.is_detached = detached;
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw_node.display_node())
    }
}
