/*
 * @Author       : 老董
 * @Date         : 2026-03-04
 * @Description  : ClipGrad 节点 - 自定义梯度规则
 *
 * 前向：恒等映射，值原样传递
 * 反向：上游梯度逐元素裁剪到 [min, max] 后再传给父节点
 */

use super::super::{TraitNode, parent_value};
use crate::nn::GraphError;
use crate::nn::nodes::{NodeHandle, NodeId};
use crate::tensor::Tensor;

#[derive(Clone)]
pub(in crate::nn) struct ClipGrad {
    id: NodeId,
    name: String,
    value: Option<Tensor>,
    grad: Option<Tensor>,
    shape: Vec<usize>,
    min: f32,
    max: f32,
}

impl ClipGrad {
    pub(in crate::nn) fn new(parents: &[&NodeHandle], min: f32, max: f32) -> Result<Self, GraphError> {
        if parents.len() != 1 {
            return Err(GraphError::InvalidOperation(
                "ClipGrad节点只需要1个父节点".to_string(),
            ));
        }
        if min.is_nan() || max.is_nan() || min > max {
            return Err(GraphError::InvalidOperation(format!(
                "ClipGrad的裁剪区间无效：[{min}, {max}]"
            )));
        }
        Ok(Self {
            id: NodeId(0),
            name: String::new(),
            value: None,
            grad: None,
            shape: parents[0].value_expected_shape().to_vec(),
            min,
            max,
        })
    }
}

impl TraitNode for ClipGrad {
    fn id(&self) -> NodeId {
        self.id
    }

    fn set_id(&mut self, id: NodeId) {
        self.id = id;
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn type_name(&self) -> &'static str {
        "ClipGrad"
    }

    fn value_expected_shape(&self) -> &[usize] {
        &self.shape
    }

    fn calc_value_by_parents(&mut self, parents: &[NodeHandle]) -> Result<(), GraphError> {
        self.value = Some(parent_value(&self.display_node(), &parents[0])?.clone());
        Ok(())
    }

    fn value(&self) -> Option<&Tensor> {
        self.value.as_ref()
    }

    fn calc_grad_to_parent(
        &self,
        _target_parent: &NodeHandle,
        upstream_grad: &Tensor,
        _assistant_parent: Option<&NodeHandle>,
    ) -> Result<Tensor, GraphError> {
        Ok(upstream_grad.clamp(self.min, self.max))
    }

    fn grad(&self) -> Option<&Tensor> {
        self.grad.as_ref()
    }

    fn set_grad(&mut self, grad: Option<&Tensor>) -> Result<(), GraphError> {
        self.grad = grad.cloned();
        Ok(())
    }
}
