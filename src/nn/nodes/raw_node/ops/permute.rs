use super::super::{TraitNode, parent_value};
use crate::nn::GraphError;
use crate::nn::nodes::{NodeHandle, NodeId};
use crate::tensor::Tensor;

/// 维度置换节点：output = input.permute(axes)，梯度按逆置换还原
#[derive(Clone)]
pub(in crate::nn) struct Permute {
    id: NodeId,
    name: String,
    value: Option<Tensor>,
    grad: Option<Tensor>,
    shape: Vec<usize>,
    axes: Vec<usize>,
    inverse_axes: Vec<usize>,
}

impl Permute {
    pub(in crate::nn) fn new(parents: &[&NodeHandle], axes: &[usize]) -> Result<Self, GraphError> {
        // 1. 必要的验证
        if parents.len() != 1 {
            return Err(GraphError::InvalidOperation(
                "Permute节点只需要1个父节点".to_string(),
            ));
        }
        let parent_shape = parents[0].value_expected_shape();
        if axes.len() != parent_shape.len() || axes.len() < 2 {
            return Err(GraphError::DimensionMismatch {
                expected: parent_shape.len(),
                got: axes.len(),
                message: format!(
                    "置换轴{axes:?}的个数必须等于输入维数（且至少为2），输入形状为{parent_shape:?}"
                ),
            });
        }
        let mut inverse_axes = vec![usize::MAX; axes.len()];
        for (i, &axis) in axes.iter().enumerate() {
            if axis >= axes.len() || inverse_axes[axis] != usize::MAX {
                return Err(GraphError::InvalidOperation(format!(
                    "置换轴{axes:?}必须是唯一且在[0, {})范围内",
                    axes.len()
                )));
            }
            inverse_axes[axis] = i;
        }

        // 2. 返回
        Ok(Self {
            id: NodeId(0),
            name: String::new(),
            value: None,
            grad: None,
            shape: axes.iter().map(|&a| parent_shape[a]).collect(),
            axes: axes.to_vec(),
            inverse_axes,
        })
    }
}

impl TraitNode for Permute {
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
        "Permute"
    }

    fn value_expected_shape(&self) -> &[usize] {
        &self.shape
    }

    fn calc_value_by_parents(&mut self, parents: &[NodeHandle]) -> Result<(), GraphError> {
        let parent_value = parent_value(&self.display_node(), &parents[0])?;
        self.value = Some(parent_value.permute(&self.axes));
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
        Ok(upstream_grad.permute(&self.inverse_axes))
    }

    fn grad(&self) -> Option<&Tensor> {
        self.grad.as_ref()
    }

    fn set_grad(&mut self, grad: Option<&Tensor>) -> Result<(), GraphError> {
        self.grad = grad.cloned();
        Ok(())
    }
}
