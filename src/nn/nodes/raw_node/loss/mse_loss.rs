use super::super::{TraitNode, parent_value};
use crate::nn::GraphError;
use crate::nn::nodes::{NodeHandle, NodeId};
use crate::tensor::Tensor;

/// MSE（均方误差）损失节点
///
/// ## 公式
/// `MSE = mean((input - target)^2)`
///
/// ## 梯度
/// `∂L/∂input = 2 * (input - target) / N`，`∂L/∂target = -∂L/∂input`
///
/// ## 输出
/// 标量损失值 [1, 1]
#[derive(Clone)]
pub(in crate::nn) struct MseLoss {
    id: NodeId,
    name: String,
    value: Option<Tensor>,
    grad: Option<Tensor>,
    shape: Vec<usize>,
    /// 缓存 input - target，用于反向传播
    diff_cache: Option<Tensor>,
    parents_ids: [NodeId; 2],
}

impl MseLoss {
    pub(in crate::nn) fn new(parents: &[&NodeHandle]) -> Result<Self, GraphError> {
        // 1. 验证父节点数量
        if parents.len() != 2 {
            return Err(GraphError::InvalidOperation(
                "MseLoss 节点需要 2 个父节点（input 和 target）".to_string(),
            ));
        }

        // 2. 验证形状一致
        let input_shape = parents[0].value_expected_shape();
        let target_shape = parents[1].value_expected_shape();
        if input_shape != target_shape {
            return Err(GraphError::ShapeMismatch {
                expected: input_shape.to_vec(),
                got: target_shape.to_vec(),
                message: "MseLoss 的 input 与 target 形状必须一致".to_string(),
            });
        }

        Ok(Self {
            id: NodeId(0),
            name: String::new(),
            value: None,
            grad: None,
            shape: vec![1, 1],
            diff_cache: None,
            parents_ids: [parents[0].id(), parents[1].id()],
        })
    }
}

impl TraitNode for MseLoss {
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
        "MseLoss"
    }

    fn value_expected_shape(&self) -> &[usize] {
        &self.shape
    }

    fn calc_value_by_parents(&mut self, parents: &[NodeHandle]) -> Result<(), GraphError> {
        let display = self.display_node();
        let input = parent_value(&display, &parents[0])?;
        let target = parent_value(&display, &parents[1])?;

        let diff = input - target;
        let loss = diff.map(|d| d * d).sum_all() / diff.size().max(1) as f32;
        self.value = Some(Tensor::new(&[loss], &[1, 1]));
        self.diff_cache = Some(diff);
        Ok(())
    }

    fn value(&self) -> Option<&Tensor> {
        self.value.as_ref()
    }

    fn calc_grad_to_parent(
        &self,
        target_parent: &NodeHandle,
        upstream_grad: &Tensor,
        _assistant_parent: Option<&NodeHandle>,
    ) -> Result<Tensor, GraphError> {
        let diff = self.diff_cache.as_ref().ok_or_else(|| {
            GraphError::ComputationError(format!(
                "{}缺少差值缓存，请先执行前向传播",
                self.display_node()
            ))
        })?;
        let upstream = upstream_grad.get_data_number().ok_or_else(|| {
            GraphError::ShapeMismatch {
                expected: vec![1, 1],
                got: upstream_grad.shape().to_vec(),
                message: format!("{}的上游梯度必须是标量", self.display_node()),
            }
        })?;

        let scale = 2.0 * upstream / diff.size().max(1) as f32;
        let sign = if target_parent.id() == self.parents_ids[0] {
            1.0
        } else {
            -1.0
        };
        Ok(diff * (sign * scale))
    }

    fn grad(&self) -> Option<&Tensor> {
        self.grad.as_ref()
    }

    fn set_grad(&mut self, grad: Option<&Tensor>) -> Result<(), GraphError> {
        self.grad = grad.cloned();
        Ok(())
    }
}
