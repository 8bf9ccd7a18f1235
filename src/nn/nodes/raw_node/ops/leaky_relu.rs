use super::super::{TraitNode, parent_value};
use crate::nn::GraphError;
use crate::nn::nodes::{NodeHandle, NodeId};
use crate::tensor::Tensor;

/// Leaky ReLU 激活函数节点
///
/// forward: f(x) = x if x >= 0, else negative_slope * x
/// backward: d(f)/dx = 1 if x > 0, else negative_slope
///
/// 当 negative_slope = 0 时，等价于标准 ReLU
#[derive(Clone)]
pub(in crate::nn) struct LeakyReLU {
    id: NodeId,
    name: String,
    value: Option<Tensor>,
    grad: Option<Tensor>,
    shape: Vec<usize>,
    /// 负半轴斜率
    negative_slope: f32,
    /// 缓存父节点的值（用于反向传播时判断梯度）
    parent_value: Option<Tensor>,
}

impl LeakyReLU {
    pub(in crate::nn) fn new(parents: &[&NodeHandle], negative_slope: f32) -> Result<Self, GraphError> {
        // 1. 必要的验证
        // 1.1 父节点数量验证
        if parents.len() != 1 {
            return Err(GraphError::InvalidOperation(
                "LeakyReLU节点只需要1个父节点".to_string(),
            ));
        }

        // 1.2 negative_slope 验证（应该是非负的有限数）
        if !(negative_slope.is_finite() && negative_slope >= 0.0) {
            return Err(GraphError::InvalidOperation(format!(
                "LeakyReLU的negative_slope应为非负数，但得到: {negative_slope}"
            )));
        }

        // 2. 返回
        Ok(Self {
            id: NodeId(0),
            name: String::new(),
            value: None,
            grad: None,
            shape: parents[0].value_expected_shape().to_vec(),
            negative_slope,
            parent_value: None,
        })
    }
}

impl TraitNode for LeakyReLU {
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
        if self.negative_slope == 0.0 {
            "ReLU"
        } else {
            "LeakyReLU"
        }
    }

    fn value_expected_shape(&self) -> &[usize] {
        &self.shape
    }

    fn calc_value_by_parents(&mut self, parents: &[NodeHandle]) -> Result<(), GraphError> {
        // 1. 获取并缓存父节点的值
        let parent_value = parent_value(&self.display_node(), &parents[0])?.clone();

        // 2. 计算 LeakyReLU
        let slope = self.negative_slope;
        self.value = Some(parent_value.where_with_f32(|x| x >= 0.0, |x| x, |x| slope * x));
        self.parent_value = Some(parent_value);
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
        let parent_value = self.parent_value.as_ref().ok_or_else(|| {
            GraphError::ComputationError(format!(
                "{}没有缓存的父节点值，无法计算梯度",
                self.display_node()
            ))
        })?;

        // 局部梯度：x > 0 时为 1，否则为 negative_slope
        let slope = self.negative_slope;
        let local_grad = parent_value.where_with_f32(|x| x > 0.0, |_| 1.0, |_| slope);
        Ok(upstream_grad * &local_grad)
    }

    fn grad(&self) -> Option<&Tensor> {
        self.grad.as_ref()
    }

    fn set_grad(&mut self, grad: Option<&Tensor>) -> Result<(), GraphError> {
        self.grad = grad.cloned();
        Ok(())
    }
}
