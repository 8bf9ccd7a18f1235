use super::TraitNode;
use crate::nn::GraphError;
use crate::nn::nodes::{NodeHandle, NodeId};
use crate::tensor::Tensor;

/// 状态节点：不可训练、但会被算子在前向传播后回写的张量（如 BN 的滑动均值/方差）
#[derive(Clone)]
pub(in crate::nn) struct State {
    id: NodeId,
    name: String,
    value: Option<Tensor>,
    shape: Vec<usize>,
}

impl State {
    pub(in crate::nn) fn new(shape: &[usize]) -> Result<Self, GraphError> {
        if shape.is_empty() {
            return Err(GraphError::DimensionMismatch {
                expected: 1,
                got: 0,
                message: "状态节点至少需要 1 维".to_string(),
            });
        }
        Ok(Self {
            id: NodeId(0),
            name: String::new(),
            value: None,
            shape: shape.to_vec(),
        })
    }
}

impl TraitNode for State {
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
        "State"
    }

    fn value_expected_shape(&self) -> &[usize] {
        &self.shape
    }

    fn calc_value_by_parents(&mut self, _parents: &[NodeHandle]) -> Result<(), GraphError> {
        Err(GraphError::InvalidOperation(format!(
            "{}被执行了前向传播。不该触及本错误，否则说明crate代码有问题",
            self.display_node()
        )))
    }

    fn value(&self) -> Option<&Tensor> {
        self.value.as_ref()
    }

    fn set_value(&mut self, value: Option<&Tensor>) -> Result<(), GraphError> {
        self.value = value.cloned();
        Ok(())
    }

    fn calc_grad_to_parent(
        &self,
        _target_parent: &NodeHandle,
        _upstream_grad: &Tensor,
        _assistant_parent: Option<&NodeHandle>,
    ) -> Result<Tensor, GraphError> {
        Err(GraphError::InvalidOperation(format!(
            "{}没有父节点。不该触及本错误，否则说明crate代码有问题",
            self.display_node()
        )))
    }

    fn grad(&self) -> Option<&Tensor> {
        None
    }

    fn set_grad(&mut self, grad: Option<&Tensor>) -> Result<(), GraphError> {
        match grad {
            None => Ok(()),
            Some(_) => Err(GraphError::InvalidOperation(format!(
                "{}不参与梯度计算",
                self.display_node()
            ))),
        }
    }
}
