/*
 * @Author       : 老董
 * @Date         : 2026-03-04
 * @Description  : Var - 携带图引用的变量句柄，扩展方法见 var_ops
 */

use super::graph::{Graph, GraphInner};
use super::{GraphError, NodeId};
use crate::tensor::Tensor;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::cell::RefCell;
use std::rc::Rc;

// ==================== Init 枚举 ====================

/// 参数初始化策略
#[derive(Debug, Clone, PartialEq)]
pub enum Init {
    /// 常数初始化
    Constant(f32),
    /// 全零
    Zeros,
    /// 全一
    Ones,
    /// 正态分布（熵源随机）
    Normal { mean: f32, std: f32 },
    /// He 正态初始化：N(0, sqrt(2 / fan_in))，固定种子，同样的参数总得到同样的张量
    HeNormalSeeded { fan_in: usize, seed: u64 },
}

impl Init {
    /// 生成初始化后的 Tensor
    pub fn generate(&self, shape: &[usize]) -> Tensor {
        match self {
            Self::Constant(v) => &Tensor::ones(shape) * *v,
            Self::Zeros => Tensor::zeros(shape),
            Self::Ones => Tensor::ones(shape),
            Self::Normal { mean, std } => {
                Tensor::normal_with_rng(*mean, *std, shape, &mut StdRng::from_entropy())
            }
            Self::HeNormalSeeded { fan_in, seed } => {
                let std = (2.0 / (*fan_in).max(1) as f32).sqrt();
                Tensor::normal_seeded(0.0, std, shape, *seed)
            }
        }
    }
}

// ==================== Var 结构 ====================

/// 变量句柄：节点 ID + 所属图的引用
///
/// Clone 只复制 Rc，开销很低。即使原 Graph 句柄已 drop，Var 仍可正常使用。
///
/// ```
/// use conv_layer::nn::{Graph, VarActivationOps};
/// use conv_layer::tensor::Tensor;
///
/// let graph = Graph::new();
/// let x = graph.input(&Tensor::new(&[-1.0, 2.0], &[1, 2])).unwrap();
/// let y = x.relu().unwrap();
/// y.forward().unwrap();
/// assert_eq!(y.value().unwrap().unwrap(), Tensor::new(&[0.0, 2.0], &[1, 2]));
/// ```
#[derive(Clone)]
pub struct Var {
    id: NodeId,
    graph: Rc<RefCell<GraphInner>>,
}

impl std::fmt::Debug for Var {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Var").field("id", &self.id).finish()
    }
}

impl Var {
    pub(crate) const fn new(id: NodeId, graph: Rc<RefCell<GraphInner>>) -> Self {
        Self { id, graph }
    }

    pub const fn node_id(&self) -> NodeId {
        self.id
    }

    pub(crate) const fn graph(&self) -> &Rc<RefCell<GraphInner>> {
        &self.graph
    }

    /// 检查两个 Var 是否来自同一个 Graph
    pub fn same_graph(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.graph, &other.graph)
    }

    /// 获取 Var 所属的 Graph 句柄
    pub fn get_graph(&self) -> Graph {
        Graph::from_rc(Rc::clone(&self.graph))
    }

    /// 节点创建时即确定的输出形状
    pub fn value_expected_shape(&self) -> Result<Vec<usize>, GraphError> {
        Ok(self
            .graph
            .borrow()
            .get_node_value_expected_shape(self.id)?
            .to_vec())
    }

    pub fn name(&self) -> Result<String, GraphError> {
        Ok(self.graph.borrow().get_node_name(self.id)?.to_string())
    }

    pub(crate) fn ensure_same_graph(&self, other: &Self, op: &str) -> Result<(), GraphError> {
        if self.same_graph(other) {
            Ok(())
        } else {
            Err(GraphError::InvalidOperation(format!(
                "不能对来自不同 Graph 的 Var 执行{op}"
            )))
        }
    }

    // ==================== 梯度流控制 ====================

    /// 截断梯度流：反向传播不再经过本节点
    pub fn detach(&self) -> Result<Self, GraphError> {
        self.graph.borrow_mut().detach_node(self.id)?;
        Ok(self.clone())
    }

    /// 恢复梯度流
    pub fn attach(&self) -> Result<Self, GraphError> {
        self.graph.borrow_mut().attach_node(self.id)?;
        Ok(self.clone())
    }

    // ==================== 执行 ====================

    pub fn forward(&self) -> Result<(), GraphError> {
        self.graph.borrow_mut().forward(self.id)
    }

    /// 反向传播，返回 loss 的标量值
    ///
    /// 先确保前向传播已完成：值未过期的节点不会被重算，
    /// 因此紧跟在 forward 之后调用不会让 BN 的滑动统计量再更新一次。
    pub fn backward(&self) -> Result<f32, GraphError> {
        let mut g = self.graph.borrow_mut();
        g.forward(self.id)?;
        g.backward(self.id)
    }

    /// 以外部给定的上游梯度（形状须与本节点的值一致）做反向传播
    pub fn backward_with_grad(&self, seed: &Tensor) -> Result<(), GraphError> {
        let mut g = self.graph.borrow_mut();
        g.forward(self.id)?;
        g.backward_with_grad(self.id, seed)
    }

    // ==================== 值访问和设置 ====================

    /// 获取节点的值（克隆的 Tensor）
    pub fn value(&self) -> Result<Option<Tensor>, GraphError> {
        Ok(self.graph.borrow().get_node_value(self.id)?.cloned())
    }

    pub fn set_value(&self, value: &Tensor) -> Result<(), GraphError> {
        self.graph.borrow_mut().set_node_value(self.id, Some(value))
    }

    /// 获取单元素张量的值
    pub fn item(&self) -> Result<f32, GraphError> {
        let val = self.value()?.ok_or_else(|| {
            GraphError::ComputationError(format!("节点{}尚未计算值", self.id))
        })?;
        val.get_data_number()
            .ok_or_else(|| GraphError::InvalidOperation("Tensor 不是单元素张量".to_string()))
    }

    /// 获取节点的梯度（克隆的 Tensor）
    pub fn grad(&self) -> Result<Option<Tensor>, GraphError> {
        Ok(self.graph.borrow().get_node_grad(self.id)?.cloned())
    }
}
