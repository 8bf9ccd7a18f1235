/*
 * @Author       : 老董
 * @Date         : 2026-03-04
 * @Description  : Graph 句柄（用户级 API）
 */

use super::error::GraphError;
use super::inner::GraphInner;
use crate::nn::NodeId;
use crate::nn::var::{Init, Var};
use crate::tensor::Tensor;
use std::cell::RefCell;
use std::rc::Rc;

/// Graph - 计算图句柄
///
/// - 是 `Rc<RefCell<GraphInner>>` 的薄封装，Clone 后多个句柄指向同一张图
/// - 一个模型对应一张图，显式传给每一层（不存在全局默认图）
/// - 创建的 Var 自动持有图引用
#[derive(Clone)]
pub struct Graph {
    inner: Rc<RefCell<GraphInner>>,
}

impl Graph {
    // ==================== 创建 ====================

    pub fn new() -> Self {
        Self::from_inner(GraphInner::new())
    }

    pub fn with_name(name: &str) -> Self {
        Self::from_inner(GraphInner::with_name(name))
    }

    pub fn from_inner(inner: GraphInner) -> Self {
        Self {
            inner: Rc::new(RefCell::new(inner)),
        }
    }

    pub(crate) const fn from_rc(inner: Rc<RefCell<GraphInner>>) -> Self {
        Self { inner }
    }

    /// 获取内部 GraphInner 的不可变引用
    pub fn inner(&self) -> std::cell::Ref<'_, GraphInner> {
        self.inner.borrow()
    }

    /// 获取内部 GraphInner 的可变引用
    pub fn inner_mut(&self) -> std::cell::RefMut<'_, GraphInner> {
        self.inner.borrow_mut()
    }

    pub(crate) fn inner_rc(&self) -> Rc<RefCell<GraphInner>> {
        Rc::clone(&self.inner)
    }

    /// 将 NodeId 包装成 Var（节点须属于本图）
    pub fn wrap_node_id(&self, node_id: NodeId) -> Result<Var, GraphError> {
        self.inner.borrow().get_node(node_id)?;
        Ok(Var::new(node_id, Rc::clone(&self.inner)))
    }

    // ==================== 创建变量 ====================

    /// 创建输入节点并设置数据
    pub fn input(&self, data: &Tensor) -> Result<Var, GraphError> {
        self.new_leaf(data, None, GraphInner::new_input_node)
    }

    /// 创建命名输入节点
    pub fn input_named(&self, data: &Tensor, name: &str) -> Result<Var, GraphError> {
        self.new_leaf(data, Some(name), GraphInner::new_input_node)
    }

    /// 创建参数节点，并按 `init` 初始化其值
    pub fn parameter(&self, shape: &[usize], init: Init, name: &str) -> Result<Var, GraphError> {
        self.new_leaf(&init.generate(shape), Some(name), GraphInner::new_parameter_node)
    }

    /// 以给定的值创建参数节点
    pub fn parameter_with_value(&self, value: &Tensor, name: &str) -> Result<Var, GraphError> {
        self.new_leaf(value, Some(name), GraphInner::new_parameter_node)
    }

    /// 创建状态节点（不参与梯度计算，可被前向传播回写，如 BN 的滑动统计量）
    pub fn state(&self, value: &Tensor, name: &str) -> Result<Var, GraphError> {
        self.new_leaf(value, Some(name), GraphInner::new_state_node)
    }

    fn new_leaf(
        &self,
        value: &Tensor,
        name: Option<&str>,
        build: fn(&mut GraphInner, &[usize], Option<&str>) -> Result<NodeId, GraphError>,
    ) -> Result<Var, GraphError> {
        let mut g = self.inner.borrow_mut();
        let node_id = build(&mut *g, value.shape(), name)?;
        g.set_node_value(node_id, Some(value))?;
        Ok(Var::new(node_id, Rc::clone(&self.inner)))
    }

    // ==================== 执行 ====================

    /// 前向传播
    pub fn forward(&self, output: &Var) -> Result<(), GraphError> {
        self.inner.borrow_mut().forward(output.node_id())
    }

    /// 反向传播（loss 须为单元素张量），返回 loss 值
    pub fn backward(&self, loss: &Var) -> Result<f32, GraphError> {
        loss.backward()
    }

    // ==================== 训练控制 ====================

    /// 清空所有节点的梯度
    pub fn zero_grad(&self) -> Result<(), GraphError> {
        self.inner.borrow_mut().zero_grad()
    }

    pub fn train(&self) {
        self.inner.borrow_mut().set_train_mode();
    }

    pub fn eval(&self) {
        self.inner.borrow_mut().set_eval_mode();
    }

    pub fn is_eval(&self) -> bool {
        !self.inner.borrow().is_train_mode()
    }

    /// 图中所有参数节点（按创建顺序）
    pub fn trainable_parameters(&self) -> Vec<Var> {
        self.inner
            .borrow()
            .get_trainable_nodes()
            .into_iter()
            .map(|id| Var::new(id, Rc::clone(&self.inner)))
            .collect()
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}
