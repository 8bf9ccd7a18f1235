/*
 * @Author       : 老董
 * @Date         : 2026-03-04
 * @Description  : Var 激活函数扩展 trait
 */

use crate::nn::{GraphError, Var};
use std::rc::Rc;

/// 激活函数扩展 trait
///
/// ```ignore
/// use conv_layer::nn::VarActivationOps;
///
/// let h = x.leaky_relu(0.1)?.clip_grad(-1.0, 1.0)?;
/// ```
pub trait VarActivationOps {
    /// `ReLU` 激活：max(0, x)
    fn relu(&self) -> Result<Var, GraphError>;

    /// `LeakyReLU` 激活：x if x >= 0 else slope * x
    fn leaky_relu(&self, negative_slope: f32) -> Result<Var, GraphError>;

    fn tanh(&self) -> Result<Var, GraphError>;

    fn sigmoid(&self) -> Result<Var, GraphError>;

    /// 前向恒等，反向把流经的梯度逐元素裁剪到 [min, max]
    fn clip_grad(&self, min: f32, max: f32) -> Result<Var, GraphError>;
}

impl VarActivationOps for Var {
    fn relu(&self) -> Result<Var, GraphError> {
        self.leaky_relu(0.0)
    }

    fn leaky_relu(&self, negative_slope: f32) -> Result<Var, GraphError> {
        let id = self
            .graph()
            .borrow_mut()
            .new_leaky_relu_node(self.node_id(), negative_slope, None)?;
        Ok(Self::new(id, Rc::clone(self.graph())))
    }

    fn tanh(&self) -> Result<Var, GraphError> {
        let id = self
            .graph()
            .borrow_mut()
            .new_tanh_node(self.node_id(), None)?;
        Ok(Self::new(id, Rc::clone(self.graph())))
    }

    fn sigmoid(&self) -> Result<Var, GraphError> {
        let id = self
            .graph()
            .borrow_mut()
            .new_sigmoid_node(self.node_id(), None)?;
        Ok(Self::new(id, Rc::clone(self.graph())))
    }

    fn clip_grad(&self, min: f32, max: f32) -> Result<Var, GraphError> {
        let id = self
            .graph()
            .borrow_mut()
            .new_clip_grad_node(self.node_id(), min, max, None)?;
        Ok(Self::new(id, Rc::clone(self.graph())))
    }
}
