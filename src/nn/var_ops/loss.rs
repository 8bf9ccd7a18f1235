/*
 * @Author       : 老董
 * @Date         : 2026-03-04
 * @Description  : Var 损失函数扩展 trait
 */

use crate::nn::{GraphError, Var};
use std::rc::Rc;

pub trait VarLossOps {
    /// 均方误差：mean((self - target)^2)，输出形状 [1, 1]
    fn mse_loss(&self, target: &Var) -> Result<Var, GraphError>;
}

impl VarLossOps for Var {
    fn mse_loss(&self, target: &Var) -> Result<Var, GraphError> {
        self.ensure_same_graph(target, "均方误差")?;
        let id = self
            .graph()
            .borrow_mut()
            .new_mse_loss_node(self.node_id(), target.node_id(), None)?;
        Ok(Self::new(id, Rc::clone(self.graph())))
    }
}
