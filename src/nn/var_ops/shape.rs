/*
 * @Author       : 老董
 * @Date         : 2026-03-04
 * @Description  : Var 形状变换扩展 trait
 */

use crate::nn::{GraphError, Var};
use std::rc::Rc;

pub trait VarShapeOps {
    /// 按 `axes` 重排维度，如 NHWC -> NCHW 为 `permute(&[0, 3, 1, 2])`
    fn permute(&self, axes: &[usize]) -> Result<Var, GraphError>;
}

impl VarShapeOps for Var {
    fn permute(&self, axes: &[usize]) -> Result<Var, GraphError> {
        let id = self
            .graph()
            .borrow_mut()
            .new_permute_node(self.node_id(), axes, None)?;
        Ok(Self::new(id, Rc::clone(self.graph())))
    }
}
