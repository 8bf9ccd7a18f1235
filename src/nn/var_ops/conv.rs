/*
 * @Author       : 老董
 * @Date         : 2026-03-04
 * @Description  : Var 卷积相关扩展 trait（输入均为 NCHW 布局）
 */

use crate::nn::{BatchNormOptions, GraphError, Padding, Var};
use std::rc::Rc;

pub trait VarConvOps {
    /// 2D 卷积
    ///
    /// - self: 输入 [N, C_in, H, W]
    /// - kernel: [kH, kW, C_in, C_out]
    /// - 输出: [N, C_out, H', W']
    fn conv2d(&self, kernel: &Var, stride: (usize, usize), padding: Padding)
    -> Result<Var, GraphError>;

    /// 按通道加偏置：self [N, C, H, W] + bias [C]
    fn channel_bias_add(&self, bias: &Var) -> Result<Var, GraphError>;

    /// 按通道批归一化
    ///
    /// gamma/beta 为参数，running_mean/running_var 为状态节点（训练模式下前向传播会回写）
    fn batch_norm(
        &self,
        gamma: &Var,
        beta: &Var,
        running_mean: &Var,
        running_var: &Var,
        options: BatchNormOptions,
    ) -> Result<Var, GraphError>;
}

impl VarConvOps for Var {
    fn conv2d(
        &self,
        kernel: &Var,
        stride: (usize, usize),
        padding: Padding,
    ) -> Result<Var, GraphError> {
        self.ensure_same_graph(kernel, "卷积")?;
        let id = self.graph().borrow_mut().new_conv2d_node(
            self.node_id(),
            kernel.node_id(),
            stride,
            padding,
            None,
        )?;
        Ok(Self::new(id, Rc::clone(self.graph())))
    }

    fn channel_bias_add(&self, bias: &Var) -> Result<Var, GraphError> {
        self.ensure_same_graph(bias, "通道偏置")?;
        let id = self
            .graph()
            .borrow_mut()
            .new_channel_bias_add_node(self.node_id(), bias.node_id(), None)?;
        Ok(Self::new(id, Rc::clone(self.graph())))
    }

    fn batch_norm(
        &self,
        gamma: &Var,
        beta: &Var,
        running_mean: &Var,
        running_var: &Var,
        options: BatchNormOptions,
    ) -> Result<Var, GraphError> {
        for other in [gamma, beta, running_mean, running_var] {
            self.ensure_same_graph(other, "批归一化")?;
        }
        let id = self.graph().borrow_mut().new_batch_norm_node(
            self.node_id(),
            gamma.node_id(),
            beta.node_id(),
            running_mean.node_id(),
            running_var.node_id(),
            options,
            None,
        )?;
        Ok(Self::new(id, Rc::clone(self.graph())))
    }
}
