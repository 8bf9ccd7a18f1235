/*
 * @Author       : 老董
 * @Date         : 2026-03-01
 * @Description  : GraphInner 节点构建方法（new_*_node）
 */

use super::super::error::GraphError;
use super::GraphInner;
use crate::nn::NodeId;
use crate::nn::nodes::raw_node::{
    BatchNorm2d, BatchNormOptions, ChannelBiasAdd, ClipGrad, Conv2d, Input, LeakyReLU, MseLoss,
    Padding, Parameter, Permute, Sigmoid, State, Tanh,
};
use crate::nn::nodes::NodeHandle;

impl GraphInner {
    /// 添加节点到列表
    pub(in crate::nn::graph) fn add_node_to_list(
        &mut self,
        mut node_handle: NodeHandle,
        name: Option<&str>,
        node_type: &str,
        parents: &[NodeId],
    ) -> Result<NodeId, GraphError> {
        let node_name = self.generate_valid_new_node_name(name.unwrap_or(""), node_type)?;
        let node_id = self.generate_valid_node_id();

        for &parent_id in parents {
            self.forward_edges.entry(parent_id).or_default().push(node_id);
        }
        self.backward_edges
            .entry(node_id)
            .or_default()
            .extend(parents);

        node_handle.bind_id_and_name(node_id, &node_name);
        self.nodes.insert(node_id, node_handle);
        Ok(node_id)
    }

    // ========== 叶子节点 ==========

    /// 创建输入节点
    pub fn new_input_node(&mut self, shape: &[usize], name: Option<&str>) -> Result<NodeId, GraphError> {
        let node = NodeHandle::new(Input::new(shape)?);
        self.add_node_to_list(node, name, "input", &[])
    }

    /// 创建参数节点（值需随后通过 set_node_value 设置）
    pub fn new_parameter_node(
        &mut self,
        shape: &[usize],
        name: Option<&str>,
    ) -> Result<NodeId, GraphError> {
        let node = NodeHandle::new(Parameter::new(shape)?);
        self.add_node_to_list(node, name, "parameter", &[])
    }

    /// 创建状态节点
    pub fn new_state_node(&mut self, shape: &[usize], name: Option<&str>) -> Result<NodeId, GraphError> {
        let node = NodeHandle::new(State::new(shape)?);
        self.add_node_to_list(node, name, "state", &[])
    }

    // ========== 卷积相关 ==========

    /// 创建 2D 卷积节点：input [N, C_in, H, W]，kernel [kH, kW, C_in, C_out]
    pub fn new_conv2d_node(
        &mut self,
        input_id: NodeId,
        kernel_id: NodeId,
        stride: (usize, usize),
        padding: Padding,
        name: Option<&str>,
    ) -> Result<NodeId, GraphError> {
        let parents = self.get_nodes(&[input_id, kernel_id])?;
        let node = NodeHandle::new(Conv2d::new(&parents, stride, padding)?);
        self.add_node_to_list(node, name, "conv2d", &[input_id, kernel_id])
    }

    /// 创建通道偏置节点：input [N, C, H, W] + bias [C]
    pub fn new_channel_bias_add_node(
        &mut self,
        input_id: NodeId,
        bias_id: NodeId,
        name: Option<&str>,
    ) -> Result<NodeId, GraphError> {
        let parents = self.get_nodes(&[input_id, bias_id])?;
        let node = NodeHandle::new(ChannelBiasAdd::new(&parents)?);
        self.add_node_to_list(node, name, "channel_bias_add", &[input_id, bias_id])
    }

    /// 创建批归一化节点
    pub fn new_batch_norm_node(
        &mut self,
        input_id: NodeId,
        gamma_id: NodeId,
        beta_id: NodeId,
        running_mean_id: NodeId,
        running_var_id: NodeId,
        options: BatchNormOptions,
        name: Option<&str>,
    ) -> Result<NodeId, GraphError> {
        let ids = [input_id, gamma_id, beta_id, running_mean_id, running_var_id];
        let parents = self.get_nodes(&ids)?;
        let node = NodeHandle::new(BatchNorm2d::new(&parents, options)?);
        self.add_node_to_list(node, name, "batch_norm", &ids)
    }

    // ========== 激活函数 ==========

    pub fn new_leaky_relu_node(
        &mut self,
        parent_id: NodeId,
        negative_slope: f32,
        name: Option<&str>,
    ) -> Result<NodeId, GraphError> {
        let parents = self.get_nodes(&[parent_id])?;
        let node = NodeHandle::new(LeakyReLU::new(&parents, negative_slope)?);
        let node_type = if negative_slope == 0.0 { "relu" } else { "leaky_relu" };
        self.add_node_to_list(node, name, node_type, &[parent_id])
    }

    pub fn new_tanh_node(&mut self, parent_id: NodeId, name: Option<&str>) -> Result<NodeId, GraphError> {
        let parents = self.get_nodes(&[parent_id])?;
        let node = NodeHandle::new(Tanh::new(&parents)?);
        self.add_node_to_list(node, name, "tanh", &[parent_id])
    }

    pub fn new_sigmoid_node(
        &mut self,
        parent_id: NodeId,
        name: Option<&str>,
    ) -> Result<NodeId, GraphError> {
        let parents = self.get_nodes(&[parent_id])?;
        let node = NodeHandle::new(Sigmoid::new(&parents)?);
        self.add_node_to_list(node, name, "sigmoid", &[parent_id])
    }

    /// 创建梯度裁剪节点：前向恒等，反向把梯度裁剪到 [min, max]
    pub fn new_clip_grad_node(
        &mut self,
        parent_id: NodeId,
        min: f32,
        max: f32,
        name: Option<&str>,
    ) -> Result<NodeId, GraphError> {
        let parents = self.get_nodes(&[parent_id])?;
        let node = NodeHandle::new(ClipGrad::new(&parents, min, max)?);
        self.add_node_to_list(node, name, "clip_grad", &[parent_id])
    }

    // ========== 形状与损失 ==========

    pub fn new_permute_node(
        &mut self,
        parent_id: NodeId,
        axes: &[usize],
        name: Option<&str>,
    ) -> Result<NodeId, GraphError> {
        let parents = self.get_nodes(&[parent_id])?;
        let node = NodeHandle::new(Permute::new(&parents, axes)?);
        self.add_node_to_list(node, name, "permute", &[parent_id])
    }

    pub fn new_mse_loss_node(
        &mut self,
        input_id: NodeId,
        target_id: NodeId,
        name: Option<&str>,
    ) -> Result<NodeId, GraphError> {
        let parents = self.get_nodes(&[input_id, target_id])?;
        let node = NodeHandle::new(MseLoss::new(&parents)?);
        self.add_node_to_list(node, name, "mse_loss", &[input_id, target_id])
    }
}
