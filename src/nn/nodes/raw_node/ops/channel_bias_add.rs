/*
 * @Author       : 老董
 * @Date         : 2026-03-02
 * @Description  : ChannelBiasAdd 节点 - 卷积输出的通道级偏置广播
 *
 * 功能：将形状为 [C] 的 bias 广播加到 [batch, C, H, W] 的输入上
 * 数学：output[b, c, h, w] = input[b, c, h, w] + bias[c]
 */

use super::super::{TraitNode, parent_value};
use crate::nn::GraphError;
use crate::nn::nodes::{NodeHandle, NodeId};
use crate::tensor::Tensor;

#[derive(Clone)]
pub(in crate::nn) struct ChannelBiasAdd {
    id: NodeId,
    name: String,
    value: Option<Tensor>,
    grad: Option<Tensor>,
    shape: Vec<usize>, // 输出形状 [batch, C, H, W]
    parents_ids: [NodeId; 2],
}

impl ChannelBiasAdd {
    /// # 参数
    /// - `parents[0]`: input，形状 [batch, C, H, W]
    /// - `parents[1]`: bias，形状 [C]
    pub(in crate::nn) fn new(parents: &[&NodeHandle]) -> Result<Self, GraphError> {
        // 1. 验证父节点数量
        if parents.len() != 2 {
            return Err(GraphError::InvalidOperation(
                "ChannelBiasAdd 节点需要恰好 2 个父节点（input 和 bias）".to_string(),
            ));
        }

        let input_shape = parents[0].value_expected_shape();
        let bias_shape = parents[1].value_expected_shape();

        // 2. 验证 input 形状
        if input_shape.len() != 4 {
            return Err(GraphError::DimensionMismatch {
                expected: 4,
                got: input_shape.len(),
                message: format!(
                    "ChannelBiasAdd 的 input 必须是 4D [batch, C, H, W]，实际为 {input_shape:?}"
                ),
            });
        }

        // 3. 验证 bias 形状与通道数
        if bias_shape != [input_shape[1]] {
            return Err(GraphError::ShapeMismatch {
                expected: vec![input_shape[1]],
                got: bias_shape.to_vec(),
                message: format!(
                    "ChannelBiasAdd 的 bias 必须是 [C]（C = {}），实际为 {bias_shape:?}",
                    input_shape[1]
                ),
            });
        }

        Ok(Self {
            id: NodeId(0),
            name: String::new(),
            value: None,
            grad: None,
            shape: input_shape.to_vec(),
            parents_ids: [parents[0].id(), parents[1].id()],
        })
    }
}

impl TraitNode for ChannelBiasAdd {
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
        "ChannelBiasAdd"
    }

    fn value_expected_shape(&self) -> &[usize] {
        &self.shape
    }

    fn calc_value_by_parents(&mut self, parents: &[NodeHandle]) -> Result<(), GraphError> {
        let input = parent_value(&self.display_node(), &parents[0])?;
        let bias = parent_value(&self.display_node(), &parents[1])?;

        let (c, h, w) = (self.shape[1], self.shape[2], self.shape[3]);
        let bias = bias.data_as_slice();
        let mut result = input.clone();
        result
            .data_as_slice_mut()
            .chunks_mut(h * w)
            .enumerate()
            .for_each(|(plane, values)| {
                let b = bias[plane % c];
                values.iter_mut().for_each(|v| *v += b);
            });
        self.value = Some(result);
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
        if target_parent.id() == self.parents_ids[0] {
            // 对 input 的梯度：直接传递
            return Ok(upstream_grad.clone());
        }

        // 对 bias 的梯度：在 batch、H、W 上求和
        let (c, h, w) = (self.shape[1], self.shape[2], self.shape[3]);
        let mut bias_grad = vec![0.0f32; c];
        upstream_grad
            .data_as_slice()
            .chunks(h * w)
            .enumerate()
            .for_each(|(plane, values)| bias_grad[plane % c] += values.iter().sum::<f32>());
        Ok(Tensor::new(&bias_grad, &[c]))
    }

    fn grad(&self) -> Option<&Tensor> {
        self.grad.as_ref()
    }

    fn set_grad(&mut self, grad: Option<&Tensor>) -> Result<(), GraphError> {
        self.grad = grad.cloned();
        Ok(())
    }
}
