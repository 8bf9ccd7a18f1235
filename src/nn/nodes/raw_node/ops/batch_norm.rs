/*
 * @Author       : 老董
 * @Date         : 2026-03-03
 * @Description  : BatchNorm2d 节点 - 按通道在 (batch, H, W) 上做批归一化
 *
 * 父节点：
 * - parents[0]: 输入 [batch, C, H, W]
 * - parents[1]: gamma [C]（Parameter）
 * - parents[2]: beta [C]（Parameter）
 * - parents[3]: running_mean [C]（State）
 * - parents[4]: running_var [C]（State）
 *
 * 训练模式：用当前批次的均值/（有偏）方差归一化，并在前向传播后回写
 *   running = momentum * running + (1 - momentum) * batch
 *   其中方差在回写时做 Bessel 校正（m / (m - 1)）
 * 推理模式：用 running_mean / running_var 归一化，不回写
 */

use super::super::{TraitNode, parent_value};
use crate::nn::GraphError;
use crate::nn::nodes::{NodeHandle, NodeId};
use crate::tensor::Tensor;

/// 批归一化的超参数，节点创建后固定
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchNormOptions {
    pub momentum: f32,
    pub epsilon: f32,
    /// 为 true 时使用批统计量并更新滑动统计量
    pub training: bool,
}

impl Default for BatchNormOptions {
    fn default() -> Self {
        Self {
            momentum: 0.9,
            epsilon: 1e-5,
            training: true,
        }
    }
}

#[derive(Clone)]
pub(in crate::nn) struct BatchNorm2d {
    id: NodeId,
    name: String,
    value: Option<Tensor>,
    grad: Option<Tensor>,
    shape: Vec<usize>,
    /// [x, gamma, beta, running_mean, running_var]
    parents_ids: [NodeId; 5],
    options: BatchNormOptions,
    // 缓存（用于反向传播）
    x_hat: Option<Tensor>,
    inv_std: Vec<f32>,
    gamma_cache: Vec<f32>,
    /// 待回写的滑动统计量
    pending_state_updates: Vec<(NodeId, Tensor)>,
}

impl BatchNorm2d {
    pub(in crate::nn) fn new(
        parents: &[&NodeHandle],
        options: BatchNormOptions,
    ) -> Result<Self, GraphError> {
        // 1. 必要的验证
        // 1.1 父节点数量
        if parents.len() != 5 {
            return Err(GraphError::InvalidOperation(
                "BatchNorm2d 节点需要 5 个父节点：[输入, gamma, beta, running_mean, running_var]"
                    .to_string(),
            ));
        }

        // 1.2 输入必须是 4D
        let input_shape = parents[0].value_expected_shape();
        if input_shape.len() != 4 {
            return Err(GraphError::DimensionMismatch {
                expected: 4,
                got: input_shape.len(),
                message: format!(
                    "BatchNorm2d 的输入必须是 4D [batch, C, H, W]，实际为 {input_shape:?}"
                ),
            });
        }

        // 1.3 其余父节点都必须是 [C]
        let channels = input_shape[1];
        for (parent, role) in parents[1..]
            .iter()
            .zip(["gamma", "beta", "running_mean", "running_var"])
        {
            if parent.value_expected_shape() != [channels] {
                return Err(GraphError::ShapeMismatch {
                    expected: vec![channels],
                    got: parent.value_expected_shape().to_vec(),
                    message: format!("BatchNorm2d 的 {role} 形状必须是 [C]"),
                });
            }
        }

        // 1.4 超参数
        if !(0.0..=1.0).contains(&options.momentum) || options.epsilon <= 0.0 {
            return Err(GraphError::InvalidOperation(format!(
                "BatchNorm2d 的 momentum 应位于 [0, 1] 且 epsilon 应为正数，但得到 {options:?}"
            )));
        }

        // 2. 返回
        Ok(Self {
            id: NodeId(0),
            name: String::new(),
            value: None,
            grad: None,
            shape: input_shape.to_vec(),
            parents_ids: [
                parents[0].id(),
                parents[1].id(),
                parents[2].id(),
                parents[3].id(),
                parents[4].id(),
            ],
            options,
            x_hat: None,
            inv_std: Vec::new(),
            gamma_cache: Vec::new(),
            pending_state_updates: Vec::new(),
        })
    }

    /// 每个通道在 (batch, H, W) 上的均值与有偏方差
    fn batch_statistics(&self, x: &[f32]) -> (Vec<f32>, Vec<f32>) {
        let (c, plane) = (self.shape[1], self.shape[2] * self.shape[3]);
        let m = (self.shape[0] * plane) as f32;
        let mut mean = vec![0.0f32; c];
        let mut var = vec![0.0f32; c];

        for (i, values) in x.chunks(plane).enumerate() {
            mean[i % c] += values.iter().sum::<f32>();
        }
        mean.iter_mut().for_each(|s| *s /= m);

        for (i, values) in x.chunks(plane).enumerate() {
            let mu = mean[i % c];
            var[i % c] += values.iter().map(|v| (v - mu) * (v - mu)).sum::<f32>();
        }
        var.iter_mut().for_each(|s| *s /= m);

        (mean, var)
    }

    /// 每通道的求和：sum over (batch, H, W) of f(i, value)
    fn channel_sum(&self, data: &[f32], f: impl Fn(usize, f32) -> f32) -> Vec<f32> {
        let (c, plane) = (self.shape[1], self.shape[2] * self.shape[3]);
        let mut sums = vec![0.0f32; c];
        let mut offset = 0;
        for (i, values) in data.chunks(plane).enumerate() {
            sums[i % c] += values
                .iter()
                .enumerate()
                .map(|(j, &v)| f(offset + j, v))
                .sum::<f32>();
            offset += values.len();
        }
        sums
    }
}

impl TraitNode for BatchNorm2d {
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
        "BatchNorm2d"
    }

    fn value_expected_shape(&self) -> &[usize] {
        &self.shape
    }

    fn calc_value_by_parents(&mut self, parents: &[NodeHandle]) -> Result<(), GraphError> {
        let display = self.display_node();
        let x = parent_value(&display, &parents[0])?;
        let gamma = parent_value(&display, &parents[1])?.data_as_slice();
        let beta = parent_value(&display, &parents[2])?.data_as_slice();
        let running_mean = parent_value(&display, &parents[3])?;
        let running_var = parent_value(&display, &parents[4])?;

        // 1. 选取归一化用的统计量
        let (mean, var) = if self.options.training {
            self.batch_statistics(x.data_as_slice())
        } else {
            (
                running_mean.data_as_slice().to_vec(),
                running_var.data_as_slice().to_vec(),
            )
        };
        let inv_std: Vec<f32> = var
            .iter()
            .map(|v| 1.0 / (v + self.options.epsilon).sqrt())
            .collect();

        // 2. 归一化 + 仿射变换
        let (c, plane) = (self.shape[1], self.shape[2] * self.shape[3]);
        let mut x_hat = x.clone();
        let mut y = x.clone();
        for (i, (xh, out)) in x_hat
            .data_as_slice_mut()
            .chunks_mut(plane)
            .zip(y.data_as_slice_mut().chunks_mut(plane))
            .enumerate()
        {
            let ch = i % c;
            for (xh_v, out_v) in xh.iter_mut().zip(out.iter_mut()) {
                *xh_v = (*xh_v - mean[ch]) * inv_std[ch];
                *out_v = gamma[ch] * *xh_v + beta[ch];
            }
        }

        // 3. 训练模式下准备滑动统计量的回写
        self.pending_state_updates.clear();
        if self.options.training {
            let m = (self.shape[0] * plane) as f32;
            let correction = if m > 1.0 { m / (m - 1.0) } else { 1.0 };
            let momentum = self.options.momentum;
            let new_mean: Vec<f32> = running_mean
                .data_as_slice()
                .iter()
                .zip(&mean)
                .map(|(r, b)| momentum * r + (1.0 - momentum) * b)
                .collect();
            let new_var: Vec<f32> = running_var
                .data_as_slice()
                .iter()
                .zip(&var)
                .map(|(r, b)| momentum * r + (1.0 - momentum) * b * correction)
                .collect();
            self.pending_state_updates
                .push((self.parents_ids[3], Tensor::new(&new_mean, &[c])));
            self.pending_state_updates
                .push((self.parents_ids[4], Tensor::new(&new_var, &[c])));
        }

        self.x_hat = Some(x_hat);
        self.inv_std = inv_std;
        self.gamma_cache = gamma.to_vec();
        self.value = Some(y);
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
        let x_hat = self.x_hat.as_ref().ok_or_else(|| {
            GraphError::ComputationError(format!(
                "{}缺少归一化缓存，请先执行前向传播",
                self.display_node()
            ))
        })?;
        let dy = upstream_grad.data_as_slice();
        let x_hat_data = x_hat.data_as_slice();
        let c = self.shape[1];

        let target_id = target_parent.id();
        if target_id == self.parents_ids[1] {
            // dL/dgamma = Σ dy · x_hat
            let dgamma = self.channel_sum(dy, |i, g| g * x_hat_data[i]);
            return Ok(Tensor::new(&dgamma, &[c]));
        }
        if target_id == self.parents_ids[2] {
            // dL/dbeta = Σ dy
            let dbeta = self.channel_sum(dy, |_, g| g);
            return Ok(Tensor::new(&dbeta, &[c]));
        }
        if target_id != self.parents_ids[0] {
            return Err(GraphError::InvalidOperation(format!(
                "{}不接收来自{}的梯度",
                target_parent,
                self.display_node()
            )));
        }

        // dL/dx
        let gamma = &self.gamma_cache;
        let plane = self.shape[2] * self.shape[3];
        let mut dx = upstream_grad.clone();
        if self.options.training {
            // dx = gamma · inv_std / m · (m·dy − Σdy − x_hat·Σ(dy·x_hat))
            let m = (self.shape[0] * plane) as f32;
            let sum_dy = self.channel_sum(dy, |_, g| g);
            let sum_dy_xhat = self.channel_sum(dy, |i, g| g * x_hat_data[i]);
            let mut offset = 0;
            for (i, values) in dx.data_as_slice_mut().chunks_mut(plane).enumerate() {
                let ch = i % c;
                let scale = gamma[ch] * self.inv_std[ch] / m;
                for (j, v) in values.iter_mut().enumerate() {
                    let xh = x_hat_data[offset + j];
                    *v = scale * (m * *v - sum_dy[ch] - xh * sum_dy_xhat[ch]);
                }
                offset += plane;
            }
        } else {
            // 推理模式下统计量是常量：dx = dy · gamma · inv_std
            for (i, values) in dx.data_as_slice_mut().chunks_mut(plane).enumerate() {
                let ch = i % c;
                let scale = gamma[ch] * self.inv_std[ch];
                values.iter_mut().for_each(|v| *v *= scale);
            }
        }
        Ok(dx)
    }

    fn grad(&self) -> Option<&Tensor> {
        self.grad.as_ref()
    }

    fn set_grad(&mut self, grad: Option<&Tensor>) -> Result<(), GraphError> {
        self.grad = grad.cloned();
        Ok(())
    }

    fn take_state_updates(&mut self) -> Vec<(NodeId, Tensor)> {
        std::mem::take(&mut self.pending_state_updates)
    }
}
