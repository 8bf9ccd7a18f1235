/*
 * @Author       : 老董
 * @Date         : 2026-03-02
 * @Description  : 2D 卷积节点
 *
 * 约定：
 * - 输入：4D [batch, C_in, H, W]（单样本使用 batch=1）
 * - 卷积核：4D [kH, kW, C_in, C_out]
 * - 输出：4D [batch, C_out, H', W']
 * - 零填充以隐式越界判断实现，不额外构造填充后的张量
 * - 使用 Rayon 在 batch 维度并行
 *
 * 父节点：
 * - parents[0]: 输入数据
 * - parents[1]: 卷积核参数
 */

use super::super::{TraitNode, parent_value};
use crate::nn::GraphError;
use crate::nn::nodes::{NodeHandle, NodeId};
use crate::tensor::Tensor;
use rayon::prelude::*;

/// 四边各自独立的零填充量
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Padding2d {
    pub top: usize,
    pub bottom: usize,
    pub left: usize,
    pub right: usize,
}

impl Padding2d {
    pub const fn new(top: usize, bottom: usize, left: usize, right: usize) -> Self {
        Self {
            top,
            bottom,
            left,
            right,
        }
    }

    /// 上下各填 `pad_h`，左右各填 `pad_w`
    pub const fn symmetric(pad_h: usize, pad_w: usize) -> Self {
        Self::new(pad_h, pad_h, pad_w, pad_w)
    }
}

/// 卷积的填充方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Padding {
    /// 显式填充，输出尺寸为 `(in + pad_before + pad_after - k) / stride + 1`
    Explicit(Padding2d),
    /// 输出空间尺寸恒为 `floor(in / stride)`，与卷积核大小无关；
    /// 所需填充总量不足时多出的一格补在下/右侧
    Same,
}

impl Padding {
    /// 依据输入尺寸、卷积核与步长解析出输出尺寸和实际填充量
    pub fn resolve(
        &self,
        input_hw: (usize, usize),
        kernel_hw: (usize, usize),
        stride_hw: (usize, usize),
    ) -> Result<((usize, usize), Padding2d), GraphError> {
        let invalid = || {
            GraphError::InvalidOperation(format!(
                "卷积输出尺寸无效：输入 {}x{}，核 {}x{}，步长 {:?}，填充 {:?}",
                input_hw.0, input_hw.1, kernel_hw.0, kernel_hw.1, stride_hw, self
            ))
        };
        if stride_hw.0 == 0 || stride_hw.1 == 0 || kernel_hw.0 == 0 || kernel_hw.1 == 0 {
            return Err(invalid());
        }

        match *self {
            Self::Explicit(pad) => {
                let padded_h = input_hw.0 + pad.top + pad.bottom;
                let padded_w = input_hw.1 + pad.left + pad.right;
                if padded_h < kernel_hw.0 || padded_w < kernel_hw.1 {
                    return Err(invalid());
                }
                let out_h = (padded_h - kernel_hw.0) / stride_hw.0 + 1;
                let out_w = (padded_w - kernel_hw.1) / stride_hw.1 + 1;
                Ok(((out_h, out_w), pad))
            }
            Self::Same => {
                let out_h = input_hw.0 / stride_hw.0;
                let out_w = input_hw.1 / stride_hw.1;
                if out_h == 0 || out_w == 0 {
                    return Err(invalid());
                }
                let total_h = ((out_h - 1) * stride_hw.0 + kernel_hw.0).saturating_sub(input_hw.0);
                let total_w = ((out_w - 1) * stride_hw.1 + kernel_hw.1).saturating_sub(input_hw.1);
                let pad = Padding2d::new(
                    total_h / 2,
                    total_h - total_h / 2,
                    total_w / 2,
                    total_w - total_w / 2,
                );
                Ok(((out_h, out_w), pad))
            }
        }
    }
}

/// 卷积的几何信息（前向与反向共用）
#[derive(Debug, Clone, Copy)]
struct ConvGeometry {
    in_c: usize,
    in_h: usize,
    in_w: usize,
    out_c: usize,
    out_h: usize,
    out_w: usize,
    k_h: usize,
    k_w: usize,
    stride: (usize, usize),
    pad_top: usize,
    pad_left: usize,
}

impl ConvGeometry {
    /// 输出位置 (oh, ow) 与核位置 (kh, kw) 对应的输入坐标，落在填充区时返回 None
    #[inline]
    fn input_coord(&self, oh: usize, ow: usize, kh: usize, kw: usize) -> Option<(usize, usize)> {
        let ih = (oh * self.stride.0 + kh).checked_sub(self.pad_top)?;
        let iw = (ow * self.stride.1 + kw).checked_sub(self.pad_left)?;
        (ih < self.in_h && iw < self.in_w).then_some((ih, iw))
    }

    #[inline]
    const fn kernel_index(&self, kh: usize, kw: usize, ic: usize, oc: usize) -> usize {
        ((kh * self.k_w + kw) * self.in_c + ic) * self.out_c + oc
    }

    const fn input_sample_size(&self) -> usize {
        self.in_c * self.in_h * self.in_w
    }

    const fn output_sample_size(&self) -> usize {
        self.out_c * self.out_h * self.out_w
    }
}

/// 2D 卷积节点
#[derive(Clone)]
pub(in crate::nn) struct Conv2d {
    id: NodeId,
    name: String,
    value: Option<Tensor>,
    grad: Option<Tensor>,
    shape: Vec<usize>,
    parents_ids: [NodeId; 2], // [input_id, kernel_id]
    geometry: ConvGeometry,
    // 缓存（用于反向传播）
    input_cache: Option<Tensor>,
}

impl Conv2d {
    /// 创建 Conv2d 节点
    ///
    /// # 参数
    /// - `parents`: [输入节点, 卷积核节点]
    /// - `stride`: 步长 (sH, sW)
    /// - `padding`: 填充方式
    pub(in crate::nn) fn new(
        parents: &[&NodeHandle],
        stride: (usize, usize),
        padding: Padding,
    ) -> Result<Self, GraphError> {
        // 1. 验证父节点数量
        if parents.len() != 2 {
            return Err(GraphError::InvalidOperation(
                "Conv2d 节点需要 2 个父节点：[输入, 卷积核]".to_string(),
            ));
        }

        let input_shape = parents[0].value_expected_shape();
        let kernel_shape = parents[1].value_expected_shape();

        // 2. 验证卷积核形状：必须是 4D [kH, kW, C_in, C_out]
        if kernel_shape.len() != 4 {
            return Err(GraphError::DimensionMismatch {
                expected: 4,
                got: kernel_shape.len(),
                message: format!("卷积核必须是 4D [kH, kW, C_in, C_out]，得到 {kernel_shape:?}"),
            });
        }
        let (k_h, k_w, kernel_in_c, out_c) = (
            kernel_shape[0],
            kernel_shape[1],
            kernel_shape[2],
            kernel_shape[3],
        );

        // 3. 验证输入形状：必须是 4D [batch, C_in, H, W]
        if input_shape.len() != 4 {
            return Err(GraphError::DimensionMismatch {
                expected: 4,
                got: input_shape.len(),
                message: format!(
                    "Conv2d 输入必须是 4D [batch, C_in, H, W]，得到 {input_shape:?}。单样本请使用 [1, C_in, H, W]"
                ),
            });
        }
        let (batch_size, in_c, in_h, in_w) = (
            input_shape[0],
            input_shape[1],
            input_shape[2],
            input_shape[3],
        );

        // 4. 验证通道数匹配
        if in_c != kernel_in_c {
            return Err(GraphError::ShapeMismatch {
                expected: vec![kernel_in_c],
                got: vec![in_c],
                message: format!("输入通道数 {in_c} 与卷积核输入通道数 {kernel_in_c} 不匹配"),
            });
        }

        // 5. 计算输出尺寸与实际填充
        let ((out_h, out_w), resolved) = padding.resolve((in_h, in_w), (k_h, k_w), stride)?;

        Ok(Self {
            id: NodeId(0),
            name: String::new(),
            value: None,
            grad: None,
            shape: vec![batch_size, out_c, out_h, out_w],
            parents_ids: [parents[0].id(), parents[1].id()],
            geometry: ConvGeometry {
                in_c,
                in_h,
                in_w,
                out_c,
                out_h,
                out_w,
                k_h,
                k_w,
                stride,
                pad_top: resolved.top,
                pad_left: resolved.left,
            },
            input_cache: None,
        })
    }

    /// 执行卷积运算（Rayon 并行版本）
    fn convolve(&self, input: &Tensor, kernel: &Tensor) -> Tensor {
        let g = self.geometry;
        let batch_size = input.shape()[0];
        let x = input.data_as_slice();
        let k = kernel.data_as_slice();

        let batch_results: Vec<Vec<f32>> = (0..batch_size)
            .into_par_iter()
            .map(|b| {
                let sample = &x[b * g.input_sample_size()..(b + 1) * g.input_sample_size()];
                let mut out = vec![0.0f32; g.output_sample_size()];
                for oc in 0..g.out_c {
                    for oh in 0..g.out_h {
                        for ow in 0..g.out_w {
                            let mut sum = 0.0f32;
                            for kh in 0..g.k_h {
                                for kw in 0..g.k_w {
                                    let Some((ih, iw)) = g.input_coord(oh, ow, kh, kw) else {
                                        continue;
                                    };
                                    for ic in 0..g.in_c {
                                        sum += sample[(ic * g.in_h + ih) * g.in_w + iw]
                                            * k[g.kernel_index(kh, kw, ic, oc)];
                                    }
                                }
                            }
                            out[(oc * g.out_h + oh) * g.out_w + ow] = sum;
                        }
                    }
                }
                out
            })
            .collect();

        let all_data: Vec<f32> = batch_results.into_iter().flatten().collect();
        Tensor::new(
            &all_data,
            &[batch_size, g.out_c, g.out_h, g.out_w],
        )
    }

    /// dL/dX：把上游梯度沿卷积核“撒回”输入位置
    fn grad_to_input(&self, upstream_grad: &Tensor, kernel: &Tensor) -> Tensor {
        let g = self.geometry;
        let batch_size = upstream_grad.shape()[0];
        let dy = upstream_grad.data_as_slice();
        let k = kernel.data_as_slice();

        let batch_results: Vec<Vec<f32>> = (0..batch_size)
            .into_par_iter()
            .map(|b| {
                let dy_b = &dy[b * g.output_sample_size()..(b + 1) * g.output_sample_size()];
                let mut dx = vec![0.0f32; g.input_sample_size()];
                for oc in 0..g.out_c {
                    for oh in 0..g.out_h {
                        for ow in 0..g.out_w {
                            let grad_val = dy_b[(oc * g.out_h + oh) * g.out_w + ow];
                            if grad_val == 0.0 {
                                continue;
                            }
                            for kh in 0..g.k_h {
                                for kw in 0..g.k_w {
                                    let Some((ih, iw)) = g.input_coord(oh, ow, kh, kw) else {
                                        continue;
                                    };
                                    for ic in 0..g.in_c {
                                        dx[(ic * g.in_h + ih) * g.in_w + iw] +=
                                            grad_val * k[g.kernel_index(kh, kw, ic, oc)];
                                    }
                                }
                            }
                        }
                    }
                }
                dx
            })
            .collect();

        let all_data: Vec<f32> = batch_results.into_iter().flatten().collect();
        Tensor::new(&all_data, &[batch_size, g.in_c, g.in_h, g.in_w])
    }

    /// dL/dK：每个样本各自求相关，再在 batch 维度求和
    fn grad_to_kernel(&self, upstream_grad: &Tensor, input: &Tensor) -> Tensor {
        let g = self.geometry;
        let batch_size = upstream_grad.shape()[0];
        let dy = upstream_grad.data_as_slice();
        let x = input.data_as_slice();
        let kernel_size = g.k_h * g.k_w * g.in_c * g.out_c;

        let dk = (0..batch_size)
            .into_par_iter()
            .map(|b| {
                let dy_b = &dy[b * g.output_sample_size()..(b + 1) * g.output_sample_size()];
                let x_b = &x[b * g.input_sample_size()..(b + 1) * g.input_sample_size()];
                let mut dk = vec![0.0f32; kernel_size];
                for oc in 0..g.out_c {
                    for oh in 0..g.out_h {
                        for ow in 0..g.out_w {
                            let grad_val = dy_b[(oc * g.out_h + oh) * g.out_w + ow];
                            if grad_val == 0.0 {
                                continue;
                            }
                            for kh in 0..g.k_h {
                                for kw in 0..g.k_w {
                                    let Some((ih, iw)) = g.input_coord(oh, ow, kh, kw) else {
                                        continue;
                                    };
                                    for ic in 0..g.in_c {
                                        dk[g.kernel_index(kh, kw, ic, oc)] +=
                                            grad_val * x_b[(ic * g.in_h + ih) * g.in_w + iw];
                                    }
                                }
                            }
                        }
                    }
                }
                dk
            })
            .reduce(
                || vec![0.0f32; kernel_size],
                |mut acc, part| {
                    acc.iter_mut().zip(part).for_each(|(a, p)| *a += p);
                    acc
                },
            );

        Tensor::new(&dk, &[g.k_h, g.k_w, g.in_c, g.out_c])
    }
}

impl TraitNode for Conv2d {
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
        "Conv2d"
    }

    fn value_expected_shape(&self) -> &[usize] {
        &self.shape
    }

    fn calc_value_by_parents(&mut self, parents: &[NodeHandle]) -> Result<(), GraphError> {
        let input = parent_value(&self.display_node(), &parents[0])?;
        let kernel = parent_value(&self.display_node(), &parents[1])?;

        let value = self.convolve(input, kernel);
        self.input_cache = Some(input.clone());
        self.value = Some(value);
        Ok(())
    }

    fn value(&self) -> Option<&Tensor> {
        self.value.as_ref()
    }

    /// 对于 Y = conv(X, K):
    /// - dL/dX：转置卷积（需要卷积核，即辅助父节点）
    /// - dL/dK：输入与上游梯度的相关运算（使用缓存的输入）
    fn calc_grad_to_parent(
        &self,
        target_parent: &NodeHandle,
        upstream_grad: &Tensor,
        assistant_parent: Option<&NodeHandle>,
    ) -> Result<Tensor, GraphError> {
        if target_parent.id() == self.parents_ids[0] {
            let kernel = assistant_parent
                .ok_or_else(|| {
                    GraphError::ComputationError(format!(
                        "{}计算输入梯度需要卷积核",
                        self.display_node()
                    ))
                })
                .and_then(|k| parent_value(&self.display_node(), k))?;
            Ok(self.grad_to_input(upstream_grad, kernel))
        } else if target_parent.id() == self.parents_ids[1] {
            let input = self.input_cache.as_ref().ok_or_else(|| {
                GraphError::ComputationError(format!(
                    "{}缺少输入缓存，请先执行前向传播",
                    self.display_node()
                ))
            })?;
            Ok(self.grad_to_kernel(upstream_grad, input))
        } else {
            Err(GraphError::InvalidOperation(format!(
                "{}不是{}的父节点",
                target_parent,
                self.display_node()
            )))
        }
    }

    fn grad(&self) -> Option<&Tensor> {
        self.grad.as_ref()
    }

    fn set_grad(&mut self, grad: Option<&Tensor>) -> Result<(), GraphError> {
        self.grad = grad.cloned();
        Ok(())
    }
}
