/*
 * @Author       : 老董
 * @Date         : 2026-03-05
 * @Description  : ConvLayer - 卷积 + （偏置 | 批归一化）+ 激活 + 梯度裁剪
 *
 * 调用方的输入/输出始终是 [batch, H, W, C]，data_format 只决定层内部的布局。
 *
 * 计算流程（compute）：
 * 1. 输入转为层内部布局（卷积原语使用 NCHW）
 * 2. SAME 填充的 2D 卷积，输出空间尺寸 = floor(输入 / 步长)
 * 3. 批归一化（momentum 0.9，epsilon 1e-5，始终更新滑动统计量）或通道偏置
 * 4. 激活函数（leaky_relu 斜率固定为 0.1）
 * 5. 梯度裁剪：前向恒等，反向梯度裁剪到 [-1, 1]
 * 6. 转回 [batch, H, W, C]
 */

use super::config::{Activation, ConvLayerConfig, ShapeTriple};
use crate::nn::{
    BatchNormOptions, Graph, GraphError, Init, Module, NodeId, Padding, Var, VarActivationOps,
    VarConvOps, VarShapeOps,
};
use std::collections::BTreeMap;

/// 参数名（`<layer_name>#weight` 等）到参数的映射
pub type ParamMap = BTreeMap<String, Var>;

const WEIGHT_SEED: u64 = 0;
const LEAKY_SLOPE: f32 = 0.1;
const BN_MOMENTUM: f32 = 0.9;
const BN_EPSILON: f32 = 1e-5;
const GRAD_CLIP_RANGE: (f32, f32) = (-1.0, 1.0);

const NHWC_TO_NCHW: [usize; 4] = [0, 3, 1, 2];
const NCHW_TO_NHWC: [usize; 4] = [0, 2, 3, 1];

/// 能向下一层提供输出形状的层
pub trait OutputShape {
    fn output_shape(&self) -> ShapeTriple;
}

/// 批归一化分支持有的张量
#[derive(Debug)]
struct BatchNormParams {
    gamma: Var,
    beta: Var,
    running_mean: Var,
    running_var: Var,
}

/// 卷积层
///
/// 参数在构造时一次性创建：
/// - weight `[kH, kW, C_in, C_out]`：He 正态初始化，固定种子 0，
///   所以超参数相同的两层初始权重逐位相同，与构造顺序无关
/// - 未启用批归一化时：bias `[C_out]` 全零
/// - 启用批归一化时：gamma 全一、beta 全零（参数），running_mean 全零、running_var 全一（状态）
///
/// ```
/// use conv_layer::nn::Graph;
/// use conv_layer::nn::layer::{ConvLayer, ConvLayerConfig, OutputShape, ShapeTriple};
///
/// let graph = Graph::new();
/// let config = ConvLayerConfig::new((3, 3), (2, 2), 8)
///     .with_input_shape(ShapeTriple::new(32, 32, 3))
///     .with_name("conv1");
/// let conv1 = ConvLayer::new(&graph, config, None).unwrap();
/// assert_eq!(conv1.output_shape(), ShapeTriple::new(16, 16, 8));
///
/// // 下一层直接沿用上一层的输出形状
/// let config = ConvLayerConfig::new((3, 3), (1, 1), 16).with_name("conv2");
/// let conv2 = ConvLayer::new(&graph, config, Some(&conv1)).unwrap();
/// assert_eq!(conv2.input_shape(), ShapeTriple::new(16, 16, 8));
/// ```
#[derive(Debug)]
pub struct ConvLayer {
    config: ConvLayerConfig,
    input_shape: ShapeTriple,
    output_shape: ShapeTriple,
    /// 乘加次数估计，仅用于诊断输出
    calculation: usize,
    weight: Var,
    bias: Option<Var>,
    batch_norm: Option<BatchNormParams>,
    params: ParamMap,
    summary_line: String,
    /// 最近一次 compute 构建的子图：(输入节点, 输出)
    built: Option<(NodeId, Var)>,
}

impl ConvLayer {
    /// 创建卷积层
    ///
    /// 输入形状取自 `prev_layer`（优先）或 `config.input_shape`；两者都缺失时返回
    /// `GraphError::InvalidConfig`。
    pub fn new(
        graph: &Graph,
        config: ConvLayerConfig,
        prev_layer: Option<&dyn OutputShape>,
    ) -> Result<Self, GraphError> {
        // 1. 必要的验证
        config.validate()?;
        let name = config.name.clone();
        let input_shape = prev_layer
            .map(|prev| prev.output_shape())
            .or(config.input_shape)
            .ok_or_else(|| {
                GraphError::InvalidConfig(format!(
                    "卷积层{name}缺少输入形状：prev_layer 与 input_shape 不能同时为空"
                ))
            })?;
        if input_shape.height == 0 || input_shape.width == 0 || input_shape.channels == 0 {
            return Err(GraphError::InvalidConfig(format!(
                "卷积层{name}的输入形状{input_shape}中不能有 0"
            )));
        }

        // 2. 输出形状与计算量
        let (k_h, k_w) = config.kernel_size;
        let (s_h, s_w) = config.stride;
        let output_shape = ShapeTriple::new(
            input_shape.height / s_h,
            input_shape.width / s_w,
            config.n_filter,
        );
        if output_shape.height == 0 || output_shape.width == 0 {
            return Err(GraphError::InvalidConfig(format!(
                "卷积层{name}的步长 {:?} 大于输入形状{input_shape}",
                config.stride
            )));
        }
        let calculation = output_shape.height
            * output_shape.width
            * output_shape.channels
            * input_shape.channels
            * k_h
            * k_w;

        // 3. 创建参数：全部参数名检查通过后才创建节点
        let c_in = input_shape.channels;
        let c_out = config.n_filter;
        let param_suffixes: &[&str] = if config.batch_normal {
            &["weight", "gamma", "beta", "running_mean", "running_var"]
        } else {
            &["weight", "bias"]
        };
        {
            let g = graph.inner();
            for suffix in param_suffixes {
                g.check_duplicate_node_name(&format!("{name}#{suffix}"))?;
            }
        }
        let weight = graph.parameter(
            &[k_h, k_w, c_in, c_out],
            Init::HeNormalSeeded {
                fan_in: k_h * k_w * c_in,
                seed: WEIGHT_SEED,
            },
            &format!("{name}#weight"),
        )?;
        let (bias, batch_norm) = if config.batch_normal {
            let params = BatchNormParams {
                gamma: graph.parameter(&[c_out], Init::Ones, &format!("{name}#gamma"))?,
                beta: graph.parameter(&[c_out], Init::Zeros, &format!("{name}#beta"))?,
                running_mean: graph
                    .state(&Init::Zeros.generate(&[c_out]), &format!("{name}#running_mean"))?,
                running_var: graph
                    .state(&Init::Ones.generate(&[c_out]), &format!("{name}#running_var"))?,
            };
            (None, Some(params))
        } else {
            let bias = graph.parameter(&[c_out], Init::Zeros, &format!("{name}#bias"))?;
            (Some(bias), None)
        };

        // 4. 打印层信息
        let summary_line = format!(
            "{:<10}\t{:<25}\t{:<20}\t{:<20}",
            name,
            format!("(({k_h}, {k_w}) / ({s_h}, {s_w}) * {c_out})"),
            input_shape.to_string(),
            output_shape.to_string(),
        );
        println!("{summary_line}");

        Ok(Self {
            config,
            input_shape,
            output_shape,
            calculation,
            weight,
            bias,
            batch_norm,
            params: ParamMap::new(),
            summary_line,
            built: None,
        })
    }

    /// 前向计算：输入 `[batch, H, W, C_in]`，输出 `[batch, H', W', C_out]`
    ///
    /// 批归一化始终以训练模式运行（使用批统计量并更新滑动统计量），
    /// `_is_training` 目前不影响计算。
    ///
    /// 对同一个输入节点重复调用时复用已构建的子图，只重新执行前向传播
    /// （输入的值变化后才会重算），图不会随调用次数增长。
    pub fn compute(&mut self, input: &Var, _is_training: bool) -> Result<Var, GraphError> {
        // 1. 输入检查
        input.ensure_same_graph(&self.weight, "卷积层计算")?;
        self.check_input_shape(&input.value_expected_shape()?)?;

        let output = match &self.built {
            Some((input_id, output)) if *input_id == input.node_id() => output.clone(),
            _ => {
                let output = self.build(input)?;
                self.built = Some((input.node_id(), output.clone()));
                output
            }
        };
        output.forward()?;

        // 刷新参数表（只含 weight 与 gamma）
        let name = &self.config.name;
        self.params.clear();
        self.params
            .insert(format!("{name}#weight"), self.weight.clone());
        if let Some(bn) = &self.batch_norm {
            self.params.insert(format!("{name}#gamma"), bn.gamma.clone());
        }

        Ok(output)
    }

    /// 为给定输入构建 卷积 → BN/偏置 → 激活 → 梯度裁剪 子图
    fn build(&self, input: &Var) -> Result<Var, GraphError> {
        // 2. 转为 NCHW；卷积原语只有 NCHW 实现，两种 data_format 的内部计算相同
        let x = input.permute(&NHWC_TO_NCHW)?;

        // 3. 卷积 + （批归一化 | 偏置）
        let conv = x.conv2d(&self.weight, self.config.stride, Padding::Same)?;
        let hidden = match (&self.batch_norm, &self.bias) {
            (Some(bn), _) => conv.batch_norm(
                &bn.gamma,
                &bn.beta,
                &bn.running_mean,
                &bn.running_var,
                BatchNormOptions {
                    momentum: BN_MOMENTUM,
                    epsilon: BN_EPSILON,
                    training: true,
                },
            )?,
            (None, Some(bias)) => conv.channel_bias_add(bias)?,
            (None, None) => conv,
        };

        // 4. 激活
        let activated = match self.config.activation {
            Activation::Relu => hidden.relu()?,
            Activation::Tanh => hidden.tanh()?,
            Activation::LeakyRelu => hidden.leaky_relu(LEAKY_SLOPE)?,
            Activation::Sigmoid => hidden.sigmoid()?,
            Activation::None => hidden,
        };

        // 5. 梯度裁剪
        let clipped = activated.clip_grad(GRAD_CLIP_RANGE.0, GRAD_CLIP_RANGE.1)?;

        // 6. 转回 [batch, H, W, C]
        clipped.permute(&NCHW_TO_NHWC)
    }

    fn check_input_shape(&self, shape: &[usize]) -> Result<(), GraphError> {
        if shape.len() != 4 {
            return Err(GraphError::DimensionMismatch {
                expected: 4,
                got: shape.len(),
                message: format!(
                    "卷积层{}的输入必须是 4D 张量，实际形状为 {shape:?}",
                    self.config.name
                ),
            });
        }
        let ShapeTriple {
            height,
            width,
            channels,
        } = self.input_shape;
        let expected = vec![shape[0], height, width, channels];
        if shape != expected.as_slice() {
            return Err(GraphError::ShapeMismatch {
                expected,
                got: shape.to_vec(),
                message: format!(
                    "卷积层{}的输入应为 [batch, H, W, C]，与构造时的输入形状{}不符",
                    self.config.name, self.input_shape
                ),
            });
        }
        Ok(())
    }

    // ========== 访问器 ==========

    /// 最近一次 compute 后的参数表
    pub const fn params(&self) -> &ParamMap {
        &self.params
    }

    pub const fn weight(&self) -> &Var {
        &self.weight
    }

    pub const fn bias(&self) -> Option<&Var> {
        self.bias.as_ref()
    }

    pub fn gamma(&self) -> Option<&Var> {
        self.batch_norm.as_ref().map(|bn| &bn.gamma)
    }

    pub fn beta(&self) -> Option<&Var> {
        self.batch_norm.as_ref().map(|bn| &bn.beta)
    }

    pub fn running_mean(&self) -> Option<&Var> {
        self.batch_norm.as_ref().map(|bn| &bn.running_mean)
    }

    pub fn running_var(&self) -> Option<&Var> {
        self.batch_norm.as_ref().map(|bn| &bn.running_var)
    }

    pub const fn input_shape(&self) -> ShapeTriple {
        self.input_shape
    }

    pub const fn calculation(&self) -> usize {
        self.calculation
    }

    pub const fn config(&self) -> &ConvLayerConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub const fn ltype(&self) -> &'static str {
        "conv"
    }

    /// 构造时打印的那一行层信息
    pub fn summary_line(&self) -> &str {
        &self.summary_line
    }
}

impl OutputShape for ConvLayer {
    fn output_shape(&self) -> ShapeTriple {
        self.output_shape
    }
}

impl Module for ConvLayer {
    fn parameters(&self) -> Vec<Var> {
        let mut params = vec![self.weight.clone()];
        if let Some(bias) = &self.bias {
            params.push(bias.clone());
        }
        if let Some(bn) = &self.batch_norm {
            params.push(bn.gamma.clone());
            params.push(bn.beta.clone());
        }
        params
    }
}
