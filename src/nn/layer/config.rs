/*
 * @Author       : 老董
 * @Date         : 2026-03-05
 * @Description  : 卷积层的配置：激活函数、数据布局、形状三元组以及可 JSON（反）序列化的 ConvLayerConfig
 */

use crate::nn::GraphError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

// ==================== 激活函数 ====================

/// 卷积层可选的激活函数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    Relu,
    Tanh,
    /// 固定斜率 0.1
    LeakyRelu,
    Sigmoid,
    /// 直接输出激活前的值
    None,
}

impl Activation {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Relu => "relu",
            Self::Tanh => "tanh",
            Self::LeakyRelu => "leaky_relu",
            Self::Sigmoid => "sigmoid",
            Self::None => "none",
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Activation {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relu" => Ok(Self::Relu),
            "tanh" => Ok(Self::Tanh),
            "leaky_relu" => Ok(Self::LeakyRelu),
            "sigmoid" => Ok(Self::Sigmoid),
            "none" => Ok(Self::None),
            _ => Err(GraphError::InvalidConfig(format!("未知的激活函数：`{s}`"))),
        }
    }
}

// ==================== 数据布局 ====================

/// 层内部计算使用的布局
///
/// 调用方的输入/输出始终是 [batch, H, W, C]，两种取值的计算结果相同。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataFormat {
    /// 内部为 [batch, C, H, W]
    #[default]
    ChannelsFirst,
    /// 内部为 [batch, H, W, C]
    ChannelsLast,
}

impl DataFormat {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ChannelsFirst => "channels_first",
            Self::ChannelsLast => "channels_last",
        }
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DataFormat {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "channels_first" => Ok(Self::ChannelsFirst),
            "channels_last" => Ok(Self::ChannelsLast),
            _ => Err(GraphError::InvalidConfig(format!("未知的数据布局：`{s}`"))),
        }
    }
}

// ==================== 形状三元组 ====================

/// 特征图形状 (height, width, channels)，与数据布局无关
///
/// JSON 中表示为 `[h, w, c]`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(usize, usize, usize)", into = "(usize, usize, usize)")]
pub struct ShapeTriple {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl ShapeTriple {
    pub const fn new(height: usize, width: usize, channels: usize) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }
}

impl From<(usize, usize, usize)> for ShapeTriple {
    fn from((height, width, channels): (usize, usize, usize)) -> Self {
        Self::new(height, width, channels)
    }
}

impl From<ShapeTriple> for (usize, usize, usize) {
    fn from(shape: ShapeTriple) -> Self {
        (shape.height, shape.width, shape.channels)
    }
}

impl fmt::Display for ShapeTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.height, self.width, self.channels)
    }
}

// ==================== ConvLayerConfig ====================

fn default_name() -> String {
    "conv".to_string()
}

/// 卷积层的超参数
///
/// ```
/// use conv_layer::nn::layer::{Activation, ConvLayerConfig, ShapeTriple};
///
/// let config = ConvLayerConfig::from_json(
///     r#"{"kernel_size": [3, 3], "stride": [2, 2], "n_filter": 8,
///         "activation": "leaky_relu", "input_shape": [32, 32, 3]}"#,
/// )
/// .unwrap();
/// assert_eq!(config.activation, Activation::LeakyRelu);
/// assert_eq!(config.input_shape, Some(ShapeTriple::new(32, 32, 3)));
/// assert_eq!(config.name, "conv");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvLayerConfig {
    /// (kernel_h, kernel_w)
    pub kernel_size: (usize, usize),
    /// (stride_h, stride_w)
    pub stride: (usize, usize),
    /// 输出通道数
    pub n_filter: usize,
    #[serde(default)]
    pub activation: Activation,
    /// 为 true 时用批归一化代替偏置
    #[serde(default)]
    pub batch_normal: bool,
    #[serde(default)]
    pub data_format: DataFormat,
    /// 未提供前一层时必须给出
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_shape: Option<ShapeTriple>,
    /// 层名，同时是参数名的前缀（`<name>#weight` 等），同一张图内须唯一
    #[serde(default = "default_name")]
    pub name: String,
}

impl ConvLayerConfig {
    pub fn new(kernel_size: (usize, usize), stride: (usize, usize), n_filter: usize) -> Self {
        Self {
            kernel_size,
            stride,
            n_filter,
            activation: Activation::default(),
            batch_normal: false,
            data_format: DataFormat::default(),
            input_shape: None,
            name: default_name(),
        }
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_batch_normal(mut self, batch_normal: bool) -> Self {
        self.batch_normal = batch_normal;
        self
    }

    pub fn with_data_format(mut self, data_format: DataFormat) -> Self {
        self.data_format = data_format;
        self
    }

    pub fn with_input_shape(mut self, input_shape: ShapeTriple) -> Self {
        self.input_shape = Some(input_shape);
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// 检查与输入形状无关的超参数
    pub fn validate(&self) -> Result<(), GraphError> {
        let (k_h, k_w) = self.kernel_size;
        let (s_h, s_w) = self.stride;
        if k_h == 0 || k_w == 0 || s_h == 0 || s_w == 0 {
            return Err(GraphError::InvalidConfig(format!(
                "卷积层{}的卷积核 {:?} 与步长 {:?} 必须为正",
                self.name, self.kernel_size, self.stride
            )));
        }
        if self.n_filter == 0 {
            return Err(GraphError::InvalidConfig(format!(
                "卷积层{}的 n_filter 必须为正",
                self.name
            )));
        }
        if self.name.is_empty() {
            return Err(GraphError::InvalidConfig("卷积层的名称不能为空".to_string()));
        }
        Ok(())
    }

    // ========== JSON ==========

    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        serde_json::from_str(json)
            .map_err(|e| GraphError::InvalidConfig(format!("解析卷积层配置失败：{e}")))
    }

    pub fn to_json(&self) -> Result<String, GraphError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| GraphError::InvalidConfig(format!("序列化卷积层配置失败：{e}")))
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, GraphError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            GraphError::InvalidConfig(format!("读取配置文件 {} 失败：{e}", path.display()))
        })?;
        Self::from_json(&json)
    }
}
