/*
 * @Author       : 老董
 * @Date         : 2026-03-05
 * @Description  : Module trait 定义
 */

use super::Var;

/// 模块 trait
///
/// - `new()` 与 `compute()` 不是 trait 方法（各层参数各异）
/// - `parameters()` 签名一致，放入 trait，供外部优化器或检查工具遍历
///
/// ```ignore
/// use conv_layer::nn::{Module, Var};
/// use conv_layer::nn::layer::ConvLayer;
///
/// struct Backbone {
///     conv1: ConvLayer,
///     conv2: ConvLayer,
/// }
///
/// impl Module for Backbone {
///     fn parameters(&self) -> Vec<Var> {
///         [self.conv1.parameters(), self.conv2.parameters()].concat()
///     }
/// }
/// ```
pub trait Module {
    /// 获取所有可训练参数
    fn parameters(&self) -> Vec<Var>;

    /// 获取参数张量的个数
    fn num_params(&self) -> usize {
        self.parameters().len()
    }
}
