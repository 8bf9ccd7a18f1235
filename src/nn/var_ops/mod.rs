/*
 * @Author       : 老董
 * @Date         : 2026-03-04
 * @Description  : Var 扩展 trait 模块
 *
 * 按功能领域组织 Var 的扩展方法，用户按需 import：
 * - `activation`: relu, leaky_relu, tanh, sigmoid, clip_grad
 * - `conv`: conv2d, channel_bias_add, batch_norm
 * - `loss`: mse_loss
 * - `shape`: permute
 */

mod activation;
mod conv;
mod loss;
mod shape;

pub use activation::VarActivationOps;
pub use conv::VarConvOps;
pub use loss::VarLossOps;
pub use shape::VarShapeOps;
