use thiserror::Error;
mod ops;
pub use self::ops::*;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TensorError {
    // 创建张量
    #[error("数据长度{data_len}与形状{shape:?}所需的元素个数不一致")]
    DataLengthMismatch { data_len: usize, shape: Vec<usize> },
    // 张量二元运算
    #[error(
        "形状不一致，故无法{operator}：第一个张量的形状为{tensor1_shape:?}，第二个张量的形状为{tensor2_shape:?}"
    )]
    OperatorError {
        operator: Operator,
        tensor1_shape: Vec<usize>,
        tensor2_shape: Vec<usize>,
    },

    #[error("新形状{new_shape:?}的元素个数与原形状{old_shape:?}不一致")]
    IncompatibleReshape {
        old_shape: Vec<usize>,
        new_shape: Vec<usize>,
    },
    #[error("交换张量时，输入的维度数至少需要2个")]
    PermuteNeedAtLeast2Dims,
    #[error("需要交换的维度必须是唯一且在[0, <张量维数>)范围内")]
    PermuteNeedUniqueAndInRange,
    #[error("裁剪区间无效：下界{min}大于上界{max}")]
    InvalidClampRange { min: String, max: String },
}
