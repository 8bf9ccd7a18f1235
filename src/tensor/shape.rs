use super::Tensor;
use crate::errors::TensorError;
use ndarray::IxDyn;
use std::collections::HashSet;

impl Tensor {
    /// 返回一个元素不变、形状为`shape`的新张量（不影响原张量）
    pub fn reshape(&self, shape: &[usize]) -> Self {
        let new_len = shape.iter().product::<usize>();
        assert!(
            new_len == self.size(),
            "{}",
            TensorError::IncompatibleReshape {
                old_shape: self.shape().to_vec(),
                new_shape: shape.to_vec(),
            }
        );
        let data = self
            .data
            .clone()
            .into_shape(IxDyn(shape))
            .expect("元素个数已校验，不该触及本错误");
        Self::from_array(data)
    }

    /// 交换张量的两个（以上）维度，并将其返回（不影响原张量）
    pub fn permute(&self, axes: &[usize]) -> Self {
        assert!(axes.len() >= 2, "{}", TensorError::PermuteNeedAtLeast2Dims);
        // 检查axes中的所有元素必须是唯一且在[0, <张量维数>)范围内
        let unique_axes = axes.iter().copied().collect::<HashSet<_>>();
        assert!(
            unique_axes.len() == axes.len()
                && axes.len() == self.dimension()
                && unique_axes.iter().all(|&a| a < self.dimension()),
            "{}",
            TensorError::PermuteNeedUniqueAndInRange
        );

        Self::from_array(self.data.clone().permuted_axes(IxDyn(axes)))
    }
}
