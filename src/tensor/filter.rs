use super::Tensor;
use crate::errors::TensorError;

impl Tensor {
    /// 通用的条件过滤函数，可以灵活处理张量中的元素
    ///
    /// # 参数
    /// * `condition` - 条件函数，接收元素值并返回bool
    /// * `true_fn` - 当条件为true时的值转换函数
    /// * `false_fn` - 当条件为false时的值转换函数
    ///
    /// # 示例
    /// ```
    /// use conv_layer::tensor::Tensor;
    /// let t = Tensor::new(&[-1.0, 0.0, 1.0], &[3]);
    ///
    /// // 类似 np.where(x >= 0.0, x, 0.1 * x)
    /// let result = t.where_with_f32(|x| x >= 0.0, |x| x, |x| 0.1 * x);
    /// assert_eq!(result.data_as_slice(), &[-0.1, 0.0, 1.0]);
    /// ```
    pub fn where_with_f32<F, T, U>(&self, condition: F, true_fn: T, false_fn: U) -> Self
    where
        F: Fn(f32) -> bool,
        T: Fn(f32) -> f32,
        U: Fn(f32) -> f32,
    {
        self.map(|x| {
            if x.is_nan() {
                f32::NAN
            } else if condition(x) {
                true_fn(x)
            } else {
                false_fn(x)
            }
        })
    }

    /// 逐元素映射
    pub fn map<F: Fn(f32) -> f32>(&self, f: F) -> Self {
        Self::from_array(self.data.mapv(f))
    }

    /// 逐元素裁剪到闭区间`[min, max]`
    pub fn clamp(&self, min: f32, max: f32) -> Self {
        assert!(
            min <= max,
            "{}",
            TensorError::InvalidClampRange {
                min: min.to_string(),
                max: max.to_string(),
            }
        );
        self.map(|x| x.clamp(min, max))
    }

    /// 所有元素之和（纯数）
    pub fn sum_all(&self) -> f32 {
        self.data.sum()
    }
}
