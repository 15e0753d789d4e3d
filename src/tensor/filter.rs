use super::Tensor;
use ndarray::Zip;

impl Tensor {
    /// 通用的条件过滤函数，可以灵活处理张量中的元素
    ///
    /// # 参数
    /// * `condition` - 条件函数，接收元素值并返回bool
    /// * `true_fn` - 当条件为true时的值转换函数
    /// * `false_fn` - 当条件为false时的值转换函数
    ///
    /// 注：NaN元素原样保留为NaN。
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

    /// 以`mask`张量的对应元素为条件：`condition(mask)`成立处保留本张量的值，否则置0。
    /// 两者形状必须一致，否则panic
    pub fn masked_by<F>(&self, mask: &Self, condition: F) -> Self
    where
        F: Fn(f32) -> bool,
    {
        assert!(
            self.is_same_shape(mask),
            "形状不一致，故无法按掩码过滤：第一个张量的形状为{:?}，掩码张量的形状为{:?}",
            self.shape(),
            mask.shape()
        );
        let data = Zip::from(&self.data)
            .and(&mask.data)
            .map_collect(|&x, &m| if condition(m) { x } else { 0.0 });
        Self::from_array(data)
    }

    /// 逐元素取`max(min, x)`
    pub fn clamp_min(&self, min: f32) -> Self {
        self.map(|x| x.max(min))
    }

    /// 逐元素截断到闭区间`[min, max]`
    pub fn clip(&self, min: f32, max: f32) -> Self {
        self.map(|x| x.clamp(min, max))
    }

    pub fn abs(&self) -> Self {
        self.map(f32::abs)
    }
}
