/*
 * @Author       : 老董
 * @Date         : 2026-10-14
 * @Description  : 张量的归约与统计：最值、求和、分位数
 */

use super::Tensor;
use ndarray::Axis;

impl Tensor {
    /// 所有元素中的最大值；空张量返回`None`
    pub fn max_value(&self) -> Option<f32> {
        self.data.iter().copied().reduce(f32::max)
    }

    /// 所有元素中的最小值；空张量返回`None`
    pub fn min_value(&self) -> Option<f32> {
        self.data.iter().copied().reduce(f32::min)
    }

    /// 最大值在行优先展平后的索引（并列时取第一个）
    pub fn argmax_flat(&self) -> Option<usize> {
        self.data
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, f32)>, (i, &x)| match best {
                Some((_, v)) if v >= x => best,
                _ => Some((i, x)),
            })
            .map(|(i, _)| i)
    }

    /// 最小值在行优先展平后的索引（并列时取第一个）
    pub fn argmin_flat(&self) -> Option<usize> {
        self.data
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, f32)>, (i, &x)| match best {
                Some((_, v)) if v <= x => best,
                _ => Some((i, x)),
            })
            .map(|(i, _)| i)
    }

    pub fn sum(&self) -> f32 {
        self.data.sum()
    }

    /// 沿`axis`求和并保留该维度（长度变为1）。如`[3, H, W]`沿0轴求和得到`[1, H, W]`
    pub fn sum_axis_keep(&self, axis: usize) -> Self {
        assert!(
            axis < self.dimension(),
            "求和的维度{}超出了张量的维数{}",
            axis,
            self.dimension()
        );
        Self::from_array(self.data.sum_axis(Axis(axis)).insert_axis(Axis(axis)))
    }

    /// 计算第`q`百分位数（`q`∈[0, 100]），与NumPy默认的线性插值方式一致：
    /// 排序后取秩`q / 100 * (n - 1)`，在相邻两个元素间线性插值。
    /// 空张量返回`None`
    pub fn percentile(&self, q: f32) -> Option<f32> {
        assert!(
            (0.0..=100.0).contains(&q),
            "百分位数须在[0, 100]之间，但得到{q}"
        );
        if self.is_empty() {
            return None;
        }
        let mut sorted = self.to_vec();
        sorted.sort_by(f32::total_cmp);

        let rank = f64::from(q) / 100.0 * (sorted.len() - 1) as f64;
        let lower = rank.floor() as usize;
        let upper = rank.ceil() as usize;
        let fraction = rank - lower as f64;
        let (low, high) = (f64::from(sorted[lower]), f64::from(sorted[upper]));
        Some((low + (high - low) * fraction) as f32)
    }
}
