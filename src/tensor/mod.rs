/*
 * @Author       : 老董
 * @Date         : 2026-10-14
 * @Description  : 张量（Tensor）：基于ndarray的动态维度f32数组。
 *                 本crate中所有的前向值、梯度、显著图都用它来承载。
 */

use ndarray::{ArrayD, IxDyn};
use rand::Rng;
use rand::rngs::StdRng;

mod filter;
mod ops;
mod property;
mod statistics;

#[cfg(test)]
mod tests;

/// 定义张量的结构体。其可以是标量、向量、矩阵或更高维度的数组。
/// 图像类张量统一采用`[C, H, W]`（单样本）或`[N, C, H, W]`（含批维度）的布局。
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: ArrayD<f32>,
}

impl Tensor {
    /// 创建一个张量。
    /// 注：`data`的长度必须和`shape`中所有元素的乘积相等，否则会panic。
    pub fn new(data: &[f32], shape: &[usize]) -> Self {
        let expected_len = shape.iter().product::<usize>();
        assert!(
            data.len() == expected_len,
            "数据长度{}与形状{:?}所需的元素个数{}不一致",
            data.len(),
            shape,
            expected_len
        );
        let data = ArrayD::from_shape_vec(IxDyn(shape), data.to_vec())
            .unwrap_or_else(|e| panic!("无法以形状{shape:?}创建张量：{e}"));
        Self { data }
    }

    /// 创建一个全零张量
    pub fn zeros(shape: &[usize]) -> Self {
        Self {
            data: ArrayD::zeros(IxDyn(shape)),
        }
    }

    /// 创建一个全一张量
    pub fn ones(shape: &[usize]) -> Self {
        Self {
            data: ArrayD::ones(IxDyn(shape)),
        }
    }

    /// 创建一个与`other`形状相同的全零张量
    pub fn zeros_like(other: &Self) -> Self {
        Self::zeros(other.shape())
    }

    /// 创建一个独热（one-hot）张量：除`index`处为1.0外其余元素皆为0.0
    pub fn one_hot(shape: &[usize], index: &[usize]) -> Self {
        let mut tensor = Self::zeros(shape);
        tensor.data[IxDyn(index)] = 1.0;
        tensor
    }

    /// 直接由ndarray数组构建张量
    pub fn from_array(data: ArrayD<f32>) -> Self {
        Self { data }
    }

    pub fn into_array(self) -> ArrayD<f32> {
        self.data
    }

    /// 使用指定的RNG创建一个服从正态分布的随机张量（Box-Muller变换）
    pub fn normal_with_rng(mean: f32, std_dev: f32, shape: &[usize], rng: &mut StdRng) -> Self {
        let data_len = shape.iter().product::<usize>();
        let mut data = Vec::with_capacity(data_len);

        while data.len() < data_len {
            let u1: f32 = rng.r#gen();
            let u2: f32 = rng.r#gen();
            let r = (-2.0 * u1.ln()).sqrt();
            let theta = 2.0 * std::f32::consts::PI * u2;
            let z0 = mean + std_dev * r * theta.cos();
            let z1 = mean + std_dev * r * theta.sin();

            if z0.is_finite() {
                data.push(z0);
            }
            if data.len() < data_len && z1.is_finite() {
                data.push(z1);
            }
        }

        Self::new(&data, shape)
    }
}
