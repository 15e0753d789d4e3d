/*
 * @Author       : 老董
 * @Date         : 2026-10-14
 * @Description  : Layer 模块 - 层树中的叶子层（具体运算）
 *
 * 所有叶子层都实现 `TraitLayer`，并通过 enum_dispatch 汇总为 `Layer` 枚举。
 * 每个层都通过 `is_rectifying_activation()` 报告自己是否为整流激活层（ReLU），
 * 钩子安装时只查询这一能力标签，不做任何运行时类型判断。
 */

mod batch_norm2d;
mod conv2d;
mod dropout;
mod flatten;
mod linear;
mod max_pool2d;
mod relu;

pub use batch_norm2d::BatchNorm2d;
pub use conv2d::Conv2d;
pub use dropout::Dropout;
pub use flatten::Flatten;
pub use linear::Linear;
pub use max_pool2d::MaxPool2d;
pub use relu::ReLU;

use super::context::LayerCache;
use super::{GradAccumulator, Mode, ModelError};
use crate::tensor::Tensor;
use enum_dispatch::enum_dispatch;
use rand::rngs::StdRng;

#[enum_dispatch]
pub(crate) trait TraitLayer {
    fn type_name(&self) -> &'static str;

    /// 是否为整流激活层（前向为`max(0, x)`）
    fn is_rectifying_activation(&self) -> bool {
        false
    }

    /// 根据输入形状推断输出形状（含批维度）
    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>, ModelError>;

    /// 前向计算，同时返回留给反向传播的缓存
    fn forward(
        &self,
        input: &Tensor,
        mode: Mode,
        rng: &mut StdRng,
    ) -> Result<(Tensor, LayerCache), ModelError>;

    /// 给定关于输出的梯度，返回关于输入的梯度；参数梯度累加到`grads`中（键见`param_key`）
    fn backward(
        &self,
        name: &str,
        grad_output: &Tensor,
        cache: &LayerCache,
        grads: &mut GradAccumulator,
    ) -> Result<Tensor, ModelError>;

    /// 按固定顺序列出（参数名, 参数）；包括不参与求导的缓冲量（如BatchNorm的运行统计量）
    fn parameters(&self) -> Vec<(&'static str, &Tensor)> {
        Vec::new()
    }

    fn parameters_mut(&mut self) -> Vec<(&'static str, &mut Tensor)> {
        Vec::new()
    }
}

/// 叶子层
#[enum_dispatch(TraitLayer)]
#[derive(Debug, Clone)]
pub enum Layer {
    Conv2d(Conv2d),
    Linear(Linear),
    ReLU(ReLU),
    MaxPool2d(MaxPool2d),
    BatchNorm2d(BatchNorm2d),
    Dropout(Dropout),
    Flatten(Flatten),
}

impl Layer {
    pub fn type_name(&self) -> &'static str {
        TraitLayer::type_name(self)
    }

    pub fn is_rectifying_activation(&self) -> bool {
        TraitLayer::is_rectifying_activation(self)
    }

    pub fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>, ModelError> {
        TraitLayer::output_shape(self, input_shape)
    }

    pub fn parameters(&self) -> Vec<(&'static str, &Tensor)> {
        TraitLayer::parameters(self)
    }
}

/// 检查`shape`的维数，失败时给出层名相关的错误信息
fn expect_rank(layer: &str, shape: &[usize], rank: usize) -> Result<(), ModelError> {
    if shape.len() == rank {
        Ok(())
    } else {
        Err(ModelError::ShapeMismatch {
            expected: vec![0; rank],
            got: shape.to_vec(),
            message: format!("{layer}的输入必须是{rank}维张量"),
        })
    }
}

/// 窗口滑动后的输出尺寸：`(size + 2*padding - kernel) / stride + 1`
fn sliding_output_size(
    layer: &str,
    size: usize,
    kernel: usize,
    stride: usize,
    padding: usize,
) -> Result<usize, ModelError> {
    let padded = size + 2 * padding;
    if stride == 0 || kernel == 0 || padded < kernel {
        return Err(ModelError::InvalidOperation(format!(
            "{layer}输出尺寸无效：输入尺寸{size}，核{kernel}，步长{stride}，填充{padding}"
        )));
    }
    Ok((padded - kernel) / stride + 1)
}

fn cache_mismatch(name: &str) -> ModelError {
    ModelError::MissingCache(name.to_string())
}

