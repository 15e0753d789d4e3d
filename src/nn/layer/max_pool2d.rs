/*
 * @Author       : 老董
 * @Date         : 2026-10-14
 * @Description  : 2D 最大池化层（PyTorch 风格）
 *
 * - 记录最大值位置用于反向传播（稀疏梯度）
 * - 输入必须是 4D [batch, C, H, W]，输出 [batch, C, H', W']
 * - 窗口内并列最大值取第一个出现的位置
 */

use super::{TraitLayer, cache_mismatch, expect_rank, sliding_output_size};
use crate::nn::context::LayerCache;
use crate::nn::{GradAccumulator, Mode, ModelError};
use crate::tensor::Tensor;
use ndarray::Ix4;
use rand::rngs::StdRng;

#[derive(Debug, Clone)]
pub struct MaxPool2d {
    kernel_size: (usize, usize),
    stride: (usize, usize),
}

impl MaxPool2d {
    /// `stride`为`None`时等于`kernel_size`
    pub fn new(kernel_size: (usize, usize), stride: Option<(usize, usize)>) -> Self {
        Self {
            kernel_size,
            stride: stride.unwrap_or(kernel_size),
        }
    }

    pub const fn kernel_size(&self) -> (usize, usize) {
        self.kernel_size
    }

    pub const fn stride(&self) -> (usize, usize) {
        self.stride
    }
}

impl TraitLayer for MaxPool2d {
    fn type_name(&self) -> &'static str {
        "MaxPool2d"
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>, ModelError> {
        expect_rank("MaxPool2d", input_shape, 4)?;
        let out_h = sliding_output_size(
            "MaxPool2d",
            input_shape[2],
            self.kernel_size.0,
            self.stride.0,
            0,
        )?;
        let out_w = sliding_output_size(
            "MaxPool2d",
            input_shape[3],
            self.kernel_size.1,
            self.stride.1,
            0,
        )?;
        Ok(vec![input_shape[0], input_shape[1], out_h, out_w])
    }

    fn forward(
        &self,
        input: &Tensor,
        _mode: Mode,
        _rng: &mut StdRng,
    ) -> Result<(Tensor, LayerCache), ModelError> {
        let out_shape = self.output_shape(input.shape())?;
        let x = input
            .view()
            .into_dimensionality::<Ix4>()
            .map_err(|e| ModelError::InvalidOperation(e.to_string()))?;
        let (n, c, h, w) = x.dim();
        let (out_h, out_w) = (out_shape[2], out_shape[3]);
        let (k_h, k_w) = self.kernel_size;
        let (s_h, s_w) = self.stride;

        let mut values = Vec::with_capacity(n * c * out_h * out_w);
        let mut indices = Vec::with_capacity(values.capacity());
        for b in 0..n {
            for ch in 0..c {
                for oy in 0..out_h {
                    for ox in 0..out_w {
                        let mut best = (f32::NEG_INFINITY, None);
                        for ky in 0..k_h {
                            for kx in 0..k_w {
                                let (iy, ix) = (oy * s_h + ky, ox * s_w + kx);
                                let v = x[[b, ch, iy, ix]];
                                if best.1.is_none() || v > best.0 {
                                    best = (v, Some(((b * c + ch) * h + iy) * w + ix));
                                }
                            }
                        }
                        let (value, index) = best;
                        values.push(value);
                        indices.push(index.unwrap_or_default());
                    }
                }
            }
        }

        Ok((
            Tensor::new(&values, &out_shape),
            LayerCache::PoolIndices {
                input_shape: input.shape().to_vec(),
                indices,
            },
        ))
    }

    fn backward(
        &self,
        name: &str,
        grad_output: &Tensor,
        cache: &LayerCache,
        _grads: &mut GradAccumulator,
    ) -> Result<Tensor, ModelError> {
        let LayerCache::PoolIndices {
            input_shape,
            indices,
        } = cache
        else {
            return Err(cache_mismatch(name));
        };
        if grad_output.size() != indices.len() {
            return Err(ModelError::ShapeMismatch {
                expected: self.output_shape(input_shape)?,
                got: grad_output.shape().to_vec(),
                message: format!("{name}收到的输出梯度形状不对"),
            });
        }
        let mut grad_input = vec![0.0f32; input_shape.iter().product()];
        for (&index, g) in indices.iter().zip(grad_output.view().iter()) {
            grad_input[index] += g;
        }
        Ok(Tensor::new(&grad_input, input_shape))
    }
}
