/*
 * @Author       : 老董
 * @Date         : 2026-10-14
 * @Description  : 2D 卷积层（PyTorch 风格）
 *
 * 输入/输出形状：
 * - 输入：[batch_size, in_channels, H, W]
 * - 输出：[batch_size, out_channels, H', W']
 *
 * 输出尺寸计算：
 * H' = (H + 2*padding_h - kernel_h) / stride_h + 1
 * W' = (W + 2*padding_w - kernel_w) / stride_w + 1
 *
 * 前向在 batch 维度上用 Rayon 并行；反向需要跨样本累加参数梯度，按固定顺序串行计算。
 */

use super::{TraitLayer, cache_mismatch, expect_rank, sliding_output_size};
use crate::nn::context::LayerCache;
use crate::nn::{GradAccumulator, Init, Mode, ModelError, param_key};
use crate::tensor::Tensor;
use ndarray::{Array1, Array4, ArrayView4, Ix4};
use rand::rngs::StdRng;
use rayon::prelude::*;

/// 2D 卷积层：`output = conv2d(x, K) + b`
#[derive(Debug, Clone)]
pub struct Conv2d {
    /// 卷积核 [out_channels, in_channels, kernel_h, kernel_w]
    weight: Tensor,
    /// 偏置 [out_channels]（可选）
    bias: Option<Tensor>,
    stride: (usize, usize),
    padding: (usize, usize),
}

impl Conv2d {
    /// 创建新的 Conv2d 层，卷积核用 Kaiming 初始化，偏置初始化为零
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: (usize, usize),
        stride: (usize, usize),
        padding: (usize, usize),
        use_bias: bool,
        rng: &mut StdRng,
    ) -> Self {
        let (k_h, k_w) = kernel_size;
        let weight = Init::Kaiming {
            fan_in: in_channels * k_h * k_w,
        }
        .generate_with_rng(&[out_channels, in_channels, k_h, k_w], rng);
        let bias = use_bias.then(|| Tensor::zeros(&[out_channels]));
        Self {
            weight,
            bias,
            stride,
            padding,
        }
    }

    /// 由已有的卷积核与偏置构建
    pub fn from_parts(
        weight: Tensor,
        bias: Option<Tensor>,
        stride: (usize, usize),
        padding: (usize, usize),
    ) -> Result<Self, ModelError> {
        expect_rank("Conv2d卷积核", weight.shape(), 4)?;
        if let Some(b) = &bias {
            if b.shape() != [weight.shape()[0]] {
                return Err(ModelError::ShapeMismatch {
                    expected: vec![weight.shape()[0]],
                    got: b.shape().to_vec(),
                    message: "Conv2d偏置长度须等于输出通道数".to_string(),
                });
            }
        }
        Ok(Self {
            weight,
            bias,
            stride,
            padding,
        })
    }

    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    pub fn bias(&self) -> Option<&Tensor> {
        self.bias.as_ref()
    }

    pub const fn stride(&self) -> (usize, usize) {
        self.stride
    }

    pub const fn padding(&self) -> (usize, usize) {
        self.padding
    }

    fn kernel_view(&self) -> ArrayView4<'_, f32> {
        self.weight
            .view()
            .into_dimensionality::<Ix4>()
            .unwrap_or_else(|_| unreachable!("构造时已保证卷积核为4维"))
    }

    fn output_hw(&self, h: usize, w: usize) -> Result<(usize, usize), ModelError> {
        let k = self.weight.shape();
        Ok((
            sliding_output_size("Conv2d", h, k[2], self.stride.0, self.padding.0)?,
            sliding_output_size("Conv2d", w, k[3], self.stride.1, self.padding.1)?,
        ))
    }

    fn input_view<'a>(&self, input: &'a Tensor) -> Result<ArrayView4<'a, f32>, ModelError> {
        expect_rank("Conv2d", input.shape(), 4)?;
        let in_channels = self.weight.shape()[1];
        if input.shape()[1] != in_channels {
            return Err(ModelError::ShapeMismatch {
                expected: vec![in_channels],
                got: vec![input.shape()[1]],
                message: "Conv2d输入通道数与卷积核不匹配".to_string(),
            });
        }
        input
            .view()
            .into_dimensionality::<Ix4>()
            .map_err(|e| ModelError::InvalidOperation(e.to_string()))
    }

    /// 输出位置`(oy, ox)`与核位置`(ky, kx)`对应的输入坐标；落在填充区时返回`None`
    fn input_coord(
        &self,
        (oy, ox): (usize, usize),
        (ky, kx): (usize, usize),
        (h, w): (usize, usize),
    ) -> Option<(usize, usize)> {
        let iy = (oy * self.stride.0 + ky).checked_sub(self.padding.0)?;
        let ix = (ox * self.stride.1 + kx).checked_sub(self.padding.1)?;
        (iy < h && ix < w).then_some((iy, ix))
    }
}

impl TraitLayer for Conv2d {
    fn type_name(&self) -> &'static str {
        "Conv2d"
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>, ModelError> {
        expect_rank("Conv2d", input_shape, 4)?;
        let (oh, ow) = self.output_hw(input_shape[2], input_shape[3])?;
        Ok(vec![input_shape[0], self.weight.shape()[0], oh, ow])
    }

    fn forward(
        &self,
        input: &Tensor,
        _mode: Mode,
        _rng: &mut StdRng,
    ) -> Result<(Tensor, LayerCache), ModelError> {
        let x = self.input_view(input)?;
        let kernel = self.kernel_view();
        let (batch_size, _, h, w) = x.dim();
        let (out_c, in_c, k_h, k_w) = kernel.dim();
        let (out_h, out_w) = self.output_hw(h, w)?;
        let bias = self.bias.as_ref().map(Tensor::to_vec);

        // Rayon 并行处理每个 batch 样本
        let batch_results: Vec<Vec<f32>> = (0..batch_size)
            .into_par_iter()
            .map(|b| {
                let mut sample = vec![0.0f32; out_c * out_h * out_w];
                for o in 0..out_c {
                    let bias_value = bias.as_ref().map_or(0.0, |v| v[o]);
                    for oy in 0..out_h {
                        for ox in 0..out_w {
                            let mut acc = bias_value;
                            for i in 0..in_c {
                                for ky in 0..k_h {
                                    for kx in 0..k_w {
                                        if let Some((iy, ix)) =
                                            self.input_coord((oy, ox), (ky, kx), (h, w))
                                        {
                                            acc += x[[b, i, iy, ix]] * kernel[[o, i, ky, kx]];
                                        }
                                    }
                                }
                            }
                            sample[(o * out_h + oy) * out_w + ox] = acc;
                        }
                    }
                }
                sample
            })
            .collect();

        let output = Tensor::new(&batch_results.concat(), &[batch_size, out_c, out_h, out_w]);
        Ok((output, LayerCache::Input(input.clone())))
    }

    fn backward(
        &self,
        name: &str,
        grad_output: &Tensor,
        cache: &LayerCache,
        grads: &mut GradAccumulator,
    ) -> Result<Tensor, ModelError> {
        let LayerCache::Input(input) = cache else {
            return Err(cache_mismatch(name));
        };
        let x = self.input_view(input)?;
        let kernel = self.kernel_view();
        let (batch_size, in_c, h, w) = x.dim();
        let (out_c, _, k_h, k_w) = kernel.dim();

        let expected = self.output_shape(input.shape())?;
        if grad_output.shape() != expected.as_slice() {
            return Err(ModelError::ShapeMismatch {
                expected,
                got: grad_output.shape().to_vec(),
                message: format!("{name}收到的输出梯度形状不对"),
            });
        }
        let g = grad_output
            .view()
            .into_dimensionality::<Ix4>()
            .map_err(|e| ModelError::InvalidOperation(e.to_string()))?;
        let (_, _, out_h, out_w) = g.dim();

        let mut grad_input = Array4::<f32>::zeros((batch_size, in_c, h, w));
        let mut grad_kernel = Array4::<f32>::zeros((out_c, in_c, k_h, k_w));
        let mut grad_bias = Array1::<f32>::zeros(out_c);

        for b in 0..batch_size {
            for o in 0..out_c {
                for oy in 0..out_h {
                    for ox in 0..out_w {
                        let upstream = g[[b, o, oy, ox]];
                        grad_bias[o] += upstream;
                        for i in 0..in_c {
                            for ky in 0..k_h {
                                for kx in 0..k_w {
                                    if let Some((iy, ix)) =
                                        self.input_coord((oy, ox), (ky, kx), (h, w))
                                    {
                                        grad_input[[b, i, iy, ix]] +=
                                            upstream * kernel[[o, i, ky, kx]];
                                        grad_kernel[[o, i, ky, kx]] +=
                                            upstream * x[[b, i, iy, ix]];
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        grads.accumulate(
            param_key(name, "weight"),
            Tensor::from_array(grad_kernel.into_dyn()),
        );
        if self.bias.is_some() {
            grads.accumulate(
                param_key(name, "bias"),
                Tensor::from_array(grad_bias.into_dyn()),
            );
        }
        Ok(Tensor::from_array(grad_input.into_dyn()))
    }

    fn parameters(&self) -> Vec<(&'static str, &Tensor)> {
        let mut params = vec![("weight", &self.weight)];
        if let Some(b) = &self.bias {
            params.push(("bias", b));
        }
        params
    }

    fn parameters_mut(&mut self) -> Vec<(&'static str, &mut Tensor)> {
        let mut params = vec![("weight", &mut self.weight)];
        if let Some(b) = &mut self.bias {
            params.push(("bias", b));
        }
        params
    }
}
