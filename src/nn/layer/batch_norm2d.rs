/*
 * @Author       : 老董
 * @Date         : 2026-10-14
 * @Description  : 2D 批归一化层（按通道）
 *
 * y = (x - mean) / sqrt(var + eps) * weight + bias
 *
 * - 推理模式：mean/var 取运行统计量（running_mean/running_var），是逐通道的仿射变换
 * - 训练模式：mean/var 取当前批的统计量；本crate不做训练，训练模式只支持前向
 */

use super::{TraitLayer, cache_mismatch, expect_rank};
use crate::nn::context::LayerCache;
use crate::nn::{GradAccumulator, Mode, ModelError, param_key};
use crate::tensor::Tensor;
use ndarray::{Array1, Array4, Axis, Ix4};
use rand::rngs::StdRng;

const DEFAULT_EPS: f32 = 1e-5;

#[derive(Debug, Clone)]
pub struct BatchNorm2d {
    weight: Tensor,
    bias: Tensor,
    running_mean: Tensor,
    running_var: Tensor,
    eps: f32,
}

impl BatchNorm2d {
    /// weight=1、bias=0、running_mean=0、running_var=1
    pub fn new(num_features: usize) -> Self {
        Self {
            weight: Tensor::ones(&[num_features]),
            bias: Tensor::zeros(&[num_features]),
            running_mean: Tensor::zeros(&[num_features]),
            running_var: Tensor::ones(&[num_features]),
            eps: DEFAULT_EPS,
        }
    }

    pub fn from_parts(
        weight: Tensor,
        bias: Tensor,
        running_mean: Tensor,
        running_var: Tensor,
    ) -> Result<Self, ModelError> {
        expect_rank("BatchNorm2d权重", weight.shape(), 1)?;
        for tensor in [&bias, &running_mean, &running_var] {
            if !tensor.is_same_shape(&weight) {
                return Err(ModelError::ShapeMismatch {
                    expected: weight.shape().to_vec(),
                    got: tensor.shape().to_vec(),
                    message: "BatchNorm2d各参数的长度须一致".to_string(),
                });
            }
        }
        Ok(Self {
            weight,
            bias,
            running_mean,
            running_var,
            eps: DEFAULT_EPS,
        })
    }

    pub fn num_features(&self) -> usize {
        self.weight.size()
    }

    pub const fn eps(&self) -> f32 {
        self.eps
    }

    fn check_input(&self, shape: &[usize]) -> Result<(), ModelError> {
        expect_rank("BatchNorm2d", shape, 4)?;
        if shape[1] != self.num_features() {
            return Err(ModelError::ShapeMismatch {
                expected: vec![self.num_features()],
                got: vec![shape[1]],
                message: "BatchNorm2d输入通道数不匹配".to_string(),
            });
        }
        Ok(())
    }

    /// 当前批的逐通道均值与（有偏）方差
    fn batch_statistics(x: &ndarray::ArrayView4<'_, f32>) -> (Vec<f32>, Vec<f32>) {
        let channels = x.dim().1;
        (0..channels)
            .map(|c| {
                let lane = x.index_axis(Axis(1), c);
                let count = lane.len().max(1) as f32;
                let mean = lane.sum() / count;
                let var = lane.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / count;
                (mean, var)
            })
            .unzip()
    }
}

impl TraitLayer for BatchNorm2d {
    fn type_name(&self) -> &'static str {
        "BatchNorm2d"
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>, ModelError> {
        self.check_input(input_shape)?;
        Ok(input_shape.to_vec())
    }

    fn forward(
        &self,
        input: &Tensor,
        mode: Mode,
        _rng: &mut StdRng,
    ) -> Result<(Tensor, LayerCache), ModelError> {
        self.check_input(input.shape())?;
        let x = input
            .view()
            .into_dimensionality::<Ix4>()
            .map_err(|e| ModelError::InvalidOperation(e.to_string()))?;

        let batch_stats = mode == Mode::Train;
        let (mean, var) = if batch_stats {
            Self::batch_statistics(&x)
        } else {
            (self.running_mean.to_vec(), self.running_var.to_vec())
        };
        let inv_std: Vec<f32> = var.iter().map(|v| 1.0 / (v + self.eps).sqrt()).collect();
        let (gamma, beta) = (self.weight.to_vec(), self.bias.to_vec());

        let mut output = x.to_owned();
        for (c, mut lane) in output.axis_iter_mut(Axis(1)).enumerate() {
            lane.mapv_inplace(|v| (v - mean[c]) * inv_std[c] * gamma[c] + beta[c]);
        }

        Ok((
            Tensor::from_array(output.into_dyn()),
            LayerCache::BatchNorm {
                input: input.clone(),
                mean,
                inv_std,
                batch_stats,
            },
        ))
    }

    fn backward(
        &self,
        name: &str,
        grad_output: &Tensor,
        cache: &LayerCache,
        grads: &mut GradAccumulator,
    ) -> Result<Tensor, ModelError> {
        let LayerCache::BatchNorm {
            input,
            mean,
            inv_std,
            batch_stats,
        } = cache
        else {
            return Err(cache_mismatch(name));
        };
        if *batch_stats {
            return Err(ModelError::InvalidOperation(format!(
                "{name}在训练模式（批统计量）下不支持反向传播，请使用推理模式"
            )));
        }
        if !grad_output.is_same_shape(input) {
            return Err(ModelError::ShapeMismatch {
                expected: input.shape().to_vec(),
                got: grad_output.shape().to_vec(),
                message: format!("{name}收到的输出梯度形状不对"),
            });
        }
        let x = input
            .view()
            .into_dimensionality::<Ix4>()
            .map_err(|e| ModelError::InvalidOperation(e.to_string()))?;
        let g = grad_output
            .view()
            .into_dimensionality::<Ix4>()
            .map_err(|e| ModelError::InvalidOperation(e.to_string()))?;
        let gamma = self.weight.to_vec();
        let channels = gamma.len();

        let mut grad_input: Array4<f32> = g.to_owned();
        let mut grad_weight = Array1::<f32>::zeros(channels);
        let mut grad_bias = Array1::<f32>::zeros(channels);
        for c in 0..channels {
            let g_lane = g.index_axis(Axis(1), c);
            let x_lane = x.index_axis(Axis(1), c);
            grad_bias[c] = g_lane.sum();
            grad_weight[c] = g_lane
                .iter()
                .zip(x_lane.iter())
                .map(|(gv, xv)| gv * (xv - mean[c]) * inv_std[c])
                .sum();
            let scale = gamma[c] * inv_std[c];
            grad_input
                .index_axis_mut(Axis(1), c)
                .mapv_inplace(|v| v * scale);
        }

        grads.accumulate(
            param_key(name, "weight"),
            Tensor::from_array(grad_weight.into_dyn()),
        );
        grads.accumulate(
            param_key(name, "bias"),
            Tensor::from_array(grad_bias.into_dyn()),
        );
        Ok(Tensor::from_array(grad_input.into_dyn()))
    }

    fn parameters(&self) -> Vec<(&'static str, &Tensor)> {
        vec![
            ("weight", &self.weight),
            ("bias", &self.bias),
            ("running_mean", &self.running_mean),
            ("running_var", &self.running_var),
        ]
    }

    fn parameters_mut(&mut self) -> Vec<(&'static str, &mut Tensor)> {
        vec![
            ("weight", &mut self.weight),
            ("bias", &mut self.bias),
            ("running_mean", &mut self.running_mean),
            ("running_var", &mut self.running_var),
        ]
    }
}
