/*
 * @Author       : 老董
 * @Date         : 2026-10-14
 * @Description  : 全连接（Linear）层 - PyTorch 风格
 *
 * 输入：[batch_size, in_features]
 * 输出：[batch_size, out_features]
 * 计算：output = x @ Wᵀ + b
 */

use super::{TraitLayer, cache_mismatch, expect_rank};
use crate::nn::context::LayerCache;
use crate::nn::{GradAccumulator, Init, Mode, ModelError, param_key};
use crate::tensor::Tensor;
use ndarray::{ArrayView1, ArrayView2, Axis, Ix1, Ix2};
use rand::rngs::StdRng;

#[derive(Debug, Clone)]
pub struct Linear {
    /// 权重 [out_features, in_features]
    weight: Tensor,
    /// 偏置 [out_features]
    bias: Tensor,
}

impl Linear {
    /// 权重用 Kaiming 初始化，偏置初始化为零
    pub fn new(in_features: usize, out_features: usize, rng: &mut StdRng) -> Self {
        let weight = Init::Kaiming { fan_in: in_features }
            .generate_with_rng(&[out_features, in_features], rng);
        Self {
            weight,
            bias: Tensor::zeros(&[out_features]),
        }
    }

    pub fn from_parts(weight: Tensor, bias: Tensor) -> Result<Self, ModelError> {
        expect_rank("Linear权重", weight.shape(), 2)?;
        if bias.shape() != [weight.shape()[0]] {
            return Err(ModelError::ShapeMismatch {
                expected: vec![weight.shape()[0]],
                got: bias.shape().to_vec(),
                message: "Linear偏置长度须等于输出特征数".to_string(),
            });
        }
        Ok(Self { weight, bias })
    }

    pub fn in_features(&self) -> usize {
        self.weight.shape()[1]
    }

    pub fn out_features(&self) -> usize {
        self.weight.shape()[0]
    }

    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    pub fn bias(&self) -> &Tensor {
        &self.bias
    }

    fn weight_view(&self) -> ArrayView2<'_, f32> {
        self.weight
            .view()
            .into_dimensionality::<Ix2>()
            .unwrap_or_else(|_| unreachable!("构造时已保证权重为2维"))
    }

    fn bias_view(&self) -> ArrayView1<'_, f32> {
        self.bias
            .view()
            .into_dimensionality::<Ix1>()
            .unwrap_or_else(|_| unreachable!("构造时已保证偏置为1维"))
    }

    fn input_view<'a>(&self, input: &'a Tensor) -> Result<ArrayView2<'a, f32>, ModelError> {
        expect_rank("Linear", input.shape(), 2)?;
        if input.shape()[1] != self.in_features() {
            return Err(ModelError::ShapeMismatch {
                expected: vec![input.shape()[0], self.in_features()],
                got: input.shape().to_vec(),
                message: "Linear输入特征数不匹配".to_string(),
            });
        }
        input
            .view()
            .into_dimensionality::<Ix2>()
            .map_err(|e| ModelError::InvalidOperation(e.to_string()))
    }
}

impl TraitLayer for Linear {
    fn type_name(&self) -> &'static str {
        "Linear"
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>, ModelError> {
        expect_rank("Linear", input_shape, 2)?;
        if input_shape[1] != self.in_features() {
            return Err(ModelError::ShapeMismatch {
                expected: vec![input_shape[0], self.in_features()],
                got: input_shape.to_vec(),
                message: "Linear输入特征数不匹配".to_string(),
            });
        }
        Ok(vec![input_shape[0], self.out_features()])
    }

    fn forward(
        &self,
        input: &Tensor,
        _mode: Mode,
        _rng: &mut StdRng,
    ) -> Result<(Tensor, LayerCache), ModelError> {
        let x = self.input_view(input)?;
        let output = x.dot(&self.weight_view().t()) + &self.bias_view();
        Ok((
            Tensor::from_array(output.into_dyn()),
            LayerCache::Input(input.clone()),
        ))
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
        let expected = vec![input.shape()[0], self.out_features()];
        if grad_output.shape() != expected.as_slice() {
            return Err(ModelError::ShapeMismatch {
                expected,
                got: grad_output.shape().to_vec(),
                message: format!("{name}收到的输出梯度形状不对"),
            });
        }
        let g = grad_output
            .view()
            .into_dimensionality::<Ix2>()
            .map_err(|e| ModelError::InvalidOperation(e.to_string()))?;

        let grad_input = g.dot(&self.weight_view());
        let grad_weight = g.t().dot(&x);
        let grad_bias = g.sum_axis(Axis(0));

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
        vec![("weight", &self.weight), ("bias", &self.bias)]
    }

    fn parameters_mut(&mut self) -> Vec<(&'static str, &mut Tensor)> {
        vec![("weight", &mut self.weight), ("bias", &mut self.bias)]
    }
}
