use super::{TraitLayer, cache_mismatch};
use crate::nn::context::LayerCache;
use crate::nn::{GradAccumulator, Mode, ModelError};
use crate::tensor::Tensor;
use rand::rngs::StdRng;

/// ReLU 激活层（整流激活）
///
/// forward: f(x) = max(0, x)
/// backward: d(f)/dx = 1 if x > 0, else 0
#[derive(Debug, Clone, Default)]
pub struct ReLU;

impl ReLU {
    pub fn new() -> Self {
        Self
    }
}

impl TraitLayer for ReLU {
    fn type_name(&self) -> &'static str {
        "ReLU"
    }

    fn is_rectifying_activation(&self) -> bool {
        true
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>, ModelError> {
        Ok(input_shape.to_vec())
    }

    fn forward(
        &self,
        input: &Tensor,
        _mode: Mode,
        _rng: &mut StdRng,
    ) -> Result<(Tensor, LayerCache), ModelError> {
        Ok((input.clamp_min(0.0), LayerCache::Input(input.clone())))
    }

    fn backward(
        &self,
        name: &str,
        grad_output: &Tensor,
        cache: &LayerCache,
        _grads: &mut GradAccumulator,
    ) -> Result<Tensor, ModelError> {
        let LayerCache::Input(input) = cache else {
            return Err(cache_mismatch(name));
        };
        if !grad_output.is_same_shape(input) {
            return Err(ModelError::ShapeMismatch {
                expected: input.shape().to_vec(),
                got: grad_output.shape().to_vec(),
                message: format!("{name}收到的输出梯度形状不对"),
            });
        }
        // 前向时被截断为0的位置，梯度也为0
        Ok(grad_output.masked_by(input, |x| x > 0.0))
    }
}
