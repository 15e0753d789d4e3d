use super::{TraitLayer, cache_mismatch};
use crate::nn::context::LayerCache;
use crate::nn::{GradAccumulator, Mode, ModelError};
use crate::tensor::Tensor;
use rand::rngs::StdRng;

/// 展平层：[batch, d1, d2, ...] -> [batch, d1*d2*...]
#[derive(Debug, Clone, Default)]
pub struct Flatten;

impl Flatten {
    pub fn new() -> Self {
        Self
    }
}

impl TraitLayer for Flatten {
    fn type_name(&self) -> &'static str {
        "Flatten"
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>, ModelError> {
        match input_shape.split_first() {
            Some((&batch, rest)) => Ok(vec![batch, rest.iter().product()]),
            None => Err(ModelError::InvalidOperation(
                "Flatten的输入至少需要1个维度".to_string(),
            )),
        }
    }

    fn forward(
        &self,
        input: &Tensor,
        _mode: Mode,
        _rng: &mut StdRng,
    ) -> Result<(Tensor, LayerCache), ModelError> {
        let shape = self.output_shape(input.shape())?;
        Ok((
            input.reshape(&shape),
            LayerCache::Shape(input.shape().to_vec()),
        ))
    }

    fn backward(
        &self,
        name: &str,
        grad_output: &Tensor,
        cache: &LayerCache,
        _grads: &mut GradAccumulator,
    ) -> Result<Tensor, ModelError> {
        let LayerCache::Shape(shape) = cache else {
            return Err(cache_mismatch(name));
        };
        if grad_output.size() != shape.iter().product::<usize>() {
            return Err(ModelError::ShapeMismatch {
                expected: self.output_shape(shape)?,
                got: grad_output.shape().to_vec(),
                message: format!("{name}收到的输出梯度形状不对"),
            });
        }
        Ok(grad_output.reshape(shape))
    }
}
