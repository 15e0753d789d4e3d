use super::{TraitLayer, cache_mismatch};
use crate::nn::context::LayerCache;
use crate::nn::{GradAccumulator, Mode, ModelError};
use crate::tensor::Tensor;
use rand::Rng;
use rand::rngs::StdRng;

/// Dropout 层（inverted dropout）
///
/// - 训练模式：以概率`p`将元素置0，其余元素乘以`1 / (1 - p)`
/// - 推理模式：恒等映射
#[derive(Debug, Clone)]
pub struct Dropout {
    p: f32,
}

impl Dropout {
    pub fn new(p: f32) -> Result<Self, ModelError> {
        if !(0.0..1.0).contains(&p) {
            return Err(ModelError::InvalidOperation(format!(
                "Dropout的丢弃概率须在[0, 1)之间，但得到: {p}"
            )));
        }
        Ok(Self { p })
    }

    pub const fn p(&self) -> f32 {
        self.p
    }
}

impl TraitLayer for Dropout {
    fn type_name(&self) -> &'static str {
        "Dropout"
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>, ModelError> {
        Ok(input_shape.to_vec())
    }

    fn forward(
        &self,
        input: &Tensor,
        mode: Mode,
        rng: &mut StdRng,
    ) -> Result<(Tensor, LayerCache), ModelError> {
        match mode {
            Mode::Eval => Ok((input.clone(), LayerCache::Identity)),
            Mode::Train => {
                let keep_scale = 1.0 / (1.0 - self.p);
                let mask_data: Vec<f32> = (0..input.size())
                    .map(|_| {
                        if rng.r#gen::<f32>() < self.p {
                            0.0
                        } else {
                            keep_scale
                        }
                    })
                    .collect();
                let mask = Tensor::new(&mask_data, input.shape());
                Ok((input * &mask, LayerCache::Mask(mask)))
            }
        }
    }

    fn backward(
        &self,
        name: &str,
        grad_output: &Tensor,
        cache: &LayerCache,
        _grads: &mut GradAccumulator,
    ) -> Result<Tensor, ModelError> {
        match cache {
            LayerCache::Identity => Ok(grad_output.clone()),
            LayerCache::Mask(mask) if mask.is_same_shape(grad_output) => Ok(grad_output * mask),
            LayerCache::Mask(mask) => Err(ModelError::ShapeMismatch {
                expected: mask.shape().to_vec(),
                got: grad_output.shape().to_vec(),
                message: format!("{name}收到的输出梯度形状不对"),
            }),
            _ => Err(cache_mismatch(name)),
        }
    }
}
