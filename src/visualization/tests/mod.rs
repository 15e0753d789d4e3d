mod saliency;

use crate::nn::layer::{Flatten, Linear, ReLU};
use crate::nn::{Model, ModelError};
use crate::tensor::Tensor;

/// flatten -> fc1 -> relu -> fc2（读出层），权重固定，便于手算导向梯度：
/// 输入`[1, 1, 2, 2]`展平后`fc1`只取前两个分量
fn hand_model() -> Result<Model, ModelError> {
    let mut model = Model::new("hand");
    model.add_layer(None, "flatten", Flatten)?;
    model.add_layer(
        None,
        "fc1",
        Linear::from_parts(
            Tensor::new(&[1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0], &[2, 4]),
            Tensor::zeros(&[2]),
        )?,
    )?;
    model.add_layer(None, "relu", ReLU)?;
    let fc2 = model.add_layer(
        None,
        "fc2",
        Linear::from_parts(
            Tensor::new(&[1.0, -1.0, 2.0, 3.0], &[2, 2]),
            Tensor::zeros(&[2]),
        )?,
    )?;
    model.mark_readout(fc2)?;
    Ok(model)
}

fn hand_input() -> Tensor {
    Tensor::new(&[1.0, 2.0, 3.0, 4.0], &[1, 1, 2, 2])
}

/// `[3, 4, 4]`，取值在[-2, 5]之间，最小值在展平索引0处，最大值在展平索引41处
fn mixed_gradient() -> Tensor {
    let data: Vec<f32> = (0..48)
        .map(|p| -2.0 + 7.0 * ((p * 7) % 48) as f32 / 47.0)
        .collect();
    Tensor::new(&data, &[3, 4, 4])
}
