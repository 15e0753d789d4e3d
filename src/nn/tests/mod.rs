mod layer_conv2d;
mod resnet;
mod save_load;

use crate::nn::layer::{Layer, TraitLayer};
use crate::nn::{ForwardContext, GradAccumulator, Mode, Model};
use crate::tensor::Tensor;
use approx::assert_abs_diff_eq;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// 以`sum(output ⊙ direction)`作为损失，用中心差分检查叶子层关于输入的梯度
fn assert_layer_input_grad(layer: &Layer, input: &Tensor) {
    let mut rng = StdRng::seed_from_u64(7);
    let (output, cache) = layer.forward(input, Mode::Eval, &mut rng).unwrap();
    let direction = Tensor::normal_with_rng(0.0, 1.0, output.shape(), &mut rng);
    let mut grads = GradAccumulator::new();
    let analytic = layer.backward("direction", &direction, &cache, &mut grads).unwrap();

    let mut loss = |data: &[f32]| {
        let (out, _) = layer
            .forward(&Tensor::new(data, input.shape()), Mode::Eval, &mut rng)
            .unwrap();
        (&out * &direction).sum()
    };
    assert_numeric_grad(&analytic, &input.to_vec(), &mut loss);
}

/// 同上，但针对整个模型（推理模式）
fn assert_model_input_grad(model: &Model, input: &Tensor) {
    let mut ctx = ForwardContext::eval();
    let output = model.forward(input, &mut ctx).unwrap();
    let mut rng = StdRng::seed_from_u64(11);
    let direction = Tensor::normal_with_rng(0.0, 1.0, output.shape(), &mut rng);
    let mut grads = GradAccumulator::new();
    let analytic = model.backward(&direction, ctx.cache(), &mut grads).unwrap();

    let mut loss = |data: &[f32]| {
        let out = model
            .forward(&Tensor::new(data, input.shape()), &mut ForwardContext::eval())
            .unwrap();
        (&out * &direction).sum()
    };
    assert_numeric_grad(&analytic, &input.to_vec(), &mut loss);
}

fn assert_numeric_grad<F: FnMut(&[f32]) -> f32>(analytic: &Tensor, data: &[f32], loss: &mut F) {
    let eps = 1e-2;
    let analytic = analytic.to_vec();
    assert_eq!(analytic.len(), data.len());
    for i in 0..data.len() {
        let mut plus = data.to_vec();
        plus[i] += eps;
        let mut minus = data.to_vec();
        minus[i] -= eps;
        let numeric = (loss(&plus) - loss(&minus)) / (2.0 * eps);
        assert_abs_diff_eq!(analytic[i], numeric, epsilon = 2e-2);
    }
}
