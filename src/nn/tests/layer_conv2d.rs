/*
 * @Author       : 老董
 * @Date         : 2026-10-14
 * @Description  : Conv2d 层单元测试
 */

use super::assert_layer_input_grad;
use crate::nn::layer::{Conv2d, Layer, TraitLayer};
use crate::nn::{GradAccumulator, Mode, ModelError};
use crate::tensor::Tensor;
use approx::assert_abs_diff_eq;
use rand::SeedableRng;
use rand::rngs::StdRng;

const X_3X3: &[f32] = &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];

fn ones_kernel_conv() -> Conv2d {
    Conv2d::from_parts(
        Tensor::ones(&[1, 1, 2, 2]),
        Some(Tensor::new(&[0.5], &[1])),
        (1, 1),
        (0, 0),
    )
    .unwrap()
}

#[test]
fn test_conv2d_forward_hand_computed() -> Result<(), ModelError> {
    let conv = ones_kernel_conv();
    let x = Tensor::new(X_3X3, &[1, 1, 3, 3]);
    let mut rng = StdRng::seed_from_u64(0);

    let (output, _) = conv.forward(&x, Mode::Eval, &mut rng)?;

    assert_eq!(output.shape(), &[1, 1, 2, 2]);
    assert_eq!(output.to_vec(), vec![12.5, 16.5, 24.5, 28.5]);
    Ok(())
}

#[test]
fn test_conv2d_backward_hand_computed() -> Result<(), ModelError> {
    let conv = ones_kernel_conv();
    let x = Tensor::new(X_3X3, &[1, 1, 3, 3]);
    let mut rng = StdRng::seed_from_u64(0);
    let (output, cache) = conv.forward(&x, Mode::Eval, &mut rng)?;
    let mut grads = GradAccumulator::new();

    let grad_input = conv.backward("conv", &Tensor::ones(output.shape()), &cache, &mut grads)?;

    // 每个输入像素被多少个窗口覆盖
    assert_eq!(
        grad_input.to_vec(),
        vec![1.0, 2.0, 1.0, 2.0, 4.0, 2.0, 1.0, 2.0, 1.0]
    );
    assert_eq!(
        grads.get("conv.weight").unwrap().to_vec(),
        vec![12.0, 16.0, 24.0, 28.0]
    );
    assert_eq!(grads.get("conv.bias").unwrap().to_vec(), vec![4.0]);
    Ok(())
}

#[test]
fn test_conv2d_without_bias_records_only_weight_grad() -> Result<(), ModelError> {
    let mut rng = StdRng::seed_from_u64(3);
    let conv = Conv2d::new(2, 3, (3, 3), (1, 1), (1, 1), false, &mut rng);
    let x = Tensor::normal_with_rng(0.0, 1.0, &[1, 2, 4, 4], &mut rng);
    let (output, cache) = conv.forward(&x, Mode::Eval, &mut rng)?;
    let mut grads = GradAccumulator::new();

    conv.backward("conv", &Tensor::ones(output.shape()), &cache, &mut grads)?;

    assert_eq!(grads.len(), 1);
    assert!(grads.get("conv.bias").is_none());
    assert_eq!(grads.get("conv.weight").unwrap().shape(), &[3, 2, 3, 3]);
    Ok(())
}

#[test]
fn test_conv2d_output_shape_with_stride_and_padding() -> Result<(), ModelError> {
    let mut rng = StdRng::seed_from_u64(0);
    let conv = Conv2d::new(3, 8, (3, 3), (2, 2), (1, 1), false, &mut rng);

    assert_eq!(conv.output_shape(&[1, 3, 5, 5])?, vec![1, 8, 3, 3]);
    assert_eq!(conv.output_shape(&[2, 3, 31, 31])?, vec![2, 8, 16, 16]);
    Ok(())
}

#[test]
fn test_conv2d_rejects_wrong_channel_count() {
    let mut rng = StdRng::seed_from_u64(0);
    let conv = Conv2d::new(3, 8, (3, 3), (1, 1), (1, 1), false, &mut rng);
    let x = Tensor::zeros(&[1, 2, 5, 5]);

    let result = conv.forward(&x, Mode::Eval, &mut rng);

    assert!(matches!(result, Err(ModelError::ShapeMismatch { .. })));
}

#[test]
fn test_conv2d_from_parts_validates_bias_length() {
    let result = Conv2d::from_parts(
        Tensor::ones(&[2, 1, 2, 2]),
        Some(Tensor::ones(&[3])),
        (1, 1),
        (0, 0),
    );
    assert!(matches!(result, Err(ModelError::ShapeMismatch { .. })));
}

#[test]
fn test_conv2d_input_grad_matches_finite_difference() {
    let mut rng = StdRng::seed_from_u64(5);
    let layer = Layer::from(Conv2d::new(2, 3, (3, 3), (2, 2), (1, 1), true, &mut rng));
    let x = Tensor::normal_with_rng(0.0, 1.0, &[1, 2, 5, 5], &mut rng);

    assert_layer_input_grad(&layer, &x);
}

#[test]
fn test_conv2d_batch_forward_matches_per_sample() -> Result<(), ModelError> {
    let mut rng = StdRng::seed_from_u64(9);
    let conv = Conv2d::new(1, 2, (2, 2), (1, 1), (0, 0), true, &mut rng);
    let x = Tensor::normal_with_rng(0.0, 1.0, &[2, 1, 3, 3], &mut rng);
    let data = x.to_vec();

    let (batched, _) = conv.forward(&x, Mode::Eval, &mut rng)?;
    let (first, _) = conv.forward(&Tensor::new(&data[..9], &[1, 1, 3, 3]), Mode::Eval, &mut rng)?;
    let (second, _) = conv.forward(&Tensor::new(&data[9..], &[1, 1, 3, 3]), Mode::Eval, &mut rng)?;

    let expected: Vec<f32> = first.to_vec().into_iter().chain(second.to_vec()).collect();
    for (actual, expected) in batched.to_vec().iter().zip(expected.iter()) {
        assert_abs_diff_eq!(actual, expected, epsilon = 1e-6);
    }
    Ok(())
}
