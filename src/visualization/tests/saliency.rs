/*
 * @Author       : 老董
 * @Date         : 2026-10-14
 * @Description  : 显著图后处理测试
 */

use super::mixed_gradient;
use crate::errors::SaliencyError;
use crate::tensor::Tensor;
use crate::visualization::{
    ExportFormat, convert_to_grayscale, get_positive_negative_saliency, save_gradient_image,
    to_gradient_image,
};
use approx::assert_abs_diff_eq;
use image::GenericImageView;

// ==================== 灰度图 ====================

#[test]
fn test_grayscale_shape_and_range() -> Result<(), SaliencyError> {
    let gray = convert_to_grayscale(&mixed_gradient())?;

    assert_eq!(gray.shape(), &[1, 4, 4]);
    assert_eq!(gray.max_value(), Some(1.0));
    assert_eq!(gray.min_value(), Some(0.0));
    assert!(gray.to_vec().iter().all(|v| (0.0..=1.0).contains(v)));
    Ok(())
}

#[test]
fn test_grayscale_is_scale_invariant() -> Result<(), SaliencyError> {
    let gradient = mixed_gradient();
    let base = convert_to_grayscale(&gradient)?;

    for factor in [2.0, 4.0] {
        let scaled = convert_to_grayscale(&(&gradient * factor))?;
        for (a, b) in base.to_vec().iter().zip(scaled.to_vec()) {
            assert_abs_diff_eq!(*a, b, epsilon = 1e-6);
        }
    }
    Ok(())
}

#[test]
fn test_grayscale_ignores_sign() -> Result<(), SaliencyError> {
    let gradient = mixed_gradient();
    assert_eq!(
        convert_to_grayscale(&gradient)?,
        convert_to_grayscale(&-&gradient)?
    );
    Ok(())
}

#[test]
fn test_grayscale_clips_outliers() -> Result<(), SaliencyError> {
    // 200个元素，单个离群值远大于其余元素
    let mut data: Vec<f32> = (0..200).map(|i| i as f32 / 200.0).collect();
    data[100] = 1000.0;
    let gray = convert_to_grayscale(&Tensor::new(&data, &[10, 20]))?;

    assert_eq!(gray.shape(), &[1, 10, 20]);
    assert_eq!(gray[[0, 5, 0]], 1.0);
    // 离群值被截断，普通元素不会被压扁到0附近
    assert!(gray[[0, 9, 18]] > 0.9);
    assert_eq!(gray[[0, 0, 0]], 0.0);
    Ok(())
}

#[test]
fn test_grayscale_of_constant_gradient_is_zero() -> Result<(), SaliencyError> {
    let gray = convert_to_grayscale(&Tensor::ones(&[3, 2, 2]))?;
    assert_eq!(gray, Tensor::zeros(&[1, 2, 2]));

    let gray = convert_to_grayscale(&Tensor::zeros(&[1, 3, 3]))?;
    assert_eq!(gray, Tensor::zeros(&[1, 3, 3]));
    Ok(())
}

#[test]
fn test_grayscale_errors() {
    assert!(matches!(
        convert_to_grayscale(&Tensor::zeros(&[3, 0, 4])),
        Err(SaliencyError::EmptyInput)
    ));
    assert!(matches!(
        convert_to_grayscale(&Tensor::ones(&[1, 3, 2, 2])),
        Err(SaliencyError::UnsupportedImageShape(shape)) if shape == vec![1, 3, 2, 2]
    ));
}

// ==================== 正/负显著图 ====================

#[test]
fn test_positive_negative_saliency_peaks() {
    let gradient = mixed_gradient();
    let (positive, negative) = get_positive_negative_saliency(&gradient);

    assert_eq!(positive.shape(), &[3, 4, 4]);
    assert_eq!(negative.shape(), &[3, 4, 4]);
    assert_eq!(gradient.argmax_flat(), Some(41));
    assert_eq!(gradient.argmin_flat(), Some(0));

    assert_eq!(positive.max_value(), Some(1.0));
    assert_eq!(positive.argmax_flat(), gradient.argmax_flat());
    assert_eq!(negative.max_value(), Some(1.0));
    assert_eq!(negative.argmax_flat(), gradient.argmin_flat());
    for (p, n) in positive.to_vec().iter().zip(negative.to_vec()) {
        assert!(*p >= 0.0 && n >= 0.0);
        // 同一位置不可能同时为正与为负
        assert!(*p == 0.0 || n == 0.0);
    }
}

#[test]
fn test_positive_negative_saliency_values() {
    let gradient = Tensor::new(&[2.0, -1.0, 4.0, -4.0], &[1, 2, 2]);
    let (positive, negative) = get_positive_negative_saliency(&gradient);

    assert_eq!(positive.to_vec(), vec![0.5, 0.0, 1.0, 0.0]);
    assert_eq!(negative.to_vec(), vec![0.0, 0.25, 0.0, 1.0]);
}

#[test]
fn test_single_signed_gradient_gives_zero_branch() {
    let all_negative = Tensor::new(&[-1.0, -2.0, -3.0, -4.0], &[1, 2, 2]);
    let (positive, negative) = get_positive_negative_saliency(&all_negative);
    assert_eq!(positive, Tensor::zeros(&[1, 2, 2]));
    assert_eq!(negative.to_vec(), vec![0.25, 0.5, 0.75, 1.0]);

    let (positive, negative) = get_positive_negative_saliency(&Tensor::zeros(&[3, 2, 2]));
    assert_eq!(positive, Tensor::zeros(&[3, 2, 2]));
    assert_eq!(negative, Tensor::zeros(&[3, 2, 2]));
}

// ==================== 转图像与保存 ====================

#[test]
fn test_rgb_image_scales_each_channel() -> Result<(), SaliencyError> {
    let gradient = Tensor::new(
        &[
            0.0, 1.0, 2.0, 3.0, // R
            -1.0, -1.0, -1.0, -1.0, // G：常数通道
            10.0, 0.0, 5.0, 0.0, // B
        ],
        &[3, 2, 2],
    );
    let image = to_gradient_image(&gradient)?;

    let rgb = image.as_rgb8().unwrap();
    assert_eq!(rgb.dimensions(), (2, 2));
    assert_eq!(rgb.get_pixel(0, 0).0, [0, 0, 255]);
    assert_eq!(rgb.get_pixel(1, 0).0, [85, 0, 0]);
    assert_eq!(rgb.get_pixel(0, 1).0, [170, 0, 128]);
    assert_eq!(rgb.get_pixel(1, 1).0, [255, 0, 0]);
    Ok(())
}

#[test]
fn test_gray_image_from_2d_and_single_channel() -> Result<(), SaliencyError> {
    let flat = Tensor::new(&[0.0, 0.5, 1.0, 1.0, 0.5, 0.0], &[2, 3]);
    let image = to_gradient_image(&flat)?;
    let luma = image.as_luma8().unwrap();
    assert_eq!(luma.dimensions(), (3, 2));
    assert_eq!(luma.get_pixel(2, 0).0, [255]);
    assert_eq!(luma.get_pixel(1, 1).0, [128]);

    let single = to_gradient_image(&flat.reshape(&[1, 2, 3]))?;
    assert_eq!(single.as_luma8().unwrap(), luma);
    Ok(())
}

#[test]
fn test_unsupported_image_shapes() {
    for shape in [vec![2, 2, 2], vec![1, 1, 2, 2], vec![4]] {
        let size = shape.iter().product::<usize>();
        let tensor = Tensor::new(&vec![0.0; size], &shape);
        assert!(matches!(
            to_gradient_image(&tensor),
            Err(SaliencyError::UnsupportedImageShape(got)) if got == shape
        ));
    }
}

#[test]
fn test_save_gradient_image_creates_directory() -> Result<(), SaliencyError> {
    let dir = tempfile::tempdir()?;
    let nested = dir.path().join("results").join("nested");

    let path = save_gradient_image(&mixed_gradient(), &nested, "snake", ExportFormat::Png)?;

    assert_eq!(path, nested.join("snake.png"));
    let reopened = image::open(&path)?;
    assert_eq!(reopened.dimensions(), (4, 4));
    Ok(())
}
