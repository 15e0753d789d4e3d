/*
 * @Author       : 老董
 * @Date         : 2026-10-14
 * @Description  : Model 参数保存/加载测试
 */

use crate::nn::layer::{BatchNorm2d, Conv2d, Linear, ReLU};
use crate::nn::serialization::to_u32;
use crate::nn::{ForwardContext, Model, ModelError};
use crate::tensor::Tensor;
use rand::SeedableRng;
use rand::rngs::StdRng;

fn build(seed: u64, out_features: usize) -> Result<Model, ModelError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut model = Model::new("params");
    model.add_layer(None, "conv", Conv2d::new(1, 2, (2, 2), (1, 1), (0, 0), true, &mut rng))?;
    model.add_layer(None, "bn", BatchNorm2d::new(2))?;
    model.add_layer(None, "relu", ReLU)?;
    model.add_layer(None, "flatten", crate::nn::layer::Flatten)?;
    model.add_layer(None, "fc", Linear::new(8, out_features, &mut rng))?;
    Ok(model)
}

#[test]
fn test_save_then_load_restores_outputs() -> Result<(), ModelError> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.bin");
    let source = build(1, 3)?;
    source.save_params(&path)?;

    let mut target = build(2, 3)?;
    let x = Tensor::new(&[0.5, -1.0, 2.0, 0.3, 1.2, -0.7, 0.9, 0.1, -1.5], &[1, 1, 3, 3]);
    let before = target.forward(&x, &mut ForwardContext::eval())?;
    let loaded = target.load_params(&path)?;

    assert_eq!(loaded, 8);
    let expected = source.forward(&x, &mut ForwardContext::eval())?;
    let actual = target.forward(&x, &mut ForwardContext::eval())?;
    assert_eq!(actual, expected);
    assert_ne!(before, expected);
    Ok(())
}

#[test]
fn test_load_rejects_shape_mismatch_without_partial_write() -> Result<(), ModelError> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.bin");
    build(1, 3)?.save_params(&path)?;

    let mut target = build(2, 5)?;
    let conv_before = target.parameters()[0].1.clone();
    let result = target.load_params(&path);

    assert!(matches!(result, Err(ModelError::Params(_))));
    assert_eq!(target.parameters()[0].1, &conv_before);
    Ok(())
}

#[test]
fn test_load_ignores_unknown_parameters() -> Result<(), ModelError> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.bin");
    build(1, 3)?.save_params(&path)?;

    let mut rng = StdRng::seed_from_u64(3);
    let mut partial = Model::new("partial");
    partial.add_layer(None, "conv", Conv2d::new(1, 2, (2, 2), (1, 1), (0, 0), true, &mut rng))?;

    assert_eq!(partial.load_params(&path)?, 2);
    Ok(())
}

/// 合法文件头 + 一个名为`x`的参数，其后接上给定的维度与原始数据
fn write_raw_params(path: &std::path::Path, dims: &[u32], data: &[f32]) {
    let mut bytes = b"GSPR".to_vec();
    for v in [1u32, 1, 1] {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes.push(b'x');
    bytes.extend_from_slice(&(dims.len() as u32).to_le_bytes());
    for d in dims {
        bytes.extend_from_slice(&d.to_le_bytes());
    }
    for v in data {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    std::fs::write(path, bytes).unwrap();
}

#[test]
fn test_load_rejects_overflowing_shape() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("huge.bin");
    write_raw_params(&path, &[u32::MAX; 4], &[]);

    let mut model = build(1, 3).unwrap();
    assert!(matches!(model.load_params(&path), Err(ModelError::Params(_))));
}

#[test]
fn test_load_rejects_truncated_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("truncated.bin");
    // 声明 [1024, 1024] 个元素，实际只有一个
    write_raw_params(&path, &[1024, 1024], &[1.0]);

    let mut model = build(1, 3).unwrap();
    let before = model.parameters()[0].1.clone();
    assert!(matches!(model.load_params(&path), Err(ModelError::Params(_))));
    assert_eq!(model.parameters()[0].1, &before);
}

#[test]
fn test_load_rejects_oversized_name() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("name.bin");
    let mut bytes = b"GSPR".to_vec();
    for v in [1u32, 1, u32::MAX] {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes.extend_from_slice(b"conv");
    std::fs::write(&path, bytes).unwrap();

    let mut model = build(1, 3).unwrap();
    assert!(matches!(model.load_params(&path), Err(ModelError::Params(_))));
}

#[test]
fn test_counts_beyond_u32_are_rejected() {
    assert_eq!(to_u32(7, "形状").unwrap(), 7);
    assert_eq!(to_u32(u32::MAX as usize, "形状").unwrap(), u32::MAX);
    if let Some(too_big) = (u32::MAX as usize).checked_add(1) {
        assert!(matches!(to_u32(too_big, "形状"), Err(ModelError::Params(_))));
    }
}

#[test]
fn test_load_rejects_foreign_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garbage.bin");
    std::fs::write(&path, b"NOPE0000").unwrap();

    let mut model = build(1, 3).unwrap();
    assert!(matches!(model.load_params(&path), Err(ModelError::Params(_))));
    assert!(matches!(
        model.load_params(dir.path().join("missing.bin")),
        Err(ModelError::Params(_))
    ));
}
