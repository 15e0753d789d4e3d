/*
 * @Author       : 老董
 * @Date         : 2026-10-14
 * @Description  : 参考残差网络构建测试
 */

use crate::nn::resnet::{ResNetConfig, StageConfig, build_resnet};
use crate::nn::{ForwardContext, Instrumenter, LayerNode, ModelError};
use crate::tensor::Tensor;

/// 缩小版配置：单个阶段、小输入，便于在测试中跑完整前向/反向
fn tiny_config() -> ResNetConfig {
    ResNetConfig {
        stem_channels: 4,
        stages: vec![
            StageConfig {
                channels: 4,
                blocks: 1,
                stride: 1,
            },
            StageConfig {
                channels: 6,
                blocks: 1,
                stride: 2,
            },
        ],
        head_channels: 8,
        head_kernel: 2,
        ..ResNetConfig::default()
    }
}

#[test]
fn test_default_resnet_shapes() -> Result<(), ModelError> {
    let model = build_resnet(&ResNetConfig::default(), (64, 64))?;

    assert_eq!(model.output_shape(&[1, 3, 64, 64])?, vec![1, 5]);
    assert_eq!(model.output_dim(), Some(5));
    let fc = model.find("fc").unwrap();
    assert!(model.node(fc)?.is_readout());
    assert_eq!(model.first_layer(), model.find("conv1"));
    Ok(())
}

#[test]
fn test_resnet_blocks_and_shortcuts() -> Result<(), ModelError> {
    let model = build_resnet(&ResNetConfig::default(), (64, 64))?;

    // layer1 不改变通道数与尺寸：恒等捷径；layer2 起第一个块需要下采样
    assert!(model.find("layer1.0.downsample").is_none());
    assert!(model.find("layer2.0.downsample.conv").is_some());
    assert!(model.find("layer2.1.downsample").is_none());
    assert_eq!(model.children(model.find("layer1").unwrap())?.len(), 3);

    // 每个基本块2个 ReLU，外加 relu1 与 head_relu
    assert_eq!(model.rectifying_layers().len(), 2 * (3 + 2 + 2 + 2) + 2);
    Ok(())
}

#[test]
fn test_resnet_is_reproducible_from_seed() -> Result<(), ModelError> {
    let a = build_resnet(&tiny_config(), (12, 12))?;
    let b = build_resnet(&tiny_config(), (12, 12))?;
    let c = build_resnet(
        &ResNetConfig {
            seed: 7,
            ..tiny_config()
        },
        (12, 12),
    )?;

    let params = |m: &crate::nn::Model| -> Vec<Tensor> {
        m.parameters().into_iter().map(|(_, t)| t.clone()).collect()
    };
    assert_eq!(params(&a), params(&b));
    assert_ne!(params(&a), params(&c));
    Ok(())
}

#[test]
fn test_tiny_resnet_guided_backward_runs() -> Result<(), ModelError> {
    let model = build_resnet(&tiny_config(), (12, 12))?;
    let x = Tensor::ones(&[1, 3, 12, 12]);

    let output = model.forward(&x, &mut ForwardContext::eval())?;
    assert_eq!(output.shape(), &[1, 5]);

    let mut instrumenter = Instrumenter::new(&model).eval();
    let clipped = instrumenter.attach_guided_relu_clipping(LayerNode::is_readout)?;
    instrumenter.attach_first_layer_capture()?;
    let instrumented = instrumenter.build();
    let (_, cache) = instrumented.forward(&x)?;
    let result = instrumented.backward(
        &Tensor::one_hot(&[1, 5], &[0, 3]),
        &cache,
        &mut crate::nn::GradAccumulator::new(),
    )?;

    assert_eq!(clipped, 2 * 2 + 2);
    assert_eq!(result.captured.unwrap().shape(), &[1, 3, 12, 12]);
    Ok(())
}

#[test]
fn test_resnet_config_deserializes_with_defaults() {
    let config: ResNetConfig = serde_json::from_str(r#"{"num_classes": 10}"#).unwrap();
    assert_eq!(config.num_classes, 10);
    assert_eq!(config.stages, ResNetConfig::default().stages);
}
