/*
 * @Author       : 老董
 * @Date         : 2026-10-14
 * @Description  : 参考分类网络（稠密版残差网络）的构建
 *
 * 结构（顶层序列）：
 * conv1 -> bn1 -> relu1 -> maxpool -> layer1..layerN -> head_conv -> head_bn -> head_relu
 *       -> flatten -> [dropout] -> fc
 *
 * 每个残差阶段`layerK`由若干基本块`layerK.i`组成，基本块为：
 *   Residual(body: conv3x3 -> bn -> relu -> conv3x3 -> bn, shortcut: [conv1x1 -> bn]) -> relu
 * 只有步长不为1或通道数变化时才加捷径分支，否则为恒等映射。
 * 最后的`fc`被标记为读出层。
 */

use super::layer::{BatchNorm2d, Conv2d, Dropout, Flatten, Linear, MaxPool2d, ReLU};
use super::{LayerId, Model, ModelError};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// 一个残差阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    pub channels: usize,
    pub blocks: usize,
    /// 该阶段第一个基本块的步长
    pub stride: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResNetConfig {
    pub in_channels: usize,
    pub num_classes: usize,
    pub stem_channels: usize,
    pub stem_kernel: usize,
    pub pool_size: usize,
    pub pool_stride: usize,
    pub stages: Vec<StageConfig>,
    pub head_channels: usize,
    pub head_kernel: usize,
    /// 读出层前的 Dropout 概率，`None` 表示不加
    pub dropout: Option<f32>,
    /// 参数初始化的随机种子
    pub seed: u64,
}

impl Default for ResNetConfig {
    fn default() -> Self {
        let stage = |channels, blocks, stride| StageConfig {
            channels,
            blocks,
            stride,
        };
        Self {
            in_channels: 3,
            num_classes: 5,
            stem_channels: 8,
            stem_kernel: 2,
            pool_size: 4,
            pool_stride: 2,
            stages: vec![stage(8, 3, 1), stage(16, 2, 2), stage(24, 2, 2), stage(32, 2, 2)],
            head_channels: 64,
            head_kernel: 4,
            dropout: None,
            seed: 42,
        }
    }
}

/// 按配置构建参考分类网络；`input_size`为输入图像的(H, W)，用于推断读出层的输入特征数
pub fn build_resnet(
    config: &ResNetConfig,
    input_size: (usize, usize),
) -> Result<Model, ModelError> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut model = Model::new("resnet");
    let k = config.stem_kernel;

    // 1.主干前端
    model.add_layer(
        None,
        "conv1",
        Conv2d::new(
            config.in_channels,
            config.stem_channels,
            (k, k),
            (1, 1),
            (0, 0),
            false,
            &mut rng,
        ),
    )?;
    model.add_layer(None, "bn1", BatchNorm2d::new(config.stem_channels))?;
    model.add_layer(None, "relu1", ReLU)?;
    model.add_layer(
        None,
        "maxpool",
        MaxPool2d::new(
            (config.pool_size, config.pool_size),
            Some((config.pool_stride, config.pool_stride)),
        ),
    )?;

    // 2.残差阶段
    let mut channels = config.stem_channels;
    for (s, stage) in config.stages.iter().enumerate() {
        let stage_name = format!("layer{}", s + 1);
        let stage_id = model.add_sequential(None, &stage_name)?;
        for b in 0..stage.blocks {
            let stride = if b == 0 { stage.stride } else { 1 };
            add_basic_block(
                &mut model,
                stage_id,
                &format!("{stage_name}.{b}"),
                (channels, stage.channels),
                stride,
                &mut rng,
            )?;
            channels = stage.channels;
        }
    }

    // 3.输出头
    let hk = config.head_kernel;
    model.add_layer(
        None,
        "head_conv",
        Conv2d::new(channels, config.head_channels, (hk, hk), (1, 1), (0, 0), false, &mut rng),
    )?;
    model.add_layer(None, "head_bn", BatchNorm2d::new(config.head_channels))?;
    model.add_layer(None, "head_relu", ReLU)?;
    model.add_layer(None, "flatten", Flatten)?;
    if let Some(p) = config.dropout {
        model.add_layer(None, "dropout", Dropout::new(p)?)?;
    }

    let (h, w) = input_size;
    let features = model.output_shape(&[1, config.in_channels, h, w])?;
    let fc = model.add_layer(None, "fc", Linear::new(features[1], config.num_classes, &mut rng))?;
    model.mark_readout(fc)?;
    Ok(model)
}

fn add_basic_block(
    model: &mut Model,
    parent: LayerId,
    name: &str,
    (in_c, out_c): (usize, usize),
    stride: usize,
    rng: &mut StdRng,
) -> Result<(), ModelError> {
    let block = model.add_sequential(Some(parent), name)?;
    let (residual, body) = model.add_residual(Some(block), &format!("{name}.residual"))?;

    let conv3x3 = |in_c, stride, rng: &mut StdRng| {
        Conv2d::new(in_c, out_c, (3, 3), (stride, stride), (1, 1), false, rng)
    };
    model.add_layer(Some(body), &format!("{name}.conv1"), conv3x3(in_c, stride, rng))?;
    model.add_layer(Some(body), &format!("{name}.bn1"), BatchNorm2d::new(out_c))?;
    model.add_layer(Some(body), &format!("{name}.relu1"), ReLU)?;
    model.add_layer(Some(body), &format!("{name}.conv2"), conv3x3(out_c, 1, rng))?;
    model.add_layer(Some(body), &format!("{name}.bn2"), BatchNorm2d::new(out_c))?;

    if stride != 1 || in_c != out_c {
        let shortcut = model.add_shortcut(residual, &format!("{name}.downsample"))?;
        model.add_layer(
            Some(shortcut),
            &format!("{name}.downsample.conv"),
            Conv2d::new(in_c, out_c, (1, 1), (stride, stride), (0, 0), false, rng),
        )?;
        model.add_layer(
            Some(shortcut),
            &format!("{name}.downsample.bn"),
            BatchNorm2d::new(out_c),
        )?;
    }

    model.add_layer(Some(block), &format!("{name}.relu"), ReLU)?;
    Ok(())
}
