/*
 * @Author       : 老董
 * @Date         : 2026-10-14
 * @Description  : 显著图后处理：把输入空间的梯度张量变成可以直接查看的图像
 *
 * 梯度统一采用`[C, H, W]`布局（`[H, W]`视为单通道）。
 */

use super::ExportFormat;
use crate::errors::SaliencyError;
use crate::tensor::Tensor;
use image::{DynamicImage, GrayImage, RgbImage};
use num_traits::ToPrimitive;
use std::fs;
use std::path::{Path, PathBuf};

/// 灰度分位数截断的下/上界（百分位）
const CLIP_LOW_PERCENTILE: f32 = 1.0;
const CLIP_HIGH_PERCENTILE: f32 = 99.0;

/// `[H, W]`补成`[1, H, W]`；其余维数不变
fn as_chw(gradient: &Tensor) -> Tensor {
    match gradient.shape() {
        [h, w] => gradient.reshape(&[1, *h, *w]),
        _ => gradient.clone(),
    }
}

/// 各通道取绝对值后求和，得到`[1, H, W]`；
/// 截断到自身第1至第99百分位之间后线性缩放到[0, 1]（截断区间退化为一个点时输出全0）
pub fn convert_to_grayscale(gradient: &Tensor) -> Result<Tensor, SaliencyError> {
    if gradient.is_empty() {
        return Err(SaliencyError::EmptyInput);
    }
    let gradient = as_chw(gradient);
    if gradient.dimension() != 3 {
        return Err(SaliencyError::UnsupportedImageShape(gradient.shape().to_vec()));
    }

    let summed = gradient.abs().sum_axis_keep(0);
    let low = summed
        .percentile(CLIP_LOW_PERCENTILE)
        .ok_or(SaliencyError::EmptyInput)?;
    let high = summed
        .percentile(CLIP_HIGH_PERCENTILE)
        .ok_or(SaliencyError::EmptyInput)?;

    let range = high - low;
    if range.is_nan() || range <= 0.0 {
        return Ok(Tensor::zeros_like(&summed));
    }
    Ok(summed.clip(low, high).map(|v| (v - low) / range))
}

/// 正/负显著图：`positive = max(0, g) / max(g)`，`negative = max(0, -g) / max(-g)`。
/// 某一支的最大值不为正（即没有该符号的分量）时，该支输出全0
pub fn get_positive_negative_saliency(gradient: &Tensor) -> (Tensor, Tensor) {
    let branch = |g: Tensor| {
        let positive = g.clamp_min(0.0);
        match g.max_value() {
            Some(max) if max > 0.0 => &positive / max,
            _ => Tensor::zeros_like(&g),
        }
    };
    (branch(gradient.clone()), branch(-gradient))
}

/// 把单个通道线性缩放到[0, 255]（常数通道为0）
fn channel_to_u8(channel: &[f32]) -> Vec<u8> {
    let min = channel.iter().copied().fold(f32::INFINITY, f32::min);
    let max = channel.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    channel
        .iter()
        .map(|&v| {
            if range > 0.0 {
                ((v - min) / range * 255.0).round().to_u8().unwrap_or(0)
            } else {
                0
            }
        })
        .collect()
}

/// 梯度张量转为图像：每个通道独立缩放到[0, 255]；
/// `[H, W]`/`[1, H, W]`为灰度图，`[3, H, W]`为RGB图
pub fn to_gradient_image(gradient: &Tensor) -> Result<DynamicImage, SaliencyError> {
    let chw = as_chw(gradient);
    let (c, h, w) = match chw.shape() {
        &[c, h, w] if (c == 1 || c == 3) && h > 0 && w > 0 => (c, h, w),
        _ => return Err(SaliencyError::UnsupportedImageShape(gradient.shape().to_vec())),
    };
    let unsupported = || SaliencyError::UnsupportedImageShape(gradient.shape().to_vec());
    let (width, height) = (
        u32::try_from(w).map_err(|_| unsupported())?,
        u32::try_from(h).map_err(|_| unsupported())?,
    );

    let data = chw.to_vec();
    let plane = h * w;
    let channels: Vec<Vec<u8>> = data.chunks(plane).map(channel_to_u8).collect();

    let image = if c == 1 {
        let buffer =
            GrayImage::from_raw(width, height, channels[0].clone()).ok_or_else(unsupported)?;
        DynamicImage::ImageLuma8(buffer)
    } else {
        // CHW -> HWC
        let interleaved: Vec<u8> = (0..plane)
            .flat_map(|i| channels.iter().map(move |ch| ch[i]))
            .collect();
        let buffer = RgbImage::from_raw(width, height, interleaved).ok_or_else(unsupported)?;
        DynamicImage::ImageRgb8(buffer)
    };
    Ok(image)
}

/// 把梯度张量保存为`dir/name.<扩展名>`（目录不存在时自动创建），返回写入的路径
pub fn save_gradient_image(
    gradient: &Tensor,
    dir: &Path,
    name: &str,
    format: ExportFormat,
) -> Result<PathBuf, SaliencyError> {
    let image = to_gradient_image(gradient)?;
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{name}.{}", format.extension()));
    image.save_with_format(&path, format.image_format())?;
    Ok(path)
}
