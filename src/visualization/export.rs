/*
 * @Author       : 老董
 * @Date         : 2026-10-14
 * @Description  : 导出：每个样本的四张显著图及其命名
 */

use super::guided_backprop::GuidedBackprop;
use super::saliency::{convert_to_grayscale, get_positive_negative_saliency, save_gradient_image};
use crate::data::Example;
use crate::errors::SaliencyError;
use crate::nn::Model;
use crate::tensor::Tensor;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub const COLOR_SUFFIX: &str = "_Guided_BP_color";
pub const GRAY_SUFFIX: &str = "_Guided_BP_gray";
pub const POSITIVE_SUFFIX: &str = "_pos_sal";
pub const NEGATIVE_SUFFIX: &str = "_neg_sal";

/// 导出图像格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// PNG 格式（默认）
    #[default]
    Png,
    /// JPEG 格式
    Jpeg,
}

impl ExportFormat {
    /// 获取文件扩展名（不含点号）
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }

    pub const fn image_format(&self) -> image::ImageFormat {
        match self {
            Self::Png => image::ImageFormat::Png,
            Self::Jpeg => image::ImageFormat::Jpeg,
        }
    }

    /// 从扩展名解析格式
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            _ => None,
        }
    }
}

/// 由导向梯度生成并保存彩色、灰度、正、负四张图，按上述顺序返回路径
pub fn export_saliency_maps(
    gradient: &Tensor,
    dir: &Path,
    export_name: &str,
    format: ExportFormat,
) -> Result<Vec<PathBuf>, SaliencyError> {
    let grayscale = convert_to_grayscale(gradient)?;
    let (positive, negative) = get_positive_negative_saliency(gradient);

    [
        (gradient, COLOR_SUFFIX),
        (&grayscale, GRAY_SUFFIX),
        (&positive, POSITIVE_SUFFIX),
        (&negative, NEGATIVE_SUFFIX),
    ]
    .into_iter()
    .map(|(tensor, suffix)| {
        save_gradient_image(tensor, dir, &format!("{export_name}{suffix}"), format)
    })
    .collect()
}

/// 对单个样本运行导向反向传播并导出全部显著图
pub fn run_guided_backprop(
    model: &Model,
    example: &Example,
    dir: &Path,
    format: ExportFormat,
) -> Result<Vec<PathBuf>, SaliencyError> {
    let mut engine = GuidedBackprop::new(model, example.prepared.clone(), example.target_class)?;
    let gradient = engine.generate_gradients()?;
    let paths = export_saliency_maps(&gradient, dir, &example.export_name, format)?;
    info!("样本{}的导向反向传播完成", example.export_name);
    Ok(paths)
}
