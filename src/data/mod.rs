/*
 * @Author       : 老董
 * @Date         : 2026-10-14
 * @Description  : 样本加载与预处理
 *
 * 图像 -> RGB -> 缩放到网络输入尺寸 -> /255 -> 按通道做 (x - mean) / std -> [1, 3, H, W]
 */

mod error;

pub use error::DataError;

use crate::tensor::Tensor;
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 单个待可视化的样本
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExampleConfig {
    pub path: PathBuf,
    pub target_class: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// 网络输入尺寸 (H, W)
    pub image_size: (usize, usize),
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for PreprocessConfig {
    /// ImageNet 的均值与标准差
    fn default() -> Self {
        Self {
            image_size: (64, 64),
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
        }
    }
}

impl PreprocessConfig {
    pub fn validate(&self) -> Result<(), DataError> {
        if self.image_size.0 == 0 || self.image_size.1 == 0 {
            return Err(DataError::InvalidPreprocess(format!(
                "目标尺寸不能为0: {:?}",
                self.image_size
            )));
        }
        if self.std.iter().any(|&s| s == 0.0 || !s.is_finite()) {
            return Err(DataError::InvalidPreprocess(format!(
                "标准差必须为非零有限值: {:?}",
                self.std
            )));
        }
        Ok(())
    }
}

/// 加载好的样本
#[derive(Debug, Clone)]
pub struct Example {
    /// 原始图像（RGB）
    pub original: RgbImage,
    /// 预处理后的网络输入 [1, 3, H, W]
    pub prepared: Tensor,
    pub target_class: usize,
    /// 导出文件名的前缀（图像文件名去掉扩展名）
    pub export_name: String,
}

/// 把图像预处理为网络输入 [1, 3, H, W]
pub fn preprocess_image(
    image: &DynamicImage,
    config: &PreprocessConfig,
) -> Result<Tensor, DataError> {
    config.validate()?;
    let (h, w) = config.image_size;
    let invalid_size =
        || DataError::InvalidPreprocess(format!("目标尺寸过大: {:?}", config.image_size));
    let resized = image
        .resize_exact(
            u32::try_from(w).map_err(|_| invalid_size())?,
            u32::try_from(h).map_err(|_| invalid_size())?,
            FilterType::Triangle,
        )
        .to_rgb8();

    let plane = h * w;
    let mut data = vec![0.0f32; 3 * plane];
    for (x, y, pixel) in resized.enumerate_pixels() {
        let offset = y as usize * w + x as usize;
        for c in 0..3 {
            let value = f32::from(pixel[c]) / 255.0;
            data[c * plane + offset] = (value - config.mean[c]) / config.std[c];
        }
    }
    Ok(Tensor::new(&data, &[1, 3, h, w]))
}

/// 导出名：文件名去掉扩展名
pub fn export_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "example".to_string())
}

/// 读取并预处理单个样本
pub fn load_example(
    config: &ExampleConfig,
    preprocess: &PreprocessConfig,
) -> Result<Example, DataError> {
    if !config.path.exists() {
        return Err(DataError::FileNotFound(config.path.clone()));
    }
    let image = image::open(&config.path)?;
    let prepared = preprocess_image(&image, preprocess)?;
    Ok(Example {
        original: image.to_rgb8(),
        prepared,
        target_class: config.target_class,
        export_name: export_name(&config.path),
    })
}
