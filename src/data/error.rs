//! 样本加载错误类型定义

use std::path::PathBuf;
use thiserror::Error;

/// 样本加载相关错误
#[derive(Debug, Error)]
pub enum DataError {
    /// 文件未找到
    #[error("文件未找到: {0}")]
    FileNotFound(PathBuf),

    /// 图像解码错误
    #[error("图像解码失败: {0}")]
    Image(#[from] image::ImageError),

    /// 预处理参数无效（如标准差为0、目标尺寸为0）
    #[error("预处理参数无效: {0}")]
    InvalidPreprocess(String),
}
