/*
 * @Author       : 老董
 * @Date         : 2026-10-14
 * @Description  : 命令行程序的 JSON 配置
 */

use crate::data::{ExampleConfig, PreprocessConfig};
use crate::nn::ResNetConfig;
use crate::visualization::ExportFormat;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("无法读取配置文件: {0}")]
    Io(#[from] std::io::Error),
    #[error("配置文件格式错误: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("配置无效: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub examples: Vec<ExampleConfig>,
    pub output_dir: PathBuf,
    pub image_format: ExportFormat,
    /// 预训练参数文件（`Model::save_params`格式）；为空时使用随机初始化的参数
    pub weights: Option<PathBuf>,
    pub model: ResNetConfig,
    pub preprocess: PreprocessConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            examples: (0..5)
                .map(|i| ExampleConfig {
                    path: PathBuf::from(format!("input_images/example_{i}.jpg")),
                    target_class: i,
                })
                .collect(),
            output_dir: PathBuf::from("results"),
            image_format: ExportFormat::default(),
            weights: None,
            model: ResNetConfig::default(),
            preprocess: PreprocessConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.examples.is_empty() {
            return Err(ConfigError::Invalid("至少需要一个样本".to_string()));
        }
        if self.model.num_classes == 0 {
            return Err(ConfigError::Invalid("类别数不能为0".to_string()));
        }
        if let Some(bad) = self
            .examples
            .iter()
            .find(|e| e.target_class >= self.model.num_classes)
        {
            return Err(ConfigError::Invalid(format!(
                "样本{}的目标类别{}超出了类别数{}",
                bad.path.display(),
                bad.target_class,
                self.model.num_classes
            )));
        }
        self.preprocess
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// 只保留指定下标的样本（保持给定顺序）
    pub fn select_examples(&self, indices: &[usize]) -> Result<Vec<ExampleConfig>, ConfigError> {
        indices
            .iter()
            .map(|&i| {
                self.examples.get(i).cloned().ok_or_else(|| {
                    ConfigError::Invalid(format!(
                        "样本下标{i}越界：共有{}个样本",
                        self.examples.len()
                    ))
                })
            })
            .collect()
    }
}
