//! # Guided Saliency
//!
//! 用导向反向传播（guided backpropagation）可视化卷积分类网络的决策依据：
//! 在反向传播时于每个ReLU处截断负梯度，取网络首层关于输入图像的梯度，
//! 再把它处理成彩色梯度图、灰度图以及正/负显著图。
//!
//! - [`nn`]：层树模型、前向/反向传播与梯度钩子
//! - [`visualization`]：导向反向传播引擎与显著图后处理
//! - [`data`]：样本加载与预处理
//! - [`config`]：命令行程序的配置
//!

pub mod config;
pub mod data;
pub mod errors;
pub mod nn;
pub mod tensor;
pub mod visualization;
