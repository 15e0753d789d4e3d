use crate::nn::ModelError;
use thiserror::Error;
mod ops;
pub use self::ops::*;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TensorError {
    // 张量二元运算
    #[error(
        "形状不一致，故无法{operator}：第一个张量的形状为{tensor1_shape:?}，第二个张量的形状为{tensor2_shape:?}"
    )]
    OperatorError {
        operator: Operator,
        tensor1_shape: Vec<usize>,
        tensor2_shape: Vec<usize>,
    },
    #[error("除数为零")]
    DivByZero,
}

/// 引导反向传播与显著图后处理过程中的错误
#[derive(Error, Debug)]
pub enum SaliencyError {
    /// 目标类别索引超出了模型输出的有效范围
    #[error("目标类别索引{index}无效：模型只有{num_classes}个类别（有效索引为0..{num_classes}）")]
    InvalidTargetIndex { index: usize, num_classes: usize },
    /// 输入的批维度不为1
    #[error("仅支持批大小为1的输入，但得到批大小{0}")]
    UnsupportedBatchSize(usize),
    /// 对0个元素的张量做后处理
    #[error("输入张量没有任何元素，无法计算分位数")]
    EmptyInput,
    #[error("形状为{0:?}的张量无法保存为图像：只支持[H, W]、[1, H, W]或[3, H, W]")]
    UnsupportedImageShape(Vec<usize>),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("图像编解码失败：{0}")]
    Image(#[from] image::ImageError),
    #[error("文件读写失败：{0}")]
    Io(#[from] std::io::Error),
}
