/*
 * @Author       : 老董
 * @Date         : 2026-10-14
 * @Description  : 模型（层树）构建、前向/反向传播与梯度钩子的错误类型
 */

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ModelError {
    /// 同一个层上重复挂载同一种钩子（属于编程错误）
    #[error("层{layer}上已经挂载过{rule}钩子，不能重复挂载")]
    HookAttachment { layer: String, rule: String },
    #[error("模型{0}中没有任何层")]
    EmptyModel(String),
    #[error("找不到层：{0}")]
    LayerNotFound(String),
    #[error("层名{0}在模型中重复")]
    DuplicateLayerName(String),
    #[error("{message}：期望形状{expected:?}，实际得到{got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
        message: String,
    },
    /// 反向传播时找不到该层的前向缓存（通常是没先执行forward）
    #[error("层{0}没有前向缓存，请先执行forward")]
    MissingCache(String),
    #[error("反向传播结束后首层钩子没有捕获到输入梯度")]
    MissingCapture,
    #[error("无效操作：{0}")]
    InvalidOperation(String),
    /// 参数文件读写或格式错误
    #[error("参数文件错误：{0}")]
    Params(String),
}
