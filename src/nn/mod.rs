/*
 * @Author       : 老董
 * @Date         : 2026-10-14
 * @Description  : 负责神经网络（neural network）的构建：层树、前向/反向传播与梯度钩子
 */

mod context;
mod error;
mod grad;
pub mod hook;
mod init;
pub mod layer;
mod model;
pub mod resnet;
mod serialization;

pub use context::{ForwardCache, ForwardContext, Mode};
pub use error::ModelError;
pub use grad::{GradAccumulator, param_key};
pub use hook::{
    BackwardOutput, HookEvent, HookRule, HookTable, HookTrace, InstrumentedModel, Instrumenter,
};
pub use init::Init;
pub use layer::Layer;
pub use model::{Container, LayerId, LayerNode, Model, NodeKind};
pub use resnet::{ResNetConfig, StageConfig, build_resnet};

#[cfg(test)]
mod tests;
