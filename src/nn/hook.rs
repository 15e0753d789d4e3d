/*
 * @Author       : 老董
 * @Date         : 2026-10-14
 * @Description  : 梯度钩子：在反向传播中拦截并改写流经某些层的梯度
 *
 * 钩子以规则（`HookRule`）的形式登记在 `HookTable` 中，绑定到层树节点上；
 * 反向传播时，每个节点算完自身的梯度后，按绑定顺序依次执行该节点上的规则。
 *
 * `Instrumenter` 是安装钩子的唯一入口，`build()` 之后得到不可变的 `InstrumentedModel`：
 * - 基础模型只被借用（`&Model`），不会被修改
 * - 钩子集合在构建完成后即固定，传播过程中不可能增删
 */

use super::model::BackwardPass;
use super::{
    ForwardCache, ForwardContext, GradAccumulator, LayerId, LayerNode, Mode, Model, ModelError,
};
use crate::tensor::Tensor;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

/// 绑定在层上的梯度改写规则
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookRule {
    /// 把该层产生的（关于其输入的）梯度存入本次传播的捕获槽中，梯度本身原样传下去
    CaptureInputGradient,
    /// 把梯度中的负值截断为0：`max(0, g)`
    ClipNegative,
}

impl fmt::Display for HookRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CaptureInputGradient => write!(f, "CaptureInputGradient"),
            Self::ClipNegative => write!(f, "ClipNegative"),
        }
    }
}

/// 层 -> 规则列表（按绑定顺序）
#[derive(Debug, Clone, Default)]
pub struct HookTable {
    rules: BTreeMap<LayerId, Vec<HookRule>>,
}

impl HookTable {
    pub fn rules_for(&self, id: LayerId) -> &[HookRule] {
        self.rules.get(&id).map_or(&[], Vec::as_slice)
    }

    /// 挂了钩子的层数
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn count(&self, rule: HookRule) -> usize {
        self.rules
            .values()
            .filter(|rules| rules.contains(&rule))
            .count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (LayerId, &[HookRule])> {
        self.rules.iter().map(|(id, rules)| (*id, rules.as_slice()))
    }

    fn bind(&mut self, node: &LayerNode, rule: HookRule) -> Result<(), ModelError> {
        let rules = self.rules.entry(node.id()).or_default();
        if rules.contains(&rule) {
            return Err(ModelError::HookAttachment {
                layer: node.name().to_string(),
                rule: rule.to_string(),
            });
        }
        rules.push(rule);
        debug!("在层{}上挂载钩子{}", node.name(), rule);
        Ok(())
    }

    /// 对`node`刚算出的输入梯度依次执行其上绑定的规则，返回（可能被改写后的）梯度
    pub(crate) fn apply(
        &self,
        node: &LayerNode,
        _grad_output: &Tensor,
        grad_input: Tensor,
        sink: &mut Option<Tensor>,
        mut trace: Option<&mut HookTrace>,
    ) -> Tensor {
        let mut grad = grad_input;
        for &rule in self.rules_for(node.id()) {
            match rule {
                HookRule::CaptureInputGradient => *sink = Some(grad.clone()),
                HookRule::ClipNegative => grad = grad.clamp_min(0.0),
            }
            if let Some(trace) = trace.as_deref_mut() {
                trace.record(node.id(), rule, &grad);
            }
        }
        grad
    }
}

/// 一次规则执行后的记录
#[derive(Debug, Clone)]
pub struct HookEvent {
    pub layer: LayerId,
    pub rule: HookRule,
    /// 规则执行后向下游传递的梯度
    pub gradient: Tensor,
}

/// 记录一次反向传播中所有规则的执行情况（按执行顺序）
#[derive(Debug, Clone, Default)]
pub struct HookTrace {
    events: Vec<HookEvent>,
}

impl HookTrace {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, layer: LayerId, rule: HookRule, gradient: &Tensor) {
        self.events.push(HookEvent {
            layer,
            rule,
            gradient: gradient.clone(),
        });
    }

    pub fn events(&self) -> &[HookEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// 钩子安装器
pub struct Instrumenter<'m> {
    model: &'m Model,
    mode: Mode,
    hooks: HookTable,
}

impl<'m> Instrumenter<'m> {
    pub fn new(model: &'m Model) -> Self {
        Self {
            model,
            mode: Mode::default(),
            hooks: HookTable::default(),
        }
    }

    /// 切换到推理模式
    pub fn eval(mut self) -> Self {
        self.mode = Mode::Eval;
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// 在顶层序列的第一个节点上挂载输入梯度捕获钩子，返回该节点
    pub fn attach_first_layer_capture(&mut self) -> Result<LayerId, ModelError> {
        let first = self
            .model
            .first_layer()
            .ok_or_else(|| ModelError::EmptyModel(self.model.name().to_string()))?;
        let node = self.model.node(first)?;
        self.hooks.bind(node, HookRule::CaptureInputGradient)?;
        Ok(first)
    }

    /// 在所有整流激活层上挂载负梯度截断钩子，`is_readout`为真的节点（连同子树）被跳过。
    /// 返回挂载的层数
    pub fn attach_guided_relu_clipping<F>(&mut self, is_readout: F) -> Result<usize, ModelError>
    where
        F: Fn(&LayerNode) -> bool,
    {
        let mut count = 0;
        for id in self.model.walk_filtered(is_readout) {
            let node = self.model.node(id)?;
            if node.is_rectifying_activation() {
                self.hooks.bind(node, HookRule::ClipNegative)?;
                count += 1;
            }
        }
        if count == 0 {
            info!(
                "模型{}中没有整流激活层，导向反向传播退化为普通反向传播",
                self.model.name()
            );
        }
        Ok(count)
    }

    pub fn build(self) -> InstrumentedModel<'m> {
        InstrumentedModel {
            model: self.model,
            mode: self.mode,
            hooks: self.hooks,
        }
    }
}

/// 反向传播的结果
#[derive(Debug, Clone)]
pub struct BackwardOutput {
    /// 关于模型输入的梯度（经过所有钩子改写后）
    pub input_gradient: Tensor,
    /// 捕获钩子存下的梯度
    pub captured: Option<Tensor>,
}

/// 挂好钩子的模型
#[derive(Debug, Clone)]
pub struct InstrumentedModel<'m> {
    model: &'m Model,
    mode: Mode,
    hooks: HookTable,
}

impl<'m> InstrumentedModel<'m> {
    pub const fn base(&self) -> &'m Model {
        self.model
    }

    pub const fn mode(&self) -> Mode {
        self.mode
    }

    pub const fn hooks(&self) -> &HookTable {
        &self.hooks
    }

    /// 按安装时设定的模式前向，返回输出与前向缓存
    pub fn forward(&self, input: &Tensor) -> Result<(Tensor, ForwardCache), ModelError> {
        let mut ctx = ForwardContext::new(self.mode, 0);
        let output = self.model.forward(input, &mut ctx)?;
        Ok((output, ctx.into_cache()))
    }

    pub fn backward(
        &self,
        seed: &Tensor,
        cache: &ForwardCache,
        grads: &mut GradAccumulator,
    ) -> Result<BackwardOutput, ModelError> {
        self.run_backward(seed, cache, grads, None)
    }

    /// 同`backward`，并把每一次规则执行记录到`trace`中
    pub fn backward_traced(
        &self,
        seed: &Tensor,
        cache: &ForwardCache,
        grads: &mut GradAccumulator,
        trace: &mut HookTrace,
    ) -> Result<BackwardOutput, ModelError> {
        self.run_backward(seed, cache, grads, Some(trace))
    }

    fn run_backward(
        &self,
        seed: &Tensor,
        cache: &ForwardCache,
        grads: &mut GradAccumulator,
        trace: Option<&mut HookTrace>,
    ) -> Result<BackwardOutput, ModelError> {
        let mut captured = None;
        let mut pass = BackwardPass {
            cache,
            grads,
            hooks: Some(&self.hooks),
            sink: &mut captured,
            trace,
        };
        let input_gradient = self.model.backward_with(seed, &mut pass)?;
        Ok(BackwardOutput {
            input_gradient,
            captured,
        })
    }
}
