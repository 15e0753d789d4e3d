/*
 * @Author       : 老董
 * @Date         : 2026-10-14
 * @Description  : 导向反向传播（Guided Backpropagation）
 *
 * 在普通反向传播的基础上，每经过一个整流激活层（ReLU）都把负梯度截断为0，
 * 最终取首层关于输入的梯度作为显著性依据。
 *
 * 一次`generate_gradients`的步骤：
 * 1. 检查输入为批大小为1的4维张量
 * 2. 以推理模式前向，得到各类别得分
 * 3. 检查目标类别索引
 * 4. 清零参数梯度
 * 5. 构造独热种子：除`[0, target]`处为1外其余为0
 * 6. 以种子做反向传播，钩子在途中截断/捕获梯度
 * 7. 取出首层捕获的梯度并去掉批维度，得到`[C, H, W]`
 */

use crate::errors::SaliencyError;
use crate::nn::{GradAccumulator, InstrumentedModel, Instrumenter, LayerNode, Model, ModelError};
use crate::tensor::Tensor;
use tracing::debug;

pub struct GuidedBackprop<'m> {
    instrumented: InstrumentedModel<'m>,
    input: Tensor,
    target_class: usize,
    grads: GradAccumulator,
    captured: Option<Tensor>,
}

impl<'m> GuidedBackprop<'m> {
    /// 以默认的读出层判定（`LayerNode::is_readout`，即构建模型时的显式标记）创建
    pub fn new(
        model: &'m Model,
        input: Tensor,
        target_class: usize,
    ) -> Result<Self, SaliencyError> {
        Self::with_readout_filter(model, input, target_class, LayerNode::is_readout)
    }

    /// `is_readout`为真的节点及其子树不挂截断钩子
    pub fn with_readout_filter<F>(
        model: &'m Model,
        input: Tensor,
        target_class: usize,
        is_readout: F,
    ) -> Result<Self, SaliencyError>
    where
        F: Fn(&LayerNode) -> bool,
    {
        if let Some(num_classes) = model.output_dim() {
            check_target(target_class, num_classes)?;
        }

        // 先切换到推理模式，再挂钩子
        let mut instrumenter = Instrumenter::new(model).eval();
        let clipped = instrumenter.attach_guided_relu_clipping(is_readout)?;
        let first = instrumenter.attach_first_layer_capture()?;
        debug!(
            "模型{}：{}个 ReLU 挂载了截断钩子，首层{}挂载了捕获钩子",
            model.name(),
            clipped,
            first
        );

        Ok(Self {
            instrumented: instrumenter.build(),
            input,
            target_class,
            grads: GradAccumulator::new(),
            captured: None,
        })
    }

    /// 计算关于输入图像的导向梯度，形状为`[C, H, W]`
    pub fn generate_gradients(&mut self) -> Result<Tensor, SaliencyError> {
        // 1.批维度检查
        let shape = self.input.shape();
        if shape.len() != 4 || shape[0] != 1 {
            return Err(SaliencyError::UnsupportedBatchSize(
                shape.first().copied().unwrap_or(0),
            ));
        }

        // 2.前向
        let (output, cache) = self.instrumented.forward(&self.input)?;

        // 3.目标类别检查（以实际输出宽度为准）
        let num_classes = match output.shape() {
            [1, k] => *k,
            other => {
                return Err(ModelError::ShapeMismatch {
                    expected: vec![1, 0],
                    got: other.to_vec(),
                    message: "模型输出必须是[1, 类别数]".to_string(),
                }
                .into());
            }
        };
        check_target(self.target_class, num_classes)?;

        // 4.清零梯度
        self.grads.zero();

        // 5.独热种子
        let seed = Tensor::one_hot(output.shape(), &[0, self.target_class]);

        // 6.反向
        let result = self
            .instrumented
            .backward(&seed, &cache, &mut self.grads)?;

        // 7.取首层捕获
        self.captured = result.captured;
        let captured = self
            .captured
            .as_ref()
            .ok_or(ModelError::MissingCapture)?;
        let gradient = captured
            .remove_batch_dim()
            .ok_or_else(|| {
                SaliencyError::UnsupportedBatchSize(captured.shape().first().copied().unwrap_or(0))
            })?;
        Ok(gradient)
    }

    /// 最近一次传播中首层捕获的梯度（含批维度）
    pub fn captured_gradient(&self) -> Option<&Tensor> {
        self.captured.as_ref()
    }

    pub fn accumulated_grads(&self) -> &GradAccumulator {
        &self.grads
    }

    pub fn model(&self) -> &'m Model {
        self.instrumented.base()
    }

    pub fn instrumented(&self) -> &InstrumentedModel<'m> {
        &self.instrumented
    }

    pub const fn target_class(&self) -> usize {
        self.target_class
    }

    pub fn input(&self) -> &Tensor {
        &self.input
    }
}

fn check_target(index: usize, num_classes: usize) -> Result<(), SaliencyError> {
    if index >= num_classes {
        return Err(SaliencyError::InvalidTargetIndex { index, num_classes });
    }
    Ok(())
}
