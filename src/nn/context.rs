/*
 * @Author       : 老董
 * @Date         : 2026-10-14
 * @Description  : 前向传播上下文：train/eval 模式、随机数发生器与各层的前向缓存
 *
 * 模型本身在前向/反向时只以 `&Model` 出现，
 * 一次传播过程中需要记录的一切可变状态都放在这里，由调用方持有。
 */

use super::LayerId;
use crate::tensor::Tensor;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashMap;

/// 运行模式
///
/// 导向反向传播与命令行程序始终以`Eval`运行，`Train`只留给层自身的前向测试；
/// BatchNorm 在`Train`下的批统计量前向不支持反向传播（返回`InvalidOperation`）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// 训练模式：Dropout 随机丢弃、BatchNorm 使用当前批的统计量
    #[default]
    Train,
    /// 推理模式：关闭一切仅用于训练的随机/统计行为
    Eval,
}

/// 单个叶子层在前向时留给反向的数据
#[derive(Debug, Clone)]
pub(crate) enum LayerCache {
    /// 层的输入（卷积、全连接、ReLU）
    Input(Tensor),
    /// 最大池化：输入形状与每个输出位置所选中的输入（展平）索引
    PoolIndices {
        input_shape: Vec<usize>,
        indices: Vec<usize>,
    },
    /// BatchNorm：输入及其使用的各通道均值、1/sqrt(var+eps)
    BatchNorm {
        input: Tensor,
        mean: Vec<f32>,
        inv_std: Vec<f32>,
        batch_stats: bool,
    },
    /// Dropout（训练模式）的缩放掩码
    Mask(Tensor),
    /// 展平前的原始形状
    Shape(Vec<usize>),
    /// 恒等映射，不需要任何缓存
    Identity,
}

/// 一次前向传播产生的所有叶子层缓存
#[derive(Debug, Clone, Default)]
pub struct ForwardCache {
    entries: HashMap<LayerId, LayerCache>,
}

impl ForwardCache {
    pub(crate) fn insert(&mut self, id: LayerId, cache: LayerCache) {
        self.entries.insert(id, cache);
    }

    pub(crate) fn get(&self, id: LayerId) -> Option<&LayerCache> {
        self.entries.get(&id)
    }

    /// 已缓存的叶子层数量
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 前向传播上下文
pub struct ForwardContext {
    mode: Mode,
    rng: StdRng,
    cache: ForwardCache,
}

impl ForwardContext {
    pub fn new(mode: Mode, seed: u64) -> Self {
        Self {
            mode,
            rng: StdRng::seed_from_u64(seed),
            cache: ForwardCache::default(),
        }
    }

    pub fn eval() -> Self {
        Self::new(Mode::Eval, 0)
    }

    pub fn train(seed: u64) -> Self {
        Self::new(Mode::Train, seed)
    }

    pub const fn mode(&self) -> Mode {
        self.mode
    }

    pub fn cache(&self) -> &ForwardCache {
        &self.cache
    }

    pub fn into_cache(self) -> ForwardCache {
        self.cache
    }

    pub(crate) fn parts_mut(&mut self) -> (Mode, &mut StdRng, &mut ForwardCache) {
        (self.mode, &mut self.rng, &mut self.cache)
    }
}
