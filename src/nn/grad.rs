/*
 * @Author       : 老董
 * @Date         : 2026-10-14
 * @Description  : 参数梯度累加器
 *
 * 与 PyTorch 一样，多次反向传播的参数梯度是累加的；
 * 不同的是累加器由调用方显式持有并以 `&mut` 传入 backward，需要时手动 `zero()`。
 */

use crate::tensor::Tensor;
use std::collections::BTreeMap;

/// 参数梯度的键：`"{层名}.{参数名}"`
pub fn param_key(layer: &str, param: &str) -> String {
    format!("{layer}.{param}")
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GradAccumulator {
    grads: BTreeMap<String, Tensor>,
}

impl GradAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 将梯度累加到`key`上（首次出现则直接记录）
    pub fn accumulate(&mut self, key: String, grad: Tensor) {
        match self.grads.get_mut(&key) {
            Some(existing) => *existing += &grad,
            None => {
                self.grads.insert(key, grad);
            }
        }
    }

    /// 清零所有已记录的梯度（保留键）
    pub fn zero(&mut self) {
        for grad in self.grads.values_mut() {
            *grad = Tensor::zeros_like(grad);
        }
    }

    pub fn get(&self, key: &str) -> Option<&Tensor> {
        self.grads.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.grads.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.grads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grads.is_empty()
    }

    /// 是否所有梯度都为0（没有任何梯度时也返回true）
    pub fn is_all_zero(&self) -> bool {
        self.grads.values().all(|g| g.view().iter().all(|&x| x == 0.0))
    }
}
