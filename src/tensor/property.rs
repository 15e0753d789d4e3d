/*
 * @Author       : 老董
 * @Date         : 2026-10-14
 * @Description  : 本类仅包含一些属性与形状方法，不包含任何数值运算
 */

use super::Tensor;
use ndarray::{ArrayViewD, ArrayViewMutD, Axis, IxDyn};
use std::ops::{Index, IndexMut};

impl Tensor {
    /*↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓快照/view(_mut)↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓*/
    pub fn view(&self) -> ArrayViewD<'_, f32> {
        self.data.view()
    }
    pub fn view_mut(&mut self) -> ArrayViewMutD<'_, f32> {
        self.data.view_mut()
    }
    /*↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑快照/view(_mut)↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑*/

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// 张量的维（dim）数、阶（rank）数
    pub fn dimension(&self) -> usize {
        self.data.ndim()
    }

    /// 张量中所有元素的数量
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 判断两个张量的形状是否严格一致。如：形状为 [1, 4]，[1, 4]和[4]是不一致的
    pub fn is_same_shape(&self, other: &Self) -> bool {
        self.shape() == other.shape()
    }

    /// 按行优先（逻辑）顺序导出所有元素
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.iter().copied().collect()
    }

    pub fn get(&self, index: &[usize]) -> Option<f32> {
        self.data.get(IxDyn(index)).copied()
    }

    /// 改变形状（元素总数必须一致，否则panic）
    pub fn reshape(&self, shape: &[usize]) -> Self {
        let new_len: usize = shape.iter().product();
        assert!(
            self.size() == new_len,
            "张量形状不兼容：无法将形状{:?}变为{:?}",
            self.shape(),
            shape
        );
        let data = self.to_vec();
        Self::new(&data, shape)
    }

    /// 在首位插入长度为1的批维度：`[C, H, W]` -> `[1, C, H, W]`
    pub fn unsqueeze_batch(&self) -> Self {
        Self::from_array(self.data.clone().insert_axis(Axis(0)))
    }

    /// 去掉长度为1的批维度：`[1, C, H, W]` -> `[C, H, W]`。
    /// 若首维长度不为1（或张量是0维的），返回`None`
    pub fn remove_batch_dim(&self) -> Option<Self> {
        match self.shape().first() {
            Some(1) => Some(Self::from_array(self.data.index_axis(Axis(0), 0).to_owned())),
            _ => None,
        }
    }
}

impl<const N: usize> Index<[usize; N]> for Tensor {
    type Output = f32;

    fn index(&self, index: [usize; N]) -> &f32 {
        &self.data[IxDyn(&index)]
    }
}

impl<const N: usize> IndexMut<[usize; N]> for Tensor {
    fn index_mut(&mut self, index: [usize; N]) -> &mut f32 {
        &mut self.data[IxDyn(&index)]
    }
}
