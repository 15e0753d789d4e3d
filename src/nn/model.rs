/*
 * @Author       : 老董
 * @Date         : 2026-10-14
 * @Description  : Model - 由命名层组成的层树（arena 存储）
 *
 * - 所有节点存放在一个 Vec 中，通过 `LayerId` 索引，并记录父/子关系
 * - 节点分为叶子层（`Layer`）与容器（Sequential / Residual），容器可任意嵌套
 * - 顶层是一个有序的节点序列（roots）；前向按序执行，反向严格按前向的逆序执行
 * - 前向/反向都只需要 `&Model`：缓存、梯度、钩子等可变状态均由调用方传入
 */

use super::context::ForwardContext;
use super::hook::{HookTable, HookTrace};
use super::layer::{Layer, TraitLayer};
use super::{ForwardCache, GradAccumulator, ModelError};
use crate::tensor::Tensor;
use std::fmt;

/// 层树中节点的索引
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayerId(usize);

impl LayerId {
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 容器节点
#[derive(Debug, Clone)]
pub enum Container {
    /// 按顺序依次执行子节点
    Sequential { children: Vec<LayerId> },
    /// 残差块：output = body(x) + shortcut(x)，`shortcut`为`None`时为恒等映射
    Residual {
        body: LayerId,
        shortcut: Option<LayerId>,
    },
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Leaf(Layer),
    Container(Container),
}

/// 层树中的一个节点
#[derive(Debug, Clone)]
pub struct LayerNode {
    id: LayerId,
    name: String,
    parent: Option<LayerId>,
    readout: bool,
    kind: NodeKind,
}

impl LayerNode {
    pub const fn id(&self) -> LayerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn parent(&self) -> Option<LayerId> {
        self.parent
    }

    /// 是否被显式标记为最终的分类/读出阶段
    pub const fn is_readout(&self) -> bool {
        self.readout
    }

    pub const fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub const fn is_container(&self) -> bool {
        matches!(self.kind, NodeKind::Container(_))
    }

    pub fn layer(&self) -> Option<&Layer> {
        match &self.kind {
            NodeKind::Leaf(layer) => Some(layer),
            NodeKind::Container(_) => None,
        }
    }

    /// 叶子层且为整流激活层
    pub fn is_rectifying_activation(&self) -> bool {
        self.layer().is_some_and(Layer::is_rectifying_activation)
    }

    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            NodeKind::Leaf(layer) => layer.type_name(),
            NodeKind::Container(Container::Sequential { .. }) => "Sequential",
            NodeKind::Container(Container::Residual { .. }) => "Residual",
        }
    }

    /// 子节点（按前向执行顺序）
    pub fn children(&self) -> Vec<LayerId> {
        match &self.kind {
            NodeKind::Leaf(_) => Vec::new(),
            NodeKind::Container(Container::Sequential { children }) => children.clone(),
            NodeKind::Container(Container::Residual { body, shortcut }) => {
                std::iter::once(*body).chain(*shortcut).collect()
            }
        }
    }
}

impl fmt::Display for LayerNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[id={}, name={}, type={}]", self.id.0, self.name, self.type_name())
    }
}

/// 一次反向传播中各节点共享的可变状态
pub(crate) struct BackwardPass<'a> {
    pub(crate) cache: &'a ForwardCache,
    pub(crate) grads: &'a mut GradAccumulator,
    pub(crate) hooks: Option<&'a HookTable>,
    pub(crate) sink: &'a mut Option<Tensor>,
    pub(crate) trace: Option<&'a mut HookTrace>,
}

/// 由命名层组成的层树
#[derive(Debug, Clone)]
pub struct Model {
    name: String,
    nodes: Vec<LayerNode>,
    roots: Vec<LayerId>,
}

impl Model {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            nodes: Vec::new(),
            roots: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ========== 构建 ==========

    /// 添加叶子层；`parent`为`None`时追加到顶层，否则追加到指定的 Sequential 容器末尾
    pub fn add_layer(
        &mut self,
        parent: Option<LayerId>,
        name: &str,
        layer: impl Into<Layer>,
    ) -> Result<LayerId, ModelError> {
        self.push_node(parent, name, NodeKind::Leaf(layer.into()))
    }

    /// 添加一个空的 Sequential 容器
    pub fn add_sequential(
        &mut self,
        parent: Option<LayerId>,
        name: &str,
    ) -> Result<LayerId, ModelError> {
        self.push_node(
            parent,
            name,
            NodeKind::Container(Container::Sequential {
                children: Vec::new(),
            }),
        )
    }

    /// 添加残差块，返回`(残差块, 主干)`；主干是名为`{name}.body`的 Sequential 容器
    pub fn add_residual(
        &mut self,
        parent: Option<LayerId>,
        name: &str,
    ) -> Result<(LayerId, LayerId), ModelError> {
        self.check_name_free(name)?;
        self.check_name_free(&format!("{name}.body"))?;
        // 先以占位的主干id创建残差块，随后回填
        let block = self.push_node(
            parent,
            name,
            NodeKind::Container(Container::Residual {
                body: LayerId(usize::MAX),
                shortcut: None,
            }),
        )?;
        let body = self.insert_node(
            Some(block),
            &format!("{name}.body"),
            NodeKind::Container(Container::Sequential {
                children: Vec::new(),
            }),
        );
        if let NodeKind::Container(Container::Residual { body: slot, .. }) =
            &mut self.nodes[block.0].kind
        {
            *slot = body;
        }
        Ok((block, body))
    }

    /// 为残差块添加捷径分支（Sequential 容器），每个残差块至多一个
    pub fn add_shortcut(&mut self, residual: LayerId, name: &str) -> Result<LayerId, ModelError> {
        match &self.node(residual)?.kind {
            NodeKind::Container(Container::Residual { shortcut: None, .. }) => {}
            NodeKind::Container(Container::Residual { .. }) => {
                return Err(ModelError::InvalidOperation(format!(
                    "残差块{}已经有捷径分支",
                    self.nodes[residual.0]
                )));
            }
            _ => {
                return Err(ModelError::InvalidOperation(format!(
                    "{}不是残差块，无法添加捷径分支",
                    self.nodes[residual.0]
                )));
            }
        }
        self.check_name_free(name)?;
        let shortcut = self.insert_node(
            Some(residual),
            name,
            NodeKind::Container(Container::Sequential {
                children: Vec::new(),
            }),
        );
        if let NodeKind::Container(Container::Residual { shortcut: slot, .. }) =
            &mut self.nodes[residual.0].kind
        {
            *slot = Some(shortcut);
        }
        Ok(shortcut)
    }

    /// 显式标记某节点为最终的分类/读出阶段
    pub fn mark_readout(&mut self, id: LayerId) -> Result<(), ModelError> {
        self.node_mut(id)?.readout = true;
        Ok(())
    }

    fn check_name_free(&self, name: &str) -> Result<(), ModelError> {
        if self.find(name).is_some() {
            return Err(ModelError::DuplicateLayerName(name.to_string()));
        }
        Ok(())
    }

    fn push_node(
        &mut self,
        parent: Option<LayerId>,
        name: &str,
        kind: NodeKind,
    ) -> Result<LayerId, ModelError> {
        self.check_name_free(name)?;
        if let Some(parent_id) = parent {
            let parent_node = self.node(parent_id)?;
            if !matches!(
                parent_node.kind,
                NodeKind::Container(Container::Sequential { .. })
            ) {
                return Err(ModelError::InvalidOperation(format!(
                    "只能向 Sequential 容器中追加子节点，但{parent_node}不是"
                )));
            }
        }
        Ok(self.insert_node(parent, name, kind))
    }

    /// 不做检查地插入节点，并挂到父容器（或顶层）末尾
    fn insert_node(&mut self, parent: Option<LayerId>, name: &str, kind: NodeKind) -> LayerId {
        let id = LayerId(self.nodes.len());
        self.nodes.push(LayerNode {
            id,
            name: name.to_string(),
            parent,
            readout: false,
            kind,
        });
        match parent {
            None => self.roots.push(id),
            Some(parent_id) => {
                if let NodeKind::Container(Container::Sequential { children }) =
                    &mut self.nodes[parent_id.0].kind
                {
                    children.push(id);
                }
            }
        }
        id
    }

    // ========== 查询 ==========

    pub fn node(&self, id: LayerId) -> Result<&LayerNode, ModelError> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| ModelError::LayerNotFound(id.to_string()))
    }

    pub(crate) fn node_mut(&mut self, id: LayerId) -> Result<&mut LayerNode, ModelError> {
        self.nodes
            .get_mut(id.0)
            .ok_or_else(|| ModelError::LayerNotFound(id.to_string()))
    }

    pub(crate) fn nodes_mut(&mut self) -> impl Iterator<Item = &mut LayerNode> {
        self.nodes.iter_mut()
    }

    pub(crate) fn layer_mut(node: &mut LayerNode) -> Option<&mut Layer> {
        match &mut node.kind {
            NodeKind::Leaf(layer) => Some(layer),
            NodeKind::Container(_) => None,
        }
    }

    pub fn find(&self, name: &str) -> Option<LayerId> {
        self.nodes.iter().find(|n| n.name == name).map(|n| n.id)
    }

    /// 顶层有序序列
    pub fn roots(&self) -> &[LayerId] {
        &self.roots
    }

    /// 顶层序列中的第一个节点
    pub fn first_layer(&self) -> Option<LayerId> {
        self.roots.first().copied()
    }

    pub fn children(&self, id: LayerId) -> Result<Vec<LayerId>, ModelError> {
        Ok(self.node(id)?.children())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 按前序（容器在前，子节点按执行顺序）遍历整棵层树
    pub fn walk(&self) -> Vec<LayerId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<LayerId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            let node = &self.nodes[id.0];
            stack.extend(node.children().into_iter().rev());
        }
        order
    }

    /// 按前序遍历，但跳过`skip`为真的节点及其整棵子树
    pub fn walk_filtered<F>(&self, skip: F) -> Vec<LayerId>
    where
        F: Fn(&LayerNode) -> bool,
    {
        let mut order = Vec::new();
        let mut stack: Vec<LayerId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id.0];
            if skip(node) {
                continue;
            }
            order.push(id);
            stack.extend(node.children().into_iter().rev());
        }
        order
    }

    /// 所有整流激活层（前序）
    pub fn rectifying_layers(&self) -> Vec<LayerId> {
        self.walk()
            .into_iter()
            .filter(|&id| self.nodes[id.0].is_rectifying_activation())
            .collect()
    }

    /// 模型声明的输出类别数：沿顶层最后一个节点一路向下（Sequential 取最后一个子节点、
    /// Residual 取主干），若终点是 Linear 则返回其输出特征数
    pub fn output_dim(&self) -> Option<usize> {
        let mut current = *self.roots.last()?;
        loop {
            match &self.nodes[current.0].kind {
                NodeKind::Leaf(Layer::Linear(linear)) => return Some(linear.out_features()),
                NodeKind::Leaf(_) => return None,
                NodeKind::Container(Container::Sequential { children }) => {
                    current = *children.last()?;
                }
                NodeKind::Container(Container::Residual { body, .. }) => current = *body,
            }
        }
    }

    /// 所有参数（含缓冲量），键为`"{层名}.{参数名}"`，按前序排列
    pub fn parameters(&self) -> Vec<(String, &Tensor)> {
        self.walk()
            .into_iter()
            .filter_map(|id| {
                let node = &self.nodes[id.0];
                node.layer().map(|layer| (node, layer))
            })
            .flat_map(|(node, layer)| {
                layer
                    .parameters()
                    .into_iter()
                    .map(move |(param, tensor)| (super::param_key(&node.name, param), tensor))
            })
            .collect()
    }

    /// 由输入形状推断输出形状
    pub fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>, ModelError> {
        if self.roots.is_empty() {
            return Err(ModelError::EmptyModel(self.name.clone()));
        }
        self.roots
            .iter()
            .try_fold(input_shape.to_vec(), |shape, &id| self.node_output_shape(id, &shape))
    }

    fn node_output_shape(
        &self,
        id: LayerId,
        input_shape: &[usize],
    ) -> Result<Vec<usize>, ModelError> {
        let node = self.node(id)?;
        match &node.kind {
            NodeKind::Leaf(layer) => layer.output_shape(input_shape),
            NodeKind::Container(Container::Sequential { children }) => children
                .iter()
                .try_fold(input_shape.to_vec(), |shape, &c| self.node_output_shape(c, &shape)),
            NodeKind::Container(Container::Residual { body, shortcut }) => {
                let main = self.node_output_shape(*body, input_shape)?;
                let skip = match shortcut {
                    Some(s) => self.node_output_shape(*s, input_shape)?,
                    None => input_shape.to_vec(),
                };
                if main != skip {
                    return Err(ModelError::ShapeMismatch {
                        expected: main,
                        got: skip,
                        message: format!("残差块{node}的主干与捷径输出形状不一致"),
                    });
                }
                Ok(main)
            }
        }
    }

    // ========== 前向传播 ==========

    pub fn forward(&self, input: &Tensor, ctx: &mut ForwardContext) -> Result<Tensor, ModelError> {
        if self.roots.is_empty() {
            return Err(ModelError::EmptyModel(self.name.clone()));
        }
        let mut x = input.clone();
        for &id in &self.roots {
            x = self.forward_node(id, &x, ctx)?;
        }
        Ok(x)
    }

    fn forward_node(
        &self,
        id: LayerId,
        input: &Tensor,
        ctx: &mut ForwardContext,
    ) -> Result<Tensor, ModelError> {
        let node = self.node(id)?;
        match &node.kind {
            NodeKind::Leaf(layer) => {
                let (mode, rng, cache) = ctx.parts_mut();
                let (output, layer_cache) = layer.forward(input, mode, rng)?;
                cache.insert(id, layer_cache);
                Ok(output)
            }
            NodeKind::Container(Container::Sequential { children }) => {
                let mut x = input.clone();
                for &child in children {
                    x = self.forward_node(child, &x, ctx)?;
                }
                Ok(x)
            }
            NodeKind::Container(Container::Residual { body, shortcut }) => {
                let main = self.forward_node(*body, input, ctx)?;
                let skip = match shortcut {
                    Some(s) => self.forward_node(*s, input, ctx)?,
                    None => input.clone(),
                };
                if !main.is_same_shape(&skip) {
                    return Err(ModelError::ShapeMismatch {
                        expected: main.shape().to_vec(),
                        got: skip.shape().to_vec(),
                        message: format!("残差块{node}的主干与捷径输出形状不一致"),
                    });
                }
                Ok(main + &skip)
            }
        }
    }

    // ========== 反向传播 ==========

    /// 以`seed`（关于模型输出的梯度）为起点做一次反向传播，返回关于模型输入的梯度。
    /// 参数梯度累加到`grads`中（不会自动清零）
    pub fn backward(
        &self,
        seed: &Tensor,
        cache: &ForwardCache,
        grads: &mut GradAccumulator,
    ) -> Result<Tensor, ModelError> {
        let mut sink = None;
        let mut pass = BackwardPass {
            cache,
            grads,
            hooks: None,
            sink: &mut sink,
            trace: None,
        };
        self.backward_with(seed, &mut pass)
    }

    pub(crate) fn backward_with(
        &self,
        seed: &Tensor,
        pass: &mut BackwardPass<'_>,
    ) -> Result<Tensor, ModelError> {
        if self.roots.is_empty() {
            return Err(ModelError::EmptyModel(self.name.clone()));
        }
        let mut grad = seed.clone();
        for &id in self.roots.iter().rev() {
            grad = self.backward_node(id, &grad, pass)?;
        }
        Ok(grad)
    }

    fn backward_node(
        &self,
        id: LayerId,
        grad_output: &Tensor,
        pass: &mut BackwardPass<'_>,
    ) -> Result<Tensor, ModelError> {
        let node = self.node(id)?;
        let grad_input = match &node.kind {
            NodeKind::Leaf(layer) => {
                let layer_cache = pass
                    .cache
                    .get(id)
                    .ok_or_else(|| ModelError::MissingCache(node.name.clone()))?;
                layer.backward(&node.name, grad_output, layer_cache, pass.grads)?
            }
            NodeKind::Container(Container::Sequential { children }) => {
                let mut grad = grad_output.clone();
                for &child in children.iter().rev() {
                    grad = self.backward_node(child, &grad, pass)?;
                }
                grad
            }
            NodeKind::Container(Container::Residual { body, shortcut }) => {
                // 前向时主干先于捷径执行，反向时先处理捷径
                let skip = match shortcut {
                    Some(s) => self.backward_node(*s, grad_output, pass)?,
                    None => grad_output.clone(),
                };
                let main = self.backward_node(*body, grad_output, pass)?;
                main + &skip
            }
        };

        match pass.hooks {
            Some(hooks) => Ok(hooks.apply(
                node,
                grad_output,
                grad_input,
                pass.sink,
                pass.trace.as_deref_mut(),
            )),
            None => Ok(grad_input),
        }
    }
}
