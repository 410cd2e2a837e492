use glam::Mat4;
use slotmap::SlotMap;

use crate::{
    material::registry::MaterialRegistry,
    mesh::mesh_asset::{MeshAsset, MeshKey},
    scene::draw_context::{DrawContext, RenderObject},
};

/// 场景节点在 [`SceneGraph`] 中的下标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SceneError {
    #[error("unknown scene node {0:?}")]
    UnknownNode(NodeId),

    #[error("making {parent:?} the parent of {child:?} would create a cycle")]
    Cycle { child: NodeId, parent: NodeId },
}

#[derive(Debug)]
struct SceneNode {
    parent: Option<NodeId>,
    children: Vec<NodeId>,

    local_transform: Mat4,
    world_transform: Mat4,

    mesh: Option<MeshKey>,
}

/// 下标式的场景树
///
/// 节点只通过 [`NodeId`] 互相引用，没有共享所有权；节点一旦加入就不会被移除
#[derive(Debug, Default)]
pub struct SceneGraph {
    nodes: Vec<SceneNode>,
}

// getters
impl SceneGraph {
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node.0).and_then(|node| node.parent)
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes.get(node.0).map_or(&[][..], |node| node.children.as_slice())
    }

    /// 最近一次 [`SceneGraph::refresh_transforms`] 的结果
    pub fn world_transform(&self, node: NodeId) -> Option<Mat4> {
        self.nodes.get(node.0).map(|node| node.world_transform)
    }

    pub fn roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.parent.is_none())
            .map(|(index, _)| NodeId(index))
    }
}

// update
impl SceneGraph {
    pub fn add_node(&mut self, local_transform: Mat4, mesh: Option<MeshKey>) -> NodeId {
        self.nodes.push(SceneNode {
            parent: None,
            children: Vec::new(),
            local_transform,
            world_transform: local_transform,
            mesh,
        });
        NodeId(self.nodes.len() - 1)
    }

    pub fn set_local_transform(&mut self, node: NodeId, transform: Mat4) -> Result<(), SceneError> {
        self.node_mut(node)?.local_transform = transform;
        Ok(())
    }

    /// `parent` 为 None 时把节点变成根节点
    pub fn set_parent(&mut self, child: NodeId, parent: Option<NodeId>) -> Result<(), SceneError> {
        self.node_mut(child)?;
        if let Some(parent) = parent {
            self.node_mut(parent)?;
            // 从 parent 向上走，如果遇到 child 说明会成环
            let mut ancestor = Some(parent);
            while let Some(current) = ancestor {
                if current == child {
                    return Err(SceneError::Cycle { child, parent });
                }
                ancestor = self.nodes[current.0].parent;
            }
        }

        if let Some(old_parent) = self.nodes[child.0].parent.take() {
            self.nodes[old_parent.0].children.retain(|&c| c != child);
        }
        if let Some(parent) = parent {
            self.nodes[parent.0].children.push(child);
        }
        self.nodes[child.0].parent = parent;
        Ok(())
    }

    /// 从所有根节点开始更新 world transform，使用显式栈而不是递归
    pub fn refresh_transforms(&mut self) {
        let mut stack = self.roots().map(|root| (root, Mat4::IDENTITY)).collect::<Vec<_>>();
        while let Some((id, parent_world)) = stack.pop() {
            let node = &mut self.nodes[id.0];
            node.world_transform = parent_world * node.local_transform;
            let world = node.world_transform;
            stack.extend(node.children.iter().map(|&child| (child, world)));
        }
    }

    fn node_mut(&mut self, node: NodeId) -> Result<&mut SceneNode, SceneError> {
        self.nodes.get_mut(node.0).ok_or(SceneError::UnknownNode(node))
    }
}

// tools
impl SceneGraph {
    /// 把带网格的节点展开成 RenderObject
    ///
    /// 已经移除的网格被跳过；surface 的材质不存在时使用默认材质，默认材质也不存在时跳过
    pub fn collect_draws(
        &self,
        top: Mat4,
        meshes: &SlotMap<MeshKey, MeshAsset>,
        materials: &MaterialRegistry,
        ctx: &mut DrawContext,
    ) {
        for node in &self.nodes {
            let Some(mesh) = node.mesh.and_then(|key| meshes.get(key)) else {
                continue;
            };
            let transform = top * node.world_transform;
            for surface in &mesh.surfaces {
                let Some(material) = materials.resolve(surface.material) else {
                    log::trace!("mesh `{}` surface has no material, skipped", mesh.name);
                    continue;
                };
                ctx.push(RenderObject {
                    index_count: surface.count,
                    first_index: surface.start_index,
                    index_buffer: mesh.buffers.index_buffer,
                    material: *material,
                    transform,
                    vertex_buffer_address: mesh.buffers.vertex_buffer_address,
                });
            }
        }
    }
}
