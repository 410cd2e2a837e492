use ash::vk;
use ember_gfx::resources::buffer::AllocatedBuffer;
use glam::Mat4;

use crate::material::{MaterialInstance, MaterialPass};

/// 一个 draw call 需要的全部信息
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderObject {
    pub index_count: u32,
    pub first_index: u32,
    pub index_buffer: AllocatedBuffer,

    pub material: MaterialInstance,

    pub transform: Mat4,
    pub vertex_buffer_address: vk::DeviceAddress,
}

impl RenderObject {
    /// opaque 绘制的排序键：尽量减少 pipeline、material set 与 index buffer 的切换
    #[inline]
    pub fn sort_key(&self) -> (vk::Pipeline, vk::DescriptorSet, vk::Buffer) {
        (
            self.material.pipeline.pipeline,
            self.material.material_set,
            self.index_buffer.vk_buffer(),
        )
    }
}

/// 每帧从场景中收集的绘制列表
#[derive(Default)]
pub struct DrawContext {
    pub opaque_surfaces: Vec<RenderObject>,
    pub transparent_surfaces: Vec<RenderObject>,
}

impl DrawContext {
    pub fn push(&mut self, object: RenderObject) {
        match object.material.pass {
            MaterialPass::Transparent => self.transparent_surfaces.push(object),
            MaterialPass::MainColor | MaterialPass::Other => self.opaque_surfaces.push(object),
        }
    }

    /// 保留容量，下一帧复用
    pub fn clear(&mut self) {
        self.opaque_surfaces.clear();
        self.transparent_surfaces.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.opaque_surfaces.len() + self.transparent_surfaces.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
