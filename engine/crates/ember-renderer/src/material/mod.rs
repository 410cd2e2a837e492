//! 材质：管线、descriptor set 与常量数据
//!
//! 每个材质实例引用一对 pipeline/layout 以及一个 material descriptor set（set 1）：
//! - binding 0：[`MaterialConstants`] uniform
//! - binding 1：颜色贴图
//! - binding 2：metal-rough 贴图

pub mod metallic_roughness;
pub mod registry;

use ash::vk;
use glam::Vec4;

/// 材质绘制在哪个 pass 中
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MaterialPass {
    #[default]
    MainColor,
    Transparent,
    Other,
}

/// material uniform 的内容，补齐到 256 字节以满足 uniform buffer offset 对齐
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialConstants {
    pub color_factors: Vec4,
    pub metal_rough_factors: Vec4,
    pub extra: [Vec4; 14],
}

impl Default for MaterialConstants {
    fn default() -> Self {
        Self {
            color_factors: Vec4::ONE,
            metal_rough_factors: Vec4::new(1.0, 0.5, 0.0, 0.0),
            extra: [Vec4::ZERO; 14],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialInstance {
    pub pipeline: MaterialPipeline,
    pub material_set: vk::DescriptorSet,
    pub pass: MaterialPass,
}

/// 写入 material descriptor set 的资源，调用方负责它们的生命周期
#[derive(Debug, Clone, Copy)]
pub struct MaterialResources {
    pub color_image: vk::ImageView,
    pub color_sampler: vk::Sampler,
    pub metal_rough_image: vk::ImageView,
    pub metal_rough_sampler: vk::Sampler,
    pub data_buffer: vk::Buffer,
    pub data_buffer_offset: vk::DeviceSize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_fill_uniform_alignment() {
        assert_eq!(size_of::<MaterialConstants>(), 256);
    }
}
