use ash::vk;
use ember_gfx::{
    deletion_queue::DeletionQueue,
    descriptors::growable_allocator::DescriptorAllocatorGrowable,
    error::GfxResult,
    resources::{allocator::GfxAllocator, buffer::MemoryUsage},
};
use slotmap::{SlotMap, new_key_type};

use crate::{
    default_resources::DefaultResources,
    material::{
        MaterialConstants, MaterialInstance, MaterialPass, MaterialResources, metallic_roughness::MetallicRoughness,
    },
};

new_key_type! { pub struct MaterialKey; }

/// 所有材质实例
///
/// 实例只是句柄：material set 属于全局 descriptor 分配器，常量 buffer 属于主删除队列
#[derive(Default)]
pub struct MaterialRegistry {
    materials: SlotMap<MaterialKey, MaterialInstance>,
    default_material: Option<MaterialKey>,
}

// new & init
impl MaterialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 白色贴图 + 线性采样 + 默认常量的不透明材质
    pub fn build_default(
        &mut self,
        allocator: &GfxAllocator,
        metal_rough: &mut MetallicRoughness,
        defaults: &DefaultResources,
        descriptors: &mut DescriptorAllocatorGrowable,
        deletion_queue: &mut DeletionQueue,
    ) -> GfxResult<MaterialKey> {
        let constants = MaterialConstants::default();
        let constants_buffer = allocator.create_buffer(
            size_of::<MaterialConstants>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            MemoryUsage::CpuToGpu,
            "default-material-constants",
        )?;
        deletion_queue.push(constants_buffer);
        allocator.write_buffer(&constants_buffer, 0, bytemuck::bytes_of(&constants))?;

        let resources = MaterialResources {
            color_image: defaults.white.view(),
            color_sampler: defaults.linear_sampler,
            metal_rough_image: defaults.white.view(),
            metal_rough_sampler: defaults.linear_sampler,
            data_buffer: constants_buffer.vk_buffer(),
            data_buffer_offset: 0,
        };
        let instance = metal_rough.write_material(MaterialPass::MainColor, &resources, descriptors)?;

        let key = self.insert(instance);
        self.default_material = Some(key);
        Ok(key)
    }
}

// getters
impl MaterialRegistry {
    #[inline]
    pub fn get(&self, key: MaterialKey) -> Option<&MaterialInstance> {
        self.materials.get(key)
    }

    #[inline]
    pub fn default_material(&self) -> Option<MaterialKey> {
        self.default_material
    }

    /// `None` 或者已经移除的 key 都回退到默认材质
    pub fn resolve(&self, key: Option<MaterialKey>) -> Option<&MaterialInstance> {
        key.and_then(|key| self.materials.get(key))
            .or_else(|| self.default_material.and_then(|key| self.materials.get(key)))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.materials.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

// update
impl MaterialRegistry {
    #[inline]
    pub fn insert(&mut self, instance: MaterialInstance) -> MaterialKey {
        self.materials.insert(instance)
    }

    pub fn remove(&mut self, key: MaterialKey) -> Option<MaterialInstance> {
        if self.default_material == Some(key) {
            self.default_material = None;
        }
        self.materials.remove(key)
    }

    pub fn clear(&mut self) {
        self.materials.clear();
        self.default_material = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        material::MaterialPipeline,
        test_utils::{fake_spirv, headless_device},
    };
    use ash::vk::Handle;
    use ember_gfx::{
        commands::immediate::ImmediateSubmit, descriptors::growable_allocator::PoolSizeRatio,
        descriptors::layout_builder::DescriptorLayoutBuilder, foundation::device::GfxDevice,
    };

    fn instance(raw: u64, pass: MaterialPass) -> MaterialInstance {
        MaterialInstance {
            pipeline: MaterialPipeline {
                pipeline: vk::Pipeline::from_raw(raw),
                layout: vk::PipelineLayout::from_raw(raw),
            },
            material_set: vk::DescriptorSet::from_raw(raw),
            pass,
        }
    }

    #[test]
    fn resolve_falls_back_to_default() {
        let mut registry = MaterialRegistry::new();
        assert!(registry.resolve(None).is_none());

        let default = registry.insert(instance(1, MaterialPass::MainColor));
        registry.default_material = Some(default);
        let glass = registry.insert(instance(2, MaterialPass::Transparent));

        assert_eq!(registry.resolve(Some(glass)).unwrap().pass, MaterialPass::Transparent);
        assert_eq!(registry.resolve(None).unwrap().material_set, vk::DescriptorSet::from_raw(1));

        registry.remove(glass);
        assert_eq!(registry.resolve(Some(glass)).unwrap().material_set, vk::DescriptorSet::from_raw(1));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn default_material_uses_white_texture() {
        let (headless, device) = headless_device();
        let allocator = GfxAllocator::new(device.clone());
        let immediate = ImmediateSubmit::new(device.clone(), u64::MAX).unwrap();
        let defaults = DefaultResources::new(&allocator, &immediate).unwrap();

        let scene_layout = DescriptorLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER)
            .build(
                device.as_ref(),
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                vk::DescriptorSetLayoutCreateFlags::empty(),
                "scene",
            )
            .unwrap();
        let mut metal_rough = MetallicRoughness::build_pipelines(
            device.clone(),
            &fake_spirv(),
            &fake_spirv(),
            scene_layout,
            vk::Format::R16G16B16A16_SFLOAT,
            vk::Format::D32_SFLOAT,
        )
        .unwrap();
        let mut descriptors = DescriptorAllocatorGrowable::new(
            device.clone(),
            2,
            &[
                PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 1.0),
                PoolSizeRatio::new(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 2.0),
            ],
            "global",
        )
        .unwrap();
        let mut deletion_queue = DeletionQueue::new();

        let mut registry = MaterialRegistry::new();
        let key = registry
            .build_default(&allocator, &mut metal_rough, &defaults, &mut descriptors, &mut deletion_queue)
            .unwrap();
        assert_eq!(registry.default_material(), Some(key));
        let material = registry.resolve(None).unwrap();
        assert_eq!(material.pipeline, metal_rough.opaque());
        assert!(headless.is_descriptor_set_valid(material.material_set));
        assert_eq!(deletion_queue.len(), 1);

        defaults.push_to(&mut deletion_queue);
        deletion_queue.flush(device.as_ref());
        descriptors.destroy_pools();
        metal_rough.destroy();
        device.destroy_descriptor_set_layout(scene_layout);
        immediate.destroy();
        assert_eq!(headless.live_object_count(), 0);
        assert!(headless.validation_errors().is_empty(), "{:?}", headless.validation_errors());
    }
}
