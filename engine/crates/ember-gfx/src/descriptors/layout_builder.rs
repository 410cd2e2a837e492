use ash::vk;

use crate::{error::GfxResult, foundation::device::GfxDevice};

/// 逐个添加 binding，最后统一指定 shader stage 创建 descriptor set layout
///
/// 每个 binding 的 descriptor count 固定为 1
#[derive(Default)]
pub struct DescriptorLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'static>>,
}

impl DescriptorLayoutBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// builder
    #[inline]
    pub fn add_binding(mut self, binding: u32, descriptor_type: vk::DescriptorType) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(1),
        );
        self
    }

    #[inline]
    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    #[inline]
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding<'static>] {
        &self.bindings
    }

    /// 所有 binding 都对 `stages` 可见
    pub fn build(
        &self,
        device: &dyn GfxDevice,
        stages: vk::ShaderStageFlags,
        flags: vk::DescriptorSetLayoutCreateFlags,
        debug_name: &str,
    ) -> GfxResult<vk::DescriptorSetLayout> {
        let bindings = self
            .bindings
            .iter()
            .map(|binding| {
                let mut binding = *binding;
                binding.stage_flags |= stages;
                binding
            })
            .collect::<Vec<_>>();
        device.create_descriptor_set_layout(&bindings, flags, debug_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessDevice;

    #[test]
    fn build_applies_stage_flags() {
        let device = HeadlessDevice::new();
        let builder = DescriptorLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER)
            .add_binding(1, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        let layout = builder
            .build(
                &device,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                vk::DescriptorSetLayoutCreateFlags::empty(),
                "material",
            )
            .unwrap();

        let bindings = device.layout_bindings(layout).unwrap();
        assert_eq!(
            bindings,
            vec![
                (vk::DescriptorType::UNIFORM_BUFFER, 1),
                (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1)
            ]
        );
        // builder 自身不被修改
        assert!(builder.bindings().iter().all(|b| b.stage_flags.is_empty()));
        device.destroy_descriptor_set_layout(layout);
    }

    #[test]
    fn clear_removes_bindings() {
        let mut builder = DescriptorLayoutBuilder::new().add_binding(0, vk::DescriptorType::STORAGE_IMAGE);
        builder.clear();
        assert!(builder.bindings().is_empty());
    }
}
