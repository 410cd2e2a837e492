use ash::vk;

use crate::{error::GfxResult, foundation::device::GfxDevice};

/// 一次 descriptor 写入
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorWrite {
    Buffer {
        binding: u32,
        descriptor_type: vk::DescriptorType,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    },
    Image {
        binding: u32,
        descriptor_type: vk::DescriptorType,
        view: vk::ImageView,
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
    },
}

impl DescriptorWrite {
    #[inline]
    pub fn binding(&self) -> u32 {
        match self {
            DescriptorWrite::Buffer { binding, .. } | DescriptorWrite::Image { binding, .. } => *binding,
        }
    }

    #[inline]
    pub fn descriptor_type(&self) -> vk::DescriptorType {
        match self {
            DescriptorWrite::Buffer { descriptor_type, .. } | DescriptorWrite::Image { descriptor_type, .. } => {
                *descriptor_type
            }
        }
    }
}

/// 收集若干次写入，最后一次性更新到某个 descriptor set
#[derive(Default)]
pub struct DescriptorWriter {
    writes: Vec<DescriptorWrite>,
}

impl DescriptorWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 支持 UNIFORM_BUFFER / STORAGE_BUFFER 及其 DYNAMIC 版本
    pub fn write_buffer(
        &mut self,
        binding: u32,
        buffer: vk::Buffer,
        size: vk::DeviceSize,
        offset: vk::DeviceSize,
        descriptor_type: vk::DescriptorType,
    ) -> &mut Self {
        self.writes.push(DescriptorWrite::Buffer {
            binding,
            descriptor_type,
            buffer,
            offset,
            range: size,
        });
        self
    }

    /// 支持 SAMPLER / SAMPLED_IMAGE / STORAGE_IMAGE / COMBINED_IMAGE_SAMPLER
    pub fn write_image(
        &mut self,
        binding: u32,
        view: vk::ImageView,
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
        descriptor_type: vk::DescriptorType,
    ) -> &mut Self {
        self.writes.push(DescriptorWrite::Image {
            binding,
            descriptor_type,
            view,
            sampler,
            layout,
        });
        self
    }

    #[inline]
    pub fn clear(&mut self) {
        self.writes.clear();
    }

    #[inline]
    pub fn writes(&self) -> &[DescriptorWrite] {
        &self.writes
    }

    pub fn update_set(&self, device: &dyn GfxDevice, set: vk::DescriptorSet) -> GfxResult<()> {
        device.update_descriptor_set(set, &self.writes)
    }
}
