use ash::vk;

use crate::{
    foundation::device::GfxDevice,
    resources::{buffer::AllocatedBuffer, image::AllocatedImage},
};

/// 一次延迟销毁请求
///
/// 按值保存句柄，而不是保存闭包
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposal {
    Buffer(AllocatedBuffer),
    Image(AllocatedImage),
    Sampler(vk::Sampler),
    DescriptorPool(vk::DescriptorPool),
    DescriptorSetLayout(vk::DescriptorSetLayout),
    Pipeline(vk::Pipeline),
    PipelineLayout(vk::PipelineLayout),
    ShaderModule(vk::ShaderModule),
    Fence(vk::Fence),
    Semaphore(vk::Semaphore),
    CommandPool(vk::CommandPool),
}

impl Disposal {
    pub fn dispose(self, device: &dyn GfxDevice) {
        match self {
            Disposal::Buffer(buffer) => device.destroy_buffer(&buffer),
            Disposal::Image(image) => device.destroy_image(&image),
            Disposal::Sampler(sampler) => device.destroy_sampler(sampler),
            Disposal::DescriptorPool(pool) => device.destroy_descriptor_pool(pool),
            Disposal::DescriptorSetLayout(layout) => device.destroy_descriptor_set_layout(layout),
            Disposal::Pipeline(pipeline) => device.destroy_pipeline(pipeline),
            Disposal::PipelineLayout(layout) => device.destroy_pipeline_layout(layout),
            Disposal::ShaderModule(module) => device.destroy_shader_module(module),
            Disposal::Fence(fence) => device.destroy_fence(fence),
            Disposal::Semaphore(semaphore) => device.destroy_semaphore(semaphore),
            Disposal::CommandPool(pool) => device.destroy_command_pool(pool),
        }
    }
}

impl From<AllocatedBuffer> for Disposal {
    fn from(buffer: AllocatedBuffer) -> Self {
        Disposal::Buffer(buffer)
    }
}

impl From<AllocatedImage> for Disposal {
    fn from(image: AllocatedImage) -> Self {
        Disposal::Image(image)
    }
}

/// 延迟销毁队列
///
/// flush 时按照插入的逆序销毁：后创建的资源可能依赖先创建的资源，需要先销毁。
/// 调用方需要保证 flush 时 GPU 不再使用这些资源（每帧的队列由 frame slot 的 fence 保证）。
#[derive(Default)]
pub struct DeletionQueue {
    pending: Vec<Disposal>,
}

impl DeletionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self, disposal: impl Into<Disposal>) {
        self.pending.push(disposal.into());
    }

    /// 逆序销毁所有的请求，返回销毁的数量；空队列什么也不做
    pub fn flush(&mut self, device: &dyn GfxDevice) -> usize {
        let count = self.pending.len();
        while let Some(disposal) = self.pending.pop() {
            disposal.dispose(device);
        }
        count
    }

    /// 丢弃所有请求但不销毁，对象交给调用方管理；返回丢弃的数量
    pub fn forget(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Drop for DeletionQueue {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            log::warn!("deletion queue dropped with {} pending disposals, GPU objects leaked", self.pending.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        headless::{GpuEvent, HeadlessDevice},
        resources::buffer::{BufferDesc, MemoryUsage},
    };

    fn buffer(device: &HeadlessDevice, name: &str) -> AllocatedBuffer {
        device
            .create_buffer(
                &BufferDesc {
                    size: 16,
                    usage: vk::BufferUsageFlags::UNIFORM_BUFFER,
                    memory: MemoryUsage::CpuToGpu,
                },
                name,
            )
            .unwrap()
    }

    #[test]
    fn flush_runs_in_reverse_order() {
        let device = HeadlessDevice::new();
        let a = buffer(&device, "a");
        let b = buffer(&device, "b");
        let c = buffer(&device, "c");

        let mut queue = DeletionQueue::new();
        queue.push(a);
        queue.push(b);
        queue.push(c);
        device.clear_events();

        assert_eq!(queue.flush(&device), 3);
        let destroyed = device
            .events()
            .into_iter()
            .filter_map(|e| match e {
                GpuEvent::BufferDestroyed { buffer } => Some(buffer),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(destroyed, vec![c.vk_buffer(), b.vk_buffer(), a.vk_buffer()]);

        // 第二次 flush 什么也不做
        device.clear_events();
        assert_eq!(queue.flush(&device), 0);
        assert!(device.events().is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn empty_flush_is_noop() {
        let device = HeadlessDevice::new();
        let mut queue = DeletionQueue::new();
        assert_eq!(queue.flush(&device), 0);
        assert!(device.events().is_empty());
    }

    #[test]
    fn forget_keeps_objects_alive() {
        let device = HeadlessDevice::new();
        let buf = buffer(&device, "kept");

        let mut queue = DeletionQueue::new();
        queue.push(buf);
        assert_eq!(queue.forget(), 1);
        assert_eq!(queue.flush(&device), 0);
        assert_eq!(device.live_buffer_count(), 1);

        device.destroy_buffer(&buf);
    }

    #[test]
    fn mixed_disposals_are_released() {
        let device = HeadlessDevice::new();
        let sampler = device.create_sampler(&crate::resources::sampler::SamplerDesc::LINEAR, "s").unwrap();
        let fence = device.create_fence(false, "f").unwrap();
        let buf = buffer(&device, "buf");

        let mut queue = DeletionQueue::new();
        queue.push(Disposal::Sampler(sampler));
        queue.push(Disposal::Fence(fence));
        queue.push(buf);
        assert_eq!(queue.len(), 3);
        queue.flush(&device);

        assert_eq!(device.live_object_count(), 0);
    }
}
