use std::rc::Rc;

use ash::vk;
use ember_gfx::{
    commands::{
        command_buffer::GfxCommandBuffer, command_pool::GfxCommandPool, fence::GfxFence, semaphore::GfxSemaphore,
    },
    deletion_queue::DeletionQueue,
    descriptors::growable_allocator::{DescriptorAllocatorGrowable, PoolSizeRatio},
    error::GfxResult,
    foundation::device::GfxDevice,
};

/// 每个 frame slot 的 descriptor 类型比例
const FRAME_POOL_RATIOS: [PoolSizeRatio; 4] = [
    PoolSizeRatio::new(vk::DescriptorType::STORAGE_IMAGE, 3.0),
    PoolSizeRatio::new(vk::DescriptorType::STORAGE_BUFFER, 3.0),
    PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 3.0),
    PoolSizeRatio::new(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 4.0),
];

/// 一个 frame in flight 独占的资源
///
/// slot *k* 的资源只有在下一次轮到 slot *k* 并且 fence 等待结束之后才会被回收，
/// 因此录制时放进 deletion queue 或者从 descriptor 分配器取出的对象在整帧的 GPU 执行期间都有效。
pub struct FrameSlot {
    device: Rc<dyn GfxDevice>,
    label: char,

    command_pool: GfxCommandPool,
    command_buffer: GfxCommandBuffer,

    /// acquire 交换链图像时 signal，submit 时 wait
    image_acquired: GfxSemaphore,
    /// submit 时 signal，present 时 wait
    render_finished: GfxSemaphore,
    /// 创建时就是 signaled，第一次等待不会阻塞
    in_flight: GfxFence,

    deletion_queue: DeletionQueue,
    descriptors: DescriptorAllocatorGrowable,

    destroyed: bool,
}

// new & init
impl FrameSlot {
    pub fn new(device: Rc<dyn GfxDevice>, label: char, frame_max_sets: u32, pool_growth_cap: u32) -> GfxResult<Self> {
        let name = format!("frame-{label}");
        let command_pool =
            GfxCommandPool::new(device.clone(), vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER, &name)?;
        let command_buffer = GfxCommandBuffer::new(device.clone(), &command_pool, &name)?;
        let image_acquired = GfxSemaphore::new(device.clone(), &format!("{name}-image-acquired"))?;
        let render_finished = GfxSemaphore::new(device.clone(), &format!("{name}-render-finished"))?;
        let in_flight = GfxFence::new(device.clone(), true, &format!("{name}-in-flight"))?;
        let descriptors = DescriptorAllocatorGrowable::new_with_cap(
            device.clone(),
            frame_max_sets,
            &FRAME_POOL_RATIOS,
            pool_growth_cap,
            &format!("{name}-descriptors"),
        )?;

        Ok(Self {
            device,
            label,
            command_pool,
            command_buffer,
            image_acquired,
            render_finished,
            in_flight,
            deletion_queue: DeletionQueue::new(),
            descriptors,
            destroyed: false,
        })
    }
}

// getters
impl FrameSlot {
    #[inline]
    pub fn label(&self) -> char {
        self.label
    }

    #[inline]
    pub fn command_buffer(&self) -> &GfxCommandBuffer {
        &self.command_buffer
    }

    #[inline]
    pub fn image_acquired(&self) -> &GfxSemaphore {
        &self.image_acquired
    }

    #[inline]
    pub fn render_finished(&self) -> &GfxSemaphore {
        &self.render_finished
    }

    #[inline]
    pub fn in_flight_fence(&self) -> &GfxFence {
        &self.in_flight
    }

    #[inline]
    pub fn deletion_queue(&self) -> &DeletionQueue {
        &self.deletion_queue
    }

    #[inline]
    pub fn deletion_queue_mut(&mut self) -> &mut DeletionQueue {
        &mut self.deletion_queue
    }

    #[inline]
    pub fn descriptors(&self) -> &DescriptorAllocatorGrowable {
        &self.descriptors
    }

    /// 录制期间可以同时使用的两个每帧资源
    #[inline]
    pub fn frame_resources_mut(&mut self) -> (&mut DeletionQueue, &mut DescriptorAllocatorGrowable) {
        (&mut self.deletion_queue, &mut self.descriptors)
    }
}

// update
impl FrameSlot {
    /// 回收上一次使用该 slot 时留下的资源，必须在 fence 等待之后调用
    pub fn reclaim(&mut self) -> GfxResult<()> {
        let disposed = self.deletion_queue.flush(self.device.as_ref());
        if disposed > 0 {
            log::trace!("frame slot {}: disposed {} deferred objects", self.label, disposed);
        }
        self.descriptors.clear_pools()
    }
}

// destroy
impl FrameSlot {
    /// 调用方需要保证设备已经 idle
    pub fn destroy(mut self) {
        self.deletion_queue.flush(self.device.as_ref());
        self.descriptors.destroy_pools();
        // 实现了 Drop，不能把字段 move 出来，直接通过 device 销毁
        self.device.destroy_fence(self.in_flight.handle());
        self.device.destroy_semaphore(self.image_acquired.handle());
        self.device.destroy_semaphore(self.render_finished.handle());
        // command buffer 随 pool 一起释放
        self.device.destroy_command_pool(self.command_pool.handle());
        self.destroyed = true;
    }
}

impl Drop for FrameSlot {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            debug_assert!(self.destroyed, "FrameSlot must be destroyed manually before drop.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_gfx::headless::HeadlessDevice;

    #[test]
    fn destroy_releases_everything() {
        let headless = Rc::new(HeadlessDevice::new());
        let device: Rc<dyn GfxDevice> = headless.clone();
        let slot = FrameSlot::new(device, 'A', 16, 4092).unwrap();
        assert_eq!(headless.is_fence_signaled(slot.in_flight_fence().handle()), Some(true));
        assert_eq!(slot.descriptors().created_pool_count(), 1);

        slot.destroy();
        assert_eq!(headless.live_object_count(), 0);
        assert!(headless.validation_errors().is_empty());
    }
}
