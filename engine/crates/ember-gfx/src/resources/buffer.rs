use ash::vk;

use crate::resources::allocation::AllocationKey;

/// buffer 的内存用途分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryUsage {
    /// 只在 GPU 上访问，device local
    GpuOnly,
    /// CPU 写入、GPU 读取，持久映射，例如每帧的 uniform
    CpuToGpu,
    /// GPU 写入、CPU 读取，持久映射，用于回读
    GpuToCpu,
    /// 上传数据用的中转 buffer，CPU 顺序写入
    Staging,
}

impl MemoryUsage {
    #[inline]
    pub fn is_host_visible(self) -> bool {
        !matches!(self, MemoryUsage::GpuOnly)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BufferDesc {
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    pub memory: MemoryUsage,
}

/// 由 [`crate::resources::allocator::GfxAllocator`] 创建的 buffer
///
/// 只是句柄与元数据，可以随意 Copy；销毁需要显式调用 allocator 或者放入 DeletionQueue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatedBuffer {
    pub(crate) vk_handle: vk::Buffer,
    pub(crate) allocation: AllocationKey,
    pub(crate) size: vk::DeviceSize,
    pub(crate) usage: vk::BufferUsageFlags,
    pub(crate) memory: MemoryUsage,
    pub(crate) device_address: Option<vk::DeviceAddress>,
}

// getters
impl AllocatedBuffer {
    #[inline]
    pub fn vk_buffer(&self) -> vk::Buffer {
        self.vk_handle
    }

    #[inline]
    pub fn allocation(&self) -> AllocationKey {
        self.allocation
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    #[inline]
    pub fn memory(&self) -> MemoryUsage {
        self.memory
    }

    /// 只有带 SHADER_DEVICE_ADDRESS usage 的 buffer 才有地址
    #[inline]
    pub fn device_address(&self) -> Option<vk::DeviceAddress> {
        self.device_address
    }
}
