use crate::resources::buffer::MemoryUsage;

/// vk-mem 分配出的一块内存
///
/// host visible 的内存在创建时就映射，整个生命周期内保持映射
pub(crate) struct AllocationRecord {
    pub allocation: vk_mem::Allocation,
    pub mapped: Option<*mut u8>,
    pub size: u64,
    pub name: String,
}

/// 不同用途的 buffer 对应的 vma 参数
pub(crate) fn allocation_create_info(memory: MemoryUsage) -> vk_mem::AllocationCreateInfo {
    let (usage, flags) = match memory {
        MemoryUsage::GpuOnly => (vk_mem::MemoryUsage::AutoPreferDevice, vk_mem::AllocationCreateFlags::empty()),
        // 例如每帧的 uniform，可能落在 ReBAR 上
        MemoryUsage::CpuToGpu => (
            vk_mem::MemoryUsage::AutoPreferDevice,
            vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE,
        ),
        MemoryUsage::Staging => (
            vk_mem::MemoryUsage::AutoPreferHost,
            vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE,
        ),
        MemoryUsage::GpuToCpu => {
            (vk_mem::MemoryUsage::AutoPreferHost, vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM)
        }
    };

    vk_mem::AllocationCreateInfo {
        usage,
        flags,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_visible_classes_request_host_access() {
        for memory in [MemoryUsage::CpuToGpu, MemoryUsage::Staging, MemoryUsage::GpuToCpu] {
            let info = allocation_create_info(memory);
            assert!(info.flags.intersects(
                vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE
                    | vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM
            ));
        }
        assert!(allocation_create_info(MemoryUsage::GpuOnly).flags.is_empty());
    }
}
