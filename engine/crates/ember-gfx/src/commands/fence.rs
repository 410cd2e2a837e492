use std::rc::Rc;

use ash::vk;

use crate::{error::GfxResult, foundation::device::GfxDevice};

/// # Destroy
/// 不实现 Drop，因为可以 Clone，需要手动 destroy
#[derive(Clone)]
pub struct GfxFence {
    device: Rc<dyn GfxDevice>,
    fence: vk::Fence,
}

// 创建与销毁
impl GfxFence {
    /// # param
    /// * signaled - 是否创建时就 signaled
    pub fn new(device: Rc<dyn GfxDevice>, signaled: bool, debug_name: &str) -> GfxResult<Self> {
        let fence = device.create_fence(signaled, debug_name)?;
        Ok(Self { device, fence })
    }

    #[inline]
    pub fn destroy(self) {
        self.device.destroy_fence(self.fence);
    }
}

// getters
impl GfxFence {
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

// tools
impl GfxFence {
    /// 阻塞等待 fence，超过 `timeout_ns` 返回 Timeout 错误
    #[inline]
    pub fn wait(&self, timeout_ns: u64) -> GfxResult<()> {
        self.device.wait_for_fence(self.fence, timeout_ns)
    }

    #[inline]
    pub fn reset(&self) -> GfxResult<()> {
        self.device.reset_fence(self.fence)
    }
}
