use std::rc::Rc;

use ash::vk;

use crate::{error::GfxResult, foundation::device::GfxDevice};

/// binary semaphore
///
/// # Destroy
/// 不实现 Drop，因为可以 Clone，需要手动 destroy
#[derive(Clone)]
pub struct GfxSemaphore {
    device: Rc<dyn GfxDevice>,
    semaphore: vk::Semaphore,
}

// 创建与销毁
impl GfxSemaphore {
    pub fn new(device: Rc<dyn GfxDevice>, debug_name: &str) -> GfxResult<Self> {
        let semaphore = device.create_semaphore(debug_name)?;
        Ok(Self { device, semaphore })
    }

    #[inline]
    pub fn destroy(self) {
        self.device.destroy_semaphore(self.semaphore);
    }
}

// getters
impl GfxSemaphore {
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}
