use std::rc::Rc;

use ash::vk;

use crate::{error::GfxResult, foundation::device::GfxDevice};

/// command pool 是和 queue family 绑定的，这里固定使用 graphics queue family
pub struct GfxCommandPool {
    device: Rc<dyn GfxDevice>,
    handle: vk::CommandPool,
    debug_name: String,
}
// init & destroy
impl GfxCommandPool {
    pub fn new(device: Rc<dyn GfxDevice>, flags: vk::CommandPoolCreateFlags, debug_name: &str) -> GfxResult<Self> {
        let handle = device.create_command_pool(flags, debug_name)?;
        Ok(Self {
            device,
            handle,
            debug_name: debug_name.to_string(),
        })
    }

    /// pool 中分配的 command buffer 会一起被释放
    pub fn destroy(self) {
        self.device.destroy_command_pool(self.handle);
    }
}
// getters
impl GfxCommandPool {
    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.handle
    }

    #[inline]
    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }

    #[inline]
    pub fn device(&self) -> &Rc<dyn GfxDevice> {
        &self.device
    }
}
