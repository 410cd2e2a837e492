use std::rc::Rc;

use ash::vk;

use crate::{commands::semaphore::GfxSemaphore, error::GfxResult, foundation::device::GfxDevice};

/// 期望的交换链参数，实际的 extent 由后端根据 surface capabilities 决定
#[derive(Debug, Clone, Copy)]
pub struct SwapchainDesc {
    pub extent: vk::Extent2D,
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
}

impl SwapchainDesc {
    pub fn new(extent: vk::Extent2D, present_mode: vk::PresentModeKHR) -> Self {
        Self {
            extent,
            format: vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            present_mode,
        }
    }
}

/// 后端创建出的交换链以及它的 images 与 views
#[derive(Debug, Clone)]
pub struct SwapchainImages {
    pub handle: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired { image_index: u32, suboptimal: bool },
    /// 交换链和 surface 不再匹配，需要重建；此时 semaphore 不会被 signal
    OutOfDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented { suboptimal: bool },
    OutOfDate,
}

impl PresentOutcome {
    /// suboptimal 也需要在下一帧重建
    #[inline]
    pub fn needs_recreate(&self) -> bool {
        !matches!(self, PresentOutcome::Presented { suboptimal: false })
    }
}

pub struct GfxRenderSwapchain {
    device: Rc<dyn GfxDevice>,
    inner: SwapchainImages,
    desc: SwapchainDesc,
    destroyed: bool,
}

// new & init
impl GfxRenderSwapchain {
    pub fn new(device: Rc<dyn GfxDevice>, desc: SwapchainDesc) -> GfxResult<Self> {
        let inner = device.create_swapchain(&desc, vk::SwapchainKHR::null())?;
        log::info!(
            "swapchain created: {}x{}, {} images, {:?}, {:?}",
            inner.extent.width,
            inner.extent.height,
            inner.images.len(),
            inner.format,
            desc.present_mode
        );
        Ok(Self {
            device,
            inner,
            desc,
            destroyed: false,
        })
    }

    /// 销毁旧的交换链，再按照新的 window extent 创建
    ///
    /// 调用方需要保证设备已经 idle
    pub fn recreate(&mut self, window_extent: vk::Extent2D) -> GfxResult<()> {
        self.device.destroy_swapchain(&self.inner);
        self.inner.handle = vk::SwapchainKHR::null();

        self.desc.extent = window_extent;
        self.inner = self.device.create_swapchain(&self.desc, vk::SwapchainKHR::null())?;
        log::info!(
            "swapchain recreated: {}x{}, {} images",
            self.inner.extent.width,
            self.inner.extent.height,
            self.inner.images.len()
        );
        Ok(())
    }
}

// getters
impl GfxRenderSwapchain {
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.inner.handle
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.inner.extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.inner.format
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.inner.images.len()
    }

    #[inline]
    pub fn image(&self, index: u32) -> vk::Image {
        self.inner.images[index as usize]
    }

    #[inline]
    pub fn image_view(&self, index: u32) -> vk::ImageView {
        self.inner.views[index as usize]
    }
}

// update
impl GfxRenderSwapchain {
    /// timeout: nano seconds
    pub fn acquire_next_image(&self, semaphore: &GfxSemaphore, timeout_ns: u64) -> GfxResult<AcquireOutcome> {
        let outcome = self.device.acquire_next_image(self.inner.handle, semaphore.handle(), timeout_ns)?;
        match outcome {
            AcquireOutcome::Acquired {
                image_index,
                suboptimal: true,
            } => log::warn!("swapchain acquire image index {} is not optimal", image_index),
            AcquireOutcome::OutOfDate => log::warn!("swapchain is out of date when acquire next image"),
            _ => {}
        }
        Ok(outcome)
    }

    pub fn present_image(&self, image_index: u32, wait_semaphore: &GfxSemaphore) -> GfxResult<PresentOutcome> {
        let outcome = self.device.queue_present(self.inner.handle, image_index, wait_semaphore.handle())?;
        match outcome {
            PresentOutcome::Presented { suboptimal: true } => {
                log::warn!("swapchain present image index {} is not optimal", image_index)
            }
            PresentOutcome::OutOfDate => log::warn!("swapchain is out of date when present image"),
            _ => {}
        }
        Ok(outcome)
    }
}

// destroy
impl GfxRenderSwapchain {
    pub fn destroy(mut self) {
        self.device.destroy_swapchain(&self.inner);
        self.destroyed = true;
    }
}
impl Drop for GfxRenderSwapchain {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            assert!(self.destroyed, "GfxRenderSwapchain must be destroyed manually before drop.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{GpuEvent, HeadlessDevice};

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn recreate_follows_window_extent() {
        let headless = Rc::new(HeadlessDevice::new());
        let mut swapchain =
            GfxRenderSwapchain::new(headless.clone(), SwapchainDesc::new(extent(800, 600), vk::PresentModeKHR::FIFO))
                .unwrap();
        assert_eq!(swapchain.extent(), extent(800, 600));
        let old = swapchain.handle();

        headless.set_surface_extent(extent(1024, 576));
        swapchain.recreate(extent(1024, 576)).unwrap();
        assert_eq!(swapchain.extent(), extent(1024, 576));
        assert_ne!(swapchain.handle(), old);

        let events = headless.events();
        let destroyed = events
            .iter()
            .position(|e| matches!(e, GpuEvent::SwapchainDestroyed { swapchain } if *swapchain == old))
            .unwrap();
        let created = events.iter().rposition(|e| matches!(e, GpuEvent::SwapchainCreated { .. })).unwrap();
        assert!(destroyed < created);

        swapchain.destroy();
    }

    #[test]
    fn present_outcome_recreate_rules() {
        assert!(!PresentOutcome::Presented { suboptimal: false }.needs_recreate());
        assert!(PresentOutcome::Presented { suboptimal: true }.needs_recreate());
        assert!(PresentOutcome::OutOfDate.needs_recreate());
    }
}
