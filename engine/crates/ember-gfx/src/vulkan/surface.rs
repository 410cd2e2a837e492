use ash::vk;

use crate::error::{GfxResult, VkResultExt};

pub struct GfxSurface {
    pub(crate) handle: vk::SurfaceKHR,
    pub(crate) pf: ash::khr::surface::Instance,
}

// new & init
impl GfxSurface {
    pub fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        raw_display_handle: raw_window_handle::RawDisplayHandle,
        raw_window_handle: raw_window_handle::RawWindowHandle,
    ) -> GfxResult<Self> {
        let pf = ash::khr::surface::Instance::new(entry, instance);
        let handle =
            unsafe { ash_window::create_surface(entry, instance, raw_display_handle, raw_window_handle, None) }
                .vk_context("ash_window::create_surface")?;

        Ok(Self { handle, pf })
    }
}

// getters
impl GfxSurface {
    pub fn capabilities(&self, pdevice: vk::PhysicalDevice) -> GfxResult<vk::SurfaceCapabilitiesKHR> {
        unsafe { self.pf.get_physical_device_surface_capabilities(pdevice, self.handle) }
            .vk_context("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")
    }

    pub fn present_modes(&self, pdevice: vk::PhysicalDevice) -> GfxResult<Vec<vk::PresentModeKHR>> {
        unsafe { self.pf.get_physical_device_surface_present_modes(pdevice, self.handle) }
            .vk_context("vkGetPhysicalDeviceSurfacePresentModesKHR")
    }

    pub fn formats(&self, pdevice: vk::PhysicalDevice) -> GfxResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe { self.pf.get_physical_device_surface_formats(pdevice, self.handle) }
            .vk_context("vkGetPhysicalDeviceSurfaceFormatsKHR")
    }

    pub fn supports_queue_family(&self, pdevice: vk::PhysicalDevice, queue_family_index: u32) -> bool {
        unsafe { self.pf.get_physical_device_surface_support(pdevice, queue_family_index, self.handle) }
            .unwrap_or(false)
    }
}

// tools
impl GfxSurface {
    /// 确定交换链的 extent 尺寸
    ///
    /// 如果 surface_capabilities.current_extent 包含特殊值 0xFFFFFFFF，则表示可以自己设置交换链的 extent
    pub fn calculate_swapchain_extent(
        surface_capabilities: &vk::SurfaceCapabilitiesKHR,
        window_physical_extent: vk::Extent2D,
    ) -> vk::Extent2D {
        let surface_extent = surface_capabilities.current_extent;
        if surface_extent.width == u32::MAX || surface_extent.height == u32::MAX {
            let width = window_physical_extent
                .width
                .clamp(surface_capabilities.min_image_extent.width, surface_capabilities.max_image_extent.width);
            let height = window_physical_extent
                .height
                .clamp(surface_capabilities.min_image_extent.height, surface_capabilities.max_image_extent.height);
            vk::Extent2D { width, height }
        } else {
            surface_extent
        }
    }

    /// max_image_count == 0 表示不限制 image 数量
    pub fn swapchain_image_count(surface_capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
        if surface_capabilities.max_image_count == 0 {
            surface_capabilities.min_image_count + 1
        } else {
            u32::min(surface_capabilities.max_image_count, surface_capabilities.min_image_count + 1)
        }
    }
}

// destroy
impl GfxSurface {
    pub fn destroy(self) {
        log::info!("destroying surface");
        unsafe { self.pf.destroy_surface(self.handle, None) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(current: (u32, u32), min_count: u32, max_count: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 2048,
            },
            min_image_count: min_count,
            max_image_count: max_count,
            ..Default::default()
        }
    }

    #[test]
    fn fixed_surface_extent_wins() {
        let extent =
            GfxSurface::calculate_swapchain_extent(&caps((800, 600), 2, 3), vk::Extent2D { width: 1, height: 1 });
        assert_eq!(extent, vk::Extent2D { width: 800, height: 600 });
    }

    #[test]
    fn window_extent_is_clamped() {
        let extent = GfxSurface::calculate_swapchain_extent(
            &caps((u32::MAX, u32::MAX), 2, 3),
            vk::Extent2D {
                width: 8000,
                height: 0,
            },
        );
        assert_eq!(
            extent,
            vk::Extent2D {
                width: 4096,
                height: 1
            }
        );
    }

    #[test]
    fn image_count_is_min_plus_one_bounded_by_max() {
        assert_eq!(GfxSurface::swapchain_image_count(&caps((1, 1), 2, 0)), 3);
        assert_eq!(GfxSurface::swapchain_image_count(&caps((1, 1), 2, 2)), 2);
        assert_eq!(GfxSurface::swapchain_image_count(&caps((1, 1), 3, 8)), 4);
    }
}
