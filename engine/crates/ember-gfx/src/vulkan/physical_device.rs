use std::ffi::CStr;

use ash::vk;
use itertools::Itertools;

use crate::{
    error::{GfxError, GfxResult, VkResultExt},
    vulkan::surface::GfxSurface,
};

/// 表示一张物理显卡，以及它上面同时支持 graphics 与 present 的 queue family
pub struct GfxPhysicalDevice {
    pub(crate) vk_handle: vk::PhysicalDevice,
    pub(crate) basic_props: vk::PhysicalDeviceProperties,
    pub(crate) gfx_queue_family_index: u32,
}

impl GfxPhysicalDevice {
    /// 优先选择独立显卡，如果没有则选择第一个可用的显卡
    ///
    /// 显卡需要支持 Vulkan 1.3，并且有一个 queue family 同时支持 graphics 与 present
    pub fn select(instance: &ash::Instance, surface: &GfxSurface) -> GfxResult<Self> {
        let pdevices = unsafe { instance.enumerate_physical_devices() }.vk_context("vkEnumeratePhysicalDevices")?;

        pdevices
            .iter()
            .filter_map(|pdevice| Self::new(*pdevice, instance, surface))
            // 优先使用独立显卡
            .find_or_first(GfxPhysicalDevice::is_descrete_gpu)
            .ok_or_else(|| {
                GfxError::NoSuitableDevice(format!(
                    "{} gpus found, none supports vulkan 1.3 with graphics + present",
                    pdevices.len()
                ))
            })
    }

    fn new(pdevice: vk::PhysicalDevice, instance: &ash::Instance, surface: &GfxSurface) -> Option<Self> {
        let basic_props = unsafe { instance.get_physical_device_properties(pdevice) };
        let physical_device_name = basic_props.device_name_as_c_str().unwrap_or(c"unknown");
        log::info!("found gpu: {:?}", physical_device_name);

        if basic_props.api_version < vk::API_VERSION_1_3 {
            log::info!("gpu {:?} skipped: vulkan 1.3 is not supported", physical_device_name);
            return None;
        }

        let device_exts = unsafe { instance.enumerate_device_extension_properties(pdevice) }.ok()?;
        let has_swapchain =
            device_exts.iter().any(|ext| ext.extension_name_as_c_str() == Ok(ash::khr::swapchain::NAME));
        if !has_swapchain {
            log::info!("gpu {:?} skipped: no swapchain extension", physical_device_name);
            return None;
        }

        // 全能的 Queue：graphics, compute, transfer，同时需要能够 present
        let queue_family_props = unsafe { instance.get_physical_device_queue_family_properties(pdevice) };
        log::debug!("physical device: queue family props:\n{:#?}", queue_family_props);
        let gfx_queue_family_index = queue_family_props
            .iter()
            .enumerate()
            .find(|(family_idx, props)| {
                props.queue_flags.contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
                    && surface.supports_queue_family(pdevice, *family_idx as u32)
            })
            .map(|(family_idx, _)| family_idx as u32)?;

        Some(Self {
            vk_handle: pdevice,
            basic_props,
            gfx_queue_family_index,
        })
    }

    #[inline]
    /// 当前 gpu 是否是独立显卡
    pub fn is_descrete_gpu(&self) -> bool {
        self.basic_props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU
    }

    #[inline]
    pub fn name(&self) -> &CStr {
        self.basic_props.device_name_as_c_str().unwrap_or(c"unknown")
    }
}
