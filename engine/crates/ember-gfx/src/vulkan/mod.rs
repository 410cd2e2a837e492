//! 基于 ash + vk-mem 的 [`GfxDevice`] 实现
//!
//! - Vulkan 1.3：synchronization2、dynamic rendering、buffer device address
//! - 一个同时支持 graphics 与 present 的队列
//! - 持有窗口的 surface，交换链通过 [`GfxDevice::create_swapchain`] 创建

mod debug_messenger;
mod device_impl;
mod instance;
mod memory;
mod physical_device;
mod surface;

use std::{cell::RefCell, ffi::CString, mem::ManuallyDrop};

use ash::vk;
use slotmap::SlotMap;

use crate::{
    error::{GfxResult, VkResultExt},
    foundation::device::GfxDevice,
    resources::allocation::AllocationKey,
    vulkan::{
        debug_messenger::GfxDebugMsger, memory::AllocationRecord, physical_device::GfxPhysicalDevice,
        surface::GfxSurface,
    },
};

pub struct VulkanDevice {
    /// vk 基础函数的接口
    ///
    /// 在 drop 之后，会卸载 dll，因此需要确保该字段最后 drop
    _entry: ash::Entry,
    instance: ash::Instance,
    debug_msger: Option<GfxDebugMsger>,
    surface: ManuallyDrop<GfxSurface>,
    physical_device: GfxPhysicalDevice,

    device: ash::Device,
    swapchain_pf: ash::khr::swapchain::Device,
    debug_utils: Option<ash::ext::debug_utils::Device>,

    gfx_queue: vk::Queue,

    /// 需要在 device 之前销毁
    allocator: ManuallyDrop<vk_mem::Allocator>,
    allocations: RefCell<SlotMap<AllocationKey, AllocationRecord>>,
}

// new & init
impl VulkanDevice {
    pub fn new(
        app_name: &str,
        validation: bool,
        raw_display_handle: raw_window_handle::RawDisplayHandle,
        raw_window_handle: raw_window_handle::RawWindowHandle,
    ) -> GfxResult<Self> {
        let entry = unsafe { ash::Entry::load() }?;
        let instance = instance::create_instance(&entry, app_name, validation, raw_display_handle)?;
        let debug_msger = if validation { Some(GfxDebugMsger::new(&entry, &instance)?) } else { None };
        let surface = GfxSurface::new(&entry, &instance, raw_display_handle, raw_window_handle)?;

        let physical_device = GfxPhysicalDevice::select(&instance, &surface)?;
        log::info!("selected gpu: {:?}", physical_device.name());

        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(physical_device.gfx_queue_family_index)
            .queue_priorities(&[1.0])];

        let device_exts = [ash::khr::swapchain::NAME.as_ptr()];
        let mut features13 =
            vk::PhysicalDeviceVulkan13Features::default().synchronization2(true).dynamic_rendering(true);
        let mut features12 = vk::PhysicalDeviceVulkan12Features::default()
            .buffer_device_address(true)
            .descriptor_indexing(true)
            .scalar_block_layout(true);
        let mut all_features = vk::PhysicalDeviceFeatures2::default()
            .features(vk::PhysicalDeviceFeatures::default().shader_int64(true))
            .push_next(&mut features12)
            .push_next(&mut features13);

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&device_exts)
            .push_next(&mut all_features);
        let device = unsafe { instance.create_device(physical_device.vk_handle, &device_create_info, None) }
            .vk_context("vkCreateDevice")?;

        let swapchain_pf = ash::khr::swapchain::Device::new(&instance, &device);
        let debug_utils = validation.then(|| ash::ext::debug_utils::Device::new(&instance, &device));
        let gfx_queue = unsafe { device.get_device_queue(physical_device.gfx_queue_family_index, 0) };

        // vma 需要引用 instance 与 device，因此在其他部分初始化完成之后再创建
        let mut vma_ci = vk_mem::AllocatorCreateInfo::new(&instance, &device, physical_device.vk_handle);
        vma_ci.vulkan_api_version = vk::API_VERSION_1_3;
        vma_ci.flags = vk_mem::AllocatorCreateFlags::BUFFER_DEVICE_ADDRESS;
        let allocator = unsafe { vk_mem::Allocator::new(vma_ci) }.vk_context("vmaCreateAllocator")?;

        let device = Self {
            _entry: entry,
            instance,
            debug_msger,
            surface: ManuallyDrop::new(surface),
            physical_device,
            device,
            swapchain_pf,
            debug_utils,
            gfx_queue,
            allocator: ManuallyDrop::new(allocator),
            allocations: RefCell::new(SlotMap::with_key()),
        };
        device.set_object_debug_name(device.device.handle(), "ember-device");
        device.set_object_debug_name(device.gfx_queue, "gfx-queue");
        log::info!("vulkan device ready, gfx queue family {}", device.physical_device.gfx_queue_family_index);

        Ok(device)
    }
}

// getters
impl VulkanDevice {
    #[inline]
    pub fn ash_device(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn gfx_queue_family_index(&self) -> u32 {
        self.physical_device.gfx_queue_family_index
    }

    /// 当前 surface 支持的 present mode
    pub fn supported_present_modes(&self) -> GfxResult<Vec<vk::PresentModeKHR>> {
        self.surface.present_modes(self.physical_device.vk_handle)
    }
}

// tools
impl VulkanDevice {
    /// 只有开启 validation 时才会设置 debug name
    pub fn set_object_debug_name<T: vk::Handle + Copy>(&self, handle: T, name: &str) {
        let Some(debug_utils) = &self.debug_utils else { return };
        let Ok(name) = CString::new(name) else { return };
        let result = unsafe {
            debug_utils.set_debug_utils_object_name(
                &vk::DebugUtilsObjectNameInfoEXT::default().object_name(name.as_c_str()).object_handle(handle),
            )
        };
        if let Err(e) = result {
            log::warn!("failed to set debug name {:?}: {:?}", name, e);
        }
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("destroying vulkan device");
        if let Err(e) = self.wait_idle() {
            log::error!("wait idle before destroying device failed: {}", e);
        }

        let leaked = self.allocations.borrow().len();
        if leaked > 0 {
            log::warn!("{} allocations are still alive when the device is destroyed", leaked);
        }

        unsafe {
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
            if let Some(debug_msger) = self.debug_msger.take() {
                debug_msger.destroy();
            }
            ManuallyDrop::take(&mut self.surface).destroy();
            self.instance.destroy_instance(None);
        }
    }
}
