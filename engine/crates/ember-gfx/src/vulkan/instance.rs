use std::{
    collections::HashSet,
    ffi::{CStr, CString, c_char},
};

use ash::vk;
use itertools::Itertools;

use crate::{
    error::{GfxError, GfxResult, VkResultExt},
    vulkan::debug_messenger::GfxDebugMsger,
};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// 设置所需的 layers 和 extensions，创建 vk instance
///
/// `validation` 为 true 时开启 validation layer 与 debug utils；layer 缺失时只给出警告
pub fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    validation: bool,
    display_handle: raw_window_handle::RawDisplayHandle,
) -> GfxResult<ash::Instance> {
    let app_name = CString::new(app_name).map_err(|e| GfxError::InvalidArgument(e.to_string()))?;
    let app_info = vk::ApplicationInfo::default()
        .api_version(vk::API_VERSION_1_3) // 版本过低时，有些函数无法正确加载
        .application_name(app_name.as_c_str())
        .application_version(vk::make_api_version(0, 1, 0, 0))
        .engine_name(c"Ember")
        .engine_version(vk::make_api_version(0, 1, 0, 0));

    // surface 需要的 extensions 由 ash-window 根据窗口系统给出
    let surface_exts = ash_window::enumerate_required_extensions(display_handle)
        .vk_context("ash_window::enumerate_required_extensions")?
        .iter()
        .map(|ext| unsafe { CStr::from_ptr(*ext) })
        .collect_vec();

    let mut required_exts = surface_exts;
    if validation {
        required_exts.push(vk::EXT_DEBUG_UTILS_NAME);
    }
    let enabled_exts = enabled_extensions(entry, &required_exts)?;
    log::info!(
        "instance extensions: {}",
        enabled_exts.iter().map(|ext| format!("\n\t{:?}", unsafe { CStr::from_ptr(*ext) })).join("")
    );

    let enabled_layers = if validation { enabled_layers(entry)? } else { vec![] };
    log::info!(
        "instance layers: {}",
        enabled_layers.iter().map(|layer| format!("\n\t{:?}", unsafe { CStr::from_ptr(*layer) })).join("")
    );

    let mut instance_ci = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&enabled_exts)
        .enabled_layer_names(&enabled_layers);

    // 为 instance info 添加 debug messenger
    let mut debug_utils_messenger_ci = GfxDebugMsger::debug_utils_messenger_ci();
    if validation {
        instance_ci = instance_ci.push_next(&mut debug_utils_messenger_ci);
    }

    unsafe { entry.create_instance(&instance_ci, None) }.vk_context("vkCreateInstance")
}

/// 检查 instance ext 是否受支持，缺失时返回错误
fn enabled_extensions(entry: &ash::Entry, required: &[&'static CStr]) -> GfxResult<Vec<*const c_char>> {
    let all_ext_props =
        unsafe { entry.enumerate_instance_extension_properties(None) }.vk_context("vkEnumerateInstanceExtensionProperties")?;

    let mut enabled: HashSet<&'static CStr> = HashSet::new();
    for &ext in required {
        let supported = all_ext_props.iter().any(|props| props.extension_name_as_c_str() == Ok(ext));
        if !supported {
            return Err(GfxError::NoSuitableDevice(format!("instance extension {:?} is missing", ext)));
        }
        enabled.insert(ext);
    }

    Ok(enabled.iter().map(|ext| ext.as_ptr()).collect_vec())
}

fn enabled_layers(entry: &ash::Entry) -> GfxResult<Vec<*const c_char>> {
    let all_layer_props =
        unsafe { entry.enumerate_instance_layer_properties() }.vk_context("vkEnumerateInstanceLayerProperties")?;

    let supported = all_layer_props.iter().any(|props| props.layer_name_as_c_str() == Ok(VALIDATION_LAYER));
    if supported {
        Ok(vec![VALIDATION_LAYER.as_ptr()])
    } else {
        log::warn!("validation requested but {:?} is not installed", VALIDATION_LAYER);
        Ok(vec![])
    }
}
