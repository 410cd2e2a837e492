use ash::vk;

use crate::resources::allocation::AllocationKey;

#[derive(Debug, Clone, Copy)]
pub struct ImageDesc {
    pub extent: vk::Extent3D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub mip_levels: u32,
}

impl ImageDesc {
    /// 2D image，`mipmapped` 时根据尺寸计算完整的 mip 链长度
    pub fn new_2d(extent: vk::Extent2D, format: vk::Format, usage: vk::ImageUsageFlags, mipmapped: bool) -> Self {
        Self {
            extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
            format,
            usage,
            mip_levels: if mipmapped { mip_levels_for(extent) } else { 1 },
        }
    }

    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        aspect_for_format(self.format)
    }
}

/// `floor(log2(max(width, height))) + 1`
#[inline]
pub fn mip_levels_for(extent: vk::Extent2D) -> u32 {
    let max_dim = extent.width.max(extent.height).max(1);
    u32::BITS - max_dim.leading_zeros()
}

/// 非压缩颜色 format 每个 texel 占用的字节数，未知 format 返回 None
pub fn texel_size(format: vk::Format) -> Option<u64> {
    match format {
        vk::Format::R8_UNORM | vk::Format::R8_SRGB => Some(1),
        vk::Format::R8G8_UNORM => Some(2),
        vk::Format::R8G8B8A8_UNORM
        | vk::Format::R8G8B8A8_SRGB
        | vk::Format::B8G8R8A8_UNORM
        | vk::Format::B8G8R8A8_SRGB
        | vk::Format::R32_SFLOAT => Some(4),
        vk::Format::R16G16B16A16_SFLOAT => Some(8),
        vk::Format::R32G32B32A32_SFLOAT => Some(16),
        _ => None,
    }
}

/// 根据 format 推导 image view 的 aspect
pub fn aspect_for_format(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// 由 [`crate::resources::allocator::GfxAllocator`] 创建的 image，附带一个覆盖全部 mip 的默认 view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatedImage {
    pub(crate) vk_handle: vk::Image,
    pub(crate) view: vk::ImageView,
    pub(crate) allocation: AllocationKey,
    pub(crate) extent: vk::Extent3D,
    pub(crate) format: vk::Format,
    pub(crate) mip_levels: u32,
}

// getters
impl AllocatedImage {
    #[inline]
    pub fn vk_image(&self) -> vk::Image {
        self.vk_handle
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn allocation(&self) -> AllocationKey {
        self.allocation
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent3D {
        self.extent
    }

    #[inline]
    pub fn extent_2d(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.extent.width,
            height: self.extent.height,
        }
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        aspect_for_format(self.format)
    }

    /// RGBA8 等 4 字节格式下，整张 level 0 的字节数
    #[inline]
    pub fn texel_bytes(&self) -> u64 {
        self.extent.width as u64 * self.extent.height as u64 * self.extent.depth as u64 * 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_levels_follow_log2() {
        let e = |width, height| vk::Extent2D { width, height };
        assert_eq!(mip_levels_for(e(1, 1)), 1);
        assert_eq!(mip_levels_for(e(2, 1)), 2);
        assert_eq!(mip_levels_for(e(1024, 512)), 11);
        assert_eq!(mip_levels_for(e(1023, 7)), 10);
        assert_eq!(mip_levels_for(e(0, 0)), 1);
    }

    #[test]
    fn mipmapped_desc_uses_full_chain() {
        let extent = vk::Extent2D { width: 256, height: 64 };
        let desc = ImageDesc::new_2d(extent, vk::Format::R8G8B8A8_UNORM, vk::ImageUsageFlags::SAMPLED, true);
        assert_eq!(desc.mip_levels, 9);
        let flat = ImageDesc::new_2d(extent, vk::Format::R8G8B8A8_UNORM, vk::ImageUsageFlags::SAMPLED, false);
        assert_eq!(flat.mip_levels, 1);
    }

    #[test]
    fn depth_formats_use_depth_aspect() {
        assert_eq!(aspect_for_format(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert_eq!(aspect_for_format(vk::Format::R16G16B16A16_SFLOAT), vk::ImageAspectFlags::COLOR);
        assert!(aspect_for_format(vk::Format::D24_UNORM_S8_UINT).contains(vk::ImageAspectFlags::STENCIL));
    }
}
