use ash::vk;

/// 创建 sampler 所需的参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerDesc {
    pub mag_filter: vk::Filter,
    pub min_filter: vk::Filter,
    pub mipmap_mode: vk::SamplerMipmapMode,
    pub address_mode: vk::SamplerAddressMode,
}

impl SamplerDesc {
    pub const NEAREST: Self = Self {
        mag_filter: vk::Filter::NEAREST,
        min_filter: vk::Filter::NEAREST,
        mipmap_mode: vk::SamplerMipmapMode::NEAREST,
        address_mode: vk::SamplerAddressMode::REPEAT,
    };

    pub const LINEAR: Self = Self {
        mag_filter: vk::Filter::LINEAR,
        min_filter: vk::Filter::LINEAR,
        mipmap_mode: vk::SamplerMipmapMode::LINEAR,
        address_mode: vk::SamplerAddressMode::REPEAT,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_use_matching_filters() {
        assert_eq!(SamplerDesc::NEAREST.mag_filter, vk::Filter::NEAREST);
        assert_eq!(SamplerDesc::NEAREST.mipmap_mode, vk::SamplerMipmapMode::NEAREST);
        assert_eq!(SamplerDesc::LINEAR.min_filter, vk::Filter::LINEAR);
        assert_eq!(SamplerDesc::LINEAR.mipmap_mode, vk::SamplerMipmapMode::LINEAR);
        assert_ne!(SamplerDesc::NEAREST, SamplerDesc::LINEAR);
    }
}
