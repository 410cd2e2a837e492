use ash::vk;
use ember_gfx::{
    commands::immediate::ImmediateSubmit,
    deletion_queue::{DeletionQueue, Disposal},
    error::GfxResult,
    resources::{allocator::GfxAllocator, image::AllocatedImage, sampler::SamplerDesc},
};
use glam::Vec4;
use itertools::Itertools;

/// 错误贴图的边长
const CHECKERBOARD_SIZE: u32 = 16;

/// 与 glsl 的 `packUnorm4x8` 一致：x 在最低字节
pub fn pack_unorm4x8(color: Vec4) -> u32 {
    color
        .to_array()
        .iter()
        .map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u32)
        .enumerate()
        .fold(0, |packed, (i, c)| packed | (c << (i * 8)))
}

/// 引擎启动时创建的占位纹理与 sampler
///
/// 没有贴图的材质使用白色纹理；加载失败的贴图使用洋红/黑色棋盘格
pub struct DefaultResources {
    pub white: AllocatedImage,
    pub grey: AllocatedImage,
    pub black: AllocatedImage,
    pub error_checkerboard: AllocatedImage,

    pub nearest_sampler: vk::Sampler,
    pub linear_sampler: vk::Sampler,
}

// new & init
impl DefaultResources {
    /// 任何一步失败时，已经创建的纹理与 sampler 会被立即释放
    pub fn new(allocator: &GfxAllocator, immediate: &ImmediateSubmit) -> GfxResult<Self> {
        let mut created = DeletionQueue::new();
        let resources = Self::create(allocator, immediate, &mut created);
        match resources {
            Ok(_) => {
                created.forget();
            }
            Err(ref e) => {
                let released = created.flush(allocator.device().as_ref());
                log::error!("failed to create default resources, released {} objects: {}", released, e);
            }
        }
        resources
    }

    fn create(allocator: &GfxAllocator, immediate: &ImmediateSubmit, created: &mut DeletionQueue) -> GfxResult<Self> {
        let mut upload = |data: &[u8], size: u32, name: &str| -> GfxResult<AllocatedImage> {
            let image = allocator.create_image_with_data(
                immediate,
                data,
                vk::Extent2D {
                    width: size,
                    height: size,
                },
                vk::Format::R8G8B8A8_UNORM,
                vk::ImageUsageFlags::SAMPLED,
                false,
                name,
            )?;
            created.push(image);
            Ok(image)
        };

        let white = upload(&pack_unorm4x8(Vec4::ONE).to_le_bytes(), 1, "default-white")?;
        let grey = upload(&pack_unorm4x8(Vec4::new(0.66, 0.66, 0.66, 1.0)).to_le_bytes(), 1, "default-grey")?;
        let black = upload(&pack_unorm4x8(Vec4::new(0.0, 0.0, 0.0, 1.0)).to_le_bytes(), 1, "default-black")?;

        let magenta = pack_unorm4x8(Vec4::new(1.0, 0.0, 1.0, 1.0));
        let black_texel = pack_unorm4x8(Vec4::new(0.0, 0.0, 0.0, 1.0));
        let checkerboard = (0..CHECKERBOARD_SIZE)
            .cartesian_product(0..CHECKERBOARD_SIZE)
            .flat_map(|(y, x)| (if (x + y) % 2 == 0 { magenta } else { black_texel }).to_le_bytes())
            .collect_vec();
        let error_checkerboard = upload(&checkerboard, CHECKERBOARD_SIZE, "default-error-checkerboard")?;

        let nearest_sampler = allocator.create_sampler(&SamplerDesc::NEAREST, "default-nearest")?;
        created.push(Disposal::Sampler(nearest_sampler));
        let linear_sampler = allocator.create_sampler(&SamplerDesc::LINEAR, "default-linear")?;
        created.push(Disposal::Sampler(linear_sampler));

        Ok(Self {
            white,
            grey,
            black,
            error_checkerboard,
            nearest_sampler,
            linear_sampler,
        })
    }
}

// destroy
impl DefaultResources {
    /// 交给延迟销毁队列，随队列一起在 shutdown 时释放
    pub fn push_to(self, deletion_queue: &mut DeletionQueue) {
        deletion_queue.push(self.white);
        deletion_queue.push(self.grey);
        deletion_queue.push(self.black);
        deletion_queue.push(self.error_checkerboard);
        deletion_queue.push(Disposal::Sampler(self.nearest_sampler));
        deletion_queue.push(Disposal::Sampler(self.linear_sampler));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::headless_device;

    #[test]
    fn pack_matches_glsl() {
        assert_eq!(pack_unorm4x8(Vec4::ONE), 0xFFFF_FFFF);
        assert_eq!(pack_unorm4x8(Vec4::new(1.0, 0.0, 1.0, 1.0)), 0xFFFF_00FF);
        assert_eq!(pack_unorm4x8(Vec4::new(2.0, -1.0, 0.0, 0.0)), 0x0000_00FF);
    }

    #[test]
    fn textures_are_uploaded() {
        let (headless, device) = headless_device();
        let allocator = GfxAllocator::new(device.clone());
        let immediate = ImmediateSubmit::new(device.clone(), u64::MAX).unwrap();

        let defaults = DefaultResources::new(&allocator, &immediate).unwrap();
        assert_eq!(headless.read_image(defaults.white.vk_image()).unwrap(), vec![0xFF; 4]);
        assert_eq!(
            headless.image_layout(defaults.white.vk_image()),
            Some(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
        );

        let checkerboard = headless.read_image(defaults.error_checkerboard.vk_image()).unwrap();
        assert_eq!(checkerboard.len(), 16 * 16 * 4);
        assert_eq!(&checkerboard[0..4], &[0xFF, 0x00, 0xFF, 0xFF]);
        assert_eq!(&checkerboard[4..8], &[0x00, 0x00, 0x00, 0xFF]);
        // 第二行从黑色开始
        assert_eq!(&checkerboard[64..68], &[0x00, 0x00, 0x00, 0xFF]);

        let mut deletion_queue = DeletionQueue::new();
        defaults.push_to(&mut deletion_queue);
        assert_eq!(deletion_queue.flush(device.as_ref()), 6);
        immediate.destroy();
        assert_eq!(headless.live_object_count(), 0);
        assert!(headless.validation_errors().is_empty(), "{:?}", headless.validation_errors());
    }

    #[test]
    fn partial_failure_releases_created_textures() {
        let (headless, device) = headless_device();
        let allocator = GfxAllocator::new(device.clone());
        let immediate = ImmediateSubmit::new(device.clone(), u64::MAX).unwrap();
        let live_before = headless.live_object_count();

        // 每张纹理需要 staging buffer 与 image 两次分配，第三张纹理的 image 分配失败
        headless.set_allocation_budget(Some(5));
        let err = DefaultResources::new(&allocator, &immediate).err().unwrap();
        assert_eq!(err.vk_result(), Some(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
        assert_eq!(headless.live_object_count(), live_before);
        assert_eq!(headless.live_buffer_count(), 0);

        headless.set_allocation_budget(None);
        immediate.destroy();
        assert_eq!(headless.live_object_count(), 0);
        assert!(headless.validation_errors().is_empty(), "{:?}", headless.validation_errors());
    }
}
