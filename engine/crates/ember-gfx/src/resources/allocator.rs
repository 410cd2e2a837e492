use std::rc::Rc;

use ash::vk;

use crate::{
    commands::immediate::ImmediateSubmit,
    error::{GfxError, GfxResult},
    foundation::device::GfxDevice,
    resources::{
        buffer::{AllocatedBuffer, BufferDesc, MemoryUsage},
        image::{AllocatedImage, ImageDesc, texel_size},
        sampler::SamplerDesc,
    },
};

/// buffer / image 的分配入口
///
/// 创建的资源都是纯句柄，销毁时机由调用方决定：
/// 如果资源可能仍被 in-flight 的帧使用，应当放入 DeletionQueue 而不是直接销毁
pub struct GfxAllocator {
    device: Rc<dyn GfxDevice>,
}

// new & init
impl GfxAllocator {
    pub fn new(device: Rc<dyn GfxDevice>) -> Self {
        Self { device }
    }
}

// getters
impl GfxAllocator {
    #[inline]
    pub fn device(&self) -> &Rc<dyn GfxDevice> {
        &self.device
    }
}

// buffer
impl GfxAllocator {
    pub fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        memory: MemoryUsage,
        name: &str,
    ) -> GfxResult<AllocatedBuffer> {
        if size == 0 {
            return Err(GfxError::InvalidArgument(format!("buffer `{name}` has zero size")));
        }
        self.device.create_buffer(&BufferDesc { size, usage, memory }, name)
    }

    /// 上传数据用的 staging buffer
    #[inline]
    pub fn create_stage_buffer(&self, size: vk::DeviceSize, name: &str) -> GfxResult<AllocatedBuffer> {
        self.create_buffer(size, vk::BufferUsageFlags::TRANSFER_SRC, MemoryUsage::Staging, name)
    }

    /// 立即释放，调用方保证 GPU 不再使用
    #[inline]
    pub fn destroy_buffer(&self, buffer: AllocatedBuffer) {
        self.device.destroy_buffer(&buffer);
    }

    /// 写入 host visible buffer
    #[inline]
    pub fn write_buffer(&self, buffer: &AllocatedBuffer, offset: vk::DeviceSize, data: &[u8]) -> GfxResult<()> {
        self.device.write_buffer(buffer, offset, data)
    }

    /// 读取 host visible buffer
    #[inline]
    pub fn read_buffer(&self, buffer: &AllocatedBuffer, offset: vk::DeviceSize, len: vk::DeviceSize) -> GfxResult<Vec<u8>> {
        self.device.read_buffer(buffer, offset, len)
    }
}

// image
impl GfxAllocator {
    pub fn create_image(
        &self,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        mipmapped: bool,
        name: &str,
    ) -> GfxResult<AllocatedImage> {
        if extent.width == 0 || extent.height == 0 {
            return Err(GfxError::InvalidArgument(format!("image `{name}` has zero extent")));
        }
        self.device.create_image(&ImageDesc::new_2d(extent, format, usage, mipmapped), name)
    }

    /// 创建 image 并通过 staging buffer 上传紧密排列的像素数据
    ///
    /// 每个 texel 的字节数由 format 决定，不支持的 format 直接拒绝。
    /// 这里不生成 mip 链，`mipmapped` 为 true 时返回错误。
    /// 完成之后 image 处于 SHADER_READ_ONLY_OPTIMAL，函数返回时 GPU 已经执行完毕。
    #[allow(clippy::too_many_arguments)]
    pub fn create_image_with_data(
        &self,
        immediate: &ImmediateSubmit,
        data: &[u8],
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        mipmapped: bool,
        name: &str,
    ) -> GfxResult<AllocatedImage> {
        if mipmapped {
            return Err(GfxError::InvalidArgument(format!(
                "image `{name}`: uploading data into a mipmapped image is not supported"
            )));
        }
        let Some(texel) = texel_size(format) else {
            return Err(GfxError::InvalidArgument(format!("image `{name}`: cannot upload data of format {format:?}")));
        };
        let data_size = extent.width as u64 * extent.height as u64 * texel;
        if (data.len() as u64) < data_size {
            return Err(GfxError::UploadSize {
                expected: data_size,
                actual: data.len() as u64,
            });
        }

        let stage_buffer = self.create_stage_buffer(data_size, &format!("{name}-stage"))?;
        if let Err(e) = self.write_buffer(&stage_buffer, 0, &data[..data_size as usize]) {
            self.destroy_buffer(stage_buffer);
            return Err(e);
        }

        let image = match self.create_image(
            extent,
            format,
            usage | vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::TRANSFER_SRC,
            mipmapped,
            name,
        ) {
            Ok(image) => image,
            Err(e) => {
                self.destroy_buffer(stage_buffer);
                return Err(e);
            }
        };

        let uploaded = immediate.submit(name, |cmd| {
            cmd.transition_image(image.vk_image(), vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
            cmd.cmd_copy_buffer_to_image(&stage_buffer, &image);
            cmd.transition_image(
                image.vk_image(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );
        });

        // 同步提交已经结束，staging buffer 可以立即释放
        self.destroy_buffer(stage_buffer);
        if let Err(e) = uploaded {
            self.destroy_image(image);
            return Err(e);
        }

        Ok(image)
    }

    #[inline]
    pub fn destroy_image(&self, image: AllocatedImage) {
        self.device.destroy_image(&image);
    }
}

// sampler
impl GfxAllocator {
    #[inline]
    pub fn create_sampler(&self, desc: &SamplerDesc, name: &str) -> GfxResult<vk::Sampler> {
        self.device.create_sampler(desc, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessDevice;

    fn setup() -> (Rc<HeadlessDevice>, GfxAllocator, ImmediateSubmit) {
        let headless = Rc::new(HeadlessDevice::new());
        let allocator = GfxAllocator::new(headless.clone());
        let immediate = ImmediateSubmit::new(headless.clone(), u64::MAX).unwrap();
        (headless, allocator, immediate)
    }

    #[test]
    fn image_upload_ends_in_shader_read_layout() {
        let (headless, allocator, immediate) = setup();
        let extent = vk::Extent2D { width: 4, height: 2 };
        let pixels = (0..32u8).collect::<Vec<_>>();

        let image = allocator
            .create_image_with_data(
                &immediate,
                &pixels,
                extent,
                vk::Format::R8G8B8A8_UNORM,
                vk::ImageUsageFlags::SAMPLED,
                false,
                "test-image",
            )
            .unwrap();

        assert_eq!(headless.image_layout(image.vk_image()), Some(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL));
        assert_eq!(headless.read_image(image.vk_image()).unwrap(), pixels);
        // staging buffer 已经被释放，只剩下 image
        assert_eq!(headless.live_buffer_count(), 0);

        allocator.destroy_image(image);
        immediate.destroy();
    }

    #[test]
    fn image_upload_rejects_short_data() {
        let (headless, allocator, immediate) = setup();
        let err = allocator
            .create_image_with_data(
                &immediate,
                &[0u8; 7],
                vk::Extent2D { width: 2, height: 1 },
                vk::Format::R8G8B8A8_UNORM,
                vk::ImageUsageFlags::SAMPLED,
                false,
                "short",
            )
            .unwrap_err();
        assert!(matches!(err, GfxError::UploadSize { expected: 8, actual: 7 }));
        assert_eq!(headless.live_buffer_count(), 0);
        immediate.destroy();
    }

    #[test]
    fn single_channel_upload_uses_format_texel_size() {
        let (headless, allocator, immediate) = setup();
        let pixels = [10u8, 20, 30, 40, 50, 60];

        let image = allocator
            .create_image_with_data(
                &immediate,
                &pixels,
                vk::Extent2D { width: 3, height: 2 },
                vk::Format::R8_UNORM,
                vk::ImageUsageFlags::SAMPLED,
                false,
                "mask",
            )
            .unwrap();

        assert_eq!(headless.read_image(image.vk_image()).unwrap(), pixels);
        assert_eq!(headless.live_buffer_count(), 0);
        assert!(headless.validation_errors().is_empty());

        allocator.destroy_image(image);
        immediate.destroy();
    }

    #[test]
    fn wide_format_upload_requires_enough_data() {
        let (headless, allocator, immediate) = setup();
        // 2x1 的 RGBA16F 需要 16 字节
        let err = allocator
            .create_image_with_data(
                &immediate,
                &[0u8; 12],
                vk::Extent2D { width: 2, height: 1 },
                vk::Format::R16G16B16A16_SFLOAT,
                vk::ImageUsageFlags::SAMPLED,
                false,
                "hdr",
            )
            .unwrap_err();
        assert!(matches!(err, GfxError::UploadSize { expected: 16, actual: 12 }));
        assert_eq!(headless.live_buffer_count(), 0);

        let pixels = (0..16u8).collect::<Vec<_>>();
        let image = allocator
            .create_image_with_data(
                &immediate,
                &pixels,
                vk::Extent2D { width: 2, height: 1 },
                vk::Format::R16G16B16A16_SFLOAT,
                vk::ImageUsageFlags::SAMPLED,
                false,
                "hdr",
            )
            .unwrap();
        assert_eq!(headless.read_image(image.vk_image()).unwrap(), pixels);

        allocator.destroy_image(image);
        immediate.destroy();
    }

    #[test]
    fn mipmapped_upload_is_rejected() {
        let (headless, allocator, immediate) = setup();
        let live_before = headless.live_object_count();

        let err = allocator
            .create_image_with_data(
                &immediate,
                &[0u8; 64],
                vk::Extent2D { width: 4, height: 4 },
                vk::Format::R8G8B8A8_UNORM,
                vk::ImageUsageFlags::SAMPLED,
                true,
                "mipped",
            )
            .unwrap_err();

        assert!(matches!(err, GfxError::InvalidArgument(_)));
        assert_eq!(headless.live_object_count(), live_before);
        immediate.destroy();
    }

    #[test]
    fn unknown_upload_format_is_rejected() {
        let (headless, allocator, immediate) = setup();
        let live_before = headless.live_object_count();

        let err = allocator
            .create_image_with_data(
                &immediate,
                &[0u8; 64],
                vk::Extent2D { width: 4, height: 4 },
                vk::Format::BC1_RGB_UNORM_BLOCK,
                vk::ImageUsageFlags::SAMPLED,
                false,
                "compressed",
            )
            .unwrap_err();

        assert!(matches!(err, GfxError::InvalidArgument(_)));
        assert_eq!(headless.live_object_count(), live_before);
        immediate.destroy();
    }

    #[test]
    fn mipmapped_image_has_full_chain() {
        let (_headless, allocator, immediate) = setup();
        let image = allocator
            .create_image(
                vk::Extent2D {
                    width: 512,
                    height: 128,
                },
                vk::Format::R8G8B8A8_UNORM,
                vk::ImageUsageFlags::SAMPLED,
                true,
                "mips",
            )
            .unwrap();
        assert_eq!(image.mip_levels(), 10);
        allocator.destroy_image(image);
        immediate.destroy();
    }

    #[test]
    fn zero_sized_buffer_is_rejected() {
        let (_headless, allocator, immediate) = setup();
        assert!(allocator.create_buffer(0, vk::BufferUsageFlags::UNIFORM_BUFFER, MemoryUsage::CpuToGpu, "z").is_err());
        immediate.destroy();
    }
}
