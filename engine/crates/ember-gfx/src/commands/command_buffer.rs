use std::rc::Rc;

use ash::vk;
use itertools::Itertools;

use crate::{
    basic::color::LabelColor,
    commands::{barrier::GfxImageBarrier, command_pool::GfxCommandPool, rendering::RenderingDesc},
    error::GfxResult,
    foundation::device::GfxDevice,
    resources::{buffer::AllocatedBuffer, image::AllocatedImage},
};

/// 命令缓冲封装
///
/// 持有设备的引用，录制接口直接转发给 [`GfxDevice`]。
///
/// # 使用示例
/// ```ignore
/// let cmd = GfxCommandBuffer::new(device.clone(), &pool, "my-pass")?;
/// cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, "my-pass")?;
/// cmd.cmd_bind_pipeline(vk::PipelineBindPoint::GRAPHICS, pipeline);
/// // 绘制命令...
/// cmd.end()?;
/// ```
#[derive(Clone)]
pub struct GfxCommandBuffer {
    device: Rc<dyn GfxDevice>,
    vk_handle: vk::CommandBuffer,
    name: String,
}
// new & init
impl GfxCommandBuffer {
    pub fn new(device: Rc<dyn GfxDevice>, command_pool: &GfxCommandPool, debug_name: &str) -> GfxResult<Self> {
        let vk_handle = device.allocate_command_buffer(command_pool.handle(), debug_name)?;
        Ok(Self {
            device,
            vk_handle,
            name: debug_name.to_string(),
        })
    }
}
// Basic 命令
impl GfxCommandBuffer {
    /// 开始录制 command
    ///
    /// 自动设置 debug label
    #[inline]
    pub fn begin(&self, usage_flag: vk::CommandBufferUsageFlags, debug_label_name: &str) -> GfxResult<()> {
        self.device.begin_command_buffer(self.vk_handle, usage_flag)?;
        self.begin_label(debug_label_name, LabelColor::COLOR_CMD);
        Ok(())
    }

    /// 结束录制 command
    ///
    /// 结束 debug label
    #[inline]
    pub fn end(&self) -> GfxResult<()> {
        self.end_label();
        self.device.end_command_buffer(self.vk_handle)
    }

    /// 回到 initial 状态，pool 需要带 RESET_COMMAND_BUFFER flag
    #[inline]
    pub fn reset(&self) -> GfxResult<()> {
        self.device.reset_command_buffer(self.vk_handle)
    }
}
// getters
impl GfxCommandBuffer {
    #[inline]
    pub fn vk_handle(&self) -> vk::CommandBuffer {
        self.vk_handle
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn device(&self) -> &Rc<dyn GfxDevice> {
        &self.device
    }
}
// 数据传输类型
impl GfxCommandBuffer {
    /// - command type: action
    /// - 支持的 queue：transfer，graphics，compute
    #[inline]
    pub fn cmd_copy_buffer(&self, src: &AllocatedBuffer, dst: &AllocatedBuffer, regions: &[vk::BufferCopy]) {
        self.device.cmd_copy_buffer(self.vk_handle, src.vk_buffer(), dst.vk_buffer(), regions);
    }

    /// 将整个 buffer 拷贝到 image 的 mip 0，image 需要处于 TRANSFER_DST_OPTIMAL
    ///
    /// - command type: action
    /// - 支持的 queue：transfer，graphics，compute
    #[inline]
    pub fn cmd_copy_buffer_to_image(&self, src: &AllocatedBuffer, dst: &AllocatedImage) {
        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: dst.aspect(),
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            image_offset: vk::Offset3D::default(),
            image_extent: dst.extent(),
        };
        self.device.cmd_copy_buffer_to_image(
            self.vk_handle,
            src.vk_buffer(),
            dst.vk_image(),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            std::slice::from_ref(&region),
        );
    }

    /// 线性过滤的 blit，用于把 draw image 拷贝到尺寸可能不同的 swapchain image
    ///
    /// - command type: action
    #[inline]
    pub fn blit_image(&self, src: vk::Image, dst: vk::Image, src_extent: vk::Extent2D, dst_extent: vk::Extent2D) {
        self.device.cmd_blit_image(self.vk_handle, src, dst, src_extent, dst_extent);
    }

    /// - command type: action
    #[inline]
    pub fn clear_color_image(&self, image: vk::Image, layout: vk::ImageLayout, color: [f32; 4]) {
        self.device.cmd_clear_color_image(self.vk_handle, image, layout, color);
    }

    /// - command type: state
    /// - 支持的 queue: graphics, compute
    #[inline]
    pub fn cmd_push_constants(
        &self,
        pipeline_layout: vk::PipelineLayout,
        stage: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        self.device.cmd_push_constants(self.vk_handle, pipeline_layout, stage, offset, data);
    }
}
// 绘制类型
impl GfxCommandBuffer {
    #[inline]
    pub fn cmd_begin_rendering(&self, desc: &RenderingDesc) {
        self.device.cmd_begin_rendering(self.vk_handle, desc);
    }

    #[inline]
    pub fn cmd_end_rendering(&self) {
        self.device.cmd_end_rendering(self.vk_handle);
    }

    #[inline]
    pub fn cmd_bind_pipeline(&self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        self.device.cmd_bind_pipeline(self.vk_handle, bind_point, pipeline);
    }

    #[inline]
    pub fn cmd_bind_descriptor_sets(
        &self,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        self.device.cmd_bind_descriptor_sets(self.vk_handle, bind_point, layout, first_set, sets);
    }

    /// index 固定为 u32
    #[inline]
    pub fn cmd_bind_index_buffer(&self, buffer: &AllocatedBuffer, offset: vk::DeviceSize) {
        self.device.cmd_bind_index_buffer(self.vk_handle, buffer.vk_buffer(), offset, vk::IndexType::UINT32);
    }

    /// viewport 与 scissor 都覆盖整个 extent
    #[inline]
    pub fn cmd_set_viewport_scissor(&self, extent: vk::Extent2D) {
        self.device.cmd_set_viewport(
            self.vk_handle,
            vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            },
        );
        self.device.cmd_set_scissor(
            self.vk_handle,
            vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
        );
    }

    #[inline]
    pub fn draw_indexed(
        &self,
        index_count: u32,
        first_index: u32,
        instance_count: u32,
        first_instance: u32,
        vertex_offset: i32,
    ) {
        self.device.cmd_draw_indexed(
            self.vk_handle,
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
        );
    }

    #[inline]
    pub fn cmd_dispatch(&self, group_cnt: glam::UVec3) {
        self.device.cmd_dispatch(self.vk_handle, group_cnt.x, group_cnt.y, group_cnt.z);
    }
}
// 同步命令
impl GfxCommandBuffer {
    #[inline]
    pub fn image_memory_barrier(&self, barriers: &[GfxImageBarrier]) {
        let barriers = barriers.iter().map(|b| *b.inner()).collect_vec();
        self.device.cmd_image_barriers(self.vk_handle, &barriers);
    }

    /// 粗粒度的 layout 转换，参见 [`GfxImageBarrier::transition`]
    #[inline]
    pub fn transition_image(&self, image: vk::Image, old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) {
        self.image_memory_barrier(&[GfxImageBarrier::transition(image, old_layout, new_layout)]);
    }
}
// debug 类型的命令
impl GfxCommandBuffer {
    #[inline]
    pub fn begin_label(&self, label_name: &str, label_color: glam::Vec4) {
        self.device.cmd_begin_label(self.vk_handle, label_name, label_color.to_array());
    }

    #[inline]
    pub fn end_label(&self) {
        self.device.cmd_end_label(self.vk_handle);
    }
}
