use ash::vk;

use crate::{
    commands::{rendering::RenderingDesc, submit_info::GfxSubmitInfo},
    descriptors::writer::DescriptorWrite,
    error::GfxResult,
    pipelines::{compute_pipeline::ComputePipelineDesc, graphics_pipeline::GraphicsPipelineDesc},
    resources::{
        buffer::{AllocatedBuffer, BufferDesc},
        image::{AllocatedImage, ImageDesc},
        sampler::SamplerDesc,
    },
    swapchain::render_swapchain::{AcquireOutcome, PresentOutcome, SwapchainDesc, SwapchainImages},
};

/// GPU 设备抽象
///
/// 所有组件通过 `Rc<dyn GfxDevice>` 访问 GPU，词汇是 `ash::vk` 的不透明句柄。
/// 设备只有一个 graphics queue，它同时负责 present。
///
/// 所有方法都只需要 `&self`，后端内部自行处理可变状态；只允许在驱动渲染循环的
/// 那一个线程中使用。
///
/// `destroy_*` 系列没有返回值：销毁调用不会失败，调用方负责保证 GPU 不再使用该资源。
pub trait GfxDevice {
    /// 后端名称，用于日志
    fn backend_name(&self) -> &str;

    /// 阻塞等待设备上所有工作完成
    fn wait_idle(&self) -> GfxResult<()>;

    // ---------------------------------------------------------------------
    // sync
    // ---------------------------------------------------------------------
    fn create_fence(&self, signaled: bool, name: &str) -> GfxResult<vk::Fence>;
    fn destroy_fence(&self, fence: vk::Fence);
    /// 超时返回 [`crate::error::GfxError::Timeout`]
    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> GfxResult<()>;
    fn reset_fence(&self, fence: vk::Fence) -> GfxResult<()>;
    fn create_semaphore(&self, name: &str) -> GfxResult<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    // ---------------------------------------------------------------------
    // command buffer
    // ---------------------------------------------------------------------
    /// 在 graphics queue family 上创建 command pool
    fn create_command_pool(&self, flags: vk::CommandPoolCreateFlags, name: &str) -> GfxResult<vk::CommandPool>;
    fn destroy_command_pool(&self, pool: vk::CommandPool);
    fn allocate_command_buffer(&self, pool: vk::CommandPool, name: &str) -> GfxResult<vk::CommandBuffer>;
    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> GfxResult<()>;
    fn begin_command_buffer(&self, cmd: vk::CommandBuffer, usage: vk::CommandBufferUsageFlags) -> GfxResult<()>;
    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> GfxResult<()>;
    /// 提交到 graphics queue，`fence` 可以为 null
    fn queue_submit(&self, submits: &[GfxSubmitInfo], fence: vk::Fence) -> GfxResult<()>;

    // ---------------------------------------------------------------------
    // commands
    // ---------------------------------------------------------------------
    fn cmd_image_barriers(&self, cmd: vk::CommandBuffer, barriers: &[vk::ImageMemoryBarrier2<'_>]);
    fn cmd_copy_buffer(&self, cmd: vk::CommandBuffer, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]);
    fn cmd_copy_buffer_to_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    );
    /// 线性过滤的 blit，src 需要处于 TRANSFER_SRC_OPTIMAL，dst 处于 TRANSFER_DST_OPTIMAL
    fn cmd_blit_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Image,
        dst: vk::Image,
        src_extent: vk::Extent2D,
        dst_extent: vk::Extent2D,
    );
    fn cmd_clear_color_image(&self, cmd: vk::CommandBuffer, image: vk::Image, layout: vk::ImageLayout, color: [f32; 4]);
    fn cmd_begin_rendering(&self, cmd: vk::CommandBuffer, desc: &RenderingDesc);
    fn cmd_end_rendering(&self, cmd: vk::CommandBuffer);
    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline);
    fn cmd_bind_descriptor_sets(
        &self,
        cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    );
    fn cmd_push_constants(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    );
    fn cmd_bind_index_buffer(
        &self,
        cmd: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    );
    fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewport: vk::Viewport);
    fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissor: vk::Rect2D);
    fn cmd_draw_indexed(
        &self,
        cmd: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );
    fn cmd_dispatch(&self, cmd: vk::CommandBuffer, group_x: u32, group_y: u32, group_z: u32);
    fn cmd_begin_label(&self, cmd: vk::CommandBuffer, label: &str, color: [f32; 4]);
    fn cmd_end_label(&self, cmd: vk::CommandBuffer);

    // ---------------------------------------------------------------------
    // memory
    // ---------------------------------------------------------------------
    fn create_buffer(&self, desc: &BufferDesc, name: &str) -> GfxResult<AllocatedBuffer>;
    fn destroy_buffer(&self, buffer: &AllocatedBuffer);
    /// 写入 host visible buffer 的映射内存
    fn write_buffer(&self, buffer: &AllocatedBuffer, offset: vk::DeviceSize, data: &[u8]) -> GfxResult<()>;
    /// 读取 host visible buffer 的映射内存
    fn read_buffer(&self, buffer: &AllocatedBuffer, offset: vk::DeviceSize, len: vk::DeviceSize) -> GfxResult<Vec<u8>>;
    /// 同时创建覆盖全部 mip 的默认 image view
    fn create_image(&self, desc: &ImageDesc, name: &str) -> GfxResult<AllocatedImage>;
    fn destroy_image(&self, image: &AllocatedImage);
    fn create_sampler(&self, desc: &SamplerDesc, name: &str) -> GfxResult<vk::Sampler>;
    fn destroy_sampler(&self, sampler: vk::Sampler);

    // ---------------------------------------------------------------------
    // descriptors
    // ---------------------------------------------------------------------
    fn create_descriptor_set_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding<'_>],
        flags: vk::DescriptorSetLayoutCreateFlags,
        name: &str,
    ) -> GfxResult<vk::DescriptorSetLayout>;
    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);
    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
        name: &str,
    ) -> GfxResult<vk::DescriptorPool>;
    /// pool 中分配出的所有 set 都会失效
    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> GfxResult<()>;
    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);
    /// pool 耗尽时返回 `ERROR_OUT_OF_POOL_MEMORY` 或者 `ERROR_FRAGMENTED_POOL`
    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> GfxResult<vk::DescriptorSet>;
    fn update_descriptor_set(&self, set: vk::DescriptorSet, writes: &[DescriptorWrite]) -> GfxResult<()>;

    // ---------------------------------------------------------------------
    // pipelines
    // ---------------------------------------------------------------------
    fn create_shader_module(&self, code: &[u32], name: &str) -> GfxResult<vk::ShaderModule>;
    fn destroy_shader_module(&self, module: vk::ShaderModule);
    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
        name: &str,
    ) -> GfxResult<vk::PipelineLayout>;
    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);
    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc, name: &str) -> GfxResult<vk::Pipeline>;
    fn create_compute_pipeline(&self, desc: &ComputePipelineDesc, name: &str) -> GfxResult<vk::Pipeline>;
    fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    // ---------------------------------------------------------------------
    // presentation
    // ---------------------------------------------------------------------
    /// 基于当前 surface 创建交换链，`old` 可以为 null
    fn create_swapchain(&self, desc: &SwapchainDesc, old: vk::SwapchainKHR) -> GfxResult<SwapchainImages>;
    /// 同时销毁交换链 image 的 view
    fn destroy_swapchain(&self, swapchain: &SwapchainImages);
    /// OUT_OF_DATE 不是错误，而是 [`AcquireOutcome::OutOfDate`]
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
        timeout_ns: u64,
    ) -> GfxResult<AcquireOutcome>;
    /// OUT_OF_DATE 不是错误，而是 [`PresentOutcome::OutOfDate`]
    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> GfxResult<PresentOutcome>;
}
