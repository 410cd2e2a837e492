use ash::vk;

/// headless 后端按调用顺序记录下来的设备事件，测试通过它观察同步与资源生命周期
#[derive(Debug, Clone, PartialEq)]
pub enum GpuEvent {
    BufferCreated { buffer: vk::Buffer, size: vk::DeviceSize },
    BufferDestroyed { buffer: vk::Buffer },
    ImageCreated { image: vk::Image, extent: vk::Extent3D },
    ImageDestroyed { image: vk::Image },
    SamplerDestroyed { sampler: vk::Sampler },
    PipelineDestroyed { pipeline: vk::Pipeline },

    DescriptorPoolCreated { pool: vk::DescriptorPool, max_sets: u32 },
    DescriptorPoolReset { pool: vk::DescriptorPool },
    DescriptorPoolDestroyed { pool: vk::DescriptorPool },

    FenceWaited { fence: vk::Fence },
    FenceReset { fence: vk::Fence },
    /// 队列真正执行完一次提交时产生
    FenceSignaled { fence: vk::Fence },

    CommandBufferBegun { command_buffer: vk::CommandBuffer },
    Submitted { command_buffers: Vec<vk::CommandBuffer>, fence: vk::Fence },

    SwapchainCreated { swapchain: vk::SwapchainKHR, extent: vk::Extent2D },
    SwapchainDestroyed { swapchain: vk::SwapchainKHR },
    ImageAcquired { swapchain: vk::SwapchainKHR, image_index: u32 },
    AcquireOutOfDate { swapchain: vk::SwapchainKHR },
    Presented { swapchain: vk::SwapchainKHR, image_index: u32 },
    PresentOutOfDate { swapchain: vk::SwapchainKHR },

    DeviceIdle,
}

/// command buffer 中录制的一条命令
///
/// 提交之后在 [`super::HeadlessDevice`] 的队列执行时才会生效
#[derive(Debug, Clone)]
pub enum HeadlessCommand {
    ImageBarrier {
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    },
    CopyBuffer {
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: Vec<vk::BufferCopy>,
    },
    CopyBufferToImage {
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: Vec<vk::BufferImageCopy>,
    },
    BlitImage {
        src: vk::Image,
        dst: vk::Image,
        src_extent: vk::Extent2D,
        dst_extent: vk::Extent2D,
    },
    ClearColorImage {
        image: vk::Image,
        layout: vk::ImageLayout,
        color: [f32; 4],
    },
    BeginRendering {
        color_view: vk::ImageView,
        depth_view: Option<vk::ImageView>,
        extent: vk::Extent2D,
    },
    EndRendering,
    BindPipeline {
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    },
    BindDescriptorSets {
        bind_point: vk::PipelineBindPoint,
        first_set: u32,
        sets: Vec<vk::DescriptorSet>,
    },
    PushConstants {
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: Vec<u8>,
    },
    BindIndexBuffer {
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
    },
    SetViewport {
        width: f32,
        height: f32,
    },
    SetScissor {
        extent: vk::Extent2D,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
    },
    Dispatch {
        group_count: [u32; 3],
    },
    BeginLabel(String),
    EndLabel,
}
