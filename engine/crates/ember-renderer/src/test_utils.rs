use std::rc::Rc;

use ash::vk;
use ember_gfx::{
    commands::rendering::RenderingDesc,
    error::GfxResult,
    foundation::device::GfxDevice,
    headless::HeadlessDevice,
    resources::{allocator::GfxAllocator, buffer::MemoryUsage},
};

use crate::frame::frame_loop::{FrameContext, FrameLoopDesc, FrameRecorder};

pub fn headless_device() -> (Rc<HeadlessDevice>, Rc<dyn GfxDevice>) {
    let headless = Rc::new(HeadlessDevice::new());
    let device: Rc<dyn GfxDevice> = headless.clone();
    (headless, device)
}

pub fn test_frame_loop_desc() -> FrameLoopDesc {
    FrameLoopDesc {
        frames_in_flight: 2,
        window_extent: vk::Extent2D { width: 640, height: 480 },
        present_mode: vk::PresentModeKHR::FIFO,
        fence_timeout_ns: 1_000_000_000,
        render_scale: 1.0,
        frame_max_sets: 16,
        pool_growth_cap: 4092,
    }
}

/// headless 后端只检查 magic number
pub fn fake_spirv() -> Vec<u32> {
    vec![0x0723_0203, 0x0001_0000]
}

/// 只清屏并开关一次 rendering 的 recorder
#[derive(Default)]
pub struct ClearRecorder {
    pub backgrounds: usize,
    pub geometries: usize,
    pub slots: Vec<usize>,
    /// 每帧创建一个 buffer 并放入 slot 的 deletion queue
    pub transient_buffer: Option<(vk::DeviceSize, MemoryUsage)>,
}

impl FrameRecorder for ClearRecorder {
    fn record_background(&mut self, ctx: &mut FrameContext) -> GfxResult<()> {
        self.backgrounds += 1;
        self.slots.push(ctx.slot_index);
        ctx.cmd
            .clear_color_image(ctx.draw_image.vk_image(), vk::ImageLayout::GENERAL, [0.1, 0.2, 0.3, 1.0]);

        if let Some((size, memory)) = self.transient_buffer {
            let allocator = GfxAllocator::new(ctx.cmd.device().clone());
            let buffer = allocator.create_buffer(size, vk::BufferUsageFlags::UNIFORM_BUFFER, memory, "transient")?;
            ctx.deletion_queue.push(buffer);
        }
        Ok(())
    }

    fn record_geometry(&mut self, ctx: &mut FrameContext) -> GfxResult<()> {
        self.geometries += 1;
        let rendering = RenderingDesc::color(ctx.draw_image.view(), ctx.draw_extent).depth(ctx.depth_image.view(), Some(0.0));
        ctx.cmd.cmd_begin_rendering(&rendering);
        ctx.cmd.cmd_end_rendering();
        Ok(())
    }
}
