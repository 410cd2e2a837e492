use std::rc::Rc;

use ash::vk;
use ember_gfx::{
    basic::color::LabelColor,
    commands::{command_buffer::GfxCommandBuffer, submit_info::GfxSubmitInfo},
    deletion_queue::{DeletionQueue, Disposal},
    descriptors::growable_allocator::DescriptorAllocatorGrowable,
    error::GfxResult,
    foundation::device::GfxDevice,
    resources::{allocator::GfxAllocator, image::AllocatedImage},
    swapchain::render_swapchain::{AcquireOutcome, GfxRenderSwapchain, SwapchainDesc},
};

use crate::{
    config::{RENDER_SCALE_RANGE, RendererConfig},
    frame::{frame_counter::FrameCounter, frame_slot::FrameSlot},
};

/// 离屏渲染目标的格式
pub const DRAW_IMAGE_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
pub const DEPTH_IMAGE_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// 创建 [`FrameLoop`] 所需的参数
#[derive(Debug, Clone, Copy)]
pub struct FrameLoopDesc {
    pub frames_in_flight: usize,
    pub window_extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
    pub fence_timeout_ns: u64,
    pub render_scale: f32,
    pub frame_max_sets: u32,
    pub pool_growth_cap: u32,
}

impl From<&RendererConfig> for FrameLoopDesc {
    fn from(config: &RendererConfig) -> Self {
        Self {
            frames_in_flight: config.frames_in_flight,
            window_extent: config.window_extent(),
            present_mode: config.present_mode.to_vk(),
            fence_timeout_ns: config.fence_timeout_ns(),
            render_scale: config.render_scale,
            frame_max_sets: config.descriptors.frame_max_sets,
            pool_growth_cap: config.descriptors.pool_growth_cap,
        }
    }
}

/// 录制一帧时可以访问的状态
///
/// - draw image 与 depth image 是整个 FrameLoop 共享的离屏目标
/// - deletion queue 与 descriptor 分配器属于当前 slot，放进去的对象在下一次轮到该 slot 时才会被回收
pub struct FrameContext<'a> {
    pub cmd: &'a GfxCommandBuffer,
    pub frame_id: u64,
    pub slot_index: usize,

    pub draw_image: &'a AllocatedImage,
    pub depth_image: &'a AllocatedImage,
    /// draw image 中实际绘制的区域
    pub draw_extent: vk::Extent2D,

    pub swapchain_image: vk::Image,
    pub swapchain_view: vk::ImageView,
    pub swapchain_extent: vk::Extent2D,

    pub deletion_queue: &'a mut DeletionQueue,
    pub descriptors: &'a mut DescriptorAllocatorGrowable,
}

/// 一帧中各个 pass 的录制者
///
/// 调用时 image 的 layout：
/// - `record_background`：draw image 处于 GENERAL
/// - `record_geometry`：draw image 处于 COLOR_ATTACHMENT_OPTIMAL，depth image 处于 DEPTH_ATTACHMENT_OPTIMAL
/// - `record_overlay`：swapchain image 处于 COLOR_ATTACHMENT_OPTIMAL
pub trait FrameRecorder {
    fn record_background(&mut self, ctx: &mut FrameContext) -> GfxResult<()>;

    fn record_geometry(&mut self, ctx: &mut FrameContext) -> GfxResult<()>;

    fn record_overlay(&mut self, _ctx: &mut FrameContext) -> GfxResult<()> {
        Ok(())
    }
}

/// 帧循环：拥有 N 个 frame slot、交换链以及离屏渲染目标
///
/// 每一帧的顺序：等待 slot fence，回收 slot 资源，acquire，reset fence，录制，提交，present。
/// acquire 或 present 发现交换链过期时只设置 resize 标记，下一帧开始时重建交换链。
pub struct FrameLoop {
    device: Rc<dyn GfxDevice>,
    allocator: GfxAllocator,

    swapchain: GfxRenderSwapchain,
    slots: Vec<FrameSlot>,
    frame_counter: FrameCounter,

    draw_image: AllocatedImage,
    depth_image: AllocatedImage,

    window_extent: vk::Extent2D,
    resize_pending: bool,

    fence_timeout_ns: u64,
    render_scale: f32,
}

// new & init
impl FrameLoop {
    pub fn new(device: Rc<dyn GfxDevice>, desc: &FrameLoopDesc) -> GfxResult<Self> {
        let swapchain =
            GfxRenderSwapchain::new(device.clone(), SwapchainDesc::new(desc.window_extent, desc.present_mode))?;

        let slots = (0..desc.frames_in_flight)
            .map(|slot_index| {
                FrameSlot::new(
                    device.clone(),
                    FrameCounter::slot_label(slot_index),
                    desc.frame_max_sets,
                    desc.pool_growth_cap,
                )
            })
            .collect::<GfxResult<Vec<_>>>()?;

        // draw image 只在创建时决定尺寸，窗口变大之后通过 min 限制绘制区域
        let allocator = GfxAllocator::new(device.clone());
        let draw_image = allocator.create_image(
            desc.window_extent,
            DRAW_IMAGE_FORMAT,
            vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::STORAGE
                | vk::ImageUsageFlags::COLOR_ATTACHMENT,
            false,
            "draw-image",
        )?;
        let depth_image = allocator.create_image(
            desc.window_extent,
            DEPTH_IMAGE_FORMAT,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            false,
            "depth-image",
        )?;

        log::info!(
            "frame loop created: {} frames in flight, draw image {}x{}",
            desc.frames_in_flight,
            desc.window_extent.width,
            desc.window_extent.height
        );

        Ok(Self {
            device,
            allocator,
            swapchain,
            slots,
            frame_counter: FrameCounter::new(0, desc.frames_in_flight),
            draw_image,
            depth_image,
            window_extent: desc.window_extent,
            resize_pending: false,
            fence_timeout_ns: desc.fence_timeout_ns,
            render_scale: clamp_render_scale(desc.render_scale),
        })
    }
}

// getters
impl FrameLoop {
    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_counter.frame_id()
    }

    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn slot(&self, slot_index: usize) -> &FrameSlot {
        &self.slots[slot_index]
    }

    #[inline]
    pub fn resize_pending(&self) -> bool {
        self.resize_pending
    }

    #[inline]
    pub fn swapchain(&self) -> &GfxRenderSwapchain {
        &self.swapchain
    }

    #[inline]
    pub fn draw_image(&self) -> &AllocatedImage {
        &self.draw_image
    }

    #[inline]
    pub fn depth_image(&self) -> &AllocatedImage {
        &self.depth_image
    }

    #[inline]
    pub fn window_extent(&self) -> vk::Extent2D {
        self.window_extent
    }

    /// `min(swapchain, draw image) * render_scale`，至少为 1
    pub fn draw_extent(&self) -> vk::Extent2D {
        let swapchain_extent = self.swapchain.extent();
        let draw_image_extent = self.draw_image.extent_2d();
        let scale = |a: u32, b: u32| ((a.min(b) as f32 * self.render_scale) as u32).max(1);
        vk::Extent2D {
            width: scale(swapchain_extent.width, draw_image_extent.width),
            height: scale(swapchain_extent.height, draw_image_extent.height),
        }
    }
}

// update
impl FrameLoop {
    /// 窗口层通知新的 drawable 尺寸，交换链在下一帧开始时重建
    pub fn set_window_extent(&mut self, extent: vk::Extent2D) {
        if extent != self.window_extent {
            self.window_extent = extent;
            self.resize_pending = true;
        }
    }

    /// 在帧之外释放一个可能仍被 GPU 使用的资源
    ///
    /// 放入最近一次提交的帧所在 slot 的队列：下次轮到该 slot 时它的 fence 已经等待过，
    /// 队列按顺序执行，更早的帧也已经完成；之后录制的帧不会再引用这个资源
    pub fn defer_disposal(&mut self, disposal: impl Into<Disposal>) {
        let slot_count = self.slots.len();
        let last_submitted = (self.frame_counter.slot_index() + slot_count - 1) % slot_count;
        self.slots[last_submitted].deletion_queue_mut().push(disposal);
    }

    /// 超出 [`RENDER_SCALE_RANGE`] 的值会被截断
    pub fn set_render_scale(&mut self, render_scale: f32) {
        self.render_scale = clamp_render_scale(render_scale);
    }

    /// 绘制一帧
    ///
    /// 交换链过期不是错误：设置 resize 标记后提前结束本帧。
    /// 其他错误（包括 fence 等待超时）都应当被调用方视为致命错误。
    pub fn draw_frame(&mut self, recorder: &mut dyn FrameRecorder) -> GfxResult<()> {
        // 窗口最小化时跳过，resize 标记保留到窗口恢复
        if self.window_extent.width == 0 || self.window_extent.height == 0 {
            return Ok(());
        }
        if self.resize_pending {
            self.resize_swapchain()?;
        }

        let frame_id = self.frame_counter.frame_id();
        let slot_index = self.frame_counter.slot_index();
        let frame_name = self.frame_counter.frame_name();
        let draw_extent = self.draw_extent();
        let slot = &mut self.slots[slot_index];

        // 1. 等待该 slot 上一次提交的工作完成
        slot.in_flight_fence().wait(self.fence_timeout_ns)?;

        // 2. 上一次使用该 slot 时留下的资源
        slot.reclaim()?;

        // 3.
        let image_index = match self.swapchain.acquire_next_image(slot.image_acquired(), self.fence_timeout_ns)? {
            AcquireOutcome::OutOfDate => {
                log::info!("{} swapchain out of date on acquire, recreate next frame", frame_name);
                self.resize_pending = true;
                return Ok(());
            }
            AcquireOutcome::Acquired { image_index, suboptimal } => {
                if suboptimal {
                    log::debug!("{} acquired a suboptimal swapchain image", frame_name);
                }
                image_index
            }
        };

        // 4. 确定本帧一定会提交之后才 reset，避免留下一个永远不会 signal 的 fence
        slot.in_flight_fence().reset()?;

        // 5.
        let cmd = slot.command_buffer().clone();
        let (deletion_queue, descriptors) = slot.frame_resources_mut();
        let mut ctx = FrameContext {
            cmd: &cmd,
            frame_id,
            slot_index,
            draw_image: &self.draw_image,
            depth_image: &self.depth_image,
            draw_extent,
            swapchain_image: self.swapchain.image(image_index),
            swapchain_view: self.swapchain.image_view(image_index),
            swapchain_extent: self.swapchain.extent(),
            deletion_queue,
            descriptors,
        };
        Self::record_frame(&mut ctx, recorder, &frame_name)?;

        // 6.
        let submit_info = GfxSubmitInfo::new(&[&cmd])
            .wait(slot.image_acquired(), vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
            .signal(slot.render_finished(), vk::PipelineStageFlags2::ALL_GRAPHICS);
        self.device.queue_submit(std::slice::from_ref(&submit_info), slot.in_flight_fence().handle())?;

        // 7.
        let present = self.swapchain.present_image(image_index, slot.render_finished())?;
        if present.needs_recreate() {
            log::info!("{} swapchain needs recreate after present: {:?}", frame_name, present);
            self.resize_pending = true;
        }

        // 8.
        self.frame_counter.next_frame();
        Ok(())
    }

    fn record_frame(ctx: &mut FrameContext, recorder: &mut dyn FrameRecorder, frame_name: &str) -> GfxResult<()> {
        let cmd = ctx.cmd;
        let draw_image = ctx.draw_image.vk_image();
        let swapchain_image = ctx.swapchain_image;

        cmd.reset()?;
        cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, frame_name)?;

        cmd.transition_image(draw_image, vk::ImageLayout::UNDEFINED, vk::ImageLayout::GENERAL);
        cmd.begin_label("background", LabelColor::COLOR_PASS);
        recorder.record_background(ctx)?;
        cmd.end_label();

        cmd.transition_image(draw_image, vk::ImageLayout::GENERAL, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        cmd.transition_image(
            ctx.depth_image.vk_image(),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
        );
        cmd.begin_label("geometry", LabelColor::COLOR_PASS);
        recorder.record_geometry(ctx)?;
        cmd.end_label();

        // draw image 拷贝到交换链
        cmd.transition_image(
            draw_image,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        );
        cmd.transition_image(swapchain_image, vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        cmd.blit_image(draw_image, swapchain_image, ctx.draw_extent, ctx.swapchain_extent);

        cmd.transition_image(
            swapchain_image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        );
        cmd.begin_label("overlay", LabelColor::COLOR_PRESENT);
        recorder.record_overlay(ctx)?;
        cmd.end_label();

        cmd.transition_image(
            swapchain_image,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        );
        cmd.end()
    }

    fn resize_swapchain(&mut self) -> GfxResult<()> {
        self.device.wait_idle()?;
        self.swapchain.recreate(self.window_extent)?;
        self.resize_pending = false;

        let extent = self.swapchain.extent();
        log::info!("swapchain resized to {}x{}", extent.width, extent.height);
        Ok(())
    }
}

// destroy
impl FrameLoop {
    pub fn destroy(self) {
        if let Err(e) = self.device.wait_idle() {
            log::error!("wait idle before destroying frame loop failed: {}", e);
        }

        let Self {
            allocator,
            swapchain,
            slots,
            draw_image,
            depth_image,
            ..
        } = self;
        for slot in slots {
            slot.destroy();
        }
        allocator.destroy_image(depth_image);
        allocator.destroy_image(draw_image);
        swapchain.destroy();
    }
}

fn clamp_render_scale(render_scale: f32) -> f32 {
    render_scale.clamp(*RENDER_SCALE_RANGE.start(), *RENDER_SCALE_RANGE.end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ClearRecorder, headless_device, test_frame_loop_desc};
    use ember_gfx::{
        headless::{GpuEvent, HeadlessDevice},
        resources::{allocator::GfxAllocator, buffer::MemoryUsage},
    };

    fn frame_loop(frames_in_flight: usize) -> (Rc<HeadlessDevice>, FrameLoop) {
        let (headless, device) = headless_device();
        let desc = FrameLoopDesc {
            frames_in_flight,
            ..test_frame_loop_desc()
        };
        let frame_loop = FrameLoop::new(device, &desc).unwrap();
        (headless, frame_loop)
    }

    fn count(events: &[GpuEvent], pred: impl Fn(&GpuEvent) -> bool) -> usize {
        events.iter().filter(|e| pred(e)).count()
    }

    #[test]
    fn frames_rotate_through_slots() {
        let (headless, mut frame_loop) = frame_loop(3);
        let mut recorder = ClearRecorder::default();
        for _ in 0..5 {
            frame_loop.draw_frame(&mut recorder).unwrap();
        }
        assert_eq!(frame_loop.frame_id(), 5);
        assert_eq!(recorder.backgrounds, 5);
        assert_eq!(recorder.geometries, 5);
        assert_eq!(recorder.slots, vec![0, 1, 2, 0, 1]);

        headless.wait_idle().unwrap();
        assert!(headless.validation_errors().is_empty(), "{:?}", headless.validation_errors());
        frame_loop.destroy();
        assert_eq!(headless.live_object_count(), 0);
    }

    /// slot s 在第 k 帧提交时 signal 的 fence，必须在第 k+N 帧开始录制之前被 signal 并等待
    #[test]
    fn slot_reuse_waits_for_previous_submission() {
        const N: usize = 2;
        let (headless, mut frame_loop) = frame_loop(N);
        headless.clear_events();

        let mut recorder = ClearRecorder::default();
        for _ in 0..3 * N {
            frame_loop.draw_frame(&mut recorder).unwrap();
        }
        let events = headless.events();

        for slot_index in 0..N {
            let slot = frame_loop.slot(slot_index);
            let fence = slot.in_flight_fence().handle();
            let cmd = slot.command_buffer().vk_handle();

            let begins = events
                .iter()
                .enumerate()
                .filter(|(_, e)| matches!(e, GpuEvent::CommandBufferBegun { command_buffer } if *command_buffer == cmd))
                .map(|(i, _)| i)
                .collect::<Vec<_>>();
            assert_eq!(begins.len(), 3);

            for pair in begins.windows(2) {
                let (prev_begin, next_begin) = (pair[0], pair[1]);
                let between = &events[prev_begin..next_begin];
                let submitted = between
                    .iter()
                    .position(|e| matches!(e, GpuEvent::Submitted { fence: f, .. } if *f == fence))
                    .expect("slot submission");
                let signaled = between
                    .iter()
                    .position(|e| matches!(e, GpuEvent::FenceSignaled { fence: f } if *f == fence))
                    .expect("fence signaled before reuse");
                let waited = between
                    .iter()
                    .rposition(|e| matches!(e, GpuEvent::FenceWaited { fence: f } if *f == fence))
                    .expect("fence waited before reuse");
                assert!(submitted < signaled);
                assert!(signaled < waited);
            }
        }

        frame_loop.destroy();
    }

    #[test]
    fn acquire_out_of_date_defers_resize() {
        let (headless, mut frame_loop) = frame_loop(2);
        let mut recorder = ClearRecorder::default();
        frame_loop.draw_frame(&mut recorder).unwrap();

        headless.push_acquire_out_of_date();
        headless.clear_events();
        frame_loop.draw_frame(&mut recorder).unwrap();

        let events = headless.events();
        assert!(frame_loop.resize_pending());
        assert_eq!(count(&events, |e| matches!(e, GpuEvent::Submitted { .. })), 0);
        assert_eq!(count(&events, |e| matches!(e, GpuEvent::CommandBufferBegun { .. })), 0);
        assert_eq!(recorder.backgrounds, 1);
        assert_eq!(frame_loop.frame_id(), 1);

        // 下一帧先重建交换链，再录制
        headless.clear_events();
        frame_loop.draw_frame(&mut recorder).unwrap();
        let events = headless.events();
        let created = events.iter().position(|e| matches!(e, GpuEvent::SwapchainCreated { .. })).unwrap();
        let destroyed = events.iter().position(|e| matches!(e, GpuEvent::SwapchainDestroyed { .. })).unwrap();
        let begun = events.iter().position(|e| matches!(e, GpuEvent::CommandBufferBegun { .. })).unwrap();
        assert!(destroyed < created);
        assert!(created < begun);
        assert!(!frame_loop.resize_pending());
        assert_eq!(frame_loop.frame_id(), 2);

        frame_loop.destroy();
        assert!(headless.validation_errors().is_empty(), "{:?}", headless.validation_errors());
    }

    #[test]
    fn suboptimal_acquire_still_presents() {
        let (headless, mut frame_loop) = frame_loop(2);
        let mut recorder = ClearRecorder::default();

        headless.push_acquire_suboptimal();
        headless.clear_events();
        frame_loop.draw_frame(&mut recorder).unwrap();

        let events = headless.events();
        assert_eq!(recorder.backgrounds, 1);
        assert_eq!(recorder.geometries, 1);
        assert_eq!(count(&events, |e| matches!(e, GpuEvent::Submitted { .. })), 1);
        assert_eq!(count(&events, |e| matches!(e, GpuEvent::Presented { .. })), 1);
        assert_eq!(count(&events, |e| matches!(e, GpuEvent::SwapchainCreated { .. })), 0);
        assert!(!frame_loop.resize_pending());
        assert_eq!(frame_loop.frame_id(), 1);

        // 下一帧照常进行，不会重建交换链
        headless.clear_events();
        frame_loop.draw_frame(&mut recorder).unwrap();
        assert_eq!(count(&headless.events(), |e| matches!(e, GpuEvent::SwapchainDestroyed { .. })), 0);
        assert_eq!(frame_loop.frame_id(), 2);

        frame_loop.destroy();
        assert!(headless.validation_errors().is_empty(), "{:?}", headless.validation_errors());
    }

    #[test]
    fn present_out_of_date_sets_resize_flag() {
        let (headless, mut frame_loop) = frame_loop(2);
        let mut recorder = ClearRecorder::default();

        headless.push_present_out_of_date();
        frame_loop.draw_frame(&mut recorder).unwrap();
        assert!(frame_loop.resize_pending());
        // 已经提交的帧仍然算数
        assert_eq!(frame_loop.frame_id(), 1);

        frame_loop.draw_frame(&mut recorder).unwrap();
        assert!(!frame_loop.resize_pending());
        assert_eq!(frame_loop.frame_id(), 2);

        frame_loop.destroy();
        assert!(headless.validation_errors().is_empty(), "{:?}", headless.validation_errors());
    }

    #[test]
    fn window_resize_recreates_with_new_extent() {
        let (headless, mut frame_loop) = frame_loop(2);
        let mut recorder = ClearRecorder::default();
        frame_loop.draw_frame(&mut recorder).unwrap();

        let new_extent = vk::Extent2D { width: 320, height: 200 };
        headless.set_surface_extent(new_extent);
        frame_loop.set_window_extent(new_extent);
        frame_loop.draw_frame(&mut recorder).unwrap();

        assert_eq!(frame_loop.swapchain().extent(), new_extent);
        // draw image 不重建，绘制区域取较小值
        assert_eq!(frame_loop.draw_extent(), new_extent);

        frame_loop.destroy();
    }

    #[test]
    fn minimized_window_skips_frame() {
        let (headless, mut frame_loop) = frame_loop(2);
        let mut recorder = ClearRecorder::default();

        frame_loop.set_window_extent(vk::Extent2D { width: 0, height: 0 });
        headless.clear_events();
        frame_loop.draw_frame(&mut recorder).unwrap();
        assert!(headless.events().is_empty());
        assert!(frame_loop.resize_pending());
        assert_eq!(frame_loop.frame_id(), 0);

        frame_loop.destroy();
    }

    #[test]
    fn stalled_gpu_times_out_on_slot_fence() {
        let (headless, mut frame_loop) = frame_loop(2);
        let mut recorder = ClearRecorder::default();
        frame_loop.draw_frame(&mut recorder).unwrap();
        frame_loop.draw_frame(&mut recorder).unwrap();

        headless.stall_gpu(true);
        let err = frame_loop.draw_frame(&mut recorder).unwrap_err();
        assert_eq!(err.vk_result(), Some(vk::Result::TIMEOUT));
        assert_eq!(recorder.backgrounds, 2);

        headless.stall_gpu(false);
        frame_loop.destroy();
    }

    #[test]
    fn slot_disposals_wait_for_next_visit() {
        let (headless, mut frame_loop) = frame_loop(2);
        let mut recorder = ClearRecorder {
            transient_buffer: Some((64, MemoryUsage::CpuToGpu)),
            ..Default::default()
        };

        frame_loop.draw_frame(&mut recorder).unwrap();
        assert_eq!(headless.live_buffer_count(), 1);
        frame_loop.draw_frame(&mut recorder).unwrap();
        assert_eq!(headless.live_buffer_count(), 2);

        // 第三帧回到 slot 0，上一次留下的 buffer 被回收，本帧又创建一个
        frame_loop.draw_frame(&mut recorder).unwrap();
        assert_eq!(headless.live_buffer_count(), 2);
        assert_eq!(frame_loop.slot(0).deletion_queue().len(), 1);

        frame_loop.destroy();
        assert_eq!(headless.live_buffer_count(), 0);
    }

    #[test]
    fn deferred_disposal_outlives_frames_in_flight() {
        let (headless, mut frame_loop) = frame_loop(2);
        let mut recorder = ClearRecorder::default();
        let allocator = GfxAllocator::new(frame_loop.device.clone());
        let buffer = allocator
            .create_buffer(16, vk::BufferUsageFlags::INDEX_BUFFER, MemoryUsage::GpuOnly, "retired")
            .unwrap();

        frame_loop.draw_frame(&mut recorder).unwrap();
        frame_loop.defer_disposal(buffer);
        assert_eq!(frame_loop.slot(0).deletion_queue().len(), 1);

        // slot 1 的帧不会回收 slot 0 的资源
        frame_loop.draw_frame(&mut recorder).unwrap();
        assert_eq!(headless.live_buffer_count(), 1);

        frame_loop.draw_frame(&mut recorder).unwrap();
        assert_eq!(headless.live_buffer_count(), 0);

        frame_loop.destroy();
        assert!(headless.validation_errors().is_empty(), "{:?}", headless.validation_errors());
    }

    #[test]
    fn swapchain_image_ends_in_present_layout() {
        let (headless, mut frame_loop) = frame_loop(2);
        let mut recorder = ClearRecorder::default();
        frame_loop.draw_frame(&mut recorder).unwrap();
        headless.wait_idle().unwrap();

        let image = frame_loop.swapchain().image(0);
        assert_eq!(headless.image_layout(image), Some(vk::ImageLayout::PRESENT_SRC_KHR));
        assert_eq!(
            headless.image_layout(frame_loop.draw_image().vk_image()),
            Some(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
        );

        frame_loop.destroy();
    }

    #[test]
    fn render_scale_shrinks_draw_extent() {
        let (_headless, mut frame_loop) = frame_loop(2);
        frame_loop.set_render_scale(0.5);
        let full = frame_loop.draw_image().extent_2d();
        assert_eq!(
            frame_loop.draw_extent(),
            vk::Extent2D {
                width: full.width / 2,
                height: full.height / 2
            }
        );
        frame_loop.destroy();
    }

    #[test]
    fn render_scale_is_clamped_on_creation() {
        let (_headless, device) = headless_device();
        let desc = FrameLoopDesc {
            render_scale: 0.01,
            ..test_frame_loop_desc()
        };
        let mut frame_loop = FrameLoop::new(device, &desc).unwrap();
        // 640x480 * 0.1
        assert_eq!(frame_loop.draw_extent(), vk::Extent2D { width: 64, height: 48 });

        frame_loop.set_render_scale(4.0);
        assert_eq!(frame_loop.draw_extent(), vk::Extent2D { width: 640, height: 480 });
        frame_loop.destroy();
    }
}
