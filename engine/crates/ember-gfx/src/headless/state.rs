use std::collections::{HashMap, HashSet, VecDeque};

use ash::vk::{self, Handle};
use slotmap::SlotMap;

use crate::{
    error::GfxError,
    headless::event::{GpuEvent, HeadlessCommand},
    pipelines::{compute_pipeline::ComputePipelineDesc, graphics_pipeline::GraphicsPipelineDesc},
    resources::{allocation::AllocationKey, buffer::MemoryUsage, image::texel_size},
};

pub(super) struct BufferRecord {
    pub memory: AllocationKey,
    pub memory_usage: MemoryUsage,
    pub name: String,
}

pub(super) struct ImageRecord {
    /// swapchain image 没有 host 端的存储
    pub memory: Option<AllocationKey>,
    pub extent: vk::Extent3D,
    pub format: vk::Format,
    pub layout: vk::ImageLayout,
    pub view: vk::ImageView,
    pub owned_by_swapchain: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum CommandBufferState {
    Initial,
    Recording,
    Executable,
    Pending,
}

pub(super) struct CommandBufferRecord {
    pub pool: vk::CommandPool,
    pub state: CommandBufferState,
    pub commands: Vec<HeadlessCommand>,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct LayoutBinding {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub count: u32,
}

pub(super) struct DescriptorPoolRecord {
    pub max_sets: u32,
    pub capacity: Vec<vk::DescriptorPoolSize>,
    pub remaining: HashMap<vk::DescriptorType, u32>,
    pub sets: Vec<vk::DescriptorSet>,
}

impl DescriptorPoolRecord {
    pub fn new(max_sets: u32, pool_sizes: &[vk::DescriptorPoolSize]) -> Self {
        let mut record = Self {
            max_sets,
            capacity: pool_sizes.to_vec(),
            remaining: HashMap::new(),
            sets: vec![],
        };
        record.reset();
        record
    }

    pub fn reset(&mut self) {
        self.sets.clear();
        self.remaining.clear();
        for size in &self.capacity {
            *self.remaining.entry(size.ty).or_insert(0) += size.descriptor_count;
        }
    }

    /// 只检查容量，不修改状态
    pub fn can_fit(&self, bindings: &[LayoutBinding]) -> bool {
        if self.sets.len() as u32 >= self.max_sets {
            return false;
        }
        let mut needed: HashMap<vk::DescriptorType, u32> = HashMap::new();
        for binding in bindings {
            *needed.entry(binding.descriptor_type).or_insert(0) += binding.count;
        }
        needed.iter().all(|(ty, count)| self.remaining.get(ty).copied().unwrap_or(0) >= *count)
    }
}

pub(super) struct DescriptorSetRecord {
    pub bindings: Vec<LayoutBinding>,
}

pub(super) enum PipelineRecord {
    Graphics(GraphicsPipelineDesc),
    Compute(ComputePipelineDesc),
}

pub(super) struct SwapchainRecord {
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub next_image: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ScriptedAcquire {
    OutOfDate,
    Suboptimal,
}

/// 队列中等待执行的操作
pub(super) enum QueueOp {
    Submit {
        command_buffers: Vec<vk::CommandBuffer>,
        fence: vk::Fence,
    },
    /// present 在队列中排在之前的提交之后，执行时检查 image layout
    Present { image: vk::Image },
}

impl QueueOp {
    fn fence(&self) -> Option<vk::Fence> {
        match self {
            QueueOp::Submit { fence, .. } if *fence != vk::Fence::null() => Some(*fence),
            _ => None,
        }
    }
}

/// 执行一个 command buffer 期间的绑定状态
#[derive(Default)]
struct ExecState {
    rendering: bool,
    graphics_pipeline: Option<vk::Pipeline>,
    compute_pipeline: Option<vk::Pipeline>,
}

#[derive(Default)]
pub(super) struct HeadlessState {
    next_handle: u64,

    pub events: Vec<GpuEvent>,
    pub validation_errors: Vec<String>,
    pub executed: Vec<HeadlessCommand>,
    pub stalled: bool,
    pub queue: VecDeque<QueueOp>,

    pub memory: SlotMap<AllocationKey, Vec<u8>>,
    pub buffers: HashMap<vk::Buffer, BufferRecord>,
    pub images: HashMap<vk::Image, ImageRecord>,
    pub views: HashMap<vk::ImageView, vk::Image>,
    pub samplers: HashSet<vk::Sampler>,

    pub fences: HashMap<vk::Fence, bool>,
    pub semaphores: HashMap<vk::Semaphore, bool>,
    pub command_pools: HashMap<vk::CommandPool, vk::CommandPoolCreateFlags>,
    pub command_buffers: HashMap<vk::CommandBuffer, CommandBufferRecord>,

    pub set_layouts: HashMap<vk::DescriptorSetLayout, Vec<LayoutBinding>>,
    pub descriptor_pools: HashMap<vk::DescriptorPool, DescriptorPoolRecord>,
    pub descriptor_sets: HashMap<vk::DescriptorSet, DescriptorSetRecord>,

    pub shader_modules: HashSet<vk::ShaderModule>,
    pub pipeline_layouts: HashSet<vk::PipelineLayout>,
    pub pipelines: HashMap<vk::Pipeline, PipelineRecord>,

    pub swapchains: HashMap<vk::SwapchainKHR, SwapchainRecord>,
    pub surface_extent: Option<vk::Extent2D>,
    pub acquire_script: VecDeque<ScriptedAcquire>,
    pub present_script: VecDeque<()>,
    /// 还能成功的 buffer/image 分配次数，None 表示不限
    pub allocation_budget: Option<usize>,
}

// tools
impl HeadlessState {
    /// 消耗一次分配额度，额度用完时返回 OUT_OF_DEVICE_MEMORY
    pub fn take_allocation(&mut self, call: &'static str) -> Result<(), GfxError> {
        match self.allocation_budget.as_mut() {
            Some(0) => Err(GfxError::Vulkan {
                call,
                result: vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
            }),
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// 所有句柄共用一个递增的计数器，保证不同类型的句柄也互不相同
    pub fn new_handle<H: Handle>(&mut self) -> H {
        self.next_handle += 1;
        H::from_raw(self.next_handle)
    }

    /// 记录一次 API 误用，返回对应的错误
    pub fn report(&mut self, message: String) -> GfxError {
        log::error!("[headless] {}", message);
        self.validation_errors.push(message.clone());
        GfxError::Validation(message)
    }

    pub fn live_object_count(&self) -> usize {
        self.buffers.len()
            + self.images.values().filter(|image| !image.owned_by_swapchain).count()
            + self.samplers.len()
            + self.fences.len()
            + self.semaphores.len()
            + self.command_pools.len()
            + self.set_layouts.len()
            + self.descriptor_pools.len()
            + self.shader_modules.len()
            + self.pipeline_layouts.len()
            + self.pipelines.len()
            + self.swapchains.len()
    }

    pub fn pending_submissions(&self) -> usize {
        self.queue.iter().filter(|op| matches!(op, QueueOp::Submit { .. })).count()
    }

    pub fn is_fence_queued(&self, fence: vk::Fence) -> bool {
        self.queue.iter().any(|op| op.fence() == Some(fence))
    }

    pub fn record(&mut self, cmd: vk::CommandBuffer, command: HeadlessCommand) {
        match self.command_buffers.get_mut(&cmd) {
            Some(record) if record.state == CommandBufferState::Recording => record.commands.push(command),
            Some(record) => {
                let message = format!("command recorded into `{}` in state {:?}", record.name, record.state);
                self.report(message);
            }
            None => {
                self.report(format!("command recorded into unknown command buffer {:?}", cmd));
            }
        }
    }
}

// queue execution
impl HeadlessState {
    /// 执行队列中的操作，直到 `fence` 对应的提交完成；`None` 表示执行全部
    pub fn execute_queue(&mut self, fence: Option<vk::Fence>) {
        while let Some(op) = self.queue.pop_front() {
            let op_fence = op.fence();
            self.execute_op(op);
            if fence.is_some() && op_fence == fence {
                break;
            }
        }
    }

    fn execute_op(&mut self, op: QueueOp) {
        match op {
            QueueOp::Submit {
                command_buffers,
                fence,
            } => {
                for cmd in command_buffers {
                    self.execute_command_buffer(cmd);
                }
                if fence != vk::Fence::null() {
                    if let Some(signaled) = self.fences.get_mut(&fence) {
                        *signaled = true;
                        self.events.push(GpuEvent::FenceSignaled { fence });
                    }
                }
            }
            QueueOp::Present { image } => {
                self.expect_layout(image, vk::ImageLayout::PRESENT_SRC_KHR, "present");
            }
        }
    }

    fn execute_command_buffer(&mut self, cmd: vk::CommandBuffer) {
        let commands = match self.command_buffers.get(&cmd) {
            Some(record) => record.commands.clone(),
            None => {
                self.report(format!("executing destroyed command buffer {:?}", cmd));
                return;
            }
        };

        let mut exec = ExecState::default();
        for command in commands {
            self.apply(&command, &mut exec);
            self.executed.push(command);
        }
        if exec.rendering {
            self.report("command buffer ended inside a rendering scope".to_string());
        }

        if let Some(record) = self.command_buffers.get_mut(&cmd) {
            if record.state == CommandBufferState::Pending {
                record.state = CommandBufferState::Executable;
            }
        }
    }

    fn apply(&mut self, command: &HeadlessCommand, exec: &mut ExecState) {
        match command {
            HeadlessCommand::ImageBarrier {
                image,
                old_layout,
                new_layout,
            } => self.transition(*image, *old_layout, *new_layout),
            HeadlessCommand::CopyBuffer { src, dst, regions } => {
                for region in regions {
                    self.copy_buffer(*src, *dst, region);
                }
            }
            HeadlessCommand::CopyBufferToImage {
                src,
                dst,
                dst_layout,
                regions,
            } => {
                if *dst_layout != vk::ImageLayout::TRANSFER_DST_OPTIMAL && *dst_layout != vk::ImageLayout::GENERAL {
                    self.report(format!("copy into image with layout {:?}", dst_layout));
                }
                self.expect_layout(*dst, *dst_layout, "copy buffer to image");
                for region in regions {
                    self.copy_buffer_to_image(*src, *dst, region);
                }
            }
            HeadlessCommand::BlitImage { src, dst, .. } => {
                self.expect_layout(*src, vk::ImageLayout::TRANSFER_SRC_OPTIMAL, "blit source");
                self.expect_layout(*dst, vk::ImageLayout::TRANSFER_DST_OPTIMAL, "blit destination");
            }
            HeadlessCommand::ClearColorImage { image, layout, color } => {
                self.expect_layout(*image, *layout, "clear color image");
                self.fill_image(*image, *color);
            }
            HeadlessCommand::BeginRendering {
                color_view,
                depth_view,
                ..
            } => {
                if exec.rendering {
                    self.report("nested begin rendering".to_string());
                }
                exec.rendering = true;
                self.expect_view_layout(*color_view, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL, "color attachment");
                if let Some(depth_view) = depth_view {
                    self.expect_view_layout(*depth_view, vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL, "depth attachment");
                }
            }
            HeadlessCommand::EndRendering => {
                if !exec.rendering {
                    self.report("end rendering without begin".to_string());
                }
                exec.rendering = false;
            }
            HeadlessCommand::BindPipeline { bind_point, pipeline } => match (self.pipelines.get(pipeline), *bind_point) {
                (Some(PipelineRecord::Graphics(_)), vk::PipelineBindPoint::GRAPHICS) => {
                    exec.graphics_pipeline = Some(*pipeline)
                }
                (Some(PipelineRecord::Compute(_)), vk::PipelineBindPoint::COMPUTE) => {
                    exec.compute_pipeline = Some(*pipeline)
                }
                _ => {
                    self.report(format!("invalid pipeline {:?} bound at {:?}", pipeline, bind_point));
                }
            },
            HeadlessCommand::BindDescriptorSets { sets, .. } => {
                for set in sets {
                    if !self.descriptor_sets.contains_key(set) {
                        self.report(format!("bound descriptor set {:?} is no longer valid", set));
                    }
                }
            }
            HeadlessCommand::DrawIndexed { .. } => {
                if !exec.rendering || exec.graphics_pipeline.is_none() {
                    self.report("draw outside of rendering or without a graphics pipeline".to_string());
                }
            }
            HeadlessCommand::Dispatch { .. } => {
                if exec.rendering || exec.compute_pipeline.is_none() {
                    self.report("dispatch inside rendering or without a compute pipeline".to_string());
                }
            }
            HeadlessCommand::PushConstants { .. }
            | HeadlessCommand::BindIndexBuffer { .. }
            | HeadlessCommand::SetViewport { .. }
            | HeadlessCommand::SetScissor { .. }
            | HeadlessCommand::BeginLabel(_)
            | HeadlessCommand::EndLabel => {}
        }
    }

    fn transition(&mut self, image: vk::Image, old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) {
        let Some(record) = self.images.get_mut(&image) else {
            self.report(format!("barrier on unknown image {:?}", image));
            return;
        };
        let current = record.layout;
        record.layout = new_layout;
        if old_layout != vk::ImageLayout::UNDEFINED && old_layout != current {
            self.report(format!(
                "image {:?} barrier expects {:?} but image is in {:?}",
                image, old_layout, current
            ));
        }
    }

    fn expect_layout(&mut self, image: vk::Image, expected: vk::ImageLayout, what: &str) {
        let current = self.images.get(&image).map(|record| record.layout);
        match current {
            Some(layout) if layout == expected => {}
            Some(layout) => {
                self.report(format!("{}: image {:?} is in {:?}, expected {:?}", what, image, layout, expected));
            }
            None => {
                self.report(format!("{}: unknown image {:?}", what, image));
            }
        }
    }

    fn expect_view_layout(&mut self, view: vk::ImageView, expected: vk::ImageLayout, what: &str) {
        match self.views.get(&view).copied() {
            Some(image) => self.expect_layout(image, expected, what),
            None => {
                self.report(format!("{}: unknown image view {:?}", what, view));
            }
        }
    }

    fn copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, region: &vk::BufferCopy) {
        let (Some(src_key), Some(dst_key)) =
            (self.buffers.get(&src).map(|b| b.memory), self.buffers.get(&dst).map(|b| b.memory))
        else {
            self.report(format!("copy between unknown buffers {:?} -> {:?}", src, dst));
            return;
        };

        let src_range = region.src_offset as usize..(region.src_offset + region.size) as usize;
        let dst_range = region.dst_offset as usize..(region.dst_offset + region.size) as usize;
        if src_range.end > self.memory[src_key].len() || dst_range.end > self.memory[dst_key].len() {
            self.report(format!("buffer copy region {:?} out of bounds", region));
            return;
        }
        let data = self.memory[src_key][src_range].to_vec();
        self.memory[dst_key][dst_range].copy_from_slice(&data);
    }

    fn copy_buffer_to_image(&mut self, src: vk::Buffer, dst: vk::Image, region: &vk::BufferImageCopy) {
        let Some(src_key) = self.buffers.get(&src).map(|b| b.memory) else {
            self.report(format!("copy from unknown buffer {:?}", src));
            return;
        };
        let Some((dst_key, image_extent, format)) =
            self.images.get(&dst).map(|image| (image.memory, image.extent, image.format))
        else {
            self.report(format!("copy into unknown image {:?}", dst));
            return;
        };
        // 只保存 level 0 的内容
        let Some(dst_key) = dst_key else { return };
        if region.image_subresource.mip_level != 0 {
            return;
        }

        let texel = format_texel_size(format) as usize;
        let width = region.image_extent.width as usize;
        let height = region.image_extent.height as usize;
        let row_length = if region.buffer_row_length == 0 {
            width
        } else {
            region.buffer_row_length as usize
        };
        let offset_x = region.image_offset.x.max(0) as usize;
        let offset_y = region.image_offset.y.max(0) as usize;
        if offset_x + width > image_extent.width as usize || offset_y + height > image_extent.height as usize {
            self.report(format!("buffer to image region {:?} exceeds image extent", region));
            return;
        }

        for y in 0..height {
            let src_start = region.buffer_offset as usize + y * row_length * texel;
            let dst_start = ((offset_y + y) * image_extent.width as usize + offset_x) * texel;
            let len = width * texel;
            if src_start + len > self.memory[src_key].len() {
                self.report(format!("buffer to image copy reads past the end of {:?}", src));
                return;
            }
            let row = self.memory[src_key][src_start..src_start + len].to_vec();
            self.memory[dst_key][dst_start..dst_start + len].copy_from_slice(&row);
        }
    }

    /// 只对 8bit 的格式写入像素，其它格式保持原样
    fn fill_image(&mut self, image: vk::Image, color: [f32; 4]) {
        let Some(record) = self.images.get(&image) else { return };
        let Some(key) = record.memory else { return };
        if format_texel_size(record.format) != 4 {
            return;
        }
        let texel = color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
        for chunk in self.memory[key].chunks_exact_mut(4) {
            chunk.copy_from_slice(&texel);
        }
    }
}

/// level 0 每个 texel 占用的字节数
pub(super) fn format_texel_size(format: vk::Format) -> u64 {
    texel_size(format).unwrap_or(4)
}
