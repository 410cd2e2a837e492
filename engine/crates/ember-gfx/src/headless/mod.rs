//! 不依赖 GPU 的 [`GfxDevice`](crate::foundation::device::GfxDevice) 实现
//!
//! - 提交进入一个 host 端的队列，直到有人等待 fence 或者 `wait_idle` 时才执行
//! - 执行时模拟 buffer/image 拷贝与 image layout 的变化，并检查 layout、绑定状态
//! - semaphore 与 fence 的使用会在提交时检查，违反规则的调用返回 [`GfxError::Validation`]
//!   并记录在 [`HeadlessDevice::validation_errors`] 中
//! - swapchain 固定 3 张 image，按顺序轮转；可以脚本化地注入 OUT_OF_DATE
//! - 可以限制分配次数，模拟显存耗尽
//!
//! [`GfxError::Validation`]: crate::error::GfxError::Validation

mod device_impl;
mod event;
mod state;

use std::cell::RefCell;

use ash::vk;

pub use event::{GpuEvent, HeadlessCommand};
use state::{HeadlessState, PipelineRecord, ScriptedAcquire};

use crate::pipelines::graphics_pipeline::GraphicsPipelineDesc;

/// swapchain 中 image 的数量
pub const HEADLESS_SWAPCHAIN_IMAGES: u32 = 3;

#[derive(Default)]
pub struct HeadlessDevice {
    state: RefCell<HeadlessState>,
}

// new & init
impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }
}

// knobs
impl HeadlessDevice {
    /// 模拟 GPU 卡住：队列不再执行，等待 fence 会超时
    pub fn stall_gpu(&self, stalled: bool) {
        self.state.borrow_mut().stalled = stalled;
    }

    /// 模拟窗口尺寸变化，和 surface 尺寸不一致的 swapchain 在 acquire 时返回 OUT_OF_DATE
    pub fn set_surface_extent(&self, extent: vk::Extent2D) {
        self.state.borrow_mut().surface_extent = Some(extent);
    }

    /// 下一次 acquire 返回 OUT_OF_DATE
    pub fn push_acquire_out_of_date(&self) {
        self.state.borrow_mut().acquire_script.push_back(ScriptedAcquire::OutOfDate);
    }

    /// 下一次 acquire 成功，但是标记为 suboptimal
    pub fn push_acquire_suboptimal(&self) {
        self.state.borrow_mut().acquire_script.push_back(ScriptedAcquire::Suboptimal);
    }

    /// 之后只允许 `count` 次 buffer/image 分配成功，再往后返回 OUT_OF_DEVICE_MEMORY；None 取消限制
    pub fn set_allocation_budget(&self, count: Option<usize>) {
        self.state.borrow_mut().allocation_budget = count;
    }

    /// 下一次 present 返回 OUT_OF_DATE
    pub fn push_present_out_of_date(&self) {
        self.state.borrow_mut().present_script.push_back(());
    }

    pub fn clear_events(&self) {
        self.state.borrow_mut().events.clear();
    }
}

// getters
impl HeadlessDevice {
    pub fn events(&self) -> Vec<GpuEvent> {
        self.state.borrow().events.clone()
    }

    /// 已经被队列执行过的命令，按执行顺序
    pub fn executed_commands(&self) -> Vec<HeadlessCommand> {
        self.state.borrow().executed.clone()
    }

    pub fn validation_errors(&self) -> Vec<String> {
        self.state.borrow().validation_errors.clone()
    }

    /// 已提交但还没有执行的 submit 数量
    pub fn pending_submissions(&self) -> usize {
        self.state.borrow().pending_submissions()
    }

    /// 所有尚未销毁的设备对象，swapchain image 与 descriptor set 不计入
    pub fn live_object_count(&self) -> usize {
        self.state.borrow().live_object_count()
    }

    pub fn live_buffer_count(&self) -> usize {
        self.state.borrow().buffers.len()
    }

    pub fn image_layout(&self, image: vk::Image) -> Option<vk::ImageLayout> {
        self.state.borrow().images.get(&image).map(|record| record.layout)
    }

    /// image level 0 的内容
    pub fn read_image(&self, image: vk::Image) -> Option<Vec<u8>> {
        let state = self.state.borrow();
        let key = state.images.get(&image)?.memory?;
        state.memory.get(key).cloned()
    }

    pub fn layout_bindings(&self, layout: vk::DescriptorSetLayout) -> Option<Vec<(vk::DescriptorType, u32)>> {
        self.state
            .borrow()
            .set_layouts
            .get(&layout)
            .map(|bindings| bindings.iter().map(|b| (b.descriptor_type, b.count)).collect())
    }

    pub fn is_descriptor_set_valid(&self, set: vk::DescriptorSet) -> bool {
        self.state.borrow().descriptor_sets.contains_key(&set)
    }

    pub fn graphics_pipeline_desc(&self, pipeline: vk::Pipeline) -> Option<GraphicsPipelineDesc> {
        match self.state.borrow().pipelines.get(&pipeline) {
            Some(PipelineRecord::Graphics(desc)) => Some(*desc),
            _ => None,
        }
    }

    pub fn is_fence_signaled(&self, fence: vk::Fence) -> Option<bool> {
        self.state.borrow().fences.get(&fence).copied()
    }
}
