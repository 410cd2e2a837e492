use std::{cell::Cell, rc::Rc};

use ash::vk;

use crate::{
    basic::color::LabelColor,
    commands::{
        command_buffer::GfxCommandBuffer, command_pool::GfxCommandPool, fence::GfxFence, submit_info::GfxSubmitInfo,
    },
    error::{GfxError, GfxResult},
    foundation::device::GfxDevice,
};

/// 同步执行一段 GPU 命令：提交之后阻塞等待完成
///
/// 只用于加载期的上传与 layout 转换，不应出现在每帧的热路径上。
pub struct ImmediateSubmit {
    device: Rc<dyn GfxDevice>,
    fence: GfxFence,
    command_pool: GfxCommandPool,
    command_buffer: GfxCommandBuffer,
    timeout_ns: u64,

    /// 防止在录制回调中再次调用 submit
    recording: Cell<bool>,
}

// new & init
impl ImmediateSubmit {
    /// `timeout_ns` 为 `u64::MAX` 时不限时等待
    pub fn new(device: Rc<dyn GfxDevice>, timeout_ns: u64) -> GfxResult<Self> {
        let fence = GfxFence::new(device.clone(), true, "immediate-submit")?;
        let command_pool = GfxCommandPool::new(
            device.clone(),
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            "immediate-submit",
        )?;
        let command_buffer = GfxCommandBuffer::new(device.clone(), &command_pool, "immediate-submit")?;

        Ok(Self {
            device,
            fence,
            command_pool,
            command_buffer,
            timeout_ns,
            recording: Cell::new(false),
        })
    }
}

// tools
impl ImmediateSubmit {
    /// 录制 `record` 中的命令并提交到 graphics queue，阻塞直到 GPU 执行完毕
    ///
    /// 返回 `record` 的返回值
    pub fn submit<R>(&self, name: &str, record: impl FnOnce(&GfxCommandBuffer) -> R) -> GfxResult<R> {
        if self.recording.replace(true) {
            return Err(GfxError::InvalidArgument(format!("nested immediate submit `{name}`")));
        }
        let result = self.submit_inner(name, record);
        self.recording.set(false);
        result
    }

    fn submit_inner<R>(&self, name: &str, record: impl FnOnce(&GfxCommandBuffer) -> R) -> GfxResult<R> {
        self.fence.reset()?;
        self.command_buffer.reset()?;

        self.command_buffer.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, "immediate-submit")?;
        self.command_buffer.begin_label(name, LabelColor::COLOR_UPLOAD);
        let output = record(&self.command_buffer);
        self.command_buffer.end_label();
        self.command_buffer.end()?;

        let submit_info = GfxSubmitInfo::new(&[&self.command_buffer]);
        self.device.queue_submit(std::slice::from_ref(&submit_info), self.fence.handle())?;
        self.fence.wait(self.timeout_ns)?;

        Ok(output)
    }
}

// destroy
impl ImmediateSubmit {
    pub fn destroy(self) {
        self.fence.destroy();
        // command buffer 随 pool 一起释放
        self.command_pool.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{GpuEvent, HeadlessDevice};

    #[test]
    fn submit_blocks_until_fence_signals() {
        let headless = Rc::new(HeadlessDevice::new());
        let device: Rc<dyn GfxDevice> = headless.clone();
        let immediate = ImmediateSubmit::new(device, u64::MAX).unwrap();
        headless.clear_events();

        let value = immediate.submit("noop", |_cmd| 42).unwrap();
        assert_eq!(value, 42);

        let events = headless.events();
        let submitted = events.iter().position(|e| matches!(e, GpuEvent::Submitted { .. })).unwrap();
        let signaled = events.iter().position(|e| matches!(e, GpuEvent::FenceSignaled { .. })).unwrap();
        let waited = events.iter().position(|e| matches!(e, GpuEvent::FenceWaited { .. })).unwrap();
        assert!(submitted < signaled);
        assert!(signaled < waited);
        assert_eq!(headless.pending_submissions(), 0);

        immediate.destroy();
    }

    #[test]
    fn submit_can_be_reused() {
        let headless = Rc::new(HeadlessDevice::new());
        let immediate = ImmediateSubmit::new(headless.clone(), u64::MAX).unwrap();
        for i in 0..3 {
            assert_eq!(immediate.submit("loop", |_| i).unwrap(), i);
        }
        let submits = headless.events().iter().filter(|e| matches!(e, GpuEvent::Submitted { .. })).count();
        assert_eq!(submits, 3);
        immediate.destroy();
    }

    #[test]
    fn nested_submit_is_rejected() {
        let headless = Rc::new(HeadlessDevice::new());
        let immediate = ImmediateSubmit::new(headless.clone(), u64::MAX).unwrap();
        let inner = immediate.submit("outer", |_| immediate.submit("inner", |_| ())).unwrap();
        assert!(matches!(inner, Err(GfxError::InvalidArgument(_))));
        immediate.destroy();
    }

    #[test]
    fn stalled_gpu_times_out() {
        let headless = Rc::new(HeadlessDevice::new());
        let immediate = ImmediateSubmit::new(headless.clone(), 1_000).unwrap();
        headless.stall_gpu(true);
        let err = immediate.submit("stalled", |_| ()).unwrap_err();
        assert!(matches!(err, GfxError::Timeout { .. }));
        headless.stall_gpu(false);
        immediate.destroy();
    }
}
