//! Vulkan GFX 抽象层
//!
//! 所有 GPU 调用都经过 [`foundation::device::GfxDevice`] trait，组件通过显式传入的
//! `Rc<dyn GfxDevice>` 访问设备，而不是全局单例。
//!
//! - [`vulkan::VulkanDevice`]：基于 ash + vk-mem 的真实后端
//! - [`headless::HeadlessDevice`]：在 host 上模拟队列、fence、semaphore、descriptor pool
//!   与 swapchain 行为的后端，用于测试以及无窗口环境
//!
//! 在设备之上提供：延迟销毁队列、buffer/image 分配器、可增长的 descriptor 分配器、
//! 同步提交执行器、管线构建器与交换链封装。

pub mod basic;
pub mod commands;
pub mod deletion_queue;
pub mod descriptors;
pub mod error;
pub mod foundation;
pub mod headless;
pub mod pipelines;
pub mod resources;
pub mod swapchain;
pub mod vulkan;
