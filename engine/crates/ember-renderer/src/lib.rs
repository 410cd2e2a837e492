//! Ember 渲染层
//!
//! 在 `ember-gfx` 之上组织一帧的生命周期：
//! - [`frame::frame_loop::FrameLoop`]：N 个 frame slot 轮转，等待 fence、回收资源、获取交换链图像、录制、提交与呈现
//! - [`mesh`]：通过 staging buffer 把顶点与索引上传到 GPU
//! - [`material`]：metallic-roughness 管线与材质实例
//! - [`scene`]：索引式场景图与每帧的绘制列表
//! - [`render_engine::RenderEngine`]：把以上组件连接起来，对外提供加载与绘制接口

pub mod config;
pub mod default_resources;
pub mod frame;
pub mod material;
pub mod mesh;
pub mod render_engine;
pub mod scene;
pub mod scene_renderer;

#[cfg(test)]
pub(crate) mod test_utils;
