use std::{rc::Rc, time::Instant};

use anyhow::Context;
use ash::vk;
use ember_crate_tools::{init_log::init_log, resource::EmberPath};
use ember_gfx::{error::GfxResult, foundation::device::GfxDevice, vulkan::VulkanDevice};
use ember_renderer::{
    config::RendererConfig,
    render_engine::{EngineShaders, RenderEngine},
    scene::scene_graph::NodeId,
};
use glam::Mat4;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowId},
};

use crate::demo_scene;

pub fn panic_handler(info: &std::panic::PanicHookInfo) {
    log::error!("{}", info);
}

pub struct EmberApp {
    config: RendererConfig,

    /// 必须在 window 之前销毁，surface 引用了 window
    engine: Option<RenderEngine>,
    spinning_node: Option<NodeId>,
    start_time: Instant,

    window: Option<Window>,
}
// 总的 main 函数
impl EmberApp {
    /// 整个程序的入口
    pub fn run() -> anyhow::Result<()> {
        Self::init_env();

        let config = RendererConfig::load(EmberPath::config_path())?;
        let event_loop = EventLoop::new()?;

        let mut app = Self {
            config,
            engine: None,
            spinning_node: None,
            start_time: Instant::now(),
            window: None,
        };
        event_loop.run_app(&mut app)?;

        log::info!("end run.");

        app.destroy();
        Ok(())
    }

    fn init_env() {
        std::panic::set_hook(Box::new(panic_handler));
        init_log();
    }
}
// new & init
impl EmberApp {
    /// 在 window 创建之后调用，初始化 Vulkan 设备与 RenderEngine
    fn init_after_window(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let [width, height] = self.config.window_extent;
        let window_attr = Window::default_attributes()
            .with_title(self.config.app_name.clone())
            .with_inner_size(winit::dpi::PhysicalSize::new(width, height));
        let window = event_loop.create_window(window_attr).context("failed to create window")?;

        let device = VulkanDevice::new(
            &self.config.app_name,
            self.config.validation,
            window.display_handle()?.as_raw(),
            window.window_handle()?.as_raw(),
        )?;
        let device: Rc<dyn GfxDevice> = Rc::new(device);

        let shaders = EngineShaders::load_from(EmberPath::shader_build_path)
            .context("shaders are missing, compile engine/shader/src into engine/shader/.build first")?;

        // 窗口管理器可能没有采用请求的尺寸
        let mut config = self.config.clone();
        let size = window.inner_size();
        config.window_extent = [size.width.max(1), size.height.max(1)];
        let (engine, node) = create_engine(device, &config, &shaders, demo_scene::populate)?;

        self.spinning_node = Some(node);
        self.engine = Some(engine);
        self.window = Some(window);
        self.start_time = Instant::now();
        Ok(())
    }
}
/// 创建 RenderEngine 并执行 `setup`
///
/// `setup` 失败时先 shutdown 再返回错误，engine 不会带着未释放的 GPU 对象被 drop
fn create_engine<T>(
    device: Rc<dyn GfxDevice>,
    config: &RendererConfig,
    shaders: &EngineShaders,
    setup: impl FnOnce(&mut RenderEngine) -> GfxResult<T>,
) -> anyhow::Result<(RenderEngine, T)> {
    let mut engine = RenderEngine::new(device, config, shaders)?;
    match setup(&mut engine) {
        Ok(value) => Ok((engine, value)),
        Err(e) => {
            engine.shutdown();
            Err(anyhow::Error::new(e).context("failed to set up the scene"))
        }
    }
}
// update
impl EmberApp {
    fn redraw(&mut self) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };

        if let Some(node) = self.spinning_node {
            let angle = self.start_time.elapsed().as_secs_f32() * 0.8;
            let transform = Mat4::from_rotation_y(angle) * Mat4::from_rotation_x(angle * 0.5);
            if let Err(e) = engine.scene_mut().set_local_transform(node, transform) {
                log::warn!("failed to animate demo node: {}", e);
            }
        }

        engine.draw_frame();
    }
}
// destroy
impl EmberApp {
    fn destroy(mut self) {
        if let Some(engine) = self.engine.take() {
            engine.shutdown();
        }
        self.window = None;
    }
}
// 各种 winit 的事件处理
impl ApplicationHandler for EmberApp {
    // 建议在这里创建 window 和 RenderEngine
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        log::info!("winit event: resumed");
        if self.window.is_some() {
            return;
        }

        if let Err(e) = self.init_after_window(event_loop) {
            log::error!("failed to initialize: {:#}", e);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(engine) = self.engine.as_mut() {
                    engine.set_window_extent(vk::Extent2D {
                        width: size.width,
                        height: size.height,
                    });
                }
            }
            WindowEvent::RedrawRequested => {
                self.redraw();
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        log::warn!("winit event: suspended");
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        log::info!("loop exiting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_gfx::headless::HeadlessDevice;

    fn test_shaders() -> EngineShaders {
        // headless 后端只检查 magic number
        let spirv = || vec![0x0723_0203, 0x0001_0000];
        EngineShaders {
            gradient_comp: spirv(),
            mesh_vert: spirv(),
            mesh_frag: spirv(),
        }
    }

    fn test_config() -> RendererConfig {
        RendererConfig {
            window_extent: [320, 240],
            ..Default::default()
        }
    }

    #[test]
    fn demo_scene_engine_shuts_down_cleanly() {
        let headless = Rc::new(HeadlessDevice::new());
        let (mut engine, node) =
            create_engine(headless.clone(), &test_config(), &test_shaders(), demo_scene::populate).unwrap();
        assert!(engine.scene_mut().set_local_transform(node, Mat4::from_rotation_y(0.5)).is_ok());
        engine.try_draw_frame().unwrap();

        engine.shutdown();
        assert_eq!(headless.live_object_count(), 0);
    }

    #[test]
    fn failed_setup_shuts_engine_down() {
        let headless = Rc::new(HeadlessDevice::new());
        let result = create_engine(headless.clone(), &test_config(), &test_shaders(), |engine| {
            engine.add_mesh("empty", &[], &[], None)
        });

        assert!(result.is_err());
        assert_eq!(headless.live_object_count(), 0);
        assert!(headless.validation_errors().is_empty(), "{:?}", headless.validation_errors());
    }
}
