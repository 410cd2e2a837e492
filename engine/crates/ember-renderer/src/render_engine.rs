use std::{path::PathBuf, rc::Rc};

use ash::vk;
use ember_gfx::{
    commands::immediate::ImmediateSubmit,
    deletion_queue::DeletionQueue,
    descriptors::growable_allocator::{DescriptorAllocatorGrowable, PoolSizeRatio},
    error::{GfxResult, fatal},
    foundation::device::GfxDevice,
    pipelines::shader::load_spirv,
    resources::allocator::GfxAllocator,
};
use glam::Mat4;
use slotmap::SlotMap;

use crate::{
    config::RendererConfig,
    default_resources::DefaultResources,
    frame::frame_loop::{FrameLoop, FrameLoopDesc},
    material::{
        MaterialPass, MaterialResources,
        metallic_roughness::MetallicRoughness,
        registry::{MaterialKey, MaterialRegistry},
    },
    mesh::{
        mesh_asset::{MeshAsset, MeshKey},
        upload::{GpuMeshBuffers, upload_mesh},
        vertex::Vertex,
    },
    scene::{scene_data::Camera, scene_graph::SceneGraph},
    scene_renderer::{RenderStats, SceneRenderer},
};

/// 全局 descriptor 分配器中各类 descriptor 与 set 数量的比例
const GLOBAL_POOL_RATIOS: [PoolSizeRatio; 3] = [
    PoolSizeRatio::new(vk::DescriptorType::STORAGE_IMAGE, 1.0),
    PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 1.0),
    PoolSizeRatio::new(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 2.0),
];

/// 引擎启动时需要的 SPIR-V
pub struct EngineShaders {
    pub gradient_comp: Vec<u32>,
    pub mesh_vert: Vec<u32>,
    pub mesh_frag: Vec<u32>,
}

impl EngineShaders {
    /// `resolve` 把 shader 名（例如 `mesh.vert`）映射为 spv 文件路径
    pub fn load_from(resolve: impl Fn(&str) -> PathBuf) -> GfxResult<Self> {
        Ok(Self {
            gradient_comp: load_spirv(resolve("gradient.comp"))?,
            mesh_vert: load_spirv(resolve("mesh.vert"))?,
            mesh_frag: load_spirv(resolve("mesh.frag"))?,
        })
    }
}

/// 渲染引擎的入口
///
/// 持有设备之上的所有长期对象：分配器、immediate submit、全局 descriptor 分配器、
/// 主删除队列、帧循环、场景渲染器、材质与网格。
///
/// # Destroy
/// 必须调用 [`RenderEngine::shutdown`]
pub struct RenderEngine {
    device: Rc<dyn GfxDevice>,
    allocator: GfxAllocator,
    immediate: ImmediateSubmit,

    global_descriptors: DescriptorAllocatorGrowable,
    /// 与引擎同生命周期的对象，shutdown 时统一释放
    main_deletion_queue: DeletionQueue,

    frame_loop: FrameLoop,
    scene_renderer: SceneRenderer,
    metal_rough: MetallicRoughness,
    materials: MaterialRegistry,
    default_resources: DefaultResources,

    meshes: SlotMap<MeshKey, MeshAsset>,
    scene: SceneGraph,
    camera: Camera,
}

// new & init
impl RenderEngine {
    pub fn new(device: Rc<dyn GfxDevice>, config: &RendererConfig, shaders: &EngineShaders) -> GfxResult<Self> {
        let allocator = GfxAllocator::new(device.clone());
        let immediate = ImmediateSubmit::new(device.clone(), config.immediate_timeout_ns())?;
        let mut global_descriptors = DescriptorAllocatorGrowable::new_with_cap(
            device.clone(),
            config.descriptors.global_max_sets,
            &GLOBAL_POOL_RATIOS,
            config.descriptors.pool_growth_cap,
            "global",
        )?;
        let mut main_deletion_queue = DeletionQueue::new();

        let frame_loop = FrameLoop::new(device.clone(), &FrameLoopDesc::from(config))?;
        let scene_renderer = SceneRenderer::new(
            device.clone(),
            &shaders.gradient_comp,
            frame_loop.draw_image(),
            &mut global_descriptors,
        )?;
        let mut metal_rough = MetallicRoughness::build_pipelines(
            device.clone(),
            &shaders.mesh_vert,
            &shaders.mesh_frag,
            scene_renderer.scene_data_layout(),
            frame_loop.draw_image().format(),
            frame_loop.depth_image().format(),
        )?;

        let default_resources = DefaultResources::new(&allocator, &immediate)?;
        let mut materials = MaterialRegistry::new();
        materials.build_default(
            &allocator,
            &mut metal_rough,
            &default_resources,
            &mut global_descriptors,
            &mut main_deletion_queue,
        )?;

        log::info!("render engine `{}` initialized", config.app_name);

        Ok(Self {
            device,
            allocator,
            immediate,
            global_descriptors,
            main_deletion_queue,
            frame_loop,
            scene_renderer,
            metal_rough,
            materials,
            default_resources,
            meshes: SlotMap::with_key(),
            scene: SceneGraph::default(),
            camera: Camera::default(),
        })
    }
}

// getters
impl RenderEngine {
    #[inline]
    pub fn device(&self) -> &Rc<dyn GfxDevice> {
        &self.device
    }

    #[inline]
    pub fn allocator(&self) -> &GfxAllocator {
        &self.allocator
    }

    #[inline]
    pub fn immediate(&self) -> &ImmediateSubmit {
        &self.immediate
    }

    #[inline]
    pub fn frame_loop(&self) -> &FrameLoop {
        &self.frame_loop
    }

    #[inline]
    pub fn default_resources(&self) -> &DefaultResources {
        &self.default_resources
    }

    #[inline]
    pub fn materials(&self) -> &MaterialRegistry {
        &self.materials
    }

    #[inline]
    pub fn mesh(&self, key: MeshKey) -> Option<&MeshAsset> {
        self.meshes.get(key)
    }

    #[inline]
    pub fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    #[inline]
    pub fn scene_mut(&mut self) -> &mut SceneGraph {
        &mut self.scene
    }

    #[inline]
    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    #[inline]
    pub fn scene_renderer_mut(&mut self) -> &mut SceneRenderer {
        &mut self.scene_renderer
    }

    /// 上一帧几何 pass 的统计
    #[inline]
    pub fn stats(&self) -> RenderStats {
        self.scene_renderer.stats()
    }
}

// update
impl RenderEngine {
    pub fn upload_mesh(&self, indices: &[u32], vertices: &[Vertex], name: &str) -> GfxResult<GpuMeshBuffers> {
        upload_mesh(&self.allocator, &self.immediate, indices, vertices, name)
    }

    /// 引擎接管 asset 中 buffer 的所有权
    pub fn add_mesh_asset(&mut self, asset: MeshAsset) -> MeshKey {
        log::info!("mesh `{}` added with {} surfaces", asset.name, asset.surfaces.len());
        self.meshes.insert(asset)
    }

    /// 上传并注册只有一个 surface 的网格
    pub fn add_mesh(
        &mut self,
        name: &str,
        indices: &[u32],
        vertices: &[Vertex],
        material: Option<MaterialKey>,
    ) -> GfxResult<MeshKey> {
        let buffers = self.upload_mesh(indices, vertices, name)?;
        Ok(self.add_mesh_asset(MeshAsset::single_surface(name, buffers, material)))
    }

    /// 网格的 buffer 在已经提交的帧完成之后才会释放
    ///
    /// 引用该网格的场景节点在之后的帧中被跳过
    pub fn remove_mesh(&mut self, key: MeshKey) -> bool {
        let Some(asset) = self.meshes.remove(key) else {
            return false;
        };
        self.frame_loop.defer_disposal(asset.buffers.index_buffer);
        self.frame_loop.defer_disposal(asset.buffers.vertex_buffer);
        log::info!("mesh `{}` removed", asset.name);
        true
    }

    /// 使用 metallic-roughness 管线创建材质实例
    ///
    /// `resources` 中的纹理与常量 buffer 仍然由调用方持有，需要比材质活得更久
    pub fn add_material(&mut self, pass: MaterialPass, resources: &MaterialResources) -> GfxResult<MaterialKey> {
        let instance = self.metal_rough.write_material(pass, resources, &mut self.global_descriptors)?;
        Ok(self.materials.insert(instance))
    }

    #[inline]
    pub fn set_camera(&mut self, camera: Camera) {
        self.camera = camera;
    }

    #[inline]
    pub fn set_window_extent(&mut self, extent: vk::Extent2D) {
        self.frame_loop.set_window_extent(extent);
    }

    #[inline]
    pub fn set_render_scale(&mut self, render_scale: f32) {
        self.frame_loop.set_render_scale(render_scale);
    }

    /// 根据场景图与相机重新生成绘制列表和 scene data
    pub fn update_scene(&mut self) {
        self.scene.refresh_transforms();

        let draw_context = self.scene_renderer.draw_context_mut();
        draw_context.clear();
        self.scene.collect_draws(Mat4::IDENTITY, &self.meshes, &self.materials, draw_context);

        let extent = self.frame_loop.draw_extent();
        let aspect = extent.width as f32 / extent.height as f32;
        self.scene_renderer.scene_data = self.camera.scene_data(aspect);
    }

    /// 每帧都重新收集绘制列表，已经移除的网格不会再被录制
    pub fn try_draw_frame(&mut self) -> GfxResult<()> {
        self.update_scene();
        self.frame_loop.draw_frame(&mut self.scene_renderer)
    }

    /// 绘制一帧，任何 GPU 错误都会终止进程
    pub fn draw_frame(&mut self) {
        if let Err(e) = self.try_draw_frame() {
            fatal(&e);
        }
    }
}

// destroy
impl RenderEngine {
    pub fn shutdown(self) {
        let Self {
            device,
            allocator: _,
            immediate,
            mut global_descriptors,
            mut main_deletion_queue,
            frame_loop,
            scene_renderer,
            metal_rough,
            mut materials,
            default_resources,
            mut meshes,
            ..
        } = self;

        if let Err(e) = device.wait_idle() {
            log::error!("wait idle before shutdown failed: {}", e);
        }

        // 1. frame slot 中的资源以及交换链
        frame_loop.destroy();

        // 2.
        scene_renderer.destroy();
        metal_rough.destroy();
        materials.clear();

        // 3. 引擎持有的 buffer 与纹理
        for (_, asset) in meshes.drain() {
            main_deletion_queue.push(asset.buffers.index_buffer);
            main_deletion_queue.push(asset.buffers.vertex_buffer);
        }
        default_resources.push_to(&mut main_deletion_queue);
        let disposed = main_deletion_queue.flush(device.as_ref());

        // 4.
        global_descriptors.destroy_pools();
        immediate.destroy();

        log::info!("render engine shut down, {} objects released from main deletion queue", disposed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{fake_spirv, headless_device};
    use ember_gfx::error::GfxError;
    use glam::{Vec3, Vec4};

    fn test_shaders() -> EngineShaders {
        EngineShaders {
            gradient_comp: fake_spirv(),
            mesh_vert: fake_spirv(),
            mesh_frag: fake_spirv(),
        }
    }

    fn test_config() -> RendererConfig {
        RendererConfig {
            window_extent: [320, 240],
            ..Default::default()
        }
    }

    fn triangle() -> (Vec<u32>, Vec<Vertex>) {
        let vertex = |x: f32, y: f32| Vertex::new(Vec3::new(x, y, 0.0), Vec3::Z, [x, y], Vec4::ONE);
        (vec![0, 1, 2], vec![vertex(0.0, 0.5), vertex(-0.5, -0.5), vertex(0.5, -0.5)])
    }

    #[test]
    fn missing_shader_is_reported() {
        let missing = std::env::temp_dir().join(format!("ember-no-shaders-{}", std::process::id()));
        let result = EngineShaders::load_from(|name| missing.join(format!("{name}.spv")));
        assert!(matches!(result, Err(GfxError::ShaderLoad { .. })));
    }

    #[test]
    fn engine_draws_and_shuts_down_cleanly() {
        let (headless, device) = headless_device();
        let mut engine = RenderEngine::new(device, &test_config(), &test_shaders()).unwrap();
        assert!(engine.materials().default_material().is_some());

        let (indices, vertices) = triangle();
        let mesh = engine.add_mesh("triangle", &indices, &vertices, None).unwrap();
        let root = engine.scene_mut().add_node(Mat4::IDENTITY, None);
        let node = engine.scene_mut().add_node(Mat4::from_translation(Vec3::X), Some(mesh));
        engine.scene_mut().set_parent(node, Some(root)).unwrap();

        for _ in 0..3 {
            engine.try_draw_frame().unwrap();
        }
        assert_eq!(engine.frame_loop().frame_id(), 3);
        assert_eq!(engine.stats().draw_calls, 1);
        assert_eq!(engine.stats().triangles, 1);

        let buffers_before = headless.live_buffer_count();
        assert!(engine.remove_mesh(mesh));
        assert!(!engine.remove_mesh(mesh));
        engine.try_draw_frame().unwrap();
        assert_eq!(engine.stats().draw_calls, 0);
        engine.try_draw_frame().unwrap();
        assert_eq!(headless.live_buffer_count(), buffers_before - 2);

        engine.shutdown();
        assert_eq!(headless.live_object_count(), 0);
        assert!(headless.validation_errors().is_empty(), "{:?}", headless.validation_errors());
    }

    #[test]
    fn resize_is_applied_on_next_frame() {
        let (headless, device) = headless_device();
        let mut engine = RenderEngine::new(device, &test_config(), &test_shaders()).unwrap();
        engine.try_draw_frame().unwrap();

        let extent = vk::Extent2D { width: 200, height: 100 };
        headless.set_surface_extent(extent);
        engine.set_window_extent(extent);
        engine.try_draw_frame().unwrap();
        assert_eq!(engine.frame_loop().swapchain().extent(), extent);
        assert!(!engine.frame_loop().resize_pending());

        engine.shutdown();
        assert_eq!(headless.live_object_count(), 0);
        assert!(headless.validation_errors().is_empty(), "{:?}", headless.validation_errors());
    }
}
