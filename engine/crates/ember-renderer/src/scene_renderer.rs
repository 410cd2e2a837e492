use std::rc::Rc;

use ash::vk;
use ember_gfx::{
    commands::rendering::RenderingDesc,
    descriptors::{
        growable_allocator::DescriptorAllocatorGrowable, layout_builder::DescriptorLayoutBuilder,
        writer::DescriptorWriter,
    },
    error::GfxResult,
    foundation::device::GfxDevice,
    pipelines::{compute_pipeline::ComputePipelineDesc, shader::GfxShaderModule},
    resources::{allocator::GfxAllocator, buffer::MemoryUsage, image::AllocatedImage},
};
use glam::{UVec3, Vec4};

use crate::{
    frame::frame_loop::{FrameContext, FrameRecorder},
    scene::{
        draw_context::DrawContext,
        scene_data::{GpuDrawPushConstants, GpuSceneData},
    },
};

/// gradient.comp 的 local_size
const GRADIENT_WORKGROUP_SIZE: u32 = 16;

/// 背景 compute shader 的 push constant
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ComputePushConstants {
    pub data1: Vec4,
    pub data2: Vec4,
    pub data3: Vec4,
    pub data4: Vec4,
}

impl Default for ComputePushConstants {
    /// 上红下蓝的渐变
    fn default() -> Self {
        Self {
            data1: Vec4::new(1.0, 0.0, 0.0, 1.0),
            data2: Vec4::new(0.0, 0.0, 1.0, 1.0),
            data3: Vec4::ZERO,
            data4: Vec4::ZERO,
        }
    }
}

/// 一帧 geometry pass 的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub draw_calls: u32,
    pub triangles: u32,
    pub pipeline_binds: u32,
    pub material_binds: u32,
}

/// 背景 compute pass 与 geometry pass 的录制者
///
/// 每帧绘制 `draw_context` 中的内容，调用方负责在 draw_frame 之前填充它以及 `scene_data`
pub struct SceneRenderer {
    device: Rc<dyn GfxDevice>,
    allocator: GfxAllocator,

    draw_image_layout: vk::DescriptorSetLayout,
    draw_image_set: vk::DescriptorSet,
    gradient_layout: vk::PipelineLayout,
    gradient_pipeline: vk::Pipeline,

    scene_data_layout: vk::DescriptorSetLayout,
    writer: DescriptorWriter,

    pub background: ComputePushConstants,
    pub scene_data: GpuSceneData,

    draw_context: DrawContext,
    opaque_order: Vec<usize>,
    stats: RenderStats,

    destroyed: bool,
}

// new & init
impl SceneRenderer {
    /// `draw_image_set` 从 `global_descriptors` 中分配，随全局分配器一起释放
    pub fn new(
        device: Rc<dyn GfxDevice>,
        gradient_code: &[u32],
        draw_image: &AllocatedImage,
        global_descriptors: &mut DescriptorAllocatorGrowable,
    ) -> GfxResult<Self> {
        let draw_image_layout = DescriptorLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::STORAGE_IMAGE)
            .build(
                device.as_ref(),
                vk::ShaderStageFlags::COMPUTE,
                vk::DescriptorSetLayoutCreateFlags::empty(),
                "draw-image",
            )?;
        let draw_image_set = global_descriptors.allocate(draw_image_layout)?;

        let mut writer = DescriptorWriter::new();
        writer.write_image(
            0,
            draw_image.view(),
            vk::Sampler::null(),
            vk::ImageLayout::GENERAL,
            vk::DescriptorType::STORAGE_IMAGE,
        );
        writer.update_set(device.as_ref(), draw_image_set)?;

        let scene_data_layout = DescriptorLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER)
            .build(
                device.as_ref(),
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                vk::DescriptorSetLayoutCreateFlags::empty(),
                "scene-data",
            )?;

        let push_constant_range = vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::COMPUTE,
            offset: 0,
            size: size_of::<ComputePushConstants>() as u32,
        };
        let gradient_layout = device.create_pipeline_layout(
            std::slice::from_ref(&draw_image_layout),
            std::slice::from_ref(&push_constant_range),
            "gradient",
        )?;

        let gradient_shader = GfxShaderModule::new(device.clone(), gradient_code, "gradient.comp")?;
        let gradient_pipeline = device.create_compute_pipeline(
            &ComputePipelineDesc {
                shader: gradient_shader.handle(),
                layout: gradient_layout,
            },
            "gradient",
        );
        gradient_shader.destroy();
        let gradient_pipeline = gradient_pipeline?;

        Ok(Self {
            allocator: GfxAllocator::new(device.clone()),
            device,
            draw_image_layout,
            draw_image_set,
            gradient_layout,
            gradient_pipeline,
            scene_data_layout,
            writer,
            background: ComputePushConstants::default(),
            scene_data: GpuSceneData::default(),
            draw_context: DrawContext::default(),
            opaque_order: Vec::new(),
            stats: RenderStats::default(),
            destroyed: false,
        })
    }
}

// getters
impl SceneRenderer {
    /// 材质管线的 set 0
    #[inline]
    pub fn scene_data_layout(&self) -> vk::DescriptorSetLayout {
        self.scene_data_layout
    }

    #[inline]
    pub fn draw_context(&self) -> &DrawContext {
        &self.draw_context
    }

    #[inline]
    pub fn draw_context_mut(&mut self) -> &mut DrawContext {
        &mut self.draw_context
    }

    /// 上一次 geometry pass 的统计
    #[inline]
    pub fn stats(&self) -> RenderStats {
        self.stats
    }
}

impl FrameRecorder for SceneRenderer {
    fn record_background(&mut self, ctx: &mut FrameContext) -> GfxResult<()> {
        let cmd = ctx.cmd;
        cmd.cmd_bind_pipeline(vk::PipelineBindPoint::COMPUTE, self.gradient_pipeline);
        cmd.cmd_bind_descriptor_sets(
            vk::PipelineBindPoint::COMPUTE,
            self.gradient_layout,
            0,
            std::slice::from_ref(&self.draw_image_set),
        );
        cmd.cmd_push_constants(
            self.gradient_layout,
            vk::ShaderStageFlags::COMPUTE,
            0,
            bytemuck::bytes_of(&self.background),
        );
        cmd.cmd_dispatch(UVec3::new(
            ctx.draw_extent.width.div_ceil(GRADIENT_WORKGROUP_SIZE),
            ctx.draw_extent.height.div_ceil(GRADIENT_WORKGROUP_SIZE),
            1,
        ));
        Ok(())
    }

    fn record_geometry(&mut self, ctx: &mut FrameContext) -> GfxResult<()> {
        let cmd = ctx.cmd;

        // 场景数据只在本帧使用：buffer 交给 slot 的删除队列，set 从 slot 的分配器中分配
        let scene_buffer = self.allocator.create_buffer(
            size_of::<GpuSceneData>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            MemoryUsage::CpuToGpu,
            "scene-data",
        )?;
        ctx.deletion_queue.push(scene_buffer);
        self.allocator.write_buffer(&scene_buffer, 0, bytemuck::bytes_of(&self.scene_data))?;

        let scene_set = ctx.descriptors.allocate(self.scene_data_layout)?;
        self.writer.clear();
        self.writer.write_buffer(
            0,
            scene_buffer.vk_buffer(),
            size_of::<GpuSceneData>() as vk::DeviceSize,
            0,
            vk::DescriptorType::UNIFORM_BUFFER,
        );
        self.writer.update_set(self.device.as_ref(), scene_set)?;

        let rendering =
            RenderingDesc::color(ctx.draw_image.view(), ctx.draw_extent).depth(ctx.depth_image.view(), Some(0.0));
        cmd.cmd_begin_rendering(&rendering);
        cmd.cmd_set_viewport_scissor(ctx.draw_extent);

        let opaque = &self.draw_context.opaque_surfaces;
        self.opaque_order.clear();
        self.opaque_order.extend(0..opaque.len());
        self.opaque_order.sort_by_key(|&i| opaque[i].sort_key());

        let mut stats = RenderStats::default();
        let mut last_pipeline = vk::Pipeline::null();
        let mut last_material_set = vk::DescriptorSet::null();
        let mut last_index_buffer = vk::Buffer::null();

        let draws = self
            .opaque_order
            .iter()
            .map(|&i| &opaque[i])
            .chain(self.draw_context.transparent_surfaces.iter());
        for draw in draws {
            let material = &draw.material;
            if material.pipeline.pipeline != last_pipeline {
                last_pipeline = material.pipeline.pipeline;
                last_material_set = vk::DescriptorSet::null();
                cmd.cmd_bind_pipeline(vk::PipelineBindPoint::GRAPHICS, last_pipeline);
                cmd.cmd_bind_descriptor_sets(
                    vk::PipelineBindPoint::GRAPHICS,
                    material.pipeline.layout,
                    0,
                    std::slice::from_ref(&scene_set),
                );
                stats.pipeline_binds += 1;
            }
            if material.material_set != last_material_set {
                last_material_set = material.material_set;
                cmd.cmd_bind_descriptor_sets(
                    vk::PipelineBindPoint::GRAPHICS,
                    material.pipeline.layout,
                    1,
                    std::slice::from_ref(&last_material_set),
                );
                stats.material_binds += 1;
            }
            if draw.index_buffer.vk_buffer() != last_index_buffer {
                last_index_buffer = draw.index_buffer.vk_buffer();
                cmd.cmd_bind_index_buffer(&draw.index_buffer, 0);
            }

            let push_constants = GpuDrawPushConstants::new(draw.transform, draw.vertex_buffer_address);
            cmd.cmd_push_constants(
                material.pipeline.layout,
                vk::ShaderStageFlags::VERTEX,
                0,
                bytemuck::bytes_of(&push_constants),
            );
            cmd.draw_indexed(draw.index_count, draw.first_index, 1, 0, 0);

            stats.draw_calls += 1;
            stats.triangles += draw.index_count / 3;
        }

        cmd.cmd_end_rendering();

        self.stats = stats;
        log::debug!(
            "frame {}: {} draws, {} triangles, {} pipeline binds, {} material binds",
            ctx.frame_id,
            stats.draw_calls,
            stats.triangles,
            stats.pipeline_binds,
            stats.material_binds
        );
        Ok(())
    }
}

// destroy
impl SceneRenderer {
    pub fn destroy(mut self) {
        self.device.destroy_pipeline(self.gradient_pipeline);
        self.device.destroy_pipeline_layout(self.gradient_layout);
        self.device.destroy_descriptor_set_layout(self.draw_image_layout);
        self.device.destroy_descriptor_set_layout(self.scene_data_layout);
        self.destroyed = true;
    }
}

impl Drop for SceneRenderer {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            debug_assert!(self.destroyed, "SceneRenderer must be destroyed manually before drop.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        frame::frame_loop::FrameLoop,
        material::{MaterialConstants, MaterialPass, MaterialResources, metallic_roughness::MetallicRoughness},
        mesh::{upload::upload_mesh, vertex::Vertex},
        scene::draw_context::RenderObject,
        test_utils::{fake_spirv, headless_device, test_frame_loop_desc},
    };
    use ember_gfx::{
        commands::immediate::ImmediateSubmit, descriptors::growable_allocator::PoolSizeRatio,
        headless::HeadlessCommand, resources::sampler::SamplerDesc,
    };
    use glam::Mat4;

    #[test]
    fn compute_push_constants_fit() {
        assert_eq!(size_of::<ComputePushConstants>(), 64);
    }

    #[test]
    fn geometry_pass_sorts_and_rebinds_on_change() {
        let (headless, device) = headless_device();
        let mut frame_loop = FrameLoop::new(device.clone(), &test_frame_loop_desc()).unwrap();
        let allocator = GfxAllocator::new(device.clone());
        let immediate = ImmediateSubmit::new(device.clone(), u64::MAX).unwrap();
        let mut global = DescriptorAllocatorGrowable::new(
            device.clone(),
            8,
            &[
                PoolSizeRatio::new(vk::DescriptorType::STORAGE_IMAGE, 1.0),
                PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 1.0),
                PoolSizeRatio::new(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 2.0),
            ],
            "global",
        )
        .unwrap();

        let mut renderer =
            SceneRenderer::new(device.clone(), &fake_spirv(), frame_loop.draw_image(), &mut global).unwrap();
        let mut metal_rough = MetallicRoughness::build_pipelines(
            device.clone(),
            &fake_spirv(),
            &fake_spirv(),
            renderer.scene_data_layout(),
            frame_loop.draw_image().format(),
            frame_loop.depth_image().format(),
        )
        .unwrap();

        let texture = allocator
            .create_image_with_data(
                &immediate,
                &[0xFF; 4],
                vk::Extent2D { width: 1, height: 1 },
                vk::Format::R8G8B8A8_UNORM,
                vk::ImageUsageFlags::SAMPLED,
                false,
                "texture",
            )
            .unwrap();
        let sampler = allocator.create_sampler(&SamplerDesc::LINEAR, "linear").unwrap();
        let constants = allocator
            .create_buffer(
                size_of::<MaterialConstants>() as vk::DeviceSize,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                MemoryUsage::CpuToGpu,
                "constants",
            )
            .unwrap();
        let resources = MaterialResources {
            color_image: texture.view(),
            color_sampler: sampler,
            metal_rough_image: texture.view(),
            metal_rough_sampler: sampler,
            data_buffer: constants.vk_buffer(),
            data_buffer_offset: 0,
        };
        let red = metal_rough.write_material(MaterialPass::MainColor, &resources, &mut global).unwrap();
        let blue = metal_rough.write_material(MaterialPass::MainColor, &resources, &mut global).unwrap();
        let glass = metal_rough.write_material(MaterialPass::Transparent, &resources, &mut global).unwrap();

        let vertices = vec![Vertex::default(); 3];
        let mesh = upload_mesh(&allocator, &immediate, &[0, 1, 2], &vertices, "triangle").unwrap();
        let object = |material| RenderObject {
            index_count: 3,
            first_index: 0,
            index_buffer: mesh.index_buffer,
            material,
            transform: Mat4::IDENTITY,
            vertex_buffer_address: mesh.vertex_buffer_address,
        };
        // 交错的材质，排序之后每个材质只绑定一次
        for material in [red, blue, red, blue, glass] {
            renderer.draw_context_mut().push(object(material));
        }

        headless.wait_idle().unwrap();
        let executed_before = headless.executed_commands().len();
        frame_loop.draw_frame(&mut renderer).unwrap();
        headless.wait_idle().unwrap();

        let stats = renderer.stats();
        assert_eq!(stats.draw_calls, 5);
        assert_eq!(stats.triangles, 5);
        assert_eq!(stats.pipeline_binds, 2);
        assert_eq!(stats.material_binds, 3);

        let commands = &headless.executed_commands()[executed_before..];
        let count = |pred: &dyn Fn(&HeadlessCommand) -> bool| commands.iter().filter(|&c| pred(c)).count();
        assert_eq!(count(&|c| matches!(c, HeadlessCommand::DrawIndexed { .. })), 5);
        assert_eq!(count(&|c| matches!(c, HeadlessCommand::BindIndexBuffer { .. })), 1);
        assert_eq!(count(&|c| matches!(c, HeadlessCommand::PushConstants { data, .. } if data.len() == 80)), 5);
        assert_eq!(
            count(&|c| matches!(c, HeadlessCommand::Dispatch { group_count } if *group_count == [40, 30, 1])),
            1
        );
        assert!(headless.validation_errors().is_empty(), "{:?}", headless.validation_errors());

        frame_loop.destroy();
        renderer.destroy();
        metal_rough.destroy();
        global.destroy_pools();
        allocator.destroy_buffer(mesh.index_buffer);
        allocator.destroy_buffer(mesh.vertex_buffer);
        allocator.destroy_buffer(constants);
        allocator.destroy_image(texture);
        device.destroy_sampler(sampler);
        immediate.destroy();
        assert_eq!(headless.live_object_count(), 0);
    }
}
