use std::rc::Rc;

use ash::vk;
use ember_gfx::{
    descriptors::{
        growable_allocator::DescriptorAllocatorGrowable, layout_builder::DescriptorLayoutBuilder,
        writer::DescriptorWriter,
    },
    error::GfxResult,
    foundation::device::GfxDevice,
    pipelines::{graphics_pipeline::PipelineBuilder, shader::GfxShaderModule},
};

use crate::{
    material::{MaterialConstants, MaterialInstance, MaterialPass, MaterialPipeline, MaterialResources},
    scene::scene_data::GpuDrawPushConstants,
};

/// metallic-roughness 材质的两条管线
///
/// - opaque：写深度，GREATER_OR_EQUAL（reversed-z）
/// - transparent：additive 混合，只测试不写深度
///
/// 两条管线共用一个 pipeline layout：set 0 是场景数据，set 1 是材质
pub struct MetallicRoughness {
    device: Rc<dyn GfxDevice>,

    opaque: MaterialPipeline,
    transparent: MaterialPipeline,

    pipeline_layout: vk::PipelineLayout,
    material_layout: vk::DescriptorSetLayout,

    writer: DescriptorWriter,

    destroyed: bool,
}

// new & init
impl MetallicRoughness {
    pub fn build_pipelines(
        device: Rc<dyn GfxDevice>,
        vertex_code: &[u32],
        fragment_code: &[u32],
        scene_data_layout: vk::DescriptorSetLayout,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> GfxResult<Self> {
        let vertex_shader = GfxShaderModule::new(device.clone(), vertex_code, "mesh.vert")?;
        let fragment_shader = match GfxShaderModule::new(device.clone(), fragment_code, "mesh.frag") {
            Ok(module) => module,
            Err(e) => {
                vertex_shader.destroy();
                return Err(e);
            }
        };

        let result = Self::build_with_shaders(
            device,
            &vertex_shader,
            &fragment_shader,
            scene_data_layout,
            color_format,
            depth_format,
        );

        // 管线创建完成后 shader module 就不再需要
        vertex_shader.destroy();
        fragment_shader.destroy();
        result
    }

    fn build_with_shaders(
        device: Rc<dyn GfxDevice>,
        vertex_shader: &GfxShaderModule,
        fragment_shader: &GfxShaderModule,
        scene_data_layout: vk::DescriptorSetLayout,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> GfxResult<Self> {
        let material_layout = DescriptorLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER)
            .add_binding(1, vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .add_binding(2, vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .build(
                device.as_ref(),
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                vk::DescriptorSetLayoutCreateFlags::empty(),
                "metallic-roughness-material",
            )?;

        let push_constant_range = vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::VERTEX,
            offset: 0,
            size: size_of::<GpuDrawPushConstants>() as u32,
        };
        let pipeline_layout = device.create_pipeline_layout(
            &[scene_data_layout, material_layout],
            std::slice::from_ref(&push_constant_range),
            "metallic-roughness",
        )?;

        let mut builder = PipelineBuilder::new();
        builder
            .set_shaders(vertex_shader.handle(), fragment_shader.handle())
            .set_layout(pipeline_layout)
            .set_input_topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .set_polygon_mode(vk::PolygonMode::FILL)
            .set_cull_mode(vk::CullModeFlags::NONE, vk::FrontFace::CLOCKWISE)
            .set_multisampling_none()
            .disable_blending()
            .enable_depth_test(true, vk::CompareOp::GREATER_OR_EQUAL)
            .set_color_attachment_format(color_format)
            .set_depth_format(depth_format);
        let opaque_pipeline = builder.build(device.as_ref(), "metallic-roughness-opaque")?;

        builder
            .enable_blending_additive()
            .enable_depth_test(false, vk::CompareOp::GREATER_OR_EQUAL);
        let transparent_pipeline = builder.build(device.as_ref(), "metallic-roughness-transparent")?;

        Ok(Self {
            device,
            opaque: MaterialPipeline {
                pipeline: opaque_pipeline,
                layout: pipeline_layout,
            },
            transparent: MaterialPipeline {
                pipeline: transparent_pipeline,
                layout: pipeline_layout,
            },
            pipeline_layout,
            material_layout,
            writer: DescriptorWriter::new(),
            destroyed: false,
        })
    }
}

// getters
impl MetallicRoughness {
    #[inline]
    pub fn opaque(&self) -> MaterialPipeline {
        self.opaque
    }

    #[inline]
    pub fn transparent(&self) -> MaterialPipeline {
        self.transparent
    }

    #[inline]
    pub fn material_layout(&self) -> vk::DescriptorSetLayout {
        self.material_layout
    }
}

// tools
impl MetallicRoughness {
    /// 从 `descriptors` 中分配 material set 并写入资源
    ///
    /// set 的生命周期跟随 `descriptors`：从全局分配器分配的材质一直有效，
    /// 从 frame slot 分配器分配的材质只在当前帧有效
    pub fn write_material(
        &mut self,
        pass: MaterialPass,
        resources: &MaterialResources,
        descriptors: &mut DescriptorAllocatorGrowable,
    ) -> GfxResult<MaterialInstance> {
        let pipeline = match pass {
            MaterialPass::Transparent => self.transparent,
            MaterialPass::MainColor | MaterialPass::Other => self.opaque,
        };
        let material_set = descriptors.allocate(self.material_layout)?;

        self.writer.clear();
        self.writer
            .write_buffer(
                0,
                resources.data_buffer,
                size_of::<MaterialConstants>() as vk::DeviceSize,
                resources.data_buffer_offset,
                vk::DescriptorType::UNIFORM_BUFFER,
            )
            .write_image(
                1,
                resources.color_image,
                resources.color_sampler,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            )
            .write_image(
                2,
                resources.metal_rough_image,
                resources.metal_rough_sampler,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            );
        self.writer.update_set(self.device.as_ref(), material_set)?;

        Ok(MaterialInstance {
            pipeline,
            material_set,
            pass,
        })
    }
}

// destroy
impl MetallicRoughness {
    /// 从这里写出的 material set 随各自的 descriptor 分配器释放
    pub fn destroy(mut self) {
        self.device.destroy_pipeline(self.opaque.pipeline);
        self.device.destroy_pipeline(self.transparent.pipeline);
        self.device.destroy_pipeline_layout(self.pipeline_layout);
        self.device.destroy_descriptor_set_layout(self.material_layout);
        self.destroyed = true;
    }
}

impl Drop for MetallicRoughness {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            debug_assert!(self.destroyed, "MetallicRoughness must be destroyed manually before drop.");
        }
    }
}
