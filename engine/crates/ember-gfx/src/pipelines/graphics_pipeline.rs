use ash::vk;

use crate::{
    error::{GfxError, GfxResult},
    foundation::device::GfxDevice,
};

/// color attachment 的混合方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    Disabled,
    /// `src * src_alpha + dst`
    Additive,
    /// `src * src_alpha + dst * (1 - src_alpha)`
    AlphaBlend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthTest {
    pub write: bool,
    pub compare_op: vk::CompareOp,
}

/// 图形管线的描述，纯数据，由后端转换为 vulkan 的 create info
///
/// - 使用 dynamic rendering，只有一个 color attachment
/// - viewport 与 scissor 是 dynamic state
/// - 没有顶点输入：顶点数据通过 buffer device address 在 shader 中读取
/// - shader 入口固定为 `main`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphicsPipelineDesc {
    pub vertex_shader: vk::ShaderModule,
    pub fragment_shader: vk::ShaderModule,
    pub layout: vk::PipelineLayout,

    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub samples: vk::SampleCountFlags,

    pub blend: BlendMode,
    pub color_format: vk::Format,
    /// UNDEFINED 表示没有 depth attachment
    pub depth_format: vk::Format,
    /// None 表示关闭深度测试
    pub depth_test: Option<DepthTest>,
}

impl Default for GraphicsPipelineDesc {
    fn default() -> Self {
        Self {
            vertex_shader: vk::ShaderModule::null(),
            fragment_shader: vk::ShaderModule::null(),
            layout: vk::PipelineLayout::null(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::CLOCKWISE,
            samples: vk::SampleCountFlags::TYPE_1,
            blend: BlendMode::Disabled,
            color_format: vk::Format::UNDEFINED,
            depth_format: vk::Format::UNDEFINED,
            depth_test: None,
        }
    }
}

/// 以 builder 的方式配置 [`GraphicsPipelineDesc`]
#[derive(Default, Clone)]
pub struct PipelineBuilder {
    desc: GraphicsPipelineDesc,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn desc(&self) -> &GraphicsPipelineDesc {
        &self.desc
    }

    #[inline]
    pub fn clear(&mut self) -> &mut Self {
        self.desc = GraphicsPipelineDesc::default();
        self
    }

    #[inline]
    pub fn set_shaders(&mut self, vertex_shader: vk::ShaderModule, fragment_shader: vk::ShaderModule) -> &mut Self {
        self.desc.vertex_shader = vertex_shader;
        self.desc.fragment_shader = fragment_shader;
        self
    }

    #[inline]
    pub fn set_layout(&mut self, layout: vk::PipelineLayout) -> &mut Self {
        self.desc.layout = layout;
        self
    }

    #[inline]
    pub fn set_input_topology(&mut self, topology: vk::PrimitiveTopology) -> &mut Self {
        self.desc.topology = topology;
        self
    }

    #[inline]
    pub fn set_polygon_mode(&mut self, mode: vk::PolygonMode) -> &mut Self {
        self.desc.polygon_mode = mode;
        self
    }

    #[inline]
    pub fn set_cull_mode(&mut self, cull_mode: vk::CullModeFlags, front_face: vk::FrontFace) -> &mut Self {
        self.desc.cull_mode = cull_mode;
        self.desc.front_face = front_face;
        self
    }

    #[inline]
    pub fn set_multisampling_none(&mut self) -> &mut Self {
        self.desc.samples = vk::SampleCountFlags::TYPE_1;
        self
    }

    #[inline]
    pub fn disable_blending(&mut self) -> &mut Self {
        self.desc.blend = BlendMode::Disabled;
        self
    }

    #[inline]
    pub fn enable_blending_additive(&mut self) -> &mut Self {
        self.desc.blend = BlendMode::Additive;
        self
    }

    #[inline]
    pub fn enable_blending_alphablend(&mut self) -> &mut Self {
        self.desc.blend = BlendMode::AlphaBlend;
        self
    }

    #[inline]
    pub fn set_color_attachment_format(&mut self, format: vk::Format) -> &mut Self {
        self.desc.color_format = format;
        self
    }

    #[inline]
    pub fn set_depth_format(&mut self, format: vk::Format) -> &mut Self {
        self.desc.depth_format = format;
        self
    }

    #[inline]
    pub fn disable_depth_test(&mut self) -> &mut Self {
        self.desc.depth_test = None;
        self
    }

    #[inline]
    pub fn enable_depth_test(&mut self, depth_write: bool, compare_op: vk::CompareOp) -> &mut Self {
        self.desc.depth_test = Some(DepthTest {
            write: depth_write,
            compare_op,
        });
        self
    }

    /// shader 或 layout 缺失时直接报错，而不是用空句柄创建管线
    pub fn build(&self, device: &dyn GfxDevice, debug_name: &str) -> GfxResult<vk::Pipeline> {
        let desc = &self.desc;
        if desc.vertex_shader == vk::ShaderModule::null() || desc.fragment_shader == vk::ShaderModule::null() {
            return Err(GfxError::InvalidArgument(format!("pipeline `{debug_name}` is missing a shader module")));
        }
        if desc.layout == vk::PipelineLayout::null() {
            return Err(GfxError::InvalidArgument(format!("pipeline `{debug_name}` is missing a pipeline layout")));
        }
        if desc.color_format == vk::Format::UNDEFINED {
            return Err(GfxError::InvalidArgument(format!("pipeline `{debug_name}` has no color attachment format")));
        }
        device.create_graphics_pipeline(desc, debug_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessDevice;
    use ash::vk::Handle;

    #[test]
    fn builder_records_state() {
        let mut builder = PipelineBuilder::new();
        builder
            .set_shaders(vk::ShaderModule::from_raw(1), vk::ShaderModule::from_raw(2))
            .set_input_topology(vk::PrimitiveTopology::LINE_LIST)
            .set_polygon_mode(vk::PolygonMode::LINE)
            .set_cull_mode(vk::CullModeFlags::BACK, vk::FrontFace::COUNTER_CLOCKWISE)
            .set_multisampling_none()
            .enable_blending_alphablend()
            .set_color_attachment_format(vk::Format::R16G16B16A16_SFLOAT)
            .set_depth_format(vk::Format::D32_SFLOAT)
            .enable_depth_test(false, vk::CompareOp::GREATER_OR_EQUAL);

        let desc = builder.desc();
        assert_eq!(desc.topology, vk::PrimitiveTopology::LINE_LIST);
        assert_eq!(desc.blend, BlendMode::AlphaBlend);
        assert_eq!(
            desc.depth_test,
            Some(DepthTest {
                write: false,
                compare_op: vk::CompareOp::GREATER_OR_EQUAL
            })
        );

        builder.disable_depth_test().disable_blending();
        assert_eq!(builder.desc().depth_test, None);
        assert_eq!(builder.desc().blend, BlendMode::Disabled);
    }

    #[test]
    fn build_without_shaders_fails_loudly() {
        let device = HeadlessDevice::new();
        let mut builder = PipelineBuilder::new();
        builder
            .set_layout(vk::PipelineLayout::from_raw(3))
            .set_color_attachment_format(vk::Format::R8G8B8A8_UNORM);
        assert!(matches!(builder.build(&device, "broken"), Err(GfxError::InvalidArgument(_))));
    }

    #[test]
    fn build_creates_pipeline() {
        let device = HeadlessDevice::new();
        let layout = device.create_pipeline_layout(&[], &[], "layout").unwrap();
        let vs = device.create_shader_module(&[0x0723_0203], "vs").unwrap();
        let fs = device.create_shader_module(&[0x0723_0203], "fs").unwrap();

        let mut builder = PipelineBuilder::new();
        builder
            .set_shaders(vs, fs)
            .set_layout(layout)
            .set_color_attachment_format(vk::Format::R16G16B16A16_SFLOAT)
            .enable_blending_additive();
        let pipeline = builder.build(&device, "additive").unwrap();
        assert_eq!(device.graphics_pipeline_desc(pipeline).map(|d| d.blend), Some(BlendMode::Additive));

        device.destroy_pipeline(pipeline);
        device.destroy_shader_module(vs);
        device.destroy_shader_module(fs);
        device.destroy_pipeline_layout(layout);
        assert_eq!(device.live_object_count(), 0);
    }
}
