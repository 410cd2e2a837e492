use ash::vk;

/// 计算管线只需要一个 shader 与 pipeline layout，入口固定为 `main`
#[derive(Debug, Clone, Copy)]
pub struct ComputePipelineDesc {
    pub shader: vk::ShaderModule,
    pub layout: vk::PipelineLayout,
}
