use ash::vk;

/// dynamic rendering 的参数，只支持单个 color attachment 与可选的 depth attachment
#[derive(Debug, Clone, Copy)]
pub struct RenderingDesc {
    pub extent: vk::Extent2D,
    pub color_view: vk::ImageView,
    /// None 表示 LOAD，保留 attachment 原有内容
    pub color_clear: Option<[f32; 4]>,
    pub depth_view: Option<vk::ImageView>,
    /// None 表示 LOAD
    pub depth_clear: Option<f32>,
}

impl RenderingDesc {
    /// 只有 color attachment，LOAD 原有内容
    pub fn color(color_view: vk::ImageView, extent: vk::Extent2D) -> Self {
        Self {
            extent,
            color_view,
            color_clear: None,
            depth_view: None,
            depth_clear: None,
        }
    }

    /// builder
    #[inline]
    pub fn clear_color(mut self, color: [f32; 4]) -> Self {
        self.color_clear = Some(color);
        self
    }

    /// builder
    #[inline]
    pub fn depth(mut self, depth_view: vk::ImageView, clear: Option<f32>) -> Self {
        self.depth_view = Some(depth_view);
        self.depth_clear = clear;
        self
    }

    #[inline]
    pub fn render_area(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent,
        }
    }
}
