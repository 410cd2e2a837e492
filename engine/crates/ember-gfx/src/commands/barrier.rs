use ash::vk;

/// 便捷创建 image memory barrier 的结构体
pub struct GfxImageBarrier {
    inner: vk::ImageMemoryBarrier2<'static>,
}

impl Default for GfxImageBarrier {
    fn default() -> Self {
        Self {
            inner: vk::ImageMemoryBarrier2 {
                old_layout: vk::ImageLayout::UNDEFINED,
                new_layout: vk::ImageLayout::UNDEFINED,
                src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                subresource_range: vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::empty(),
                    base_array_layer: 0,
                    layer_count: 1,
                    base_mip_level: 0,
                    level_count: 1,
                },
                ..Default::default()
            },
        }
    }
}

impl GfxImageBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// 粗粒度的 layout 转换：ALL_COMMANDS 阶段，覆盖全部 mip 与 layer
    ///
    /// 新 layout 为 DEPTH_ATTACHMENT_OPTIMAL 时使用 depth aspect，否则使用 color aspect
    pub fn transition(image: vk::Image, old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) -> Self {
        let aspect = if new_layout == vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL {
            vk::ImageAspectFlags::DEPTH
        } else {
            vk::ImageAspectFlags::COLOR
        };
        Self::new()
            .image(image)
            .layout_transfer(old_layout, new_layout)
            .src_mask(vk::PipelineStageFlags2::ALL_COMMANDS, vk::AccessFlags2::MEMORY_WRITE)
            .dst_mask(
                vk::PipelineStageFlags2::ALL_COMMANDS,
                vk::AccessFlags2::MEMORY_WRITE | vk::AccessFlags2::MEMORY_READ,
            )
            .image_aspect_flag(aspect)
            .all_subresources()
    }

    #[inline]
    pub fn inner(&self) -> &vk::ImageMemoryBarrier2<'_> {
        &self.inner
    }

    /// builder
    #[inline]
    pub fn layout_transfer(mut self, old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) -> Self {
        self.inner.old_layout = old_layout;
        self.inner.new_layout = new_layout;
        self
    }

    /// builder
    #[inline]
    pub fn src_mask(mut self, src_stage_mask: vk::PipelineStageFlags2, src_access_mask: vk::AccessFlags2) -> Self {
        self.inner.src_stage_mask = src_stage_mask;
        self.inner.src_access_mask = src_access_mask;
        self
    }

    /// builder
    #[inline]
    pub fn dst_mask(mut self, dst_stage_mask: vk::PipelineStageFlags2, dst_access_mask: vk::AccessFlags2) -> Self {
        self.inner.dst_stage_mask = dst_stage_mask;
        self.inner.dst_access_mask = dst_access_mask;
        self
    }

    /// builder
    /// layer 和 miplevel 都使用默认值
    #[inline]
    pub fn image_aspect_flag(mut self, aspect_mask: vk::ImageAspectFlags) -> Self {
        self.inner.subresource_range.aspect_mask = aspect_mask;
        self
    }

    /// builder
    /// 覆盖全部的 mip 与 layer
    #[inline]
    pub fn all_subresources(mut self) -> Self {
        self.inner.subresource_range.level_count = vk::REMAINING_MIP_LEVELS;
        self.inner.subresource_range.layer_count = vk::REMAINING_ARRAY_LAYERS;
        self
    }

    /// builder
    #[inline]
    pub fn image(mut self, image: vk::Image) -> Self {
        self.inner.image = image;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn depth_transition_uses_depth_aspect() {
        let image = vk::Image::from_raw(7);
        let barrier = GfxImageBarrier::transition(
            image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
        );
        assert_eq!(barrier.inner().subresource_range.aspect_mask, vk::ImageAspectFlags::DEPTH);
        assert_eq!(barrier.inner().image, image);
        assert_eq!(barrier.inner().subresource_range.level_count, vk::REMAINING_MIP_LEVELS);
    }

    #[test]
    fn color_transition_waits_on_all_commands() {
        let barrier = GfxImageBarrier::transition(
            vk::Image::from_raw(1),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        let inner = barrier.inner();
        assert_eq!(inner.subresource_range.aspect_mask, vk::ImageAspectFlags::COLOR);
        assert_eq!(inner.src_stage_mask, vk::PipelineStageFlags2::ALL_COMMANDS);
        assert!(inner.dst_access_mask.contains(vk::AccessFlags2::MEMORY_READ));
        assert_eq!(inner.old_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
    }
}
