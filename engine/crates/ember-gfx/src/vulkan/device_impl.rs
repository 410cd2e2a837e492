use std::ffi::CString;

use ash::vk;
use itertools::Itertools;
use vk_mem::Alloc;

use crate::{
    commands::{rendering::RenderingDesc, submit_info::GfxSubmitInfo},
    descriptors::writer::DescriptorWrite,
    error::{GfxError, GfxResult, VkResultExt},
    foundation::device::GfxDevice,
    pipelines::{
        compute_pipeline::ComputePipelineDesc,
        graphics_pipeline::{BlendMode, GraphicsPipelineDesc},
    },
    resources::{
        buffer::{AllocatedBuffer, BufferDesc},
        image::{AllocatedImage, ImageDesc},
        sampler::SamplerDesc,
    },
    swapchain::render_swapchain::{AcquireOutcome, PresentOutcome, SwapchainDesc, SwapchainImages},
    vulkan::{
        VulkanDevice,
        memory::{AllocationRecord, allocation_create_info},
        surface::GfxSurface,
    },
};

const ENTRY_POINT: &std::ffi::CStr = c"main";

// tools
impl VulkanDevice {
    fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
        mip_levels: u32,
    ) -> GfxResult<vk::ImageView> {
        let view_ci = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: mip_levels,
                base_array_layer: 0,
                layer_count: 1,
            });
        unsafe { self.device.create_image_view(&view_ci, None) }.vk_context("vkCreateImageView")
    }

    fn color_blend_attachment(blend: BlendMode) -> vk::PipelineColorBlendAttachmentState {
        let attachment = vk::PipelineColorBlendAttachmentState::default().color_write_mask(vk::ColorComponentFlags::RGBA);
        match blend {
            BlendMode::Disabled => attachment.blend_enable(false),
            BlendMode::Additive => attachment
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
                .alpha_blend_op(vk::BlendOp::ADD),
            BlendMode::AlphaBlend => attachment
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
                .alpha_blend_op(vk::BlendOp::ADD),
        }
    }
}

impl GfxDevice for VulkanDevice {
    fn backend_name(&self) -> &str {
        "vulkan"
    }

    fn wait_idle(&self) -> GfxResult<()> {
        unsafe { self.device.device_wait_idle() }.vk_context("vkDeviceWaitIdle")
    }

    // sync ---------------------------------------------------------------

    fn create_fence(&self, signaled: bool, name: &str) -> GfxResult<vk::Fence> {
        let flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        let fence = unsafe { self.device.create_fence(&vk::FenceCreateInfo::default().flags(flags), None) }
            .vk_context("vkCreateFence")?;
        self.set_object_debug_name(fence, name);
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) }
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> GfxResult<()> {
        match unsafe { self.device.wait_for_fences(std::slice::from_ref(&fence), true, timeout_ns) } {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(GfxError::Timeout { what: "fence", timeout_ns }),
            Err(result) => Err(GfxError::Vulkan {
                call: "vkWaitForFences",
                result,
            }),
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> GfxResult<()> {
        unsafe { self.device.reset_fences(std::slice::from_ref(&fence)) }.vk_context("vkResetFences")
    }

    fn create_semaphore(&self, name: &str) -> GfxResult<vk::Semaphore> {
        let semaphore = unsafe { self.device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) }
            .vk_context("vkCreateSemaphore")?;
        self.set_object_debug_name(semaphore, name);
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) }
    }

    // command buffer -----------------------------------------------------

    fn create_command_pool(&self, flags: vk::CommandPoolCreateFlags, name: &str) -> GfxResult<vk::CommandPool> {
        let pool_ci = vk::CommandPoolCreateInfo::default()
            .queue_family_index(self.gfx_queue_family_index())
            .flags(flags);
        let pool = unsafe { self.device.create_command_pool(&pool_ci, None) }.vk_context("vkCreateCommandPool")?;
        self.set_object_debug_name(pool, name);
        Ok(pool)
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.device.destroy_command_pool(pool, None) }
    }

    fn allocate_command_buffer(&self, pool: vk::CommandPool, name: &str) -> GfxResult<vk::CommandBuffer> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let cmds =
            unsafe { self.device.allocate_command_buffers(&info) }.vk_context("vkAllocateCommandBuffers")?;
        let cmd = cmds[0];
        self.set_object_debug_name(cmd, name);
        Ok(cmd)
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> GfxResult<()> {
        unsafe { self.device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty()) }
            .vk_context("vkResetCommandBuffer")
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer, usage: vk::CommandBufferUsageFlags) -> GfxResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::default().flags(usage);
        unsafe { self.device.begin_command_buffer(cmd, &begin_info) }.vk_context("vkBeginCommandBuffer")
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> GfxResult<()> {
        unsafe { self.device.end_command_buffer(cmd) }.vk_context("vkEndCommandBuffer")
    }

    fn queue_submit(&self, submits: &[GfxSubmitInfo], fence: vk::Fence) -> GfxResult<()> {
        let submit_infos = submits.iter().map(|s| s.submit_info()).collect_vec();
        unsafe { self.device.queue_submit2(self.gfx_queue, &submit_infos, fence) }.vk_context("vkQueueSubmit2")
    }

    // commands -----------------------------------------------------------

    fn cmd_image_barriers(&self, cmd: vk::CommandBuffer, barriers: &[vk::ImageMemoryBarrier2<'_>]) {
        let dependency_info = vk::DependencyInfo::default().image_memory_barriers(barriers);
        unsafe { self.device.cmd_pipeline_barrier2(cmd, &dependency_info) }
    }

    fn cmd_copy_buffer(&self, cmd: vk::CommandBuffer, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        unsafe { self.device.cmd_copy_buffer(cmd, src, dst, regions) }
    }

    fn cmd_copy_buffer_to_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        unsafe { self.device.cmd_copy_buffer_to_image(cmd, src, dst, dst_layout, regions) }
    }

    fn cmd_blit_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Image,
        dst: vk::Image,
        src_extent: vk::Extent2D,
        dst_extent: vk::Extent2D,
    ) {
        let subresource = vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        };
        let region = vk::ImageBlit2::default()
            .src_subresource(subresource)
            .src_offsets([
                vk::Offset3D::default(),
                vk::Offset3D {
                    x: src_extent.width as i32,
                    y: src_extent.height as i32,
                    z: 1,
                },
            ])
            .dst_subresource(subresource)
            .dst_offsets([
                vk::Offset3D::default(),
                vk::Offset3D {
                    x: dst_extent.width as i32,
                    y: dst_extent.height as i32,
                    z: 1,
                },
            ]);
        let blit_info = vk::BlitImageInfo2::default()
            .src_image(src)
            .src_image_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
            .dst_image(dst)
            .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .filter(vk::Filter::LINEAR)
            .regions(std::slice::from_ref(&region));
        unsafe { self.device.cmd_blit_image2(cmd, &blit_info) }
    }

    fn cmd_clear_color_image(&self, cmd: vk::CommandBuffer, image: vk::Image, layout: vk::ImageLayout, color: [f32; 4]) {
        let range = vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: vk::REMAINING_MIP_LEVELS,
            base_array_layer: 0,
            layer_count: vk::REMAINING_ARRAY_LAYERS,
        };
        let clear = vk::ClearColorValue { float32: color };
        unsafe { self.device.cmd_clear_color_image(cmd, image, layout, &clear, std::slice::from_ref(&range)) }
    }

    fn cmd_begin_rendering(&self, cmd: vk::CommandBuffer, desc: &RenderingDesc) {
        let color_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(desc.color_view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(if desc.color_clear.is_some() { vk::AttachmentLoadOp::CLEAR } else { vk::AttachmentLoadOp::LOAD })
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: desc.color_clear.unwrap_or_default(),
                },
            });
        let depth_attachment = desc.depth_view.map(|view| {
            vk::RenderingAttachmentInfo::default()
                .image_view(view)
                .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
                .load_op(if desc.depth_clear.is_some() { vk::AttachmentLoadOp::CLEAR } else { vk::AttachmentLoadOp::LOAD })
                .store_op(vk::AttachmentStoreOp::STORE)
                .clear_value(vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: desc.depth_clear.unwrap_or_default(),
                        stencil: 0,
                    },
                })
        });

        let mut rendering_info = vk::RenderingInfo::default()
            .render_area(desc.render_area())
            .layer_count(1)
            .color_attachments(std::slice::from_ref(&color_attachment));
        if let Some(depth_attachment) = depth_attachment.as_ref() {
            rendering_info = rendering_info.depth_attachment(depth_attachment);
        }
        unsafe { self.device.cmd_begin_rendering(cmd, &rendering_info) }
    }

    fn cmd_end_rendering(&self, cmd: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_rendering(cmd) }
    }

    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        unsafe { self.device.cmd_bind_pipeline(cmd, bind_point, pipeline) }
    }

    fn cmd_bind_descriptor_sets(
        &self,
        cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        unsafe { self.device.cmd_bind_descriptor_sets(cmd, bind_point, layout, first_set, sets, &[]) }
    }

    fn cmd_push_constants(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        unsafe { self.device.cmd_push_constants(cmd, layout, stages, offset, data) }
    }

    fn cmd_bind_index_buffer(
        &self,
        cmd: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    ) {
        unsafe { self.device.cmd_bind_index_buffer(cmd, buffer, offset, index_type) }
    }

    fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewport: vk::Viewport) {
        unsafe { self.device.cmd_set_viewport(cmd, 0, std::slice::from_ref(&viewport)) }
    }

    fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissor: vk::Rect2D) {
        unsafe { self.device.cmd_set_scissor(cmd, 0, std::slice::from_ref(&scissor)) }
    }

    fn cmd_draw_indexed(
        &self,
        cmd: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.device
                .cmd_draw_indexed(cmd, index_count, instance_count, first_index, vertex_offset, first_instance)
        }
    }

    fn cmd_dispatch(&self, cmd: vk::CommandBuffer, group_x: u32, group_y: u32, group_z: u32) {
        unsafe { self.device.cmd_dispatch(cmd, group_x, group_y, group_z) }
    }

    fn cmd_begin_label(&self, cmd: vk::CommandBuffer, label: &str, color: [f32; 4]) {
        let Some(debug_utils) = &self.debug_utils else { return };
        let Ok(name) = CString::new(label) else { return };
        let label = vk::DebugUtilsLabelEXT::default().label_name(name.as_c_str()).color(color);
        unsafe { debug_utils.cmd_begin_debug_utils_label(cmd, &label) }
    }

    fn cmd_end_label(&self, cmd: vk::CommandBuffer) {
        let Some(debug_utils) = &self.debug_utils else { return };
        unsafe { debug_utils.cmd_end_debug_utils_label(cmd) }
    }

    // memory -------------------------------------------------------------

    fn create_buffer(&self, desc: &BufferDesc, name: &str) -> GfxResult<AllocatedBuffer> {
        let buffer_ci = vk::BufferCreateInfo::default()
            .size(desc.size)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let alloc_ci = allocation_create_info(desc.memory);

        let (buffer, mut allocation) =
            unsafe { self.allocator.create_buffer(&buffer_ci, &alloc_ci) }.vk_context("vmaCreateBuffer")?;

        let mapped = if desc.memory.is_host_visible() {
            match unsafe { self.allocator.map_memory(&mut allocation) } {
                Ok(ptr) => Some(ptr),
                Err(result) => {
                    unsafe { self.allocator.destroy_buffer(buffer, &mut allocation) };
                    return Err(GfxError::Vulkan {
                        call: "vmaMapMemory",
                        result,
                    });
                }
            }
        } else {
            None
        };

        let device_address = desc.usage.contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS).then(|| unsafe {
            self.device.get_buffer_device_address(&vk::BufferDeviceAddressInfo::default().buffer(buffer))
        });

        self.set_object_debug_name(buffer, name);
        let key = self.allocations.borrow_mut().insert(AllocationRecord {
            allocation,
            mapped,
            size: desc.size,
            name: name.to_string(),
        });

        Ok(AllocatedBuffer {
            vk_handle: buffer,
            allocation: key,
            size: desc.size,
            usage: desc.usage,
            memory: desc.memory,
            device_address,
        })
    }

    fn destroy_buffer(&self, buffer: &AllocatedBuffer) {
        let Some(mut record) = self.allocations.borrow_mut().remove(buffer.allocation) else {
            log::error!("destroy buffer {:?} with unknown allocation", buffer.vk_handle);
            return;
        };
        unsafe {
            if record.mapped.is_some() {
                self.allocator.unmap_memory(&mut record.allocation);
            }
            self.allocator.destroy_buffer(buffer.vk_handle, &mut record.allocation);
        }
    }

    fn write_buffer(&self, buffer: &AllocatedBuffer, offset: vk::DeviceSize, data: &[u8]) -> GfxResult<()> {
        let allocations = self.allocations.borrow();
        let record = allocations
            .get(buffer.allocation)
            .ok_or_else(|| GfxError::InvalidArgument(format!("write to dead buffer {:?}", buffer.vk_handle)))?;
        let Some(mapped) = record.mapped else {
            return Err(GfxError::NotHostVisible(record.name.clone()));
        };
        let end = offset + data.len() as vk::DeviceSize;
        if end > record.size {
            return Err(GfxError::UploadSize {
                expected: record.size,
                actual: end,
            });
        }

        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped.add(offset as usize), data.len());
            self.allocator.flush_allocation(&record.allocation, offset, data.len() as vk::DeviceSize)
        }
        .vk_context("vmaFlushAllocation")
    }

    fn read_buffer(&self, buffer: &AllocatedBuffer, offset: vk::DeviceSize, len: vk::DeviceSize) -> GfxResult<Vec<u8>> {
        let allocations = self.allocations.borrow();
        let record = allocations
            .get(buffer.allocation)
            .ok_or_else(|| GfxError::InvalidArgument(format!("read from dead buffer {:?}", buffer.vk_handle)))?;
        let Some(mapped) = record.mapped else {
            return Err(GfxError::NotHostVisible(record.name.clone()));
        };
        if offset + len > record.size {
            return Err(GfxError::InvalidArgument(format!(
                "read range {}..{} exceeds buffer size {}",
                offset,
                offset + len,
                record.size
            )));
        }

        unsafe { self.allocator.invalidate_allocation(&record.allocation, offset, len) }
            .vk_context("vmaInvalidateAllocation")?;
        let mut out = vec![0u8; len as usize];
        unsafe { std::ptr::copy_nonoverlapping(mapped.add(offset as usize), out.as_mut_ptr(), len as usize) };
        Ok(out)
    }

    fn create_image(&self, desc: &ImageDesc, name: &str) -> GfxResult<AllocatedImage> {
        let image_ci = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(desc.extent)
            .mip_levels(desc.mip_levels)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            required_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            ..Default::default()
        };

        let (image, mut allocation) =
            unsafe { self.allocator.create_image(&image_ci, &alloc_ci) }.vk_context("vmaCreateImage")?;
        let view = match self.create_image_view(image, desc.format, desc.aspect(), desc.mip_levels) {
            Ok(view) => view,
            Err(e) => {
                unsafe { self.allocator.destroy_image(image, &mut allocation) };
                return Err(e);
            }
        };

        self.set_object_debug_name(image, name);
        self.set_object_debug_name(view, name);
        let key = self.allocations.borrow_mut().insert(AllocationRecord {
            allocation,
            mapped: None,
            size: 0,
            name: name.to_string(),
        });

        Ok(AllocatedImage {
            vk_handle: image,
            view,
            allocation: key,
            extent: desc.extent,
            format: desc.format,
            mip_levels: desc.mip_levels,
        })
    }

    fn destroy_image(&self, image: &AllocatedImage) {
        unsafe { self.device.destroy_image_view(image.view, None) };
        let Some(mut record) = self.allocations.borrow_mut().remove(image.allocation) else {
            log::error!("destroy image {:?} with unknown allocation", image.vk_handle);
            return;
        };
        unsafe { self.allocator.destroy_image(image.vk_handle, &mut record.allocation) };
    }

    fn create_sampler(&self, desc: &SamplerDesc, name: &str) -> GfxResult<vk::Sampler> {
        let sampler_ci = vk::SamplerCreateInfo::default()
            .mag_filter(desc.mag_filter)
            .min_filter(desc.min_filter)
            .mipmap_mode(desc.mipmap_mode)
            .address_mode_u(desc.address_mode)
            .address_mode_v(desc.address_mode)
            .address_mode_w(desc.address_mode)
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE);
        let sampler = unsafe { self.device.create_sampler(&sampler_ci, None) }.vk_context("vkCreateSampler")?;
        self.set_object_debug_name(sampler, name);
        Ok(sampler)
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        unsafe { self.device.destroy_sampler(sampler, None) }
    }

    // descriptors --------------------------------------------------------

    fn create_descriptor_set_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding<'_>],
        flags: vk::DescriptorSetLayoutCreateFlags,
        name: &str,
    ) -> GfxResult<vk::DescriptorSetLayout> {
        let layout_ci = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings).flags(flags);
        let layout = unsafe { self.device.create_descriptor_set_layout(&layout_ci, None) }
            .vk_context("vkCreateDescriptorSetLayout")?;
        self.set_object_debug_name(layout, name);
        Ok(layout)
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.device.destroy_descriptor_set_layout(layout, None) }
    }

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
        name: &str,
    ) -> GfxResult<vk::DescriptorPool> {
        let pool_ci = vk::DescriptorPoolCreateInfo::default().max_sets(max_sets).pool_sizes(pool_sizes);
        let pool =
            unsafe { self.device.create_descriptor_pool(&pool_ci, None) }.vk_context("vkCreateDescriptorPool")?;
        self.set_object_debug_name(pool, name);
        Ok(pool)
    }

    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> GfxResult<()> {
        unsafe { self.device.reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty()) }
            .vk_context("vkResetDescriptorPool")
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.device.destroy_descriptor_pool(pool, None) }
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> GfxResult<vk::DescriptorSet> {
        let alloc_info =
            vk::DescriptorSetAllocateInfo::default().descriptor_pool(pool).set_layouts(std::slice::from_ref(&layout));
        let sets =
            unsafe { self.device.allocate_descriptor_sets(&alloc_info) }.vk_context("vkAllocateDescriptorSets")?;
        Ok(sets[0])
    }

    fn update_descriptor_set(&self, set: vk::DescriptorSet, writes: &[DescriptorWrite]) -> GfxResult<()> {
        // 先收集所有的 info，保证 WriteDescriptorSet 引用的地址稳定
        let buffer_infos = writes
            .iter()
            .map(|write| match *write {
                DescriptorWrite::Buffer {
                    buffer, offset, range, ..
                } => vk::DescriptorBufferInfo { buffer, offset, range },
                DescriptorWrite::Image { .. } => vk::DescriptorBufferInfo::default(),
            })
            .collect_vec();
        let image_infos = writes
            .iter()
            .map(|write| match *write {
                DescriptorWrite::Image {
                    view, sampler, layout, ..
                } => vk::DescriptorImageInfo {
                    sampler,
                    image_view: view,
                    image_layout: layout,
                },
                DescriptorWrite::Buffer { .. } => vk::DescriptorImageInfo::default(),
            })
            .collect_vec();

        let vk_writes = writes
            .iter()
            .enumerate()
            .map(|(i, write)| {
                let vk_write = vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(write.binding())
                    .descriptor_type(write.descriptor_type());
                match write {
                    DescriptorWrite::Buffer { .. } => vk_write.buffer_info(std::slice::from_ref(&buffer_infos[i])),
                    DescriptorWrite::Image { .. } => vk_write.image_info(std::slice::from_ref(&image_infos[i])),
                }
            })
            .collect_vec();

        unsafe { self.device.update_descriptor_sets(&vk_writes, &[]) };
        Ok(())
    }

    // pipelines ----------------------------------------------------------

    fn create_shader_module(&self, code: &[u32], name: &str) -> GfxResult<vk::ShaderModule> {
        let module_ci = vk::ShaderModuleCreateInfo::default().code(code);
        let module =
            unsafe { self.device.create_shader_module(&module_ci, None) }.vk_context("vkCreateShaderModule")?;
        self.set_object_debug_name(module, name);
        Ok(module)
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        unsafe { self.device.destroy_shader_module(module, None) }
    }

    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
        name: &str,
    ) -> GfxResult<vk::PipelineLayout> {
        let layout_ci = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constant_ranges);
        let layout =
            unsafe { self.device.create_pipeline_layout(&layout_ci, None) }.vk_context("vkCreatePipelineLayout")?;
        self.set_object_debug_name(layout, name);
        Ok(layout)
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.device.destroy_pipeline_layout(layout, None) }
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc, name: &str) -> GfxResult<vk::Pipeline> {
        // dynamic rendering 需要的 framebuffer 信息
        let color_formats = [desc.color_format];
        let mut attach_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(desc.depth_format);

        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(desc.vertex_shader)
                .name(ENTRY_POINT),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(desc.fragment_shader)
                .name(ENTRY_POINT),
        ];

        // 顶点数据通过 buffer device address 读取，没有 vertex input
        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::default();
        let input_assembly_info = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(desc.topology)
            .primitive_restart_enable(false);

        // viewport 和 scissor 具体值由 dynamic 决定，但是数量由该 create info 决定
        let viewport_info = vk::PipelineViewportStateCreateInfo::default().viewport_count(1).scissor_count(1);
        let rasterize_info = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(desc.polygon_mode)
            .cull_mode(desc.cull_mode)
            .front_face(desc.front_face)
            .line_width(1.0);
        let msaa_info = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(desc.samples)
            .min_sample_shading(1.0);

        let blend_attachment = Self::color_blend_attachment(desc.blend);
        let color_blend_info = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(std::slice::from_ref(&blend_attachment));

        let depth_stencil_info = match desc.depth_test {
            Some(depth) => vk::PipelineDepthStencilStateCreateInfo::default()
                .depth_test_enable(true)
                .depth_write_enable(depth.write)
                .depth_compare_op(depth.compare_op)
                .min_depth_bounds(0.0)
                .max_depth_bounds(1.0),
            None => vk::PipelineDepthStencilStateCreateInfo::default()
                .depth_test_enable(false)
                .depth_write_enable(false)
                .depth_compare_op(vk::CompareOp::NEVER),
        };

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state_info = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly_info)
            .viewport_state(&viewport_info)
            .rasterization_state(&rasterize_info)
            .multisample_state(&msaa_info)
            .color_blend_state(&color_blend_info)
            .depth_stencil_state(&depth_stencil_info)
            .layout(desc.layout)
            .dynamic_state(&dynamic_state_info)
            .push_next(&mut attach_info);

        let pipelines = unsafe {
            self.device.create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&pipeline_info), None)
        }
        .map_err(|(_, result)| GfxError::Vulkan {
            call: "vkCreateGraphicsPipelines",
            result,
        })?;
        let pipeline = pipelines[0];
        self.set_object_debug_name(pipeline, name);
        Ok(pipeline)
    }

    fn create_compute_pipeline(&self, desc: &ComputePipelineDesc, name: &str) -> GfxResult<vk::Pipeline> {
        let stage = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(desc.shader)
            .name(ENTRY_POINT);
        let pipeline_info = vk::ComputePipelineCreateInfo::default().stage(stage).layout(desc.layout);

        let pipelines = unsafe {
            self.device.create_compute_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&pipeline_info), None)
        }
        .map_err(|(_, result)| GfxError::Vulkan {
            call: "vkCreateComputePipelines",
            result,
        })?;
        let pipeline = pipelines[0];
        self.set_object_debug_name(pipeline, name);
        Ok(pipeline)
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.device.destroy_pipeline(pipeline, None) }
    }

    // presentation -------------------------------------------------------

    fn create_swapchain(&self, desc: &SwapchainDesc, old: vk::SwapchainKHR) -> GfxResult<SwapchainImages> {
        let pdevice = self.physical_device.vk_handle;
        let surface_capabilities = self.surface.capabilities(pdevice)?;

        // 如果 surface_capabilities.current_extent 包含特殊值 0xFFFFFFFF，则表示可以自己设置交换链的 extent
        let extent = GfxSurface::calculate_swapchain_extent(&surface_capabilities, desc.extent);
        log::info!(
            "create swapchain:
            surface current extent: {}x{}, min extent: {}x{}, max extent: {}x{}
            window physical extent: {}x{}
            final swapchain extent: {}x{}",
            surface_capabilities.current_extent.width,
            surface_capabilities.current_extent.height,
            surface_capabilities.min_image_extent.width,
            surface_capabilities.min_image_extent.height,
            surface_capabilities.max_image_extent.width,
            surface_capabilities.max_image_extent.height,
            desc.extent.width,
            desc.extent.height,
            extent.width,
            extent.height
        );

        // 不支持的 present mode 回退到 FIFO，FIFO 是唯一保证支持的
        let present_mode = if self.surface.present_modes(pdevice)?.contains(&desc.present_mode) {
            desc.present_mode
        } else {
            log::warn!("present mode {:?} is not supported, fall back to FIFO", desc.present_mode);
            vk::PresentModeKHR::FIFO
        };
        let formats = self.surface.formats(pdevice)?;
        let surface_format = if formats.contains(&desc.format) {
            desc.format
        } else {
            let fallback = formats.first().copied().ok_or_else(|| {
                GfxError::NoSuitableDevice("surface reports no formats".to_string())
            })?;
            log::warn!("surface format {:?} is not supported, fall back to {:?}", desc.format, fallback);
            fallback
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface.handle)
            .min_image_count(GfxSurface::swapchain_image_count(&surface_capabilities))
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            // TRANSFER_DST 用于 blit draw image
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .pre_transform(surface_capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .clipped(true)
            .old_swapchain(old);

        let handle =
            unsafe { self.swapchain_pf.create_swapchain(&create_info, None) }.vk_context("vkCreateSwapchainKHR")?;
        self.set_object_debug_name(handle, "main");

        let images = unsafe { self.swapchain_pf.get_swapchain_images(handle) }.vk_context("vkGetSwapchainImagesKHR")?;
        let mut views = Vec::with_capacity(images.len());
        for (idx, image) in images.iter().enumerate() {
            let view = self.create_image_view(*image, surface_format.format, vk::ImageAspectFlags::COLOR, 1)?;
            self.set_object_debug_name(*image, &format!("swapchain-image-{idx}"));
            self.set_object_debug_name(view, &format!("swapchain-view-{idx}"));
            views.push(view);
        }

        Ok(SwapchainImages {
            handle,
            images,
            views,
            extent,
            format: surface_format.format,
        })
    }

    fn destroy_swapchain(&self, swapchain: &SwapchainImages) {
        unsafe {
            for view in &swapchain.views {
                self.device.destroy_image_view(*view, None);
            }
            self.swapchain_pf.destroy_swapchain(swapchain.handle, None);
        }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
        timeout_ns: u64,
    ) -> GfxResult<AcquireOutcome> {
        let result =
            unsafe { self.swapchain_pf.acquire_next_image(swapchain, timeout_ns, signal, vk::Fence::null()) };
        match result {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired { image_index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => Err(GfxError::Timeout {
                what: "swapchain image",
                timeout_ns,
            }),
            Err(result) => Err(GfxError::Vulkan {
                call: "vkAcquireNextImageKHR",
                result,
            }),
        }
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> GfxResult<PresentOutcome> {
        let wait_semaphores = [wait];
        let swapchains = [swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.swapchain_pf.queue_present(self.gfx_queue, &present_info) } {
            Ok(suboptimal) => Ok(PresentOutcome::Presented { suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(result) => Err(GfxError::Vulkan {
                call: "vkQueuePresentKHR",
                result,
            }),
        }
    }
}
