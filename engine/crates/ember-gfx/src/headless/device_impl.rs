use ash::vk;

use crate::{
    commands::{rendering::RenderingDesc, submit_info::GfxSubmitInfo},
    descriptors::writer::DescriptorWrite,
    error::{GfxError, GfxResult},
    foundation::device::GfxDevice,
    headless::{
        HEADLESS_SWAPCHAIN_IMAGES, HeadlessDevice,
        event::{GpuEvent, HeadlessCommand},
        state::{
            BufferRecord, CommandBufferRecord, CommandBufferState, DescriptorPoolRecord, DescriptorSetRecord,
            ImageRecord, LayoutBinding, PipelineRecord, QueueOp, ScriptedAcquire, SwapchainRecord,
            format_texel_size,
        },
    },
    pipelines::{compute_pipeline::ComputePipelineDesc, graphics_pipeline::GraphicsPipelineDesc},
    resources::{
        buffer::{AllocatedBuffer, BufferDesc},
        image::{AllocatedImage, ImageDesc},
        sampler::SamplerDesc,
    },
    swapchain::render_swapchain::{AcquireOutcome, PresentOutcome, SwapchainDesc, SwapchainImages},
};

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// buffer device address 的起始值，只要求非零且互不重叠
const DEVICE_ADDRESS_BASE: vk::DeviceAddress = 0x1_0000_0000;

impl GfxDevice for HeadlessDevice {
    fn backend_name(&self) -> &str {
        "headless"
    }

    fn wait_idle(&self) -> GfxResult<()> {
        let mut s = self.state.borrow_mut();
        if s.stalled && !s.queue.is_empty() {
            return Err(GfxError::Timeout {
                what: "device idle",
                timeout_ns: u64::MAX,
            });
        }
        s.execute_queue(None);
        s.events.push(GpuEvent::DeviceIdle);
        Ok(())
    }

    // sync ---------------------------------------------------------------

    fn create_fence(&self, signaled: bool, _name: &str) -> GfxResult<vk::Fence> {
        let mut s = self.state.borrow_mut();
        let fence = s.new_handle();
        s.fences.insert(fence, signaled);
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut s = self.state.borrow_mut();
        if s.fences.remove(&fence).is_none() {
            s.report(format!("destroy unknown fence {:?}", fence));
        }
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> GfxResult<()> {
        let mut s = self.state.borrow_mut();
        match s.fences.get(&fence).copied() {
            None => return Err(s.report(format!("wait on unknown fence {:?}", fence))),
            Some(true) => {}
            Some(false) => {
                if !s.is_fence_queued(fence) {
                    s.report(format!("fence {:?} is never going to be signaled", fence));
                    return Err(GfxError::Timeout { what: "fence", timeout_ns });
                }
                if s.stalled {
                    return Err(GfxError::Timeout { what: "fence", timeout_ns });
                }
                s.execute_queue(Some(fence));
            }
        }
        s.events.push(GpuEvent::FenceWaited { fence });
        Ok(())
    }

    fn reset_fence(&self, fence: vk::Fence) -> GfxResult<()> {
        let mut s = self.state.borrow_mut();
        if s.is_fence_queued(fence) {
            return Err(s.report(format!("reset fence {:?} while its submission is in flight", fence)));
        }
        match s.fences.get_mut(&fence) {
            Some(signaled) => *signaled = false,
            None => return Err(s.report(format!("reset unknown fence {:?}", fence))),
        }
        s.events.push(GpuEvent::FenceReset { fence });
        Ok(())
    }

    fn create_semaphore(&self, _name: &str) -> GfxResult<vk::Semaphore> {
        let mut s = self.state.borrow_mut();
        let semaphore = s.new_handle();
        s.semaphores.insert(semaphore, false);
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        let mut s = self.state.borrow_mut();
        if s.semaphores.remove(&semaphore).is_none() {
            s.report(format!("destroy unknown semaphore {:?}", semaphore));
        }
    }

    // command buffer -----------------------------------------------------

    fn create_command_pool(&self, flags: vk::CommandPoolCreateFlags, _name: &str) -> GfxResult<vk::CommandPool> {
        let mut s = self.state.borrow_mut();
        let pool = s.new_handle();
        s.command_pools.insert(pool, flags);
        Ok(pool)
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        let mut s = self.state.borrow_mut();
        if s.command_pools.remove(&pool).is_none() {
            s.report(format!("destroy unknown command pool {:?}", pool));
            return;
        }
        s.command_buffers.retain(|_, record| record.pool != pool);
    }

    fn allocate_command_buffer(&self, pool: vk::CommandPool, name: &str) -> GfxResult<vk::CommandBuffer> {
        let mut s = self.state.borrow_mut();
        if !s.command_pools.contains_key(&pool) {
            return Err(s.report(format!("allocate command buffer from unknown pool {:?}", pool)));
        }
        let cmd = s.new_handle();
        s.command_buffers.insert(
            cmd,
            CommandBufferRecord {
                pool,
                state: CommandBufferState::Initial,
                commands: vec![],
                name: name.to_string(),
            },
        );
        Ok(cmd)
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> GfxResult<()> {
        let mut s = self.state.borrow_mut();
        let state = s.command_buffers.get(&cmd).map(|record| record.state);
        match state {
            None => Err(s.report(format!("reset unknown command buffer {:?}", cmd))),
            Some(CommandBufferState::Pending) => {
                Err(s.report(format!("reset command buffer {:?} while it is pending", cmd)))
            }
            Some(_) => {
                if let Some(record) = s.command_buffers.get_mut(&cmd) {
                    record.state = CommandBufferState::Initial;
                    record.commands.clear();
                }
                Ok(())
            }
        }
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer, _usage: vk::CommandBufferUsageFlags) -> GfxResult<()> {
        let mut s = self.state.borrow_mut();
        let state = s.command_buffers.get(&cmd).map(|record| record.state);
        match state {
            None => return Err(s.report(format!("begin unknown command buffer {:?}", cmd))),
            Some(CommandBufferState::Pending) => {
                return Err(s.report(format!("begin command buffer {:?} while it is pending", cmd)));
            }
            Some(CommandBufferState::Recording) => {
                return Err(s.report(format!("begin command buffer {:?} twice", cmd)));
            }
            Some(_) => {}
        }
        if let Some(record) = s.command_buffers.get_mut(&cmd) {
            record.state = CommandBufferState::Recording;
            record.commands.clear();
        }
        s.events.push(GpuEvent::CommandBufferBegun { command_buffer: cmd });
        Ok(())
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> GfxResult<()> {
        let mut s = self.state.borrow_mut();
        match s.command_buffers.get_mut(&cmd) {
            Some(record) if record.state == CommandBufferState::Recording => {
                record.state = CommandBufferState::Executable;
                Ok(())
            }
            _ => Err(s.report(format!("end command buffer {:?} that is not recording", cmd))),
        }
    }

    fn queue_submit(&self, submits: &[GfxSubmitInfo], fence: vk::Fence) -> GfxResult<()> {
        let mut s = self.state.borrow_mut();

        if fence != vk::Fence::null() {
            match s.fences.get(&fence).copied() {
                None => return Err(s.report(format!("submit with unknown fence {:?}", fence))),
                Some(true) => return Err(s.report(format!("submit with fence {:?} that is still signaled", fence))),
                Some(false) if s.is_fence_queued(fence) => {
                    return Err(s.report(format!("submit with fence {:?} that is already in flight", fence)));
                }
                Some(false) => {}
            }
        }

        let command_buffers = submits.iter().flat_map(|submit| submit.command_buffers()).collect::<Vec<_>>();
        for cmd in &command_buffers {
            let state = s.command_buffers.get(cmd).map(|record| record.state);
            if state != Some(CommandBufferState::Executable) {
                return Err(s.report(format!("submit command buffer {:?} in state {:?}", cmd, state)));
            }
        }

        for submit in submits {
            for (semaphore, _) in submit.wait_semaphores() {
                match s.semaphores.get_mut(&semaphore) {
                    Some(signaled) if *signaled => *signaled = false,
                    _ => return Err(s.report(format!("wait on semaphore {:?} that has no pending signal", semaphore))),
                }
            }
            for (semaphore, _) in submit.signal_semaphores() {
                match s.semaphores.get_mut(&semaphore) {
                    Some(signaled) if !*signaled => *signaled = true,
                    _ => return Err(s.report(format!("signal semaphore {:?} that is already signaled", semaphore))),
                }
            }
        }

        for cmd in &command_buffers {
            if let Some(record) = s.command_buffers.get_mut(cmd) {
                record.state = CommandBufferState::Pending;
            }
        }
        s.events.push(GpuEvent::Submitted {
            command_buffers: command_buffers.clone(),
            fence,
        });
        s.queue.push_back(QueueOp::Submit { command_buffers, fence });
        Ok(())
    }

    // commands -----------------------------------------------------------

    fn cmd_image_barriers(&self, cmd: vk::CommandBuffer, barriers: &[vk::ImageMemoryBarrier2<'_>]) {
        let mut s = self.state.borrow_mut();
        for barrier in barriers {
            s.record(
                cmd,
                HeadlessCommand::ImageBarrier {
                    image: barrier.image,
                    old_layout: barrier.old_layout,
                    new_layout: barrier.new_layout,
                },
            );
        }
    }

    fn cmd_copy_buffer(&self, cmd: vk::CommandBuffer, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        self.state.borrow_mut().record(
            cmd,
            HeadlessCommand::CopyBuffer {
                src,
                dst,
                regions: regions.to_vec(),
            },
        );
    }

    fn cmd_copy_buffer_to_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        self.state.borrow_mut().record(
            cmd,
            HeadlessCommand::CopyBufferToImage {
                src,
                dst,
                dst_layout,
                regions: regions.to_vec(),
            },
        );
    }

    fn cmd_blit_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Image,
        dst: vk::Image,
        src_extent: vk::Extent2D,
        dst_extent: vk::Extent2D,
    ) {
        self.state.borrow_mut().record(
            cmd,
            HeadlessCommand::BlitImage {
                src,
                dst,
                src_extent,
                dst_extent,
            },
        );
    }

    fn cmd_clear_color_image(&self, cmd: vk::CommandBuffer, image: vk::Image, layout: vk::ImageLayout, color: [f32; 4]) {
        self.state.borrow_mut().record(cmd, HeadlessCommand::ClearColorImage { image, layout, color });
    }

    fn cmd_begin_rendering(&self, cmd: vk::CommandBuffer, desc: &RenderingDesc) {
        self.state.borrow_mut().record(
            cmd,
            HeadlessCommand::BeginRendering {
                color_view: desc.color_view,
                depth_view: desc.depth_view,
                extent: desc.extent,
            },
        );
    }

    fn cmd_end_rendering(&self, cmd: vk::CommandBuffer) {
        self.state.borrow_mut().record(cmd, HeadlessCommand::EndRendering);
    }

    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        self.state.borrow_mut().record(cmd, HeadlessCommand::BindPipeline { bind_point, pipeline });
    }

    fn cmd_bind_descriptor_sets(
        &self,
        cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        _layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        self.state.borrow_mut().record(
            cmd,
            HeadlessCommand::BindDescriptorSets {
                bind_point,
                first_set,
                sets: sets.to_vec(),
            },
        );
    }

    fn cmd_push_constants(
        &self,
        cmd: vk::CommandBuffer,
        _layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        self.state.borrow_mut().record(
            cmd,
            HeadlessCommand::PushConstants {
                stages,
                offset,
                data: data.to_vec(),
            },
        );
    }

    fn cmd_bind_index_buffer(
        &self,
        cmd: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        _index_type: vk::IndexType,
    ) {
        self.state.borrow_mut().record(cmd, HeadlessCommand::BindIndexBuffer { buffer, offset });
    }

    fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewport: vk::Viewport) {
        self.state.borrow_mut().record(
            cmd,
            HeadlessCommand::SetViewport {
                width: viewport.width,
                height: viewport.height,
            },
        );
    }

    fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissor: vk::Rect2D) {
        self.state.borrow_mut().record(cmd, HeadlessCommand::SetScissor { extent: scissor.extent });
    }

    fn cmd_draw_indexed(
        &self,
        cmd: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        _vertex_offset: i32,
        _first_instance: u32,
    ) {
        self.state.borrow_mut().record(
            cmd,
            HeadlessCommand::DrawIndexed {
                index_count,
                instance_count,
                first_index,
            },
        );
    }

    fn cmd_dispatch(&self, cmd: vk::CommandBuffer, group_x: u32, group_y: u32, group_z: u32) {
        self.state.borrow_mut().record(
            cmd,
            HeadlessCommand::Dispatch {
                group_count: [group_x, group_y, group_z],
            },
        );
    }

    fn cmd_begin_label(&self, cmd: vk::CommandBuffer, label: &str, _color: [f32; 4]) {
        self.state.borrow_mut().record(cmd, HeadlessCommand::BeginLabel(label.to_string()));
    }

    fn cmd_end_label(&self, cmd: vk::CommandBuffer) {
        self.state.borrow_mut().record(cmd, HeadlessCommand::EndLabel);
    }

    // memory -------------------------------------------------------------

    fn create_buffer(&self, desc: &BufferDesc, name: &str) -> GfxResult<AllocatedBuffer> {
        let mut s = self.state.borrow_mut();
        s.take_allocation("vmaCreateBuffer")?;
        let buffer: vk::Buffer = s.new_handle();
        let allocation = s.memory.insert(vec![0u8; desc.size as usize]);
        s.buffers.insert(
            buffer,
            BufferRecord {
                memory: allocation,
                memory_usage: desc.memory,
                name: name.to_string(),
            },
        );
        let device_address = desc
            .usage
            .contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS)
            .then(|| DEVICE_ADDRESS_BASE + (ash::vk::Handle::as_raw(buffer) << 32));
        s.events.push(GpuEvent::BufferCreated {
            buffer,
            size: desc.size,
        });

        Ok(AllocatedBuffer {
            vk_handle: buffer,
            allocation,
            size: desc.size,
            usage: desc.usage,
            memory: desc.memory,
            device_address,
        })
    }

    fn destroy_buffer(&self, buffer: &AllocatedBuffer) {
        let mut s = self.state.borrow_mut();
        let Some(record) = s.buffers.remove(&buffer.vk_handle) else {
            s.report(format!("destroy unknown buffer {:?}", buffer.vk_handle));
            return;
        };
        s.memory.remove(record.memory);
        s.events.push(GpuEvent::BufferDestroyed {
            buffer: buffer.vk_handle,
        });
    }

    fn write_buffer(&self, buffer: &AllocatedBuffer, offset: vk::DeviceSize, data: &[u8]) -> GfxResult<()> {
        let mut s = self.state.borrow_mut();
        let Some((key, usage, name)) = s
            .buffers
            .get(&buffer.vk_handle)
            .map(|record| (record.memory, record.memory_usage, record.name.clone()))
        else {
            return Err(s.report(format!("write unknown buffer {:?}", buffer.vk_handle)));
        };
        if !usage.is_host_visible() {
            return Err(GfxError::NotHostVisible(name));
        }
        let end = offset as usize + data.len();
        let memory = &mut s.memory[key];
        if end > memory.len() {
            return Err(GfxError::UploadSize {
                expected: memory.len() as u64,
                actual: end as u64,
            });
        }
        memory[offset as usize..end].copy_from_slice(data);
        Ok(())
    }

    /// headless 中任何 buffer 都可以读取，方便检查 GPU only buffer 的上传结果
    fn read_buffer(&self, buffer: &AllocatedBuffer, offset: vk::DeviceSize, len: vk::DeviceSize) -> GfxResult<Vec<u8>> {
        let mut s = self.state.borrow_mut();
        let Some(key) = s.buffers.get(&buffer.vk_handle).map(|record| record.memory) else {
            return Err(s.report(format!("read unknown buffer {:?}", buffer.vk_handle)));
        };
        let memory = &s.memory[key];
        let range = offset as usize..(offset + len) as usize;
        if range.end > memory.len() {
            return Err(GfxError::InvalidArgument(format!(
                "read range {:?} exceeds buffer size {}",
                range,
                memory.len()
            )));
        }
        Ok(memory[range].to_vec())
    }

    fn create_image(&self, desc: &ImageDesc, _name: &str) -> GfxResult<AllocatedImage> {
        let mut s = self.state.borrow_mut();
        s.take_allocation("vmaCreateImage")?;
        let image: vk::Image = s.new_handle();
        let view: vk::ImageView = s.new_handle();
        let bytes = desc.extent.width as u64 * desc.extent.height as u64 * desc.extent.depth as u64
            * format_texel_size(desc.format);
        let allocation = s.memory.insert(vec![0u8; bytes as usize]);
        s.images.insert(
            image,
            ImageRecord {
                memory: Some(allocation),
                extent: desc.extent,
                format: desc.format,
                layout: vk::ImageLayout::UNDEFINED,
                view,
                owned_by_swapchain: false,
            },
        );
        s.views.insert(view, image);
        s.events.push(GpuEvent::ImageCreated {
            image,
            extent: desc.extent,
        });

        Ok(AllocatedImage {
            vk_handle: image,
            view,
            allocation,
            extent: desc.extent,
            format: desc.format,
            mip_levels: desc.mip_levels,
        })
    }

    fn destroy_image(&self, image: &AllocatedImage) {
        let mut s = self.state.borrow_mut();
        let Some(record) = s.images.remove(&image.vk_handle) else {
            s.report(format!("destroy unknown image {:?}", image.vk_handle));
            return;
        };
        s.views.remove(&record.view);
        if let Some(key) = record.memory {
            s.memory.remove(key);
        }
        s.events.push(GpuEvent::ImageDestroyed {
            image: image.vk_handle,
        });
    }

    fn create_sampler(&self, _desc: &SamplerDesc, _name: &str) -> GfxResult<vk::Sampler> {
        let mut s = self.state.borrow_mut();
        let sampler = s.new_handle();
        s.samplers.insert(sampler);
        Ok(sampler)
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        let mut s = self.state.borrow_mut();
        if !s.samplers.remove(&sampler) {
            s.report(format!("destroy unknown sampler {:?}", sampler));
            return;
        }
        s.events.push(GpuEvent::SamplerDestroyed { sampler });
    }

    // descriptors --------------------------------------------------------

    fn create_descriptor_set_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding<'_>],
        _flags: vk::DescriptorSetLayoutCreateFlags,
        _name: &str,
    ) -> GfxResult<vk::DescriptorSetLayout> {
        let mut s = self.state.borrow_mut();
        let layout = s.new_handle();
        let bindings = bindings
            .iter()
            .map(|b| LayoutBinding {
                binding: b.binding,
                descriptor_type: b.descriptor_type,
                count: b.descriptor_count,
            })
            .collect();
        s.set_layouts.insert(layout, bindings);
        Ok(layout)
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        let mut s = self.state.borrow_mut();
        if s.set_layouts.remove(&layout).is_none() {
            s.report(format!("destroy unknown descriptor set layout {:?}", layout));
        }
    }

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
        _name: &str,
    ) -> GfxResult<vk::DescriptorPool> {
        let mut s = self.state.borrow_mut();
        if max_sets == 0 {
            return Err(s.report("descriptor pool with zero max sets".to_string()));
        }
        let pool = s.new_handle();
        s.descriptor_pools.insert(pool, DescriptorPoolRecord::new(max_sets, pool_sizes));
        s.events.push(GpuEvent::DescriptorPoolCreated { pool, max_sets });
        Ok(pool)
    }

    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> GfxResult<()> {
        let mut s = self.state.borrow_mut();
        let Some(record) = s.descriptor_pools.get_mut(&pool) else {
            return Err(s.report(format!("reset unknown descriptor pool {:?}", pool)));
        };
        let sets = std::mem::take(&mut record.sets);
        record.reset();
        for set in sets {
            s.descriptor_sets.remove(&set);
        }
        s.events.push(GpuEvent::DescriptorPoolReset { pool });
        Ok(())
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        let mut s = self.state.borrow_mut();
        let Some(record) = s.descriptor_pools.remove(&pool) else {
            s.report(format!("destroy unknown descriptor pool {:?}", pool));
            return;
        };
        for set in record.sets {
            s.descriptor_sets.remove(&set);
        }
        s.events.push(GpuEvent::DescriptorPoolDestroyed { pool });
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> GfxResult<vk::DescriptorSet> {
        let mut s = self.state.borrow_mut();
        let Some(bindings) = s.set_layouts.get(&layout).cloned() else {
            return Err(s.report(format!("allocate with unknown descriptor set layout {:?}", layout)));
        };
        let fits = match s.descriptor_pools.get(&pool) {
            Some(record) => record.can_fit(&bindings),
            None => return Err(s.report(format!("allocate from unknown descriptor pool {:?}", pool))),
        };
        if !fits {
            return Err(GfxError::Vulkan {
                call: "vkAllocateDescriptorSets",
                result: vk::Result::ERROR_OUT_OF_POOL_MEMORY,
            });
        }

        let set = s.new_handle();
        if let Some(record) = s.descriptor_pools.get_mut(&pool) {
            for binding in &bindings {
                if let Some(remaining) = record.remaining.get_mut(&binding.descriptor_type) {
                    *remaining -= binding.count;
                }
            }
            record.sets.push(set);
        }
        s.descriptor_sets.insert(set, DescriptorSetRecord { bindings });
        Ok(set)
    }

    fn update_descriptor_set(&self, set: vk::DescriptorSet, writes: &[DescriptorWrite]) -> GfxResult<()> {
        let mut s = self.state.borrow_mut();
        let Some(bindings) = s.descriptor_sets.get(&set).map(|record| record.bindings.clone()) else {
            return Err(s.report(format!("update invalid descriptor set {:?}", set)));
        };
        for write in writes {
            let matches = bindings
                .iter()
                .any(|b| b.binding == write.binding() && b.descriptor_type == write.descriptor_type());
            if !matches {
                return Err(s.report(format!(
                    "descriptor write to binding {} with {:?} does not match the set layout",
                    write.binding(),
                    write.descriptor_type()
                )));
            }
            let known = match *write {
                DescriptorWrite::Buffer { buffer, .. } => s.buffers.contains_key(&buffer),
                DescriptorWrite::Image { view, .. } => s.views.contains_key(&view),
            };
            if !known {
                return Err(s.report(format!("descriptor write to binding {} uses a dead resource", write.binding())));
            }
        }
        Ok(())
    }

    // pipelines ----------------------------------------------------------

    fn create_shader_module(&self, code: &[u32], _name: &str) -> GfxResult<vk::ShaderModule> {
        let mut s = self.state.borrow_mut();
        if code.first() != Some(&SPIRV_MAGIC) {
            return Err(s.report("shader code does not start with the SPIR-V magic number".to_string()));
        }
        let module = s.new_handle();
        s.shader_modules.insert(module);
        Ok(module)
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        let mut s = self.state.borrow_mut();
        if !s.shader_modules.remove(&module) {
            s.report(format!("destroy unknown shader module {:?}", module));
        }
    }

    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
        _name: &str,
    ) -> GfxResult<vk::PipelineLayout> {
        let mut s = self.state.borrow_mut();
        if let Some(layout) = set_layouts.iter().find(|layout| !s.set_layouts.contains_key(*layout)) {
            return Err(s.report(format!("pipeline layout uses unknown set layout {:?}", layout)));
        }
        // 最小保证是 128 字节
        if let Some(range) = push_constant_ranges.iter().find(|range| range.offset + range.size > 128) {
            return Err(s.report(format!("push constant range {:?} exceeds 128 bytes", range)));
        }
        let layout = s.new_handle();
        s.pipeline_layouts.insert(layout);
        Ok(layout)
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        let mut s = self.state.borrow_mut();
        if !s.pipeline_layouts.remove(&layout) {
            s.report(format!("destroy unknown pipeline layout {:?}", layout));
        }
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc, name: &str) -> GfxResult<vk::Pipeline> {
        let mut s = self.state.borrow_mut();
        if !s.shader_modules.contains(&desc.vertex_shader) || !s.shader_modules.contains(&desc.fragment_shader) {
            return Err(s.report(format!("graphics pipeline `{}` uses unknown shader modules", name)));
        }
        if !s.pipeline_layouts.contains(&desc.layout) {
            return Err(s.report(format!("graphics pipeline `{}` uses unknown layout", name)));
        }
        let pipeline = s.new_handle();
        s.pipelines.insert(pipeline, PipelineRecord::Graphics(*desc));
        Ok(pipeline)
    }

    fn create_compute_pipeline(&self, desc: &ComputePipelineDesc, name: &str) -> GfxResult<vk::Pipeline> {
        let mut s = self.state.borrow_mut();
        if !s.shader_modules.contains(&desc.shader) || !s.pipeline_layouts.contains(&desc.layout) {
            return Err(s.report(format!("compute pipeline `{}` uses unknown shader or layout", name)));
        }
        let pipeline = s.new_handle();
        s.pipelines.insert(pipeline, PipelineRecord::Compute(*desc));
        Ok(pipeline)
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        let mut s = self.state.borrow_mut();
        if s.pipelines.remove(&pipeline).is_none() {
            s.report(format!("destroy unknown pipeline {:?}", pipeline));
            return;
        }
        s.events.push(GpuEvent::PipelineDestroyed { pipeline });
    }

    // presentation -------------------------------------------------------

    fn create_swapchain(&self, desc: &SwapchainDesc, old: vk::SwapchainKHR) -> GfxResult<SwapchainImages> {
        let mut s = self.state.borrow_mut();
        if old != vk::SwapchainKHR::null() && !s.swapchains.contains_key(&old) {
            return Err(s.report(format!("create swapchain with unknown old swapchain {:?}", old)));
        }
        let extent = s.surface_extent.unwrap_or(desc.extent);
        if extent.width == 0 || extent.height == 0 {
            return Err(GfxError::InvalidArgument("swapchain extent must not be zero".to_string()));
        }

        let handle: vk::SwapchainKHR = s.new_handle();
        let mut images = Vec::with_capacity(HEADLESS_SWAPCHAIN_IMAGES as usize);
        let mut views = Vec::with_capacity(HEADLESS_SWAPCHAIN_IMAGES as usize);
        for _ in 0..HEADLESS_SWAPCHAIN_IMAGES {
            let image: vk::Image = s.new_handle();
            let view: vk::ImageView = s.new_handle();
            s.images.insert(
                image,
                ImageRecord {
                    memory: None,
                    extent: vk::Extent3D {
                        width: extent.width,
                        height: extent.height,
                        depth: 1,
                    },
                    format: desc.format.format,
                    layout: vk::ImageLayout::UNDEFINED,
                    view,
                    owned_by_swapchain: true,
                },
            );
            s.views.insert(view, image);
            images.push(image);
            views.push(view);
        }

        s.swapchains.insert(
            handle,
            SwapchainRecord {
                extent,
                images: images.clone(),
                next_image: 0,
            },
        );
        s.events.push(GpuEvent::SwapchainCreated {
            swapchain: handle,
            extent,
        });

        Ok(SwapchainImages {
            handle,
            images,
            views,
            extent,
            format: desc.format.format,
        })
    }

    fn destroy_swapchain(&self, swapchain: &SwapchainImages) {
        let mut s = self.state.borrow_mut();
        let Some(record) = s.swapchains.remove(&swapchain.handle) else {
            s.report(format!("destroy unknown swapchain {:?}", swapchain.handle));
            return;
        };
        for image in record.images {
            if let Some(image) = s.images.remove(&image) {
                s.views.remove(&image.view);
            }
        }
        s.events.push(GpuEvent::SwapchainDestroyed {
            swapchain: swapchain.handle,
        });
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
        _timeout_ns: u64,
    ) -> GfxResult<AcquireOutcome> {
        let mut s = self.state.borrow_mut();
        let Some(extent) = s.swapchains.get(&swapchain).map(|record| record.extent) else {
            return Err(s.report(format!("acquire from unknown swapchain {:?}", swapchain)));
        };

        let scripted = s.acquire_script.pop_front();
        let surface_changed = s.surface_extent.is_some_and(|surface| surface != extent);
        if scripted == Some(ScriptedAcquire::OutOfDate) || surface_changed {
            s.events.push(GpuEvent::AcquireOutOfDate { swapchain });
            return Ok(AcquireOutcome::OutOfDate);
        }

        match s.semaphores.get_mut(&signal) {
            Some(signaled) if !*signaled => *signaled = true,
            _ => return Err(s.report(format!("acquire signals semaphore {:?} that is not unsignaled", signal))),
        }

        let image_index = match s.swapchains.get_mut(&swapchain) {
            Some(record) => {
                let index = record.next_image;
                record.next_image = (index + 1) % record.images.len() as u32;
                index
            }
            None => 0,
        };
        s.events.push(GpuEvent::ImageAcquired { swapchain, image_index });
        Ok(AcquireOutcome::Acquired {
            image_index,
            suboptimal: scripted == Some(ScriptedAcquire::Suboptimal),
        })
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> GfxResult<PresentOutcome> {
        let mut s = self.state.borrow_mut();
        let Some(image) = s.swapchains.get(&swapchain).and_then(|record| record.images.get(image_index as usize).copied())
        else {
            return Err(s.report(format!("present invalid image {} of swapchain {:?}", image_index, swapchain)));
        };

        match s.semaphores.get_mut(&wait) {
            Some(signaled) if *signaled => *signaled = false,
            _ => return Err(s.report(format!("present waits on semaphore {:?} that has no pending signal", wait))),
        }

        if s.present_script.pop_front().is_some() {
            s.events.push(GpuEvent::PresentOutOfDate { swapchain });
            return Ok(PresentOutcome::OutOfDate);
        }

        s.queue.push_back(QueueOp::Present { image });
        s.events.push(GpuEvent::Presented { swapchain, image_index });
        Ok(PresentOutcome::Presented { suboptimal: false })
    }
}
