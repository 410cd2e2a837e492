use ash::vk;
use ember_gfx::{
    commands::immediate::ImmediateSubmit,
    error::{GfxError, GfxResult},
    resources::{
        allocator::GfxAllocator,
        buffer::{AllocatedBuffer, MemoryUsage},
    },
};

use crate::mesh::vertex::Vertex;

/// 上传到 GPU 的一份网格数据
///
/// 顶点不走 vertex input，shader 通过 `vertex_buffer_address` 直接读取
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuMeshBuffers {
    pub index_buffer: AllocatedBuffer,
    pub vertex_buffer: AllocatedBuffer,
    pub vertex_buffer_address: vk::DeviceAddress,
}

impl GpuMeshBuffers {
    #[inline]
    pub fn index_count(&self) -> u32 {
        (self.index_buffer.size() / size_of::<u32>() as vk::DeviceSize) as u32
    }
}

/// 通过一个 staging buffer 与一次 immediate submit 上传网格
///
/// staging buffer 中顶点在前，索引紧随其后；提交结束后立即释放 staging buffer
pub fn upload_mesh(
    allocator: &GfxAllocator,
    immediate: &ImmediateSubmit,
    indices: &[u32],
    vertices: &[Vertex],
    name: &str,
) -> GfxResult<GpuMeshBuffers> {
    if indices.is_empty() || vertices.is_empty() {
        return Err(GfxError::InvalidArgument(format!(
            "mesh `{}` is empty: {} vertices, {} indices",
            name,
            vertices.len(),
            indices.len()
        )));
    }

    let vertex_bytes: &[u8] = bytemuck::cast_slice(vertices);
    let index_bytes: &[u8] = bytemuck::cast_slice(indices);
    let vertex_size = vertex_bytes.len() as vk::DeviceSize;
    let index_size = index_bytes.len() as vk::DeviceSize;

    let vertex_buffer = allocator.create_buffer(
        vertex_size,
        vk::BufferUsageFlags::STORAGE_BUFFER
            | vk::BufferUsageFlags::TRANSFER_DST
            | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
        MemoryUsage::GpuOnly,
        &format!("{name}-vertices"),
    )?;
    let index_buffer = match allocator.create_buffer(
        index_size,
        vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
        MemoryUsage::GpuOnly,
        &format!("{name}-indices"),
    ) {
        Ok(buffer) => buffer,
        Err(e) => {
            allocator.destroy_buffer(vertex_buffer);
            return Err(e);
        }
    };
    let destroy_mesh_buffers = || {
        allocator.destroy_buffer(index_buffer);
        allocator.destroy_buffer(vertex_buffer);
    };

    let Some(vertex_buffer_address) = vertex_buffer.device_address() else {
        destroy_mesh_buffers();
        return Err(GfxError::InvalidArgument(format!("vertex buffer of `{name}` has no device address")));
    };

    let stage_buffer = match allocator.create_stage_buffer(vertex_size + index_size, &format!("{name}-stage")) {
        Ok(buffer) => buffer,
        Err(e) => {
            destroy_mesh_buffers();
            return Err(e);
        }
    };

    let uploaded = allocator
        .write_buffer(&stage_buffer, 0, vertex_bytes)
        .and_then(|_| allocator.write_buffer(&stage_buffer, vertex_size, index_bytes))
        .and_then(|_| {
            immediate.submit(name, |cmd| {
                cmd.cmd_copy_buffer(
                    &stage_buffer,
                    &vertex_buffer,
                    &[vk::BufferCopy {
                        src_offset: 0,
                        dst_offset: 0,
                        size: vertex_size,
                    }],
                );
                cmd.cmd_copy_buffer(
                    &stage_buffer,
                    &index_buffer,
                    &[vk::BufferCopy {
                        src_offset: vertex_size,
                        dst_offset: 0,
                        size: index_size,
                    }],
                );
            })
        });

    allocator.destroy_buffer(stage_buffer);
    if let Err(e) = uploaded {
        destroy_mesh_buffers();
        return Err(e);
    }

    log::debug!(
        "uploaded mesh `{}`: {} vertices, {} indices",
        name,
        vertices.len(),
        indices.len()
    );
    Ok(GpuMeshBuffers {
        index_buffer,
        vertex_buffer,
        vertex_buffer_address,
    })
}

#[cfg(test)]
mod tests {
    use glam::{Vec3, Vec4};

    use super::*;
    use crate::test_utils::headless_device;

    fn quad() -> (Vec<u32>, Vec<Vertex>) {
        let vertices = [
            Vec3::new(0.5, -0.5, 0.0),
            Vec3::new(0.5, 0.5, 0.0),
            Vec3::new(-0.5, -0.5, 0.0),
            Vec3::new(-0.5, 0.5, 0.0),
        ]
        .into_iter()
        .enumerate()
        .map(|(i, position)| Vertex::new(position, Vec3::Z, [i as f32 * 0.25, 0.5], Vec4::new(0.0, i as f32, 1.0, 1.0)))
        .collect();
        (vec![0, 1, 2, 2, 1, 3], vertices)
    }

    /// 把 GPU only 的 buffer 拷贝到可回读的 buffer 中
    fn read_back(allocator: &GfxAllocator, immediate: &ImmediateSubmit, src: &AllocatedBuffer) -> Vec<u8> {
        let readback = allocator
            .create_buffer(src.size(), vk::BufferUsageFlags::TRANSFER_DST, MemoryUsage::GpuToCpu, "readback")
            .unwrap();
        immediate
            .submit("readback", |cmd| {
                cmd.cmd_copy_buffer(
                    src,
                    &readback,
                    &[vk::BufferCopy {
                        src_offset: 0,
                        dst_offset: 0,
                        size: src.size(),
                    }],
                )
            })
            .unwrap();
        let bytes = allocator.read_buffer(&readback, 0, src.size()).unwrap();
        allocator.destroy_buffer(readback);
        bytes
    }

    #[test]
    fn uploaded_mesh_reads_back_equal() {
        let (headless, device) = headless_device();
        let allocator = GfxAllocator::new(device.clone());
        let immediate = ImmediateSubmit::new(device, u64::MAX).unwrap();
        let (indices, vertices) = quad();

        let mesh = upload_mesh(&allocator, &immediate, &indices, &vertices, "quad").unwrap();
        assert_eq!(mesh.vertex_buffer.size(), 4 * 48);
        assert_eq!(mesh.index_buffer.size(), 6 * 4);
        assert_eq!(mesh.index_count(), 6);
        assert_ne!(mesh.vertex_buffer_address, 0);
        // staging buffer 已经释放
        assert_eq!(headless.live_buffer_count(), 2);

        let vertex_bytes = read_back(&allocator, &immediate, &mesh.vertex_buffer);
        let index_bytes = read_back(&allocator, &immediate, &mesh.index_buffer);
        assert_eq!(bytemuck::cast_slice::<Vertex, u8>(&vertices), vertex_bytes.as_slice());
        assert_eq!(bytemuck::cast_slice::<u32, u8>(&indices), index_bytes.as_slice());

        allocator.destroy_buffer(mesh.index_buffer);
        allocator.destroy_buffer(mesh.vertex_buffer);
        immediate.destroy();
        assert_eq!(headless.live_object_count(), 0);
        assert!(headless.validation_errors().is_empty(), "{:?}", headless.validation_errors());
    }

    #[test]
    fn empty_mesh_is_rejected() {
        let (headless, device) = headless_device();
        let allocator = GfxAllocator::new(device.clone());
        let immediate = ImmediateSubmit::new(device, u64::MAX).unwrap();
        let (indices, vertices) = quad();

        assert!(matches!(
            upload_mesh(&allocator, &immediate, &[], &vertices, "no-indices"),
            Err(GfxError::InvalidArgument(_))
        ));
        assert!(matches!(
            upload_mesh(&allocator, &immediate, &indices, &[], "no-vertices"),
            Err(GfxError::InvalidArgument(_))
        ));
        assert_eq!(headless.live_buffer_count(), 0);
        immediate.destroy();
    }
}
