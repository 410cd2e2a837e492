use slotmap::new_key_type;

use crate::{material::registry::MaterialKey, mesh::upload::GpuMeshBuffers};

new_key_type! { pub struct MeshKey; }

/// 网格中使用同一个材质的一段索引
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeoSurface {
    pub start_index: u32,
    pub count: u32,
    /// None 时使用默认材质
    pub material: Option<MaterialKey>,
}

/// 已经上传到 GPU 的网格资产
#[derive(Debug)]
pub struct MeshAsset {
    pub name: String,
    pub surfaces: Vec<GeoSurface>,
    pub buffers: GpuMeshBuffers,
}

impl MeshAsset {
    /// 整个索引范围作为一个 surface
    pub fn single_surface(name: impl Into<String>, buffers: GpuMeshBuffers, material: Option<MaterialKey>) -> Self {
        Self {
            name: name.into(),
            surfaces: vec![GeoSurface {
                start_index: 0,
                count: buffers.index_count(),
                material,
            }],
            buffers,
        }
    }
}
