use glam::{Vec3, Vec4};

/// shader 通过 buffer device address 读取的顶点
///
/// uv 拆成两个标量填进 vec3 后面的空位，整个结构体 48 字节，和 std430 布局一致
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub uv_x: f32,
    pub normal: Vec3,
    pub uv_y: f32,
    pub color: Vec4,
}

impl Vertex {
    #[inline]
    pub fn new(position: Vec3, normal: Vec3, uv: [f32; 2], color: Vec4) -> Self {
        Self {
            position,
            uv_x: uv[0],
            normal,
            uv_y: uv[1],
            color,
        }
    }

    #[inline]
    pub fn uv(&self) -> [f32; 2] {
        [self.uv_x, self.uv_y]
    }
}
