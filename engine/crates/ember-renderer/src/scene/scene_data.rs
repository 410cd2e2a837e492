use glam::{Mat4, Quat, Vec3, Vec4};

/// 每帧更新的场景 uniform，对应 shader 中 set 0 binding 0
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuSceneData {
    pub view: Mat4,
    pub proj: Mat4,
    pub viewproj: Mat4,
    pub ambient_color: Vec4,
    /// w 分量是光照强度
    pub sunlight_direction: Vec4,
    pub sunlight_color: Vec4,
}

impl Default for GpuSceneData {
    fn default() -> Self {
        Self::from_camera(Mat4::IDENTITY, Mat4::IDENTITY)
    }
}

impl GpuSceneData {
    pub fn from_camera(view: Mat4, proj: Mat4) -> Self {
        Self {
            view,
            proj,
            viewproj: proj * view,
            ambient_color: Vec4::splat(0.1),
            sunlight_direction: Vec4::new(0.0, 1.0, 0.5, 1.0),
            sunlight_color: Vec4::ONE,
        }
    }
}

/// 每个 draw call 的 push constant
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuDrawPushConstants {
    pub world_matrix: Mat4,
    /// 顶点 buffer 的 device address
    pub vertex_buffer: u64,
    pub _padding: u64,
}

impl GpuDrawPushConstants {
    #[inline]
    pub fn new(world_matrix: Mat4, vertex_buffer: u64) -> Self {
        Self {
            world_matrix,
            vertex_buffer,
            _padding: 0,
        }
    }
}

/// 第一人称相机
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    /// 绕 y 轴，弧度
    pub yaw: f32,
    /// 绕 x 轴，弧度
    pub pitch: f32,
    /// 竖直方向视角，弧度
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            yaw: 0.0,
            pitch: 0.0,
            fov_y: 70f32.to_radians(),
            near: 0.1,
            far: 10000.0,
        }
    }
}

impl Camera {
    pub fn rotation(&self) -> Mat4 {
        let yaw = Quat::from_axis_angle(Vec3::NEG_Y, self.yaw);
        let pitch = Quat::from_axis_angle(Vec3::X, self.pitch);
        Mat4::from_quat(yaw) * Mat4::from_quat(pitch)
    }

    pub fn view_matrix(&self) -> Mat4 {
        (Mat4::from_translation(self.position) * self.rotation()).inverse()
    }

    /// reversed-z 透视投影，近平面深度为 1，远平面为 0；y 轴翻转到 vulkan 的 NDC
    pub fn projection(&self, aspect: f32) -> Mat4 {
        let mut proj = Mat4::perspective_rh(self.fov_y, aspect, self.far, self.near);
        proj.y_axis.y *= -1.0;
        proj
    }

    pub fn scene_data(&self, aspect: f32) -> GpuSceneData {
        GpuSceneData::from_camera(self.view_matrix(), self.projection(aspect))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_layouts() {
        assert_eq!(size_of::<GpuSceneData>(), 240);
        assert_eq!(size_of::<GpuDrawPushConstants>(), 80);
    }

    #[test]
    fn reversed_depth() {
        let camera = Camera {
            position: Vec3::ZERO,
            ..Default::default()
        };
        let data = camera.scene_data(16.0 / 9.0);

        let near = data.viewproj * Vec4::new(0.0, 0.0, -camera.near, 1.0);
        let far = data.viewproj * Vec4::new(0.0, 0.0, -camera.far, 1.0);
        assert!((near.z / near.w - 1.0).abs() < 1e-4);
        assert!((far.z / far.w).abs() < 1e-4);
    }
}
