use ember_gfx::error::GfxResult;
use ember_renderer::{mesh::vertex::Vertex, render_engine::RenderEngine, scene::scene_graph::NodeId};
use glam::{Mat4, Vec3, Vec4};

/// 边长为 1 的立方体，每个面 4 个顶点，颜色由法线决定
///
/// 从外侧看每个三角形都是逆时针
pub fn cube() -> (Vec<u32>, Vec<Vertex>) {
    let faces = [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z];

    let mut indices = Vec::with_capacity(faces.len() * 6);
    let mut vertices = Vec::with_capacity(faces.len() * 4);
    for normal in faces {
        let u = if normal.y.abs() > 0.5 { Vec3::X } else { Vec3::Y };
        let v = normal.cross(u);
        let color = (normal * 0.5 + Vec3::splat(0.5)).extend(1.0);

        let base = vertices.len() as u32;
        let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
        vertices.extend(corners.iter().map(|&(s, t)| {
            let position = (normal + u * s + v * t) * 0.5;
            Vertex::new(position, normal, [(s + 1.0) * 0.5, (t + 1.0) * 0.5], color)
        }));
        indices.extend([0, 1, 2, 2, 3, 0].iter().map(|i| base + i));
    }
    (indices, vertices)
}

/// 背景 compute shader 的默认渐变
pub fn background_colors() -> [Vec4; 2] {
    [Vec4::new(0.05, 0.05, 0.12, 1.0), Vec4::new(0.35, 0.18, 0.08, 1.0)]
}

/// 设置背景与相机，放入一个立方体，返回需要旋转的节点
pub fn populate(engine: &mut RenderEngine) -> GfxResult<NodeId> {
    let [top, bottom] = background_colors();
    let background = &mut engine.scene_renderer_mut().background;
    background.data1 = top;
    background.data2 = bottom;

    let (indices, vertices) = cube();
    let cube = engine.add_mesh("cube", &indices, &vertices, None)?;
    let node = engine.scene_mut().add_node(Mat4::IDENTITY, Some(cube));
    engine.camera_mut().position = Vec3::new(0.0, 0.0, 3.0);
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_faces_point_outward() {
        let (indices, vertices) = cube();
        assert_eq!(vertices.len(), 24);
        assert_eq!(indices.len(), 36);
        assert!(indices.iter().all(|&i| (i as usize) < vertices.len()));

        for triangle in indices.chunks(3) {
            let [a, b, c] = [0, 1, 2].map(|k| vertices[triangle[k] as usize]);
            let face_normal = (b.position - a.position).cross(c.position - a.position);
            assert!(face_normal.dot(a.normal) > 0.0);
            // 面的中心在法线方向上
            assert!((a.position + b.position + c.position).dot(a.normal) > 0.0);
        }
    }
}
