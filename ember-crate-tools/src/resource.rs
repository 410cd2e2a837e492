use std::{
    env,
    path::{Path, PathBuf},
};

/// 统一资源路径管理
///
/// 所有路径基于工作区根目录（通过 `CARGO_MANIFEST_DIR` 推导）。
/// 可以通过环境变量 `EMBER_ROOT` 覆盖工作区根目录，便于发布后的二进制定位资源。
///
/// # 使用示例
/// ```ignore
/// let config = EmberPath::workspace_path().join("ember.toml");
/// let texture = EmberPath::assets_path("uv_checker.png"); // assets/uv_checker.png
/// let shader = EmberPath::shader_build_path("mesh.vert"); // engine/shader/.build/mesh.vert.spv
/// ```
pub struct EmberPath {}
// 核心路径
impl EmberPath {
    /// 获取工作区根目录
    pub fn workspace_path() -> PathBuf {
        if let Some(root) = env::var_os("EMBER_ROOT") {
            return PathBuf::from(root);
        }
        // 本 crate 位于工作区根目录的下一级
        let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
        manifest_dir.parent().unwrap_or(manifest_dir).to_path_buf()
    }

    pub fn engine_path() -> PathBuf {
        Self::workspace_path().join("engine")
    }

    /// 获取 `assets/` 目录下的文件路径
    pub fn assets_path(filename: &str) -> PathBuf {
        Self::workspace_path().join("assets").join(filename)
    }

    /// 默认的渲染配置文件
    pub fn config_path() -> PathBuf {
        Self::workspace_path().join("ember.toml")
    }
}
// shader 目录
impl EmberPath {
    pub fn shader_root_path() -> PathBuf {
        Self::engine_path().join("shader")
    }

    /// 获取 `engine/shader/.build/` 目录下编译后的 SPIR-V 路径
    ///
    /// `filename` 不带 `.spv` 后缀，例如 `mesh.vert`
    pub fn shader_build_path(filename: &str) -> PathBuf {
        Self::shader_root_path().join(".build").join(format!("{filename}.spv"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shader_build_path_appends_spv() {
        let path = EmberPath::shader_build_path("mesh.vert");
        assert!(path.ends_with("engine/shader/.build/mesh.vert.spv"));
    }

    #[test]
    fn assets_are_under_workspace() {
        let path = EmberPath::assets_path("a.png");
        assert!(path.starts_with(EmberPath::workspace_path()));
    }
}
