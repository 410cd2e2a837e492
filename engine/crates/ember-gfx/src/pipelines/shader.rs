use std::{path::Path, rc::Rc};

use ash::vk;

use crate::{
    error::{GfxError, GfxResult},
    foundation::device::GfxDevice,
};

/// 读取编译好的 SPIR-V 文件
///
/// 文件不存在或者内容不是合法的 SPIR-V（长度不是 4 的倍数、magic 不对）时记录错误并返回 `ShaderLoad`。
/// 缺失 shader 属于打包问题，不做任何回退。
pub fn load_spirv(path: impl AsRef<Path>) -> GfxResult<Vec<u32>> {
    let path = path.as_ref();
    std::fs::File::open(path).and_then(|mut file| ash::util::read_spv(&mut file)).map_err(|source| {
        log::error!("failed to load shader module {}: {}", path.display(), source);
        GfxError::ShaderLoad {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// # Destroy
///
/// 需要手动调用 `destroy` 方法来释放资源。
pub struct GfxShaderModule {
    device: Rc<dyn GfxDevice>,
    handle: vk::ShaderModule,
    destroyed: bool,
}
impl GfxShaderModule {
    pub fn new(device: Rc<dyn GfxDevice>, code: &[u32], debug_name: &str) -> GfxResult<Self> {
        let handle = device.create_shader_module(code, debug_name)?;
        Ok(Self {
            device,
            handle,
            destroyed: false,
        })
    }

    /// # param
    /// * path - spv shader 文件路径
    pub fn from_file(device: Rc<dyn GfxDevice>, path: &Path) -> GfxResult<Self> {
        let code = load_spirv(path)?;
        Self::new(device, &code, &path.to_string_lossy())
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.handle
    }

    #[inline]
    pub fn destroy(mut self) {
        self.device.destroy_shader_module(self.handle);
        self.destroyed = true;
    }
}
impl Drop for GfxShaderModule {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            debug_assert!(self.destroyed, "GfxShaderModule must be destroyed manually before drop.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessDevice;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    fn temp_file(name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("ember-gfx-shader-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let err = load_spirv("/definitely/not/here/mesh.vert.spv").unwrap_err();
        assert!(matches!(err, GfxError::ShaderLoad { .. }));
    }

    #[test]
    fn truncated_file_is_a_load_error() {
        let path = temp_file("truncated.spv", &[0x03, 0x02, 0x23]);
        assert!(matches!(load_spirv(&path), Err(GfxError::ShaderLoad { .. })));
    }

    #[test]
    fn valid_words_are_returned() {
        let words = [SPIRV_MAGIC, 0x0001_0000, 0, 1, 0];
        let bytes = words.iter().flat_map(|w| w.to_le_bytes()).collect::<Vec<_>>();
        let path = temp_file("valid.spv", &bytes);
        assert_eq!(load_spirv(&path).unwrap(), words.to_vec());

        let device = Rc::new(HeadlessDevice::new());
        let module = GfxShaderModule::from_file(device.clone(), &path).unwrap();
        assert_ne!(module.handle(), vk::ShaderModule::null());
        module.destroy();
        assert_eq!(device.live_object_count(), 0);
    }
}
