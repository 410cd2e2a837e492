use std::path::PathBuf;

use ash::vk;

/// GFX 层的错误类型
///
/// GPU 调用失败在引擎边界处被视为致命错误，参见 [`fatal`]
#[derive(Debug, thiserror::Error)]
pub enum GfxError {
    #[error("vulkan call `{call}` failed: {result:?}")]
    Vulkan { call: &'static str, result: vk::Result },

    #[error("timed out waiting for {what} after {timeout_ns} ns")]
    Timeout { what: &'static str, timeout_ns: u64 },

    #[error("failed to load vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("failed to load shader `{path}`: {source}")]
    ShaderLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no suitable physical device: {0}")]
    NoSuitableDevice(String),

    #[error("buffer `{0}` is not host visible")]
    NotHostVisible(String),

    #[error("upload size mismatch: expected at least {expected} bytes, got {actual}")]
    UploadSize { expected: u64, actual: u64 },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// headless 后端检测到的 API 误用
    #[error("validation failed: {0}")]
    Validation(String),
}

pub type GfxResult<T> = Result<T, GfxError>;

impl GfxError {
    /// 底层的 vk::Result，超时会映射为 `vk::Result::TIMEOUT`
    pub fn vk_result(&self) -> Option<vk::Result> {
        match self {
            GfxError::Vulkan { result, .. } => Some(*result),
            GfxError::Timeout { .. } => Some(vk::Result::TIMEOUT),
            _ => None,
        }
    }

    /// descriptor pool 耗尽或者碎片化，可以通过换一个新 pool 重试
    pub fn is_pool_exhausted(&self) -> bool {
        matches!(
            self.vk_result(),
            Some(vk::Result::ERROR_OUT_OF_POOL_MEMORY) | Some(vk::Result::ERROR_FRAGMENTED_POOL)
        )
    }

    /// swapchain 已经和 surface 不匹配
    pub fn is_out_of_date(&self) -> bool {
        self.vk_result() == Some(vk::Result::ERROR_OUT_OF_DATE_KHR)
    }
}

/// 为 `VkResult` 附加调用名
pub trait VkResultExt<T> {
    fn vk_context(self, call: &'static str) -> GfxResult<T>;
}

impl<T> VkResultExt<T> for Result<T, vk::Result> {
    #[inline]
    fn vk_context(self, call: &'static str) -> GfxResult<T> {
        self.map_err(|result| GfxError::Vulkan { call, result })
    }
}

/// 不可恢复的 GPU 错误：记录错误码之后直接终止进程
///
/// 设备在调用失败后处于未定义状态，这一层没有安全的局部恢复手段
pub fn fatal(err: &GfxError) -> ! {
    match err.vk_result() {
        Some(code) => log::error!("Detected fatal GPU error ({code:?}): {err}"),
        None => log::error!("Detected fatal GPU error: {err}"),
    }
    log::logger().flush();
    std::process::abort()
}
