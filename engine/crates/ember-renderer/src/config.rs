use std::{
    ops::RangeInclusive,
    path::{Path, PathBuf},
};

use ash::vk;
use serde::{Deserialize, Serialize};

/// 渲染配置加载失败
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresentModeConfig {
    Fifo,
    Mailbox,
    Immediate,
}

impl PresentModeConfig {
    #[inline]
    pub fn to_vk(self) -> vk::PresentModeKHR {
        match self {
            PresentModeConfig::Fifo => vk::PresentModeKHR::FIFO,
            PresentModeConfig::Mailbox => vk::PresentModeKHR::MAILBOX,
            PresentModeConfig::Immediate => vk::PresentModeKHR::IMMEDIATE,
        }
    }
}

/// descriptor 分配器的尺寸
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptorConfig {
    /// 全局分配器第一个 pool 的 set 数量
    pub global_max_sets: u32,
    /// 每个 frame slot 的分配器第一个 pool 的 set 数量
    pub frame_max_sets: u32,
    /// 单个 pool 的 set 数量上限
    pub pool_growth_cap: u32,
}

impl Default for DescriptorConfig {
    fn default() -> Self {
        Self {
            global_max_sets: 10,
            frame_max_sets: 1000,
            pool_growth_cap: 4092,
        }
    }
}

/// render_scale 允许的取值，配置校验与运行时设置共用
pub const RENDER_SCALE_RANGE: RangeInclusive<f32> = 0.1..=1.0;

/// 渲染器配置，从 `ember.toml` 加载
///
/// 所有字段都有默认值，配置文件中只需要写出需要覆盖的部分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub app_name: String,
    /// 初始窗口尺寸 `[width, height]`
    pub window_extent: [u32; 2],
    /// frame in flight 的数量，只能是 2 或 3
    pub frames_in_flight: usize,
    /// 等待 frame slot fence 的超时时间
    pub fence_timeout_ms: u64,
    /// immediate submit 的超时时间，None 表示不限时
    pub immediate_timeout_ms: Option<u64>,
    pub present_mode: PresentModeConfig,
    /// 是否开启 validation layer
    pub validation: bool,
    /// 实际绘制的尺寸相对 draw image 的比例，取值 [0.1, 1]
    pub render_scale: f32,
    pub descriptors: DescriptorConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            app_name: "ember".to_string(),
            window_extent: [1700, 900],
            frames_in_flight: 2,
            fence_timeout_ms: 1000,
            immediate_timeout_ms: None,
            present_mode: PresentModeConfig::Fifo,
            validation: cfg!(debug_assertions),
            render_scale: 1.0,
            descriptors: DescriptorConfig::default(),
        }
    }
}

// new & init
impl RendererConfig {
    /// 文件不存在时使用默认配置
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("config {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        log::info!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(2..=3).contains(&self.frames_in_flight) {
            return Err(ConfigError::Invalid(format!(
                "frames_in_flight must be 2 or 3, got {}",
                self.frames_in_flight
            )));
        }
        if !RENDER_SCALE_RANGE.contains(&self.render_scale) {
            return Err(ConfigError::Invalid(format!(
                "render_scale must be in [{}, {}], got {}",
                RENDER_SCALE_RANGE.start(),
                RENDER_SCALE_RANGE.end(),
                self.render_scale
            )));
        }
        if self.fence_timeout_ms == 0 {
            return Err(ConfigError::Invalid("fence_timeout_ms must not be zero".to_string()));
        }
        let descriptors = &self.descriptors;
        if descriptors.global_max_sets == 0 || descriptors.frame_max_sets == 0 {
            return Err(ConfigError::Invalid("descriptor max sets must not be zero".to_string()));
        }
        if descriptors.pool_growth_cap < descriptors.global_max_sets.max(descriptors.frame_max_sets) {
            return Err(ConfigError::Invalid(format!(
                "pool_growth_cap {} is smaller than the initial pool size",
                descriptors.pool_growth_cap
            )));
        }
        Ok(())
    }
}

// getters
impl RendererConfig {
    #[inline]
    pub fn window_extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.window_extent[0],
            height: self.window_extent[1],
        }
    }

    #[inline]
    pub fn fence_timeout_ns(&self) -> u64 {
        self.fence_timeout_ms.saturating_mul(1_000_000)
    }

    /// 不限时的时候为 `u64::MAX`
    #[inline]
    pub fn immediate_timeout_ns(&self) -> u64 {
        self.immediate_timeout_ms.map_or(u64::MAX, |ms| ms.saturating_mul(1_000_000))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_means_defaults() {
        let config = RendererConfig::from_toml_str("").unwrap();
        assert_eq!(config, RendererConfig::default());
        assert_eq!(config.fence_timeout_ns(), 1_000_000_000);
        assert_eq!(config.immediate_timeout_ns(), u64::MAX);
        assert_eq!(config.descriptors.pool_growth_cap, 4092);
    }

    #[test]
    fn partial_override() {
        let config = RendererConfig::from_toml_str(
            r#"
            frames_in_flight = 3
            present_mode = "mailbox"
            immediate_timeout_ms = 250

            [descriptors]
            frame_max_sets = 64
            "#,
        )
        .unwrap();
        assert_eq!(config.frames_in_flight, 3);
        assert_eq!(config.present_mode.to_vk(), vk::PresentModeKHR::MAILBOX);
        assert_eq!(config.immediate_timeout_ns(), 250_000_000);
        assert_eq!(config.descriptors.frame_max_sets, 64);
        assert_eq!(config.descriptors.global_max_sets, 10);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        assert!(matches!(RendererConfig::from_toml_str("frames_in_flight = 4"), Err(ConfigError::Invalid(_))));
        assert!(matches!(RendererConfig::from_toml_str("render_scale = 0.0"), Err(ConfigError::Invalid(_))));
        assert!(matches!(RendererConfig::from_toml_str("render_scale = 1.5"), Err(ConfigError::Invalid(_))));
        assert!(matches!(RendererConfig::from_toml_str("render_scale = 0.05"), Err(ConfigError::Invalid(_))));
        assert!(RendererConfig::from_toml_str("render_scale = 0.1").is_ok());
        assert!(matches!(RendererConfig::from_toml_str("frames_in_flight = \"two\""), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join(format!("ember-missing-{}.toml", std::process::id()));
        let config = RendererConfig::load(&path).unwrap();
        assert_eq!(config.frames_in_flight, 2);
    }
}
