//! 配置管理模块
//!
//! 提供渲染表面配置的加载、解析和管理功能。
//! 支持从 TOML 配置文件加载，也支持命令行参数覆盖。
//!
//! # 配置文件格式 (config.toml)
//!
//! ```toml
//! [surface]
//! width = 300
//! height = 300
//! vsync = true
//! depth_format = "d32_float"   # 可省略
//!
//! [graphics]
//! backend = "vulkan"   # vulkan, direct3d11, opengl, opengles, metal, headless
//! host = "win32_forms" # win32_forms, android_activity, uikit, appkit, headless
//! debug = false
//!
//! [pacer]
//! kind = "spin"        # display_link, timer, spin, manual（省略时按宿主选择）
//! interval_ms = 33
//! refresh_hz = 60
//!
//! [logging]
//! level = "info"       # trace, debug, info, warn, error
//! file_output = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::{ConfigError, GraphicsError, Result};

/// 渲染表面配置
///
/// 包含宿主程序创建设备、表面和刷新源所需的所有配置项。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// 表面配置
    #[serde(default)]
    pub surface: SurfaceConfig,

    /// 图形配置
    #[serde(default)]
    pub graphics: GraphicsConfig,

    /// 刷新源配置
    #[serde(default)]
    pub pacer: PacerConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 表面配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurfaceConfig {
    /// 初始宽度（像素）
    #[serde(default = "default_width")]
    pub width: u32,

    /// 初始高度（像素）
    #[serde(default = "default_height")]
    pub height: u32,

    /// 垂直同步
    #[serde(default = "default_vsync")]
    pub vsync: bool,

    /// 交换链深度格式（`None` 表示无深度缓冲）
    #[serde(default)]
    pub depth_format: Option<DepthFormat>,
}

/// 图形配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphicsConfig {
    /// 图形后端选择
    #[serde(default = "default_backend")]
    pub backend: GraphicsBackend,

    /// 宿主平台
    #[serde(default = "default_host")]
    pub host: HostPlatform,

    /// 是否启用调试层
    #[serde(default)]
    pub debug: bool,
}

/// 刷新源配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacerConfig {
    /// 刷新源类型（`None` 时按宿主平台选择）
    #[serde(default)]
    pub kind: Option<PacerKind>,

    /// 定时器刷新源的间隔（毫秒）
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// 软件垂直同步的刷新率（Hz）
    #[serde(default = "default_refresh_hz")]
    pub refresh_hz: u32,
}

/// 图形后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphicsBackend {
    /// Vulkan 后端
    Vulkan,
    /// Direct3D 11 后端
    Direct3D11,
    /// 桌面 OpenGL 后端
    #[serde(rename = "opengl")]
    OpenGL,
    /// OpenGL ES 后端
    #[serde(rename = "opengles")]
    OpenGLES,
    /// Metal 后端
    Metal,
    /// 无窗口的离屏设备（测试与工具使用）
    Headless,
}

/// 宿主平台
///
/// 决定合法的图形后端集合以及默认的刷新源类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostPlatform {
    /// Windows 窗体控件（通过原生子窗口承载交换链）
    Win32Forms,
    /// Android Activity 中的 SurfaceView
    AndroidActivity,
    /// iOS UIView
    #[serde(rename = "uikit")]
    UiKit,
    /// macOS NSView
    #[serde(rename = "appkit")]
    AppKit,
    /// 无宿主（离屏）
    Headless,
}

/// 刷新源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacerKind {
    /// 合成器回调（display link）
    DisplayLink,
    /// 固定间隔定时器
    Timer,
    /// 专用线程自旋循环
    Spin,
    /// 由宿主的事件循环驱动
    Manual,
}

/// 交换链深度格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthFormat {
    D16Unorm,
    D24UnormS8Uint,
    D32Float,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// 是否输出到文件
    #[serde(default = "default_file_output")]
    pub file_output: bool,

    /// 日志文件路径
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

// 默认值函数
fn default_width() -> u32 { 300 }
fn default_height() -> u32 { 300 }
fn default_vsync() -> bool { true }
fn default_backend() -> GraphicsBackend { GraphicsBackend::Vulkan }
fn default_host() -> HostPlatform { HostPlatform::Headless }
fn default_interval_ms() -> u64 { 1000 / 30 }
fn default_refresh_hz() -> u32 { 60 }
fn default_log_level() -> LogLevel { LogLevel::Info }
fn default_file_output() -> bool { false }
fn default_log_file() -> String { "distsurface.log".to_string() }

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            vsync: default_vsync(),
            depth_format: None,
        }
    }
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            host: default_host(),
            debug: false,
        }
    }
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self {
            kind: None,
            interval_ms: default_interval_ms(),
            refresh_hz: default_refresh_hz(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: default_file_output(),
            log_file: default_log_file(),
        }
    }
}

impl Config {
    /// 从配置文件加载
    ///
    /// # 参数
    ///
    /// * `path` - 配置文件路径
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let contents = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path_str.clone()))?;

        Self::from_toml_str(&contents)
    }

    /// 从 TOML 字符串解析
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()).into())
    }

    /// 从配置文件加载，如果文件不存在则使用默认配置
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::from_file(path).unwrap_or_default()
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// 从命令行参数覆盖配置
    ///
    /// 支持的参数：
    /// - `--backend <name>`: 图形后端
    /// - `--host <name>`: 宿主平台
    /// - `--pacer <name>`: 刷新源类型
    /// - `--width <value>` / `--height <value>`: 初始尺寸
    /// - `--no-vsync`: 关闭垂直同步
    ///
    /// 无法识别的取值会被忽略，保留原配置。
    pub fn apply_args<I>(&mut self, args: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();

        let value_of = |flag: &str| -> Option<&String> {
            args.iter()
                .position(|a| a == flag)
                .and_then(|idx| args.get(idx + 1))
        };

        if let Some(backend) = value_of("--backend").and_then(|s| GraphicsBackend::parse(s)) {
            self.graphics.backend = backend;
        }

        if let Some(host) = value_of("--host").and_then(|s| HostPlatform::parse(s)) {
            self.graphics.host = host;
        }

        if let Some(kind) = value_of("--pacer").and_then(|s| PacerKind::parse(s)) {
            self.pacer.kind = Some(kind);
        }

        if let Some(width) = value_of("--width").and_then(|s| s.parse().ok()) {
            self.surface.width = width;
        }

        if let Some(height) = value_of("--height").and_then(|s| s.parse().ok()) {
            self.surface.height = height;
        }

        if args.iter().any(|a| a == "--no-vsync") {
            self.surface.vsync = false;
        }
    }

    /// 验证配置的有效性
    ///
    /// 除了字段范围检查，还会检查后端与宿主平台是否匹配。
    pub fn validate(&self) -> Result<()> {
        if self.pacer.interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pacer.interval_ms".to_string(),
                reason: "Timer interval must be greater than 0".to_string(),
            }.into());
        }

        if self.pacer.refresh_hz == 0 || self.pacer.refresh_hz > 1000 {
            return Err(ConfigError::InvalidValue {
                field: "pacer.refresh_hz".to_string(),
                reason: "Refresh rate must be within 1..=1000".to_string(),
            }.into());
        }

        self.graphics.host.check_backend(self.graphics.backend)
    }

    /// 实际使用的刷新源类型
    pub fn pacer_kind(&self) -> PacerKind {
        self.pacer.kind.unwrap_or_else(|| PacerKind::for_host(self.graphics.host))
    }
}

impl GraphicsBackend {
    /// 获取后端名称
    pub fn name(&self) -> &'static str {
        match self {
            GraphicsBackend::Vulkan => "Vulkan",
            GraphicsBackend::Direct3D11 => "Direct3D11",
            GraphicsBackend::OpenGL => "OpenGL",
            GraphicsBackend::OpenGLES => "OpenGLES",
            GraphicsBackend::Metal => "Metal",
            GraphicsBackend::Headless => "Headless",
        }
    }

    /// 从命令行字符串解析（不区分大小写）
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "vulkan" => Some(GraphicsBackend::Vulkan),
            "direct3d11" | "d3d11" => Some(GraphicsBackend::Direct3D11),
            "opengl" | "gl" => Some(GraphicsBackend::OpenGL),
            "opengles" | "gles" => Some(GraphicsBackend::OpenGLES),
            "metal" => Some(GraphicsBackend::Metal),
            "headless" => Some(GraphicsBackend::Headless),
            _ => None,
        }
    }
}

impl HostPlatform {
    /// 获取宿主名称
    pub fn name(&self) -> &'static str {
        match self {
            HostPlatform::Win32Forms => "Win32 Forms",
            HostPlatform::AndroidActivity => "Android Activity",
            HostPlatform::UiKit => "UIKit",
            HostPlatform::AppKit => "AppKit",
            HostPlatform::Headless => "Headless",
        }
    }

    /// 从命令行字符串解析
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "win32_forms" | "win32" | "forms" => Some(HostPlatform::Win32Forms),
            "android_activity" | "android" => Some(HostPlatform::AndroidActivity),
            "uikit" | "ios" => Some(HostPlatform::UiKit),
            "appkit" | "macos" => Some(HostPlatform::AppKit),
            "headless" => Some(HostPlatform::Headless),
            _ => None,
        }
    }

    /// 当前编译目标对应的默认宿主
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            HostPlatform::Win32Forms
        } else if cfg!(target_os = "android") {
            HostPlatform::AndroidActivity
        } else if cfg!(target_os = "ios") {
            HostPlatform::UiKit
        } else if cfg!(target_os = "macos") {
            HostPlatform::AppKit
        } else {
            HostPlatform::Headless
        }
    }

    /// 检查后端能否在该宿主上使用
    ///
    /// 离屏后端在所有宿主上都可用；其余组合不合法时立即失败，不尝试回退。
    pub fn check_backend(&self, backend: GraphicsBackend) -> Result<()> {
        use GraphicsBackend as B;

        if backend == B::Headless {
            return Ok(());
        }

        let supported = match self {
            HostPlatform::Win32Forms => matches!(backend, B::Vulkan | B::OpenGL | B::Direct3D11),
            HostPlatform::AndroidActivity => matches!(backend, B::OpenGLES | B::Vulkan),
            HostPlatform::UiKit => matches!(backend, B::Metal | B::OpenGLES),
            HostPlatform::AppKit => matches!(backend, B::Metal | B::OpenGL),
            HostPlatform::Headless => true,
        };

        if !supported {
            return Err(GraphicsError::UnsupportedBackend { backend, host: *self }.into());
        }

        // 窗体宿主的 OpenGL 需要 WGL 上下文共享，尚未实现
        if *self == HostPlatform::Win32Forms && backend == B::OpenGL {
            return Err(GraphicsError::NotImplemented(backend).into());
        }

        Ok(())
    }
}

impl PacerKind {
    /// 宿主平台的默认刷新源
    pub fn for_host(host: HostPlatform) -> Self {
        match host {
            HostPlatform::UiKit | HostPlatform::AppKit => PacerKind::DisplayLink,
            HostPlatform::AndroidActivity => PacerKind::Timer,
            HostPlatform::Win32Forms => PacerKind::Spin,
            HostPlatform::Headless => PacerKind::Timer,
        }
    }

    /// 从命令行字符串解析
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "display_link" | "displaylink" | "vsync" => Some(PacerKind::DisplayLink),
            "timer" => Some(PacerKind::Timer),
            "spin" | "thread" => Some(PacerKind::Spin),
            "manual" | "host" => Some(PacerKind::Manual),
            _ => None,
        }
    }

    /// 获取名称
    pub fn name(&self) -> &'static str {
        match self {
            PacerKind::DisplayLink => "display_link",
            PacerKind::Timer => "timer",
            PacerKind::Spin => "spin",
            PacerKind::Manual => "manual",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.surface.width, 300);
        assert_eq!(config.surface.height, 300);
        assert_eq!(config.graphics.backend, GraphicsBackend::Vulkan);
        assert_eq!(config.pacer.interval_ms, 33);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = Config::from_toml_str(
            r#"
            [graphics]
            backend = "metal"
            host = "appkit"

            [surface]
            depth_format = "d32_float"
            "#,
        )
        .unwrap();

        assert_eq!(config.graphics.backend, GraphicsBackend::Metal);
        assert_eq!(config.graphics.host, HostPlatform::AppKit);
        assert_eq!(config.surface.depth_format, Some(DepthFormat::D32Float));
        assert_eq!(config.surface.width, 300);
        assert_eq!(config.pacer_kind(), PacerKind::DisplayLink);
    }

    #[test]
    fn test_apply_args() {
        let mut config = Config::default();
        config.apply_args([
            "dist_surface", "--backend", "gles", "--host", "android", "--width", "640",
            "--pacer", "spin", "--no-vsync",
        ]);

        assert_eq!(config.graphics.backend, GraphicsBackend::OpenGLES);
        assert_eq!(config.graphics.host, HostPlatform::AndroidActivity);
        assert_eq!(config.surface.width, 640);
        assert_eq!(config.surface.height, 300);
        assert_eq!(config.pacer_kind(), PacerKind::Spin);
        assert!(!config.surface.vsync);
    }

    #[test]
    fn test_backend_host_validation() {
        assert!(HostPlatform::Win32Forms.check_backend(GraphicsBackend::Direct3D11).is_ok());
        assert!(HostPlatform::Win32Forms.check_backend(GraphicsBackend::Vulkan).is_ok());
        assert!(HostPlatform::AppKit.check_backend(GraphicsBackend::Metal).is_ok());
        assert!(HostPlatform::UiKit.check_backend(GraphicsBackend::Headless).is_ok());

        let err = HostPlatform::Win32Forms
            .check_backend(GraphicsBackend::Metal)
            .unwrap_err();
        assert!(err.is_unsupported_configuration());

        let err = HostPlatform::Win32Forms
            .check_backend(GraphicsBackend::OpenGL)
            .unwrap_err();
        assert!(matches!(
            err,
            crate::core::error::DistSurfaceError::Graphics(GraphicsError::NotImplemented(
                GraphicsBackend::OpenGL
            ))
        ));
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.pacer.interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.graphics.host = HostPlatform::UiKit;
        config.graphics.backend = GraphicsBackend::Direct3D11;
        assert!(config.validate().is_err());
    }
}
