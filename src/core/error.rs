//! 错误处理模块
//!
//! 定义了渲染表面、刷新源和原生窗口中使用的统一错误类型。
//!
//! # 设计原则
//!
//! - 为每种错误类型提供清晰的上下文信息
//! - 按子系统划分错误枚举，方便模式匹配
//! - 不支持的配置属于不可恢复错误，不做后端回退

use std::fmt;

use super::config::{GraphicsBackend, HostPlatform};

/// 引擎统一的 Result 类型
///
/// 所有可能返回错误的函数都应该使用这个类型。
pub type Result<T> = std::result::Result<T, DistSurfaceError>;

/// DistSurface 的错误类型
#[derive(Debug)]
pub enum DistSurfaceError {
    /// 配置错误
    Config(ConfigError),

    /// 图形设备错误
    Graphics(GraphicsError),

    /// 渲染表面错误
    Surface(SurfaceError),

    /// 原生窗口错误
    Window(WindowError),

    /// IO 错误
    Io(std::io::Error),

    /// 日志系统错误
    Log(String),

    /// 初始化错误
    Initialization(String),

    /// 运行时错误
    Runtime(String),
}

/// 配置相关的错误
#[derive(Debug)]
pub enum ConfigError {
    /// 配置文件未找到
    FileNotFound(String),

    /// 配置文件解析失败
    ParseError(String),

    /// 配置项缺失
    MissingField(String),

    /// 配置值无效
    InvalidValue { field: String, reason: String },
}

/// 图形设备相关的错误
#[derive(Debug)]
pub enum GraphicsError {
    /// 宿主平台不支持该后端
    UnsupportedBackend {
        backend: GraphicsBackend,
        host: HostPlatform,
    },

    /// 后端合法但尚未实现
    NotImplemented(GraphicsBackend),

    /// 设备已存在时再次初始化
    DeviceAlreadyInitialized,

    /// 设备已释放
    DeviceDisposed,

    /// 设备创建失败
    DeviceCreation(String),

    /// 交换链错误
    SwapchainError(String),

    /// 资源创建失败
    ResourceCreation(String),

    /// 渲染命令执行失败
    CommandExecution(String),
}

/// 渲染表面相关的错误
#[derive(Debug)]
pub enum SurfaceError {
    /// 当前状态不允许该操作
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    /// 刷新源启动/停止失败
    Pacer(String),

    /// 渲染回调或提交/呈现过程中发生的错误
    RenderFault {
        frame: u64,
        source: Box<DistSurfaceError>,
    },

    /// 渲染回调返回的错误
    Callback(String),
}

/// 原生窗口相关的错误
#[derive(Debug)]
pub enum WindowError {
    /// 窗口类注册失败
    ClassRegistration(String),

    /// 子窗口创建失败
    Creation(String),

    /// 窗口操作失败（移动、销毁等）
    Operation(String),

    /// 当前平台不支持原生子窗口
    Unsupported(&'static str),
}

impl fmt::Display for DistSurfaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistSurfaceError::Config(e) => write!(f, "Configuration error: {}", e),
            DistSurfaceError::Graphics(e) => write!(f, "Graphics error: {}", e),
            DistSurfaceError::Surface(e) => write!(f, "Surface error: {}", e),
            DistSurfaceError::Window(e) => write!(f, "Window error: {}", e),
            DistSurfaceError::Io(e) => write!(f, "IO error: {}", e),
            DistSurfaceError::Log(msg) => write!(f, "Log error: {}", msg),
            DistSurfaceError::Initialization(msg) => write!(f, "Initialization error: {}", msg),
            DistSurfaceError::Runtime(msg) => write!(f, "Runtime error: {}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {}", path),
            ConfigError::ParseError(msg) => write!(f, "Failed to parse config: {}", msg),
            ConfigError::MissingField(field) => write!(f, "Missing required field: {}", field),
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
        }
    }
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphicsError::UnsupportedBackend { backend, host } => {
                write!(f, "{} is not supported on {}", backend.name(), host.name())
            }
            GraphicsError::NotImplemented(backend) => {
                write!(f, "{} is not currently implemented", backend.name())
            }
            GraphicsError::DeviceAlreadyInitialized => {
                write!(f, "Graphics device is already initialized")
            }
            GraphicsError::DeviceDisposed => write!(f, "Graphics device has been disposed"),
            GraphicsError::DeviceCreation(msg) => write!(f, "Device creation failed: {}", msg),
            GraphicsError::SwapchainError(msg) => write!(f, "Swapchain error: {}", msg),
            GraphicsError::ResourceCreation(msg) => write!(f, "Resource creation failed: {}", msg),
            GraphicsError::CommandExecution(msg) => write!(f, "Command execution failed: {}", msg),
        }
    }
}

impl fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SurfaceError::InvalidState { operation, state } => {
                write!(f, "Cannot {} while surface is {}", operation, state)
            }
            SurfaceError::Pacer(msg) => write!(f, "Frame pacer failure: {}", msg),
            SurfaceError::RenderFault { frame, source } => {
                write!(f, "Encountered an error while rendering frame {}: {}", frame, source)
            }
            SurfaceError::Callback(msg) => write!(f, "Rendering callback failed: {}", msg),
        }
    }
}

impl fmt::Display for WindowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowError::ClassRegistration(msg) => {
                write!(f, "Window class registration failed: {}", msg)
            }
            WindowError::Creation(msg) => write!(f, "Child window creation failed: {}", msg),
            WindowError::Operation(msg) => write!(f, "Window operation failed: {}", msg),
            WindowError::Unsupported(platform) => {
                write!(f, "Native child windows are not available on {}", platform)
            }
        }
    }
}

impl std::error::Error for DistSurfaceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DistSurfaceError::Io(e) => Some(e),
            DistSurfaceError::Surface(SurfaceError::RenderFault { source, .. }) => {
                Some(source.as_ref())
            }
            _ => None,
        }
    }
}

impl std::error::Error for ConfigError {}
impl std::error::Error for GraphicsError {}
impl std::error::Error for SurfaceError {}
impl std::error::Error for WindowError {}

impl DistSurfaceError {
    /// 是否为设备已释放错误
    pub fn is_device_disposed(&self) -> bool {
        matches!(self, DistSurfaceError::Graphics(GraphicsError::DeviceDisposed))
    }

    /// 是否为不支持的配置（构造阶段的不可恢复错误）
    pub fn is_unsupported_configuration(&self) -> bool {
        matches!(
            self,
            DistSurfaceError::Graphics(
                GraphicsError::UnsupportedBackend { .. } | GraphicsError::NotImplemented(_)
            )
        )
    }
}

// 实现 From trait 以便于错误转换
impl From<std::io::Error> for DistSurfaceError {
    fn from(err: std::io::Error) -> Self {
        DistSurfaceError::Io(err)
    }
}

impl From<ConfigError> for DistSurfaceError {
    fn from(err: ConfigError) -> Self {
        DistSurfaceError::Config(err)
    }
}

impl From<GraphicsError> for DistSurfaceError {
    fn from(err: GraphicsError) -> Self {
        DistSurfaceError::Graphics(err)
    }
}

impl From<SurfaceError> for DistSurfaceError {
    fn from(err: SurfaceError) -> Self {
        DistSurfaceError::Surface(err)
    }
}

impl From<WindowError> for DistSurfaceError {
    fn from(err: WindowError) -> Self {
        DistSurfaceError::Window(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_backend_message() {
        let err: DistSurfaceError = GraphicsError::UnsupportedBackend {
            backend: GraphicsBackend::Metal,
            host: HostPlatform::Win32Forms,
        }
        .into();
        assert!(err.is_unsupported_configuration());
        assert_eq!(
            err.to_string(),
            "Graphics error: Metal is not supported on Win32 Forms"
        );
    }

    #[test]
    fn test_render_fault_keeps_source() {
        let err: DistSurfaceError = SurfaceError::RenderFault {
            frame: 7,
            source: Box::new(GraphicsError::DeviceDisposed.into()),
        }
        .into();
        let source = std::error::Error::source(&err).expect("render fault has a source");
        assert_eq!(source.to_string(), "Graphics error: Graphics device has been disposed");
        assert!(!err.is_device_disposed());
    }
}
