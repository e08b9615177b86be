//! 核心功能模块
//!
//! 本模块提供与具体图形 API 和宿主平台无关的基础功能：
//! 配置管理、日志系统、错误处理、事件系统和颜色类型。
//!
//! # 模块组织
//!
//! - `config`：配置管理，支持从 TOML 文件和命令行加载
//! - `log`：日志系统，基于 `tracing` 的结构化日志
//! - `error`：错误处理，定义统一的错误类型
//! - `event`：事件系统，表面事件与指针事件的监听器注册和分发
//! - `color`：清屏颜色

pub mod color;
pub mod config;
pub mod error;
pub mod event;
pub mod log;

// 重新导出常用类型，方便使用
pub use color::Color;
pub use config::{Config, DepthFormat, GraphicsBackend, HostPlatform, PacerKind};
pub use error::{DistSurfaceError, Result};
pub use event::{Event, EventType, Listeners, MouseButton, PointerEvent, SurfaceEvent};
