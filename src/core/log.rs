//! 日志系统模块
//!
//! 基于 `tracing` 提供结构化的日志记录功能。
//!
//! 刷新源线程、渲染回调和窗口过程分别运行在不同线程上，
//! 因此日志默认带上线程名，便于定位是哪个回调在输出。
//!
//! # 使用示例
//!
//! ```no_run
//! use dist_surface::core::log;
//! use dist_surface::core::config::LogLevel;
//!
//! log::init_logger(LogLevel::Info, false, None).ok();
//! tracing::info!(width = 300, height = 300, "Surface attached");
//! ```

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use std::path::Path;

use super::config::LogLevel;
use super::error::{DistSurfaceError, Result};

/// 初始化日志系统
///
/// 必须在程序开始时调用一次；重复初始化会被忽略并返回错误。
///
/// # 参数
///
/// * `level` - 日志级别
/// * `file_output` - 是否输出到文件
/// * `log_file_path` - 日志文件路径（可选，默认为 "distsurface.log"）
pub fn init_logger(level: LogLevel, file_output: bool, log_file_path: Option<&str>) -> Result<()> {
    let filter = EnvFilter::new(filter_directive(level));

    if file_output {
        // 解析日志文件路径
        let log_path = log_file_path.unwrap_or("distsurface.log");
        let path = Path::new(log_path);
        let directory = path.parent().unwrap_or(Path::new("."));
        let filename = path.file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("distsurface.log");

        // 创建滚动文件 appender（每天滚动）
        let file_appender = RollingFileAppender::new(
            Rotation::DAILY,
            directory,
            filename
        );

        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_ansi(true);

        let file_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_ansi(false)  // 文件不需要 ANSI 颜色
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .with(file_layer)
            .try_init()
            .map_err(|e| DistSurfaceError::Log(e.to_string()))
    } else {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(true);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| DistSurfaceError::Log(e.to_string()))
    }
}

fn filter_directive(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Trace => "trace",
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    }
}

/// 表面生命周期日志 - Info 级别
#[macro_export]
macro_rules! surface_info {
    ($($arg:tt)*) => {
        tracing::info!(target: "dist_surface::surface", $($arg)*)
    };
}

/// 表面生命周期日志 - Warn 级别
#[macro_export]
macro_rules! surface_warn {
    ($($arg:tt)*) => {
        tracing::warn!(target: "dist_surface::surface", $($arg)*)
    };
}

/// 表面生命周期日志 - Error 级别
#[macro_export]
macro_rules! surface_error {
    ($($arg:tt)*) => {
        tracing::error!(target: "dist_surface::surface", $($arg)*)
    };
}

/// 日志级别转换
impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}
