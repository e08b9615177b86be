//! 原生窗口嵌入
//!
//! 窗体类宿主没有可以直接交给交换链的绘制对象，这里创建一个原生子窗口承载交换链，
//! 并把窗口过程收到的指针消息转换为 `PointerEvent`。
//!
//! # 模块组织
//!
//! - `message`：窗口消息解码和进入/离开跟踪（纯函数，所有平台可测）
//! - `window`：`NativeWindowSystem` 抽象、`EmbeddedWindow` 和指针监听器
//! - `control`：子窗口 + 渲染表面组成的嵌入式控件
//! - `win32`：Windows 上的窗口系统实现

pub mod control;
pub mod message;
pub mod window;

#[cfg(target_os = "windows")]
pub mod win32;

pub use control::EmbeddedSurfaceControl;
pub use window::{
    default_window_system, EmbeddedWindow, MessageRouter, NativeWindowHandle, NativeWindowSystem,
    PointerListeners,
};

#[cfg(target_os = "windows")]
pub use win32::Win32WindowSystem;
