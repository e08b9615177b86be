//! 图形设备抽象
//!
//! 渲染表面只依赖这里定义的 `GraphicsDevice` 和 `Swapchain` 两个 trait，
//! 具体的图形 API（wgpu 或离屏设备）在 `gfx` 的子模块中实现。
//!
//! # 可绘制对象
//!
//! `SwapchainSource` 描述交换链绑定的原生可绘制对象（HWND、ANativeWindow、
//! UIView、NSView 等），并可转换为 `raw-window-handle` 0.6 的句柄。

use std::ffi::c_void;
use std::fmt;
use std::num::NonZeroIsize;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

use raw_window_handle::{
    AndroidDisplayHandle, AndroidNdkWindowHandle, AppKitDisplayHandle, AppKitWindowHandle,
    HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle, UiKitDisplayHandle,
    UiKitWindowHandle, WaylandDisplayHandle, WaylandWindowHandle, Win32WindowHandle,
    WindowsDisplayHandle, XlibDisplayHandle, XlibWindowHandle,
};

use crate::core::config::{DepthFormat, GraphicsBackend};
use crate::core::error::{GraphicsError, Result};
use super::command::CommandList;

/// 交换链 ID，在进程内唯一
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SwapchainId(u64);

impl SwapchainId {
    /// 分配新的 ID
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SwapchainId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// 原始数值
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SwapchainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "swapchain#{}", self.0)
    }
}

/// 交换链当前后台缓冲区对应的帧缓冲
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Framebuffer {
    /// 所属交换链
    pub swapchain: SwapchainId,
    pub width: u32,
    pub height: u32,
    /// 颜色目标数量（交换链帧缓冲固定为 1）
    pub color_targets: u32,
    /// 是否带深度目标
    pub has_depth: bool,
}

/// 设备创建选项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphicsDeviceOptions {
    /// 启用图形 API 的调试/验证层
    pub debug: bool,
    /// 主交换链的深度格式
    pub swapchain_depth_format: Option<DepthFormat>,
    /// 垂直同步
    pub sync_to_vertical_blank: bool,
    /// 深度范围使用 [0, 1]
    pub prefer_depth_range_zero_to_one: bool,
    /// 裁剪空间 Y 轴朝上
    pub prefer_standard_clip_space_y_direction: bool,
}

impl Default for GraphicsDeviceOptions {
    fn default() -> Self {
        Self {
            debug: false,
            swapchain_depth_format: None,
            sync_to_vertical_blank: true,
            prefer_depth_range_zero_to_one: true,
            prefer_standard_clip_space_y_direction: true,
        }
    }
}

impl GraphicsDeviceOptions {
    /// 从配置构建
    pub fn from_config(config: &crate::core::config::Config) -> Self {
        Self {
            debug: config.graphics.debug,
            swapchain_depth_format: config.surface.depth_format,
            sync_to_vertical_blank: config.surface.vsync,
            ..Self::default()
        }
    }
}

/// 交换链绑定的原生可绘制对象
///
/// 指针以整数形式保存，使描述可以在线程之间传递。
/// 构造函数是 `unsafe` 的：调用者必须保证可绘制对象在交换链释放之前一直有效。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapchainSource {
    /// Windows 窗口句柄
    Win32 { hwnd: isize, hinstance: isize },
    /// Android `ANativeWindow*`
    AndroidSurface { window: usize },
    /// iOS `UIView*`
    UiView { view: usize },
    /// macOS `NSView*`
    NsView { view: usize },
    /// X11 窗口
    Xlib { window: u64, display: usize, screen: i32 },
    /// Wayland 表面
    Wayland { surface: usize, display: usize },
    /// 离屏（无可绘制对象）
    Headless,
}

impl SwapchainSource {
    /// Win32 窗口
    ///
    /// # Safety
    ///
    /// `hwnd` 必须是有效窗口，并且在交换链释放前不能销毁。
    pub unsafe fn win32(hwnd: isize, hinstance: isize) -> Self {
        SwapchainSource::Win32 { hwnd, hinstance }
    }

    /// Android 原生窗口
    ///
    /// # Safety
    ///
    /// `window` 必须是有效的 `ANativeWindow*`，并在交换链释放前保持有效。
    pub unsafe fn android_surface(window: *mut c_void) -> Self {
        SwapchainSource::AndroidSurface { window: window as usize }
    }

    /// iOS 视图
    ///
    /// # Safety
    ///
    /// `view` 必须是有效的 `UIView*`，并在交换链释放前保持有效。
    pub unsafe fn ui_view(view: *mut c_void) -> Self {
        SwapchainSource::UiView { view: view as usize }
    }

    /// macOS 视图
    ///
    /// # Safety
    ///
    /// `view` 必须是有效的 `NSView*`，并在交换链释放前保持有效。
    pub unsafe fn ns_view(view: *mut c_void) -> Self {
        SwapchainSource::NsView { view: view as usize }
    }

    /// 从实现了 `raw-window-handle` 的窗口获取
    ///
    /// # Safety
    ///
    /// 窗口必须比使用该描述创建的交换链活得更久。
    pub unsafe fn from_window<W>(window: &W) -> Result<Self>
    where
        W: HasWindowHandle + HasDisplayHandle + ?Sized,
    {
        let window_handle = window
            .window_handle()
            .map_err(|e| GraphicsError::SwapchainError(format!("window handle: {}", e)))?
            .as_raw();
        let display_handle = window
            .display_handle()
            .map_err(|e| GraphicsError::SwapchainError(format!("display handle: {}", e)))?
            .as_raw();

        let source = match (window_handle, display_handle) {
            (RawWindowHandle::Win32(h), _) => SwapchainSource::Win32 {
                hwnd: h.hwnd.get(),
                hinstance: h.hinstance.map_or(0, |i| i.get()),
            },
            (RawWindowHandle::AndroidNdk(h), _) => SwapchainSource::AndroidSurface {
                window: h.a_native_window.as_ptr() as usize,
            },
            (RawWindowHandle::UiKit(h), _) => SwapchainSource::UiView {
                view: h.ui_view.as_ptr() as usize,
            },
            (RawWindowHandle::AppKit(h), _) => SwapchainSource::NsView {
                view: h.ns_view.as_ptr() as usize,
            },
            (RawWindowHandle::Xlib(h), RawDisplayHandle::Xlib(d)) => SwapchainSource::Xlib {
                window: h.window as u64,
                display: d.display.map_or(0, |p| p.as_ptr() as usize),
                screen: d.screen as i32,
            },
            (RawWindowHandle::Wayland(h), RawDisplayHandle::Wayland(d)) => {
                SwapchainSource::Wayland {
                    surface: h.surface.as_ptr() as usize,
                    display: d.display.as_ptr() as usize,
                }
            }
            (other, _) => {
                return Err(GraphicsError::SwapchainError(format!(
                    "unsupported window handle: {:?}",
                    other
                ))
                .into())
            }
        };
        Ok(source)
    }

    /// 是否为离屏
    pub fn is_headless(&self) -> bool {
        matches!(self, SwapchainSource::Headless)
    }

    /// 转换为 `raw-window-handle` 句柄
    ///
    /// 离屏和空指针返回错误。
    pub fn to_raw_handles(&self) -> Result<(RawWindowHandle, RawDisplayHandle)> {
        let null = |what: &str| -> crate::core::error::DistSurfaceError {
            GraphicsError::SwapchainError(format!("{} handle is null", what)).into()
        };
        let ptr = |value: usize, what: &str| {
            NonNull::new(value as *mut c_void).ok_or_else(|| null(what))
        };

        let handles = match *self {
            SwapchainSource::Win32 { hwnd, hinstance } => {
                let mut handle =
                    Win32WindowHandle::new(NonZeroIsize::new(hwnd).ok_or_else(|| null("HWND"))?);
                handle.hinstance = NonZeroIsize::new(hinstance);
                (
                    RawWindowHandle::Win32(handle),
                    RawDisplayHandle::Windows(WindowsDisplayHandle::new()),
                )
            }
            SwapchainSource::AndroidSurface { window } => (
                RawWindowHandle::AndroidNdk(AndroidNdkWindowHandle::new(ptr(
                    window,
                    "ANativeWindow",
                )?)),
                RawDisplayHandle::Android(AndroidDisplayHandle::new()),
            ),
            SwapchainSource::UiView { view } => (
                RawWindowHandle::UiKit(UiKitWindowHandle::new(ptr(view, "UIView")?)),
                RawDisplayHandle::UiKit(UiKitDisplayHandle::new()),
            ),
            SwapchainSource::NsView { view } => (
                RawWindowHandle::AppKit(AppKitWindowHandle::new(ptr(view, "NSView")?)),
                RawDisplayHandle::AppKit(AppKitDisplayHandle::new()),
            ),
            SwapchainSource::Xlib { window, display, screen } => (
                RawWindowHandle::Xlib(XlibWindowHandle::new(window as _)),
                RawDisplayHandle::Xlib(XlibDisplayHandle::new(
                    NonNull::new(display as *mut c_void),
                    screen as _,
                )),
            ),
            SwapchainSource::Wayland { surface, display } => (
                RawWindowHandle::Wayland(WaylandWindowHandle::new(ptr(surface, "wl_surface")?)),
                RawDisplayHandle::Wayland(WaylandDisplayHandle::new(ptr(display, "wl_display")?)),
            ),
            SwapchainSource::Headless => {
                return Err(GraphicsError::SwapchainError(
                    "headless source has no native handles".to_string(),
                )
                .into())
            }
        };
        Ok(handles)
    }
}

/// 交换链描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainDescription {
    pub source: SwapchainSource,
    pub width: u32,
    pub height: u32,
    pub depth_format: Option<DepthFormat>,
    pub vsync: bool,
    /// 后台缓冲使用 sRGB 格式
    pub color_srgb: bool,
}

impl SwapchainDescription {
    /// 创建描述（无深度，开启垂直同步）
    pub fn new(source: SwapchainSource, width: u32, height: u32) -> Self {
        Self {
            source,
            width,
            height,
            depth_format: None,
            vsync: true,
            color_srgb: false,
        }
    }

    /// 设置深度格式
    pub fn with_depth(mut self, depth_format: Option<DepthFormat>) -> Self {
        self.depth_format = depth_format;
        self
    }

    /// 设置垂直同步
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }
}

/// 交换链
///
/// 由一个渲染表面独占。
pub trait Swapchain: Send {
    /// 交换链 ID
    fn id(&self) -> SwapchainId;

    /// 当前尺寸
    fn size(&self) -> (u32, u32);

    /// 调整后台缓冲区尺寸
    ///
    /// 零尺寸是合法的：此时不呈现任何内容，直到再次调整为非零尺寸。
    fn resize(&mut self, width: u32, height: u32) -> Result<()>;

    /// 当前帧缓冲
    fn framebuffer(&self) -> Framebuffer;

    /// 释放交换链（幂等）
    fn dispose(&mut self);

    /// 是否已释放
    fn is_disposed(&self) -> bool;
}

/// 图形设备
///
/// 一个进程可以共享同一个设备，多个表面通过设备内部的提交锁串行化
/// `submit_commands` 和 `swap_buffers`。
pub trait GraphicsDevice: Send + Sync {
    /// 设备使用的后端
    fn backend(&self) -> GraphicsBackend;

    /// 创建时的选项
    fn options(&self) -> &GraphicsDeviceOptions;

    /// 为可绘制对象创建交换链
    fn create_swapchain(&self, description: &SwapchainDescription) -> Result<Box<dyn Swapchain>>;

    /// 创建命令列表
    fn create_command_list(&self) -> Result<CommandList>;

    /// 提交已结束记录的命令列表
    fn submit_commands(&self, commands: &mut CommandList) -> Result<()>;

    /// 呈现交换链的当前后台缓冲
    fn swap_buffers(&self, swapchain: &mut dyn Swapchain) -> Result<()>;

    /// 释放设备（幂等），之后的所有操作都返回 `DeviceDisposed`
    fn dispose(&self);

    /// 是否已释放
    fn is_disposed(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swapchain_ids_are_unique() {
        let a = SwapchainId::next();
        let b = SwapchainId::next();
        assert_ne!(a, b);
        assert!(b.raw() > a.raw());
    }

    #[test]
    fn test_win32_source_to_raw_handles() {
        let source = unsafe { SwapchainSource::win32(0x1234, 0x40_0000) };
        let (window, display) = source.to_raw_handles().unwrap();

        match window {
            RawWindowHandle::Win32(h) => {
                assert_eq!(h.hwnd.get(), 0x1234);
                assert_eq!(h.hinstance.map(|i| i.get()), Some(0x40_0000));
            }
            other => panic!("unexpected handle {:?}", other),
        }
        assert!(matches!(display, RawDisplayHandle::Windows(_)));
    }

    #[test]
    fn test_null_and_headless_sources_rejected() {
        let source = unsafe { SwapchainSource::win32(0, 0) };
        assert!(source.to_raw_handles().is_err());

        let source = unsafe { SwapchainSource::ns_view(std::ptr::null_mut()) };
        assert!(source.to_raw_handles().is_err());

        assert!(SwapchainSource::Headless.to_raw_handles().is_err());
        assert!(SwapchainSource::Headless.is_headless());
    }

    #[test]
    fn test_options_from_config() {
        let mut config = crate::core::config::Config::default();
        config.surface.vsync = false;
        config.surface.depth_format = Some(DepthFormat::D16Unorm);

        let options = GraphicsDeviceOptions::from_config(&config);
        assert!(!options.sync_to_vertical_blank);
        assert_eq!(options.swapchain_depth_format, Some(DepthFormat::D16Unorm));
        assert!(options.prefer_depth_range_zero_to_one);
    }
}
