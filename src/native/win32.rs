//! Win32 子窗口实现
//!
//! 注册一次窗口类 `DistSurfaceHwndWrapper`，在宿主控件下创建位于 (0, 0) 的
//! `WS_CHILD | WS_VISIBLE` 子窗口。窗口的 `GWLP_USERDATA` 保存 `MessageRouter`
//! 的强引用，销毁窗口时收回。

use std::ffi::c_void;
use std::sync::Arc;

use tracing::{debug, warn};
use windows::core::{w, PCWSTR};
use windows::Win32::Foundation::{
    GetLastError, ERROR_CLASS_ALREADY_EXISTS, HINSTANCE, HWND, LPARAM, LRESULT, POINT, WPARAM,
};
use windows::Win32::Graphics::Gdi::ScreenToClient;
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::Input::KeyboardAndMouse::{TrackMouseEvent, TME_LEAVE, TRACKMOUSEEVENT};
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, GetWindowLongPtrW, LoadCursorW, MoveWindow,
    RegisterClassExW, SetWindowLongPtrW, CS_HREDRAW, CS_OWNDC, CS_VREDRAW, GWLP_USERDATA,
    IDC_ARROW, WINDOW_EX_STYLE, WNDCLASSEXW, WS_CHILD, WS_CLIPCHILDREN, WS_CLIPSIBLINGS,
    WS_VISIBLE,
};

use crate::core::error::{Result, WindowError};
use super::message::{self, WM_MOUSEMOVE, WM_MOUSEWHEEL};
use super::window::{MessageRouter, NativeWindowHandle, NativeWindowSystem};

const CLASS_NAME: PCWSTR = w!("DistSurfaceHwndWrapper");

fn to_hwnd(raw: isize) -> HWND {
    HWND(raw as *mut c_void)
}

/// Win32 窗口系统
#[derive(Debug, Default)]
pub struct Win32WindowSystem {
    hinstance: Option<HINSTANCE>,
}

impl Win32WindowSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册窗口类，已注册时直接复用
    fn ensure_class(&mut self) -> Result<HINSTANCE> {
        if let Some(hinstance) = self.hinstance {
            return Ok(hinstance);
        }

        unsafe {
            let module = GetModuleHandleW(None)
                .map_err(|e| WindowError::ClassRegistration(e.to_string()))?;
            let hinstance = HINSTANCE::from(module);

            let wc = WNDCLASSEXW {
                cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
                style: CS_HREDRAW | CS_VREDRAW | CS_OWNDC,
                lpfnWndProc: Some(wrapper_window_proc),
                hInstance: hinstance,
                hCursor: LoadCursorW(None, IDC_ARROW).unwrap_or_default(),
                lpszClassName: CLASS_NAME,
                ..Default::default()
            };

            if RegisterClassExW(&wc) == 0 {
                let error = GetLastError();
                if error != ERROR_CLASS_ALREADY_EXISTS {
                    return Err(WindowError::ClassRegistration(format!(
                        "RegisterClassExW failed: {:?}",
                        error
                    ))
                    .into());
                }
                debug!("Window class already registered, reusing it");
            }

            self.hinstance = Some(hinstance);
            Ok(hinstance)
        }
    }
}

impl NativeWindowSystem for Win32WindowSystem {
    fn create_child(
        &mut self,
        parent: isize,
        width: i32,
        height: i32,
        router: Arc<MessageRouter>,
    ) -> Result<NativeWindowHandle> {
        let hinstance = self.ensure_class()?;

        let hwnd = unsafe {
            CreateWindowExW(
                WINDOW_EX_STYLE::default(),
                CLASS_NAME,
                w!(""),
                WS_CHILD | WS_VISIBLE | WS_CLIPCHILDREN | WS_CLIPSIBLINGS,
                0,
                0,
                width,
                height,
                Some(to_hwnd(parent)),
                None,
                Some(hinstance),
                None,
            )
        }
        .map_err(|e| WindowError::Creation(e.to_string()))?;

        unsafe {
            SetWindowLongPtrW(hwnd, GWLP_USERDATA, Arc::into_raw(router) as isize);
        }

        Ok(NativeWindowHandle {
            hwnd: hwnd.0 as isize,
            hinstance: hinstance.0 as isize,
        })
    }

    fn move_window(&mut self, handle: NativeWindowHandle, width: i32, height: i32) -> Result<()> {
        unsafe { MoveWindow(to_hwnd(handle.hwnd), 0, 0, width, height, true) }
            .map_err(|e| WindowError::Operation(format!("MoveWindow failed: {}", e)).into())
    }

    fn destroy(&mut self, handle: NativeWindowHandle) -> Result<()> {
        let hwnd = to_hwnd(handle.hwnd);
        unsafe {
            let router = SetWindowLongPtrW(hwnd, GWLP_USERDATA, 0) as *const MessageRouter;
            if !router.is_null() {
                drop(Arc::from_raw(router));
            }
            DestroyWindow(hwnd)
        }
        .map_err(|e| WindowError::Operation(format!("DestroyWindow failed: {}", e)).into())
    }
}

/// 请求在指针离开时收到 `WM_MOUSELEAVE`
unsafe fn request_leave_notification(hwnd: HWND) {
    let mut tracking = TRACKMOUSEEVENT {
        cbSize: std::mem::size_of::<TRACKMOUSEEVENT>() as u32,
        dwFlags: TME_LEAVE,
        hwndTrack: hwnd,
        dwHoverTime: 0,
    };
    if let Err(e) = TrackMouseEvent(&mut tracking) {
        warn!("TrackMouseEvent failed: {}", e);
    }
}

/// 滚轮消息的坐标是屏幕坐标
unsafe fn wheel_lparam_to_client(hwnd: HWND, lparam: isize) -> isize {
    let (x, y) = message::point_from_lparam(lparam);
    let mut point = POINT { x, y };
    let _ = ScreenToClient(hwnd, &mut point);
    message::lparam_from_point(point.x, point.y)
}

unsafe extern "system" fn wrapper_window_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    let router = GetWindowLongPtrW(hwnd, GWLP_USERDATA) as *const MessageRouter;
    if !router.is_null() && message::is_pointer_message(msg) {
        let router = &*router;
        let mut raw_lparam = lparam.0;
        match msg {
            WM_MOUSEMOVE if !router.is_pointer_inside() => request_leave_notification(hwnd),
            WM_MOUSEWHEEL => raw_lparam = wheel_lparam_to_client(hwnd, raw_lparam),
            _ => {}
        }
        router.route(msg, wparam.0, raw_lparam);
    }

    DefWindowProcW(hwnd, msg, wparam, lparam)
}
