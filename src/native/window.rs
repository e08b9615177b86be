//! 可嵌入的原生子窗口
//!
//! `EmbeddedWindow` 拥有一个挂在宿主控件下的原生子窗口，
//! 窗口过程收到的指针消息经 `MessageRouter` 转换后分发给 `PointerListeners`。
//! 具体的窗口系统调用由 `NativeWindowSystem` 实现（Windows 上为 `Win32WindowSystem`）。

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::core::error::{Result, WindowError};
use crate::core::event::{EventType, Listeners, PointerEvent};
use crate::gfx::device::SwapchainSource;
use super::message::{self, PointerTracker};

/// 原生窗口句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeWindowHandle {
    pub hwnd: isize,
    pub hinstance: isize,
}

/// 指针事件监听器
#[derive(Debug, Default)]
pub struct PointerListeners {
    listeners: Listeners<PointerEvent>,
}

impl PointerListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_mouse_down<F>(&self, handler: F)
    where
        F: FnMut(&PointerEvent) + Send + 'static,
    {
        self.listeners.add_for(EventType::MouseDown, handler);
    }

    pub fn on_mouse_up<F>(&self, handler: F)
    where
        F: FnMut(&PointerEvent) + Send + 'static,
    {
        self.listeners.add_for(EventType::MouseUp, handler);
    }

    pub fn on_mouse_move<F>(&self, handler: F)
    where
        F: FnMut(&PointerEvent) + Send + 'static,
    {
        self.listeners.add_for(EventType::MouseMove, handler);
    }

    pub fn on_mouse_enter<F>(&self, handler: F)
    where
        F: FnMut(&PointerEvent) + Send + 'static,
    {
        self.listeners.add_for(EventType::MouseEnter, handler);
    }

    pub fn on_mouse_leave<F>(&self, handler: F)
    where
        F: FnMut(&PointerEvent) + Send + 'static,
    {
        self.listeners.add_for(EventType::MouseLeave, handler);
    }

    pub fn on_mouse_wheel<F>(&self, handler: F)
    where
        F: FnMut(&PointerEvent) + Send + 'static,
    {
        self.listeners.add_for(EventType::MouseWheel, handler);
    }

    /// 接收所有指针事件
    pub fn on_any<F>(&self, handler: F)
    where
        F: FnMut(&PointerEvent) + Send + 'static,
    {
        self.listeners.add(handler);
    }

    pub fn dispatch(&self, event: &PointerEvent) -> usize {
        self.listeners.dispatch(event)
    }
}

/// 窗口过程到指针监听器的桥
#[derive(Debug, Default)]
pub struct MessageRouter {
    tracker: Mutex<PointerTracker>,
    pointer: PointerListeners,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 处理一条窗口消息
    ///
    /// 返回是否为指针消息。无论返回什么，调用者都应该继续交给默认窗口过程。
    pub fn route(&self, msg: u32, wparam: usize, lparam: isize) -> bool {
        let raw = match message::decode(msg, wparam, lparam) {
            Some(raw) => raw,
            None => return false,
        };

        let mut tracker = self.tracker.lock().unwrap_or_else(|p| p.into_inner());
        tracker.translate(raw, |event| {
            self.pointer.dispatch(&event);
        });
        true
    }

    /// 指针是否在窗口内
    pub fn is_pointer_inside(&self) -> bool {
        self.tracker.lock().map(|t| t.is_inside()).unwrap_or(false)
    }

    pub fn pointer(&self) -> &PointerListeners {
        &self.pointer
    }
}

/// 原生窗口系统
pub trait NativeWindowSystem: Send {
    /// 在 `parent` 下创建位于 (0, 0) 的可见子窗口
    fn create_child(
        &mut self,
        parent: isize,
        width: i32,
        height: i32,
        router: Arc<MessageRouter>,
    ) -> Result<NativeWindowHandle>;

    /// 调整子窗口大小
    fn move_window(&mut self, handle: NativeWindowHandle, width: i32, height: i32) -> Result<()>;

    /// 销毁子窗口并释放路由
    fn destroy(&mut self, handle: NativeWindowHandle) -> Result<()>;
}

/// 平台默认的窗口系统
pub fn default_window_system() -> Result<Box<dyn NativeWindowSystem>> {
    #[cfg(target_os = "windows")]
    {
        Ok(Box::new(super::win32::Win32WindowSystem::new()))
    }
    #[cfg(not(target_os = "windows"))]
    {
        Err(WindowError::Unsupported(std::env::consts::OS).into())
    }
}

fn non_negative(value: i32) -> i32 {
    value.max(0)
}

/// 嵌入宿主控件的子窗口
pub struct EmbeddedWindow {
    system: Box<dyn NativeWindowSystem>,
    handle: NativeWindowHandle,
    router: Arc<MessageRouter>,
    destroyed: bool,
}

impl EmbeddedWindow {
    /// 创建子窗口，负尺寸按 0 处理
    pub fn create(
        mut system: Box<dyn NativeWindowSystem>,
        parent: isize,
        width: i32,
        height: i32,
    ) -> Result<Self> {
        let router = Arc::new(MessageRouter::new());
        let (width, height) = (non_negative(width), non_negative(height));
        let handle = system.create_child(parent, width, height, Arc::clone(&router))?;

        debug!(hwnd = handle.hwnd, parent, width, height, "Embedded window created");
        Ok(Self {
            system,
            handle,
            router,
            destroyed: false,
        })
    }

    pub fn handle(&self) -> NativeWindowHandle {
        self.handle
    }

    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.router
    }

    pub fn pointer(&self) -> &PointerListeners {
        self.router.pointer()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// 交换链可绘制对象
    ///
    /// # Safety
    ///
    /// 使用它创建的交换链必须在窗口销毁之前释放。
    pub unsafe fn swapchain_source(&self) -> SwapchainSource {
        SwapchainSource::win32(self.handle.hwnd, self.handle.hinstance)
    }

    /// 调整窗口大小，负尺寸按 0 处理
    pub fn resize(&mut self, width: i32, height: i32) -> Result<()> {
        if self.destroyed {
            return Err(WindowError::Operation("window has been destroyed".to_string()).into());
        }
        self.system
            .move_window(self.handle, non_negative(width), non_negative(height))
    }

    /// 销毁窗口（只执行一次）
    pub fn destroy(&mut self) -> Result<()> {
        if self.destroyed {
            return Ok(());
        }
        self.destroyed = true;
        self.system.destroy(self.handle)?;
        debug!(hwnd = self.handle.hwnd, "Embedded window destroyed");
        Ok(())
    }
}

impl Drop for EmbeddedWindow {
    fn drop(&mut self) {
        if let Err(e) = self.destroy() {
            warn!("Failed to destroy embedded window: {}", e);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! 记录调用的窗口系统替身

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        Create { parent: isize, width: i32, height: i32 },
        Move { hwnd: isize, width: i32, height: i32 },
        Destroy { hwnd: isize },
    }

    #[derive(Default)]
    pub struct RecordingWindowSystem {
        pub calls: Arc<Mutex<Vec<Call>>>,
        pub routers: Arc<Mutex<Vec<Arc<MessageRouter>>>>,
        next_hwnd: isize,
    }

    impl RecordingWindowSystem {
        pub fn new() -> (Self, Arc<Mutex<Vec<Call>>>) {
            let system = Self {
                next_hwnd: 0x100,
                ..Self::default()
            };
            let calls = Arc::clone(&system.calls);
            (system, calls)
        }
    }

    impl NativeWindowSystem for RecordingWindowSystem {
        fn create_child(
            &mut self,
            parent: isize,
            width: i32,
            height: i32,
            router: Arc<MessageRouter>,
        ) -> Result<NativeWindowHandle> {
            self.calls.lock().unwrap().push(Call::Create { parent, width, height });
            self.routers.lock().unwrap().push(router);
            self.next_hwnd += 1;
            Ok(NativeWindowHandle {
                hwnd: self.next_hwnd,
                hinstance: 0x40_0000,
            })
        }

        fn move_window(&mut self, handle: NativeWindowHandle, width: i32, height: i32) -> Result<()> {
            self.calls.lock().unwrap().push(Call::Move { hwnd: handle.hwnd, width, height });
            Ok(())
        }

        fn destroy(&mut self, handle: NativeWindowHandle) -> Result<()> {
            self.calls.lock().unwrap().push(Call::Destroy { hwnd: handle.hwnd });
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{Call, RecordingWindowSystem};
    use super::*;
    use crate::core::event::MouseButton;
    use crate::native::message::{lparam_from_point, WM_LBUTTONDOWN, WM_MOUSELEAVE, WM_MOUSEMOVE};

    #[test]
    fn test_zero_and_negative_sizes() {
        let (system, calls) = RecordingWindowSystem::new();
        let mut window = EmbeddedWindow::create(Box::new(system), 0x42, 0, -10).unwrap();
        window.resize(-1, 50).unwrap();

        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                Call::Create { parent: 0x42, width: 0, height: 0 },
                Call::Move { hwnd: window.handle().hwnd, width: 0, height: 50 },
            ]
        );
    }

    #[test]
    fn test_destroy_exactly_once() {
        let (system, calls) = RecordingWindowSystem::new();
        let mut window = EmbeddedWindow::create(Box::new(system), 0x42, 10, 10).unwrap();
        let hwnd = window.handle().hwnd;

        window.destroy().unwrap();
        window.destroy().unwrap();
        assert!(window.resize(5, 5).is_err());
        drop(window);

        let destroys = calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| **c == Call::Destroy { hwnd })
            .count();
        assert_eq!(destroys, 1);
    }

    #[test]
    fn test_router_dispatches_pointer_events() {
        let router = MessageRouter::new();
        let events = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&events);
        router.pointer().on_any(move |e| sink.lock().unwrap().push(*e));
        let downs = Arc::new(Mutex::new(0));
        let downs_sink = Arc::clone(&downs);
        router.pointer().on_mouse_down(move |_| *downs_sink.lock().unwrap() += 1);

        assert!(router.route(WM_MOUSEMOVE, 0, lparam_from_point(4, 5)));
        assert!(router.is_pointer_inside());
        assert!(router.route(WM_LBUTTONDOWN, 0, lparam_from_point(4, 5)));
        assert!(router.route(WM_MOUSELEAVE, 0, 0));
        assert!(!router.route(0x000F, 0, 0)); // WM_PAINT

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                PointerEvent::Enter,
                PointerEvent::Move { x: 4, y: 5 },
                PointerEvent::Down { button: MouseButton::Left, x: 4, y: 5 },
                PointerEvent::Leave,
            ]
        );
        assert_eq!(*downs.lock().unwrap(), 1);
    }
}
