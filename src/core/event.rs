//! 事件系统模块
//!
//! 定义渲染表面和原生窗口对外发布的事件，以及监听器注册/分发机制。
//!
//! # 事件分类
//!
//! - **表面事件**：`DeviceReady`、`Resized`，由渲染表面在生命周期固定位置触发
//! - **指针事件**：`MouseDown`、`MouseUp`、`MouseMove`、`MouseEnter`、`MouseLeave`、
//!   `MouseWheel`，由原生窗口消息转换而来
//!
//! # 使用示例
//!
//! ```
//! use dist_surface::core::event::{Event, EventType, Listeners, PointerEvent};
//!
//! let listeners: Listeners<PointerEvent> = Listeners::new();
//! listeners.add_for(EventType::MouseEnter, |e| println!("{}", e.detail()));
//!
//! listeners.dispatch(&PointerEvent::Enter);
//! ```

use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// 事件类型枚举
///
/// 每个变体对应一种具体的事件类型，用于监听器过滤和日志输出。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// 交换链已创建，首帧之前触发一次
    DeviceReady,

    /// 锁存的尺寸已应用到交换链
    Resized,

    /// 鼠标按下
    MouseDown,

    /// 鼠标释放
    MouseUp,

    /// 鼠标移动
    MouseMove,

    /// 鼠标进入客户区
    MouseEnter,

    /// 鼠标离开客户区
    MouseLeave,

    /// 鼠标滚轮
    MouseWheel,
}

impl EventType {
    /// 获取事件类型的名称
    pub fn name(&self) -> &'static str {
        match self {
            EventType::DeviceReady => "DeviceReady",
            EventType::Resized => "Resized",
            EventType::MouseDown => "MouseDown",
            EventType::MouseUp => "MouseUp",
            EventType::MouseMove => "MouseMove",
            EventType::MouseEnter => "MouseEnter",
            EventType::MouseLeave => "MouseLeave",
            EventType::MouseWheel => "MouseWheel",
        }
    }
}

/// 事件 trait
///
/// 所有可分发的事件都实现此 trait，监听器据此做类型过滤。
pub trait Event: fmt::Debug {
    /// 获取事件类型
    fn event_type(&self) -> EventType;

    /// 获取事件详细信息（用于调试和日志）
    fn detail(&self) -> String {
        format!("{:?}", self)
    }
}

/// 鼠标按钮
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    /// 主按钮
    Left,
    /// 次按钮
    Right,
}

/// 指针事件
///
/// 与宿主控件对外暴露的鼠标事件一一对应，坐标为客户区坐标。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    /// 鼠标进入客户区
    Enter,
    /// 鼠标离开客户区
    Leave,
    /// 鼠标移动
    Move { x: i32, y: i32 },
    /// 按钮按下
    Down { button: MouseButton, x: i32, y: i32 },
    /// 按钮释放
    Up { button: MouseButton, x: i32, y: i32 },
    /// 滚轮，`delta` 为有符号的滚动量（一格通常为 120）
    Wheel { x: i32, y: i32, delta: i32 },
}

impl Event for PointerEvent {
    fn event_type(&self) -> EventType {
        match self {
            PointerEvent::Enter => EventType::MouseEnter,
            PointerEvent::Leave => EventType::MouseLeave,
            PointerEvent::Move { .. } => EventType::MouseMove,
            PointerEvent::Down { .. } => EventType::MouseDown,
            PointerEvent::Up { .. } => EventType::MouseUp,
            PointerEvent::Wheel { .. } => EventType::MouseWheel,
        }
    }

    fn detail(&self) -> String {
        match self {
            PointerEvent::Enter => "MouseEnter".to_string(),
            PointerEvent::Leave => "MouseLeave".to_string(),
            PointerEvent::Move { x, y } => format!("MouseMove: ({}, {})", x, y),
            PointerEvent::Down { button, x, y } => {
                format!("MouseDown: {:?} at ({}, {})", button, x, y)
            }
            PointerEvent::Up { button, x, y } => {
                format!("MouseUp: {:?} at ({}, {})", button, x, y)
            }
            PointerEvent::Wheel { x, y, delta } => {
                format!("MouseWheel: {} at ({}, {})", delta, x, y)
            }
        }
    }
}

/// 表面生命周期事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// 交换链与每表面资源已就绪
    DeviceReady { width: u32, height: u32 },
    /// 交换链已调整为新尺寸
    Resized { width: u32, height: u32 },
}

impl Event for SurfaceEvent {
    fn event_type(&self) -> EventType {
        match self {
            SurfaceEvent::DeviceReady { .. } => EventType::DeviceReady,
            SurfaceEvent::Resized { .. } => EventType::Resized,
        }
    }

    fn detail(&self) -> String {
        match self {
            SurfaceEvent::DeviceReady { width, height } => {
                format!("DeviceReady: {}x{}", width, height)
            }
            SurfaceEvent::Resized { width, height } => format!("Resized: {}x{}", width, height),
        }
    }
}

type Handler<E> = Box<dyn FnMut(&E) + Send>;

struct Registration<E> {
    filter: Option<EventType>,
    handler: Handler<E>,
}

/// 监听器集合
///
/// 显式注册 + 分发。监听器按注册顺序调用；带类型过滤的监听器
/// 只接收匹配类型的事件。可以跨线程共享（内部加锁）。
pub struct Listeners<E> {
    registrations: Mutex<Vec<Registration<E>>>,
}

impl<E: Event> Listeners<E> {
    /// 创建空的监听器集合
    pub fn new() -> Self {
        Self {
            registrations: Mutex::new(Vec::new()),
        }
    }

    /// 注册接收所有事件的监听器
    pub fn add<F>(&self, handler: F)
    where
        F: FnMut(&E) + Send + 'static,
    {
        self.push(None, Box::new(handler));
    }

    /// 注册只接收指定类型事件的监听器
    pub fn add_for<F>(&self, event_type: EventType, handler: F)
    where
        F: FnMut(&E) + Send + 'static,
    {
        self.push(Some(event_type), Box::new(handler));
    }

    fn registrations(&self) -> MutexGuard<'_, Vec<Registration<E>>> {
        self.registrations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, filter: Option<EventType>, handler: Handler<E>) {
        self.registrations().push(Registration { filter, handler });
    }

    /// 分发事件
    ///
    /// 监听器在锁外调用，可以在回调中注册新的监听器，
    /// 新监听器从下一次分发开始生效。嵌套或并发的分发看不到正在执行的这一组监听器。
    ///
    /// # 返回值
    ///
    /// 被调用的监听器数量
    pub fn dispatch(&self, event: &E) -> usize {
        let event_type = event.event_type();
        let mut active = std::mem::take(&mut *self.registrations());

        let mut invoked = 0;
        for registration in active.iter_mut() {
            if registration.filter.map_or(true, |filter| filter == event_type) {
                (registration.handler)(event);
                invoked += 1;
            }
        }

        let mut registrations = self.registrations();
        let added = std::mem::replace(&mut *registrations, active);
        registrations.extend(added);
        invoked
    }

    /// 已注册的监听器数量
    pub fn len(&self) -> usize {
        self.registrations
            .lock()
            .map(|r| r.len())
            .unwrap_or(0)
    }

    /// 是否没有任何监听器
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: Event> Default for Listeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for Listeners<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.registrations.lock().map(|r| r.len()).unwrap_or(0);
        f.debug_struct("Listeners").field("count", &count).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_event_types() {
        assert_eq!(EventType::Resized.name(), "Resized");
        assert_eq!(PointerEvent::Enter.event_type(), EventType::MouseEnter);
        assert_eq!(
            PointerEvent::Wheel { x: 1, y: 2, delta: -120 }.event_type(),
            EventType::MouseWheel
        );
        assert_eq!(
            SurfaceEvent::DeviceReady { width: 1, height: 1 }.event_type().name(),
            "DeviceReady"
        );
    }

    #[test]
    fn test_event_detail() {
        let event = SurfaceEvent::Resized { width: 150, height: 150 };
        assert_eq!(event.detail(), "Resized: 150x150");

        let event = PointerEvent::Down { button: MouseButton::Left, x: 3, y: 4 };
        assert_eq!(event.detail(), "MouseDown: Left at (3, 4)");
    }

    #[test]
    fn test_listeners_filter_by_type() {
        let listeners: Listeners<PointerEvent> = Listeners::new();
        let all = Arc::new(AtomicUsize::new(0));
        let moves = Arc::new(AtomicUsize::new(0));

        let all_clone = all.clone();
        listeners.add(move |_| {
            all_clone.fetch_add(1, Ordering::SeqCst);
        });
        let moves_clone = moves.clone();
        listeners.add_for(EventType::MouseMove, move |_| {
            moves_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(listeners.dispatch(&PointerEvent::Enter), 1);
        assert_eq!(listeners.dispatch(&PointerEvent::Move { x: 0, y: 0 }), 2);

        assert_eq!(all.load(Ordering::SeqCst), 2);
        assert_eq!(moves.load(Ordering::SeqCst), 1);
        assert_eq!(listeners.len(), 2);
    }

    #[test]
    fn test_listeners_preserve_registration_order() {
        let listeners: Listeners<SurfaceEvent> = Listeners::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for id in 0..3 {
            let order = order.clone();
            listeners.add(move |_| order.lock().unwrap().push(id));
        }

        listeners.dispatch(&SurfaceEvent::DeviceReady { width: 1, height: 1 });
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_listener_can_register_during_dispatch() {
        let listeners: Arc<Listeners<PointerEvent>> = Arc::new(Listeners::new());
        let late = Arc::new(AtomicUsize::new(0));

        let registry = Arc::clone(&listeners);
        let late_clone = late.clone();
        listeners.add_for(EventType::MouseEnter, move |_| {
            let late = late_clone.clone();
            registry.add_for(EventType::MouseLeave, move |_| {
                late.fetch_add(1, Ordering::SeqCst);
            });
        });

        assert_eq!(listeners.dispatch(&PointerEvent::Enter), 1);
        assert_eq!(listeners.len(), 2);
        assert_eq!(listeners.dispatch(&PointerEvent::Leave), 1);
        assert_eq!(late.load(Ordering::SeqCst), 1);
    }
}
