//! 窗口消息解码
//!
//! 整个 crate 中唯一知道窗口消息编号和参数打包方式的地方。
//! 解码是纯函数，不依赖 Win32，可以在任何平台上测试。

use crate::core::event::{MouseButton, PointerEvent};

pub const WM_MOUSEMOVE: u32 = 0x0200;
pub const WM_LBUTTONDOWN: u32 = 0x0201;
pub const WM_LBUTTONUP: u32 = 0x0202;
pub const WM_RBUTTONDOWN: u32 = 0x0204;
pub const WM_RBUTTONUP: u32 = 0x0205;
pub const WM_MOUSEWHEEL: u32 = 0x020A;
pub const WM_MOUSELEAVE: u32 = 0x02A3;

/// 滚轮一格的增量
pub const WHEEL_DELTA: i32 = 120;

/// 解码后的原始指针消息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawPointerMessage {
    Move { x: i32, y: i32 },
    ButtonDown { button: MouseButton, x: i32, y: i32 },
    ButtonUp { button: MouseButton, x: i32, y: i32 },
    Wheel { x: i32, y: i32, delta: i32 },
    Leave,
}

fn low_word_signed(value: isize) -> i32 {
    (value & 0xFFFF) as u16 as i16 as i32
}

fn high_word_signed(value: isize) -> i32 {
    ((value >> 16) & 0xFFFF) as u16 as i16 as i32
}

/// 从 `lParam` 取出有符号的 16 位坐标
pub fn point_from_lparam(lparam: isize) -> (i32, i32) {
    (low_word_signed(lparam), high_word_signed(lparam))
}

/// 把坐标打包成 `lParam`
pub fn lparam_from_point(x: i32, y: i32) -> isize {
    let low = (x as u16) as isize;
    let high = (y as u16) as isize;
    (high << 16) | low
}

/// 从 `wParam` 的高位字取出有符号的滚轮增量
pub fn wheel_delta(wparam: usize) -> i32 {
    high_word_signed(wparam as isize)
}

/// 是否为关心的指针消息
pub fn is_pointer_message(msg: u32) -> bool {
    matches!(
        msg,
        WM_MOUSEMOVE
            | WM_LBUTTONDOWN
            | WM_LBUTTONUP
            | WM_RBUTTONDOWN
            | WM_RBUTTONUP
            | WM_MOUSEWHEEL
            | WM_MOUSELEAVE
    )
}

/// 解码指针消息，其他消息返回 `None`
///
/// `WM_MOUSEWHEEL` 的坐标原样返回，调用者负责把屏幕坐标换算为客户区坐标。
pub fn decode(msg: u32, wparam: usize, lparam: isize) -> Option<RawPointerMessage> {
    let (x, y) = point_from_lparam(lparam);
    let message = match msg {
        WM_MOUSEMOVE => RawPointerMessage::Move { x, y },
        WM_LBUTTONDOWN => RawPointerMessage::ButtonDown { button: MouseButton::Left, x, y },
        WM_LBUTTONUP => RawPointerMessage::ButtonUp { button: MouseButton::Left, x, y },
        WM_RBUTTONDOWN => RawPointerMessage::ButtonDown { button: MouseButton::Right, x, y },
        WM_RBUTTONUP => RawPointerMessage::ButtonUp { button: MouseButton::Right, x, y },
        WM_MOUSEWHEEL => RawPointerMessage::Wheel { x, y, delta: wheel_delta(wparam) },
        WM_MOUSELEAVE => RawPointerMessage::Leave,
        _ => return None,
    };
    Some(message)
}

/// 指针进入/离开跟踪
///
/// 原生窗口只报告离开，进入由"在外面时收到的第一次移动"合成。
#[derive(Debug, Default)]
pub struct PointerTracker {
    inside: bool,
}

impl PointerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 指针是否在客户区内
    pub fn is_inside(&self) -> bool {
        self.inside
    }

    /// 把原始消息转换为指针事件
    pub fn translate<F>(&mut self, message: RawPointerMessage, mut emit: F)
    where
        F: FnMut(PointerEvent),
    {
        match message {
            RawPointerMessage::Move { x, y } => {
                if !self.inside {
                    self.inside = true;
                    emit(PointerEvent::Enter);
                }
                emit(PointerEvent::Move { x, y });
            }
            RawPointerMessage::ButtonDown { button, x, y } => {
                emit(PointerEvent::Down { button, x, y })
            }
            RawPointerMessage::ButtonUp { button, x, y } => emit(PointerEvent::Up { button, x, y }),
            RawPointerMessage::Wheel { x, y, delta } => emit(PointerEvent::Wheel { x, y, delta }),
            RawPointerMessage::Leave => {
                if self.inside {
                    self.inside = false;
                    emit(PointerEvent::Leave);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(tracker: &mut PointerTracker, message: RawPointerMessage) -> Vec<PointerEvent> {
        let mut events = Vec::new();
        tracker.translate(message, |e| events.push(e));
        events
    }

    #[test]
    fn test_decode_signed_coordinates() {
        let lparam = lparam_from_point(-5, 300);
        assert_eq!(point_from_lparam(lparam), (-5, 300));
        assert_eq!(
            decode(WM_LBUTTONDOWN, 0, lparam),
            Some(RawPointerMessage::ButtonDown { button: MouseButton::Left, x: -5, y: 300 })
        );
        assert_eq!(
            decode(WM_RBUTTONUP, 0, lparam_from_point(10, -1)),
            Some(RawPointerMessage::ButtonUp { button: MouseButton::Right, x: 10, y: -1 })
        );
    }

    #[test]
    fn test_decode_wheel_delta() {
        let wparam = ((-WHEEL_DELTA as u16 as usize) << 16) | 0x0008;
        assert_eq!(wheel_delta(wparam), -120);
        assert_eq!(
            decode(WM_MOUSEWHEEL, wparam, lparam_from_point(7, 9)),
            Some(RawPointerMessage::Wheel { x: 7, y: 9, delta: -120 })
        );
    }

    #[test]
    fn test_decode_ignores_other_messages() {
        assert_eq!(decode(0x0005, 0, 0), None); // WM_SIZE
        assert!(!is_pointer_message(0x0005));
        assert!(is_pointer_message(WM_MOUSELEAVE));
        assert_eq!(decode(WM_MOUSELEAVE, 0, 0), Some(RawPointerMessage::Leave));
    }

    #[test]
    fn test_enter_synthesized_once_per_excursion() {
        let mut tracker = PointerTracker::new();

        let events = collect(&mut tracker, RawPointerMessage::Move { x: 1, y: 2 });
        assert_eq!(events, vec![PointerEvent::Enter, PointerEvent::Move { x: 1, y: 2 }]);

        let events = collect(&mut tracker, RawPointerMessage::Move { x: 3, y: 4 });
        assert_eq!(events, vec![PointerEvent::Move { x: 3, y: 4 }]);

        assert_eq!(collect(&mut tracker, RawPointerMessage::Leave), vec![PointerEvent::Leave]);
        assert!(collect(&mut tracker, RawPointerMessage::Leave).is_empty());

        let events = collect(&mut tracker, RawPointerMessage::Move { x: 0, y: 0 });
        assert_eq!(events[0], PointerEvent::Enter);
    }
}
