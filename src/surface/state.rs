//! 表面状态
//!
//! ```text
//! Uninitialized ──attach──▶ Attached ──start──▶ Running ⇄ Paused
//!                                                  │        │
//!                                                  └─stop───┴──▶ Stopped ──dispose──▶ Disposed
//! ```
//!
//! 任何状态都可以直接 `dispose`。状态保存在原子变量中，
//! 宿主线程、刷新源线程和其他线程都可以读取。

use std::sync::atomic::{AtomicU8, Ordering};

/// 播放状态，决定节拍是否渲染
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Running,
    Paused,
    /// 终止状态
    Stopped,
}

/// 表面生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceState {
    Uninitialized,
    Attached,
    Running,
    Paused,
    Stopped,
    Disposed,
}

impl SurfaceState {
    /// 状态名称
    pub fn name(&self) -> &'static str {
        match self {
            SurfaceState::Uninitialized => "uninitialized",
            SurfaceState::Attached => "attached",
            SurfaceState::Running => "running",
            SurfaceState::Paused => "paused",
            SurfaceState::Stopped => "stopped",
            SurfaceState::Disposed => "disposed",
        }
    }

    /// 对应的播放状态
    pub fn playback(&self) -> PlaybackState {
        match self {
            SurfaceState::Running => PlaybackState::Running,
            SurfaceState::Paused | SurfaceState::Uninitialized | SurfaceState::Attached => {
                PlaybackState::Paused
            }
            SurfaceState::Stopped | SurfaceState::Disposed => PlaybackState::Stopped,
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            SurfaceState::Uninitialized => 0,
            SurfaceState::Attached => 1,
            SurfaceState::Running => 2,
            SurfaceState::Paused => 3,
            SurfaceState::Stopped => 4,
            SurfaceState::Disposed => 5,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => SurfaceState::Uninitialized,
            1 => SurfaceState::Attached,
            2 => SurfaceState::Running,
            3 => SurfaceState::Paused,
            4 => SurfaceState::Stopped,
            _ => SurfaceState::Disposed,
        }
    }
}

/// 原子的表面状态
#[derive(Debug)]
pub(crate) struct AtomicSurfaceState(AtomicU8);

impl AtomicSurfaceState {
    pub(crate) fn new(state: SurfaceState) -> Self {
        Self(AtomicU8::new(state.to_u8()))
    }

    pub(crate) fn get(&self) -> SurfaceState {
        SurfaceState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: SurfaceState) {
        self.0.store(state.to_u8(), Ordering::Release);
    }

    /// 状态为 `from` 时切换到 `to`
    pub(crate) fn transition(&self, from: SurfaceState, to: SurfaceState) -> bool {
        self.0
            .compare_exchange(from.to_u8(), to.to_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_roundtrip_and_playback() {
        let state = AtomicSurfaceState::new(SurfaceState::Uninitialized);
        assert_eq!(state.get().playback(), PlaybackState::Paused);

        state.set(SurfaceState::Running);
        assert_eq!(state.get(), SurfaceState::Running);
        assert_eq!(state.get().playback(), PlaybackState::Running);

        assert!(state.transition(SurfaceState::Running, SurfaceState::Paused));
        assert!(!state.transition(SurfaceState::Running, SurfaceState::Paused));
        assert_eq!(state.get().name(), "paused");

        state.set(SurfaceState::Disposed);
        assert_eq!(state.get().playback(), PlaybackState::Stopped);
    }
}
