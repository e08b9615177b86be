//! 尺寸锁存器
//!
//! 布局/调整大小通知可能来自任意线程，渲染节拍在刷新源线程上运行。
//! 锁存器只记录最近一次请求的尺寸，并在下一帧渲染之前被应用恰好一次：
//! 两次节拍之间的多次通知会合并成最后一次。

use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct PendingSize {
    width: u32,
    height: u32,
    dirty: bool,
}

/// 尺寸锁存器
#[derive(Debug, Default)]
pub struct ResizeLatch {
    pending: Mutex<PendingSize>,
}

impl ResizeLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录请求的尺寸（覆盖之前未应用的请求）
    pub fn notify(&self, width: u32, height: u32) {
        *self.lock() = PendingSize {
            width,
            height,
            dirty: true,
        };
    }

    /// 读取并清除未应用的尺寸
    pub fn take_if_dirty(&self) -> Option<(u32, u32)> {
        let mut pending = self.lock();
        if !pending.dirty {
            return None;
        }
        pending.dirty = false;
        Some((pending.width, pending.height))
    }

    /// 是否有未应用的尺寸
    pub fn is_dirty(&self) -> bool {
        self.lock().dirty
    }

    fn lock(&self) -> MutexGuard<'_, PendingSize> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// 把布局尺寸转换为像素尺寸
///
/// 负数（以及 NaN）视为 0，其余按 `ceil(value * dpi_scale)` 取整。
pub fn clamp_dimension(value: f64, dpi_scale: f64) -> u32 {
    let scaled = value * dpi_scale;
    if scaled.is_nan() || scaled <= 0.0 {
        return 0;
    }
    let ceiled = scaled.ceil();
    if ceiled >= u32::MAX as f64 {
        u32::MAX
    } else {
        ceiled as u32
    }
}

/// 同时转换宽和高
pub fn clamp_size(width: f64, height: f64, dpi_scale: f64) -> (u32, u32) {
    (clamp_dimension(width, dpi_scale), clamp_dimension(height, dpi_scale))
}
