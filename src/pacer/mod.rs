//! 刷新源模块
//!
//! 刷新源周期性地产生"帧节拍"，每个节拍同步调用一次表面的渲染处理函数。
//!
//! # 模块组织
//!
//! - `display_link`：与显示刷新对齐的合成器回调（macOS 使用 CVDisplayLink）
//! - `timer`：固定间隔定时器线程
//! - `spin`：专用线程自旋循环，带协作式取消令牌
//! - `manual`：由宿主自己的事件循环驱动
//!
//! # 约定
//!
//! - 处理函数在刷新源的线程上同步执行，刷新源不会并发调用同一个处理函数
//! - `stop()` 返回后不会再有节拍在执行
//! - 处理函数返回错误时，刷新源记录并保存该错误，然后停止产生节拍

pub mod display_link;
pub mod manual;
pub mod spin;
pub mod timer;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{error, trace};

use crate::core::config::{PacerConfig, PacerKind};
use crate::core::error::{ConfigError, DistSurfaceError, Result};

pub use display_link::DisplayLinkPacer;
pub use manual::{ManualPacer, ManualTrigger};
pub use spin::SpinPacer;
pub use timer::TimerPacer;

/// 一次节拍的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// 渲染并呈现了一帧
    Rendered,
    /// 本次节拍没有渲染（暂停、重入或尚未就绪）
    Skipped,
}

/// 节拍处理函数
pub type TickHandler = Arc<dyn Fn() -> Result<TickOutcome> + Send + Sync>;

/// 刷新源
pub trait FramePacer: Send {
    /// 刷新源类型
    fn kind(&self) -> PacerKind;

    /// 开始产生节拍
    fn start(&mut self, handler: TickHandler) -> Result<()>;

    /// 停止产生节拍，阻塞到正在执行的节拍返回
    fn stop(&mut self) -> Result<()>;

    /// 是否正在产生节拍
    fn is_running(&self) -> bool;

    /// 取出处理函数返回的错误（如果有）
    fn take_fault(&mut self) -> Option<DistSurfaceError>;

    /// 已经执行的节拍数
    fn tick_count(&self) -> u64;
}

/// 刷新源线程与控制端共享的状态
///
/// `running` 同时充当协作式取消令牌。
#[derive(Debug, Default)]
pub(crate) struct PacerControl {
    running: AtomicBool,
    ticks: AtomicU64,
    fault: Mutex<Option<DistSurfaceError>>,
}

impl PacerControl {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// 标记为运行中；已经在运行时返回 `false`
    pub(crate) fn begin(&self) -> bool {
        !self.running.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn cancel(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub(crate) fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    pub(crate) fn take_fault(&self) -> Option<DistSurfaceError> {
        self.fault
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    /// 执行一次节拍
    ///
    /// 返回 `None` 表示处理函数出错，刷新源已被取消。
    pub(crate) fn run_tick(&self, handler: &TickHandler) -> Option<TickOutcome> {
        if !self.is_running() {
            return None;
        }

        self.ticks.fetch_add(1, Ordering::AcqRel);
        match handler() {
            Ok(outcome) => {
                trace!(?outcome, "Tick");
                Some(outcome)
            }
            Err(e) => {
                error!("Frame pacer stopping after handler error: {}", e);
                self.cancel();
                *self
                    .fault
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(e);
                None
            }
        }
    }
}

/// 按类型和配置创建刷新源
///
/// `name` 用于刷新源线程的命名。`Manual` 需要宿主持有触发端，
/// 只能通过 `ManualPacer::new` 创建。
pub fn create(kind: PacerKind, config: &PacerConfig, name: &str) -> Result<Box<dyn FramePacer>> {
    match kind {
        PacerKind::DisplayLink => Ok(Box::new(DisplayLinkPacer::new(config.refresh_hz, name))),
        PacerKind::Timer => Ok(Box::new(TimerPacer::new(
            Duration::from_millis(config.interval_ms),
            name,
        ))),
        PacerKind::Spin => Ok(Box::new(SpinPacer::new(name))),
        PacerKind::Manual => Err(ConfigError::InvalidValue {
            field: "pacer.kind".to_string(),
            reason: "the manual pacer is driven by the host and has no factory".to_string(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::SurfaceError;

    #[test]
    fn test_run_tick_counts_and_faults() {
        let control = PacerControl::new();
        let ok: TickHandler = Arc::new(|| Ok(TickOutcome::Rendered));
        let failing: TickHandler =
            Arc::new(|| Err(SurfaceError::Callback("boom".to_string()).into()));

        // 未运行时不执行
        assert_eq!(control.run_tick(&ok), None);
        assert_eq!(control.tick_count(), 0);

        assert!(control.begin());
        assert!(!control.begin());
        assert_eq!(control.run_tick(&ok), Some(TickOutcome::Rendered));
        assert_eq!(control.run_tick(&failing), None);

        assert!(!control.is_running());
        assert_eq!(control.tick_count(), 2);
        let fault = control.take_fault().unwrap();
        assert!(fault.to_string().contains("boom"));
        assert!(control.take_fault().is_none());
    }

    #[test]
    fn test_create_by_kind() {
        let config = PacerConfig::default();
        for kind in [PacerKind::DisplayLink, PacerKind::Timer, PacerKind::Spin] {
            let pacer = create(kind, &config, "test").unwrap();
            assert_eq!(pacer.kind(), kind);
            assert!(!pacer.is_running());
        }
        assert!(create(PacerKind::Manual, &config, "test").is_err());
    }
}
