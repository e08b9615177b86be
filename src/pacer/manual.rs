//! 宿主驱动的刷新源
//!
//! 宿主自己的事件循环（例如窗口系统的重绘请求）决定何时渲染，
//! 通过 `ManualTrigger::tick` 在宿主线程上同步执行一次节拍。

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::core::config::PacerKind;
use crate::core::error::{DistSurfaceError, Result, SurfaceError};
use super::{FramePacer, PacerControl, TickHandler, TickOutcome};

#[derive(Default)]
struct ManualShared {
    control: Arc<PacerControl>,
    // 节拍执行期间一直持有，stop 因此会等待正在执行的节拍
    handler: Mutex<Option<TickHandler>>,
}

impl ManualShared {
    fn handler(&self) -> MutexGuard<'_, Option<TickHandler>> {
        self.handler.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// 宿主驱动的刷新源
pub struct ManualPacer {
    shared: Arc<ManualShared>,
}

/// 触发端，由宿主持有
#[derive(Clone)]
pub struct ManualTrigger {
    shared: Arc<ManualShared>,
}

impl ManualPacer {
    /// 创建刷新源及其触发端
    pub fn new() -> (Self, ManualTrigger) {
        let shared = Arc::new(ManualShared::default());
        (
            Self {
                shared: Arc::clone(&shared),
            },
            ManualTrigger { shared },
        )
    }
}

impl ManualTrigger {
    /// 执行一次节拍
    ///
    /// 刷新源未运行时返回 `Skipped`；处理函数出错时返回错误，
    /// 原始错误保存在刷新源中，之后的节拍都被跳过。
    pub fn tick(&self) -> Result<TickOutcome> {
        let handler = self.shared.handler();
        let handler = match handler.as_ref() {
            Some(handler) => handler,
            None => return Ok(TickOutcome::Skipped),
        };

        match self.shared.control.run_tick(handler) {
            Some(outcome) => Ok(outcome),
            None if self.shared.control.is_running() => Ok(TickOutcome::Skipped),
            None => Err(SurfaceError::Pacer("frame pacer stopped after a render fault".to_string()).into()),
        }
    }

    /// 刷新源是否在运行
    pub fn is_running(&self) -> bool {
        self.shared.control.is_running()
    }
}

impl FramePacer for ManualPacer {
    fn kind(&self) -> PacerKind {
        PacerKind::Manual
    }

    fn start(&mut self, handler: TickHandler) -> Result<()> {
        let mut slot = self.shared.handler();
        if !self.shared.control.begin() {
            return Err(SurfaceError::Pacer("manual pacer is already running".to_string()).into());
        }
        *slot = Some(handler);
        debug!("Manual pacer started");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.shared.control.cancel();
        if self.shared.handler().take().is_some() {
            debug!("Manual pacer stopped");
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.shared.control.is_running()
    }

    fn take_fault(&mut self) -> Option<DistSurfaceError> {
        self.shared.control.take_fault()
    }

    fn tick_count(&self) -> u64 {
        self.shared.control.tick_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_trigger_runs_handler_only_while_running() {
        let (mut pacer, trigger) = ManualPacer::new();
        let count = Arc::new(AtomicUsize::new(0));

        assert_eq!(trigger.tick().unwrap(), TickOutcome::Skipped);

        let count_clone = count.clone();
        pacer
            .start(Arc::new(move || {
                count_clone.fetch_add(1, Ordering::SeqCst);
                Ok(TickOutcome::Rendered)
            }))
            .unwrap();
        assert_eq!(trigger.tick().unwrap(), TickOutcome::Rendered);
        assert_eq!(trigger.tick().unwrap(), TickOutcome::Rendered);

        pacer.stop().unwrap();
        assert_eq!(trigger.tick().unwrap(), TickOutcome::Skipped);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(pacer.tick_count(), 2);
    }

    #[test]
    fn test_fault_is_reported_and_kept() {
        let (mut pacer, trigger) = ManualPacer::new();
        pacer
            .start(Arc::new(|| Err(SurfaceError::Callback("bad frame".to_string()).into())))
            .unwrap();

        assert!(trigger.tick().is_err());
        assert!(!trigger.is_running());
        assert!(trigger.tick().is_err());

        let fault = pacer.take_fault().unwrap();
        assert!(fault.to_string().contains("bad frame"));
    }
}
