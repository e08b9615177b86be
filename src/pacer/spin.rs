//! 自旋刷新源
//!
//! 一个专用线程尽可能快地产生节拍，由垂直同步的呈现调用自然限速。
//! 停止时设置取消令牌并等待线程退出。

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::core::config::PacerKind;
use crate::core::error::{DistSurfaceError, Result, SurfaceError};
use super::timer::PacerThread;
use super::{FramePacer, PacerControl, TickHandler, TickOutcome};

/// 节拍被跳过（例如暂停）时让出 CPU 的时长
const SKIP_BACKOFF: Duration = Duration::from_millis(1);

/// 自旋刷新源
pub struct SpinPacer {
    name: String,
    control: Arc<PacerControl>,
    worker: Option<PacerThread>,
}

impl SpinPacer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            control: PacerControl::new(),
            worker: None,
        }
    }
}

impl FramePacer for SpinPacer {
    fn kind(&self) -> PacerKind {
        PacerKind::Spin
    }

    fn start(&mut self, handler: TickHandler) -> Result<()> {
        if !self.control.begin() {
            return Err(SurfaceError::Pacer("spin pacer is already running".to_string()).into());
        }
        if let Some(stale) = self.worker.take() {
            stale.join()?;
        }

        let control = Arc::clone(&self.control);
        let spawned = PacerThread::spawn(format!("{}-spin", self.name), move |_sleeper| {
            while let Some(outcome) = control.run_tick(&handler) {
                if outcome == TickOutcome::Skipped {
                    thread::sleep(SKIP_BACKOFF);
                }
            }
        });
        match spawned {
            Ok(worker) => self.worker = Some(worker),
            Err(e) => {
                self.control.cancel();
                return Err(e);
            }
        }

        debug!(name = %self.name, "Spin pacer started");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.control.cancel();
        if let Some(worker) = self.worker.take() {
            worker.join()?;
            debug!(name = %self.name, "Spin pacer stopped");
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.control.is_running()
    }

    fn take_fault(&mut self) -> Option<DistSurfaceError> {
        self.control.take_fault()
    }

    fn tick_count(&self) -> u64 {
        self.control.tick_count()
    }
}

impl Drop for SpinPacer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_stop_joins_thread() {
        let mut pacer = SpinPacer::new("test");
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        pacer
            .start(Arc::new(move || {
                count_clone.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_micros(200));
                Ok(TickOutcome::Rendered)
            }))
            .unwrap();

        thread::sleep(Duration::from_millis(20));
        pacer.stop().unwrap();

        let after_stop = count.load(Ordering::SeqCst);
        assert!(after_stop > 0);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_start_twice_fails() {
        let mut pacer = SpinPacer::new("test");
        pacer.start(Arc::new(|| Ok(TickOutcome::Skipped))).unwrap();
        assert!(pacer.start(Arc::new(|| Ok(TickOutcome::Skipped))).is_err());
        pacer.stop().unwrap();
        pacer.stop().unwrap();
    }
}
