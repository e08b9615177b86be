//! 定时器刷新源
//!
//! 单个定时器线程按固定间隔产生节拍。节拍之间不会重叠：
//! 如果一次节拍执行得比间隔还久，期间错过的截止时间直接丢弃，
//! 计划按原相位顺延，不做补偿性的连续触发。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::core::config::PacerKind;
use crate::core::error::{DistSurfaceError, Result, SurfaceError};
use super::{FramePacer, PacerControl, TickHandler};

/// 刷新源的工作线程
///
/// 丢弃 `wake` 发送端会立即唤醒正在等待下一个截止时间的线程。
pub(crate) struct PacerThread {
    handle: JoinHandle<()>,
    wake: Sender<()>,
}

impl PacerThread {
    /// 以给定名称启动线程
    pub(crate) fn spawn<F>(name: String, body: F) -> Result<Self>
    where
        F: FnOnce(Receiver<()>) + Send + 'static,
    {
        let (wake, sleeper) = mpsc::channel();
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || body(sleeper))
            .map_err(|e| SurfaceError::Pacer(format!("Failed to spawn pacer thread: {}", e)))?;
        Ok(Self { handle, wake })
    }

    /// 唤醒并等待线程退出
    ///
    /// 调用前必须已经取消了 `PacerControl`。
    pub(crate) fn join(self) -> Result<()> {
        if thread::current().id() == self.handle.thread().id() {
            return Err(SurfaceError::Pacer(
                "a pacer cannot be stopped from its own tick".to_string(),
            )
            .into());
        }

        drop(self.wake);
        self.handle
            .join()
            .map_err(|_| SurfaceError::Pacer("pacer thread panicked".to_string()).into())
    }
}

/// 固定频率循环
///
/// 返回错过（被丢弃）的截止时间数量。
pub(crate) fn run_fixed_rate(
    control: &PacerControl,
    handler: &TickHandler,
    interval: Duration,
    initial_delay: Duration,
    sleeper: &Receiver<()>,
) -> u64 {
    let mut missed = 0u64;
    let mut deadline = Instant::now() + initial_delay;

    loop {
        let now = Instant::now();
        if deadline > now {
            match sleeper.recv_timeout(deadline - now) {
                Err(RecvTimeoutError::Timeout) => {}
                // 发送端被丢弃或收到消息：停止请求
                _ => break,
            }
        }

        if control.run_tick(handler).is_none() {
            break;
        }

        deadline += interval;
        let now = Instant::now();
        if now > deadline && !interval.is_zero() {
            let behind = (now - deadline).as_nanos() / interval.as_nanos() + 1;
            let skipped = u32::try_from(behind).unwrap_or(u32::MAX);
            missed += u64::from(skipped);
            trace!(skipped, "Tick overran its interval, dropping missed deadlines");
            deadline += interval * skipped;
        }
    }

    missed
}

/// 定时器刷新源
pub struct TimerPacer {
    name: String,
    interval: Duration,
    initial_delay: Duration,
    control: Arc<PacerControl>,
    missed: Arc<AtomicU64>,
    worker: Option<PacerThread>,
}

impl TimerPacer {
    /// 创建定时器刷新源，第一个节拍在一个间隔之后到达
    pub fn new(interval: Duration, name: &str) -> Self {
        Self {
            name: name.to_string(),
            interval,
            initial_delay: interval,
            control: PacerControl::new(),
            missed: Arc::new(AtomicU64::new(0)),
            worker: None,
        }
    }

    /// 设置第一个节拍之前的延迟
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// 节拍间隔
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 因为节拍超时而丢弃的截止时间数量
    pub fn missed_ticks(&self) -> u64 {
        self.missed.load(Ordering::Acquire)
    }
}

impl FramePacer for TimerPacer {
    fn kind(&self) -> PacerKind {
        PacerKind::Timer
    }

    fn start(&mut self, handler: TickHandler) -> Result<()> {
        if self.interval.is_zero() {
            return Err(SurfaceError::Pacer("timer interval must be greater than 0".to_string()).into());
        }
        if !self.control.begin() {
            return Err(SurfaceError::Pacer("timer pacer is already running".to_string()).into());
        }
        // 上一次因错误退出的线程
        if let Some(stale) = self.worker.take() {
            stale.join()?;
        }

        let control = Arc::clone(&self.control);
        let missed = Arc::clone(&self.missed);
        let interval = self.interval;
        let initial_delay = self.initial_delay;

        let spawned = PacerThread::spawn(format!("{}-timer", self.name), move |sleeper| {
            let skipped = run_fixed_rate(&control, &handler, interval, initial_delay, &sleeper);
            missed.fetch_add(skipped, Ordering::AcqRel);
        });
        match spawned {
            Ok(worker) => self.worker = Some(worker),
            Err(e) => {
                self.control.cancel();
                return Err(e);
            }
        }

        debug!(name = %self.name, interval_ms = interval.as_millis() as u64, "Timer pacer started");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.control.cancel();
        if let Some(worker) = self.worker.take() {
            worker.join()?;
            debug!(name = %self.name, "Timer pacer stopped");
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

impl Drop for TimerPacer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
