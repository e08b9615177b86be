//! 显示刷新刷新源
//!
//! 在显示器每次垂直刷新时产生节拍，节拍在回调内同步执行。
//!
//! - macOS：使用 CoreVideo 的 `CVDisplayLink`，回调运行在 CoreVideo 的后台线程
//! - 其他平台：按配置的刷新率运行的软件垂直同步线程
//!
//! 停止时先取消节拍，再停掉显示链接；`CVDisplayLinkStop` 等回调线程退出后才返回。

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::core::config::PacerKind;
use crate::core::error::{DistSurfaceError, Result, SurfaceError};
use super::timer::{run_fixed_rate, PacerThread};
use super::{FramePacer, PacerControl, TickHandler};

enum Driver {
    Software(PacerThread),
    #[cfg(target_os = "macos")]
    CoreVideo(core_video::CoreVideoLink),
}

/// 显示刷新刷新源
pub struct DisplayLinkPacer {
    name: String,
    refresh_hz: u32,
    use_core_video: bool,
    control: Arc<PacerControl>,
    driver: Option<Driver>,
}

impl DisplayLinkPacer {
    /// 创建平台默认的显示刷新源
    ///
    /// `refresh_hz` 只用于软件垂直同步。
    pub fn new(refresh_hz: u32, name: &str) -> Self {
        Self {
            name: name.to_string(),
            refresh_hz,
            use_core_video: cfg!(target_os = "macos"),
            control: PacerControl::new(),
            driver: None,
        }
    }

    /// 始终使用软件垂直同步线程
    pub fn software(refresh_hz: u32, name: &str) -> Self {
        let mut pacer = Self::new(refresh_hz, name);
        pacer.use_core_video = false;
        pacer
    }

    /// 软件垂直同步的刷新间隔
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(1) / self.refresh_hz.max(1)
    }

    fn start_software(&self, handler: TickHandler) -> Result<Driver> {
        let control = Arc::clone(&self.control);
        let interval = self.refresh_interval();
        let thread = PacerThread::spawn(format!("{}-vsync", self.name), move |sleeper| {
            run_fixed_rate(&control, &handler, interval, interval, &sleeper);
        })?;
        Ok(Driver::Software(thread))
    }

    #[cfg(target_os = "macos")]
    fn start_core_video(&self, handler: TickHandler) -> Result<Driver> {
        core_video::CoreVideoLink::start(Arc::clone(&self.control), handler).map(Driver::CoreVideo)
    }

    #[cfg(not(target_os = "macos"))]
    fn start_core_video(&self, handler: TickHandler) -> Result<Driver> {
        self.start_software(handler)
    }
}

impl FramePacer for DisplayLinkPacer {
    fn kind(&self) -> PacerKind {
        PacerKind::DisplayLink
    }

    fn start(&mut self, handler: TickHandler) -> Result<()> {
        if self.refresh_hz == 0 {
            return Err(SurfaceError::Pacer("refresh rate must be greater than 0".to_string()).into());
        }
        if !self.control.begin() {
            return Err(SurfaceError::Pacer("display link is already running".to_string()).into());
        }
        if let Some(stale) = self.driver.take() {
            stop_driver(stale)?;
        }

        let started = if self.use_core_video {
            self.start_core_video(handler)
        } else {
            self.start_software(handler)
        };
        match started {
            Ok(driver) => self.driver = Some(driver),
            Err(e) => {
                self.control.cancel();
                return Err(e);
            }
        }

        debug!(
            name = %self.name,
            core_video = self.use_core_video,
            refresh_hz = self.refresh_hz,
            "Display link started"
        );
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.control.cancel();
        if let Some(driver) = self.driver.take() {
            stop_driver(driver)?;
            debug!(name = %self.name, "Display link stopped");
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

fn stop_driver(driver: Driver) -> Result<()> {
    match driver {
        Driver::Software(thread) => thread.join(),
        #[cfg(target_os = "macos")]
        Driver::CoreVideo(link) => link.stop(),
    }
}

impl Drop for DisplayLinkPacer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(target_os = "macos")]
mod core_video {
    use std::ffi::c_void;
    use std::pin::Pin;
    use std::ptr::NonNull;
    use std::sync::Arc;

    use objc2_core_foundation::CFRetained;
    use objc2_core_video::{kCVReturnSuccess, CVDisplayLink, CVTimeStamp};

    use crate::core::error::{Result, SurfaceError};
    use crate::pacer::{PacerControl, TickHandler};

    struct CallbackState {
        control: Arc<PacerControl>,
        handler: TickHandler,
    }

    /// `CVDisplayLink` 及其回调状态
    pub(super) struct CoreVideoLink {
        raw: CFRetained<CVDisplayLink>,
        // 回调持有指向它的裸指针，必须比 raw 活得久
        state: Pin<Box<CallbackState>>,
    }

    // SAFETY: CVDisplayLink 的启动/停止函数可以从任意线程调用，
    // 回调状态只包含 Send + Sync 的成员
    unsafe impl Send for CoreVideoLink {}

    impl CoreVideoLink {
        #[allow(deprecated)]
        pub(super) fn start(control: Arc<PacerControl>, handler: TickHandler) -> Result<Self> {
            let state = Box::pin(CallbackState { control, handler });

            let mut link_ptr: *mut CVDisplayLink = std::ptr::null_mut();
            // SAFETY: link_ptr 是有效的输出指针
            let ret = unsafe {
                CVDisplayLink::create_with_active_cg_displays(NonNull::new_unchecked(&mut link_ptr))
            };
            if ret != kCVReturnSuccess {
                return Err(failure("CVDisplayLinkCreateWithActiveCGDisplays", ret));
            }
            let raw = NonNull::new(link_ptr)
                .ok_or_else(|| failure("CVDisplayLinkCreateWithActiveCGDisplays", ret))?;
            // SAFETY: Create 规则，返回 +1 引用
            let raw = unsafe { CFRetained::from_raw(raw) };

            let state_ptr: *const CallbackState = &*state;
            // SAFETY: 回调签名匹配，state 在 CoreVideoLink 存活期间有效
            let ret = unsafe {
                raw.set_output_callback(Some(display_link_callback), state_ptr as *mut c_void)
            };
            if ret != kCVReturnSuccess {
                return Err(failure("CVDisplayLinkSetOutputCallback", ret));
            }

            let ret = raw.start();
            if ret != kCVReturnSuccess {
                return Err(failure("CVDisplayLinkStart", ret));
            }

            Ok(Self { raw, state })
        }

        /// 停止显示链接
        ///
        /// 返回后回调不会再被调用，随后释放回调状态。
        #[allow(deprecated)]
        pub(super) fn stop(self) -> Result<()> {
            self.state.control.cancel();
            let ret = if self.raw.is_running() {
                self.raw.stop()
            } else {
                kCVReturnSuccess
            };
            if ret != kCVReturnSuccess {
                return Err(failure("CVDisplayLinkStop", ret));
            }
            Ok(())
        }
    }

    fn failure(call: &str, code: i32) -> crate::core::error::DistSurfaceError {
        SurfaceError::Pacer(format!("{} failed ({})", call, code)).into()
    }

    /// CoreVideo 在其后台线程上调用的回调
    ///
    /// # Safety
    ///
    /// `user_info` 必须指向 `CoreVideoLink` 中固定的 `CallbackState`。
    unsafe extern "C-unwind" fn display_link_callback(
        _display_link: NonNull<CVDisplayLink>,
        _in_now: NonNull<CVTimeStamp>,
        _in_output_time: NonNull<CVTimeStamp>,
        _flags_in: u64,
        _flags_out: NonNull<u64>,
        user_info: *mut c_void,
    ) -> i32 {
        // SAFETY: user_info 是 start 中设置的 CallbackState 指针
        let state = unsafe { &*(user_info.cast::<CallbackState>()) };
        let _ = state.control.run_tick(&state.handler);

        kCVReturnSuccess
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pacer::TickOutcome;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_software_vsync_ticks_and_stops() {
        let mut pacer = DisplayLinkPacer::software(240, "test");
        assert_eq!(pacer.refresh_interval(), Duration::from_secs(1) / 240);

        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        pacer
            .start(Arc::new(move || {
                count_clone.fetch_add(1, Ordering::SeqCst);
                Ok(TickOutcome::Rendered)
            }))
            .unwrap();

        thread::sleep(Duration::from_millis(60));
        pacer.stop().unwrap();

        let after_stop = count.load(Ordering::SeqCst);
        assert!(after_stop > 0);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_software_keeps_settings_of_new() {
        let pacer = DisplayLinkPacer::software(75, "soft");
        assert!(!pacer.use_core_video);
        assert_eq!(pacer.refresh_hz, 75);
        assert_eq!(pacer.name, "soft");
        assert!(!pacer.is_running());
        assert_eq!(pacer.kind(), PacerKind::DisplayLink);
    }

    #[test]
    fn test_zero_refresh_rate_rejected() {
        let mut pacer = DisplayLinkPacer::software(0, "test");
        assert!(pacer.start(Arc::new(|| Ok(TickOutcome::Skipped))).is_err());
        assert!(!pacer.is_running());
    }
}
