//! 嵌入式表面控件
//!
//! 把原生子窗口和渲染表面组合成宿主可以直接放进窗体的控件：
//! 创建时建窗口并绑定交换链，尺寸变化时先移动窗口再通知表面，
//! 释放时先释放表面再销毁窗口。

use std::sync::Arc;

use crate::core::error::Result;
use crate::core::event::SurfaceEvent;
use crate::gfx::device::GraphicsDevice;
use crate::pacer::FramePacer;
use crate::surface::{clamp_dimension, FrameContext, RenderSurface, SurfaceDescriptor, SurfaceState};
use crate::surface_warn;
use super::window::{EmbeddedWindow, NativeWindowHandle, NativeWindowSystem, PointerListeners};

/// 控件尺寸换算为交换链尺寸
fn control_size(width: i32, height: i32) -> (u32, u32) {
    (
        clamp_dimension(f64::from(width), 1.0),
        clamp_dimension(f64::from(height), 1.0),
    )
}

fn window_dimension(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// 嵌入宿主窗体的渲染控件
pub struct EmbeddedSurfaceControl {
    surface: RenderSurface,
    window: EmbeddedWindow,
    disposed: bool,
}

impl EmbeddedSurfaceControl {
    /// 在 `parent` 下创建子窗口并绑定交换链
    ///
    /// 负尺寸按 0 处理，0×0 的窗口是合法的。
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        descriptor: SurfaceDescriptor,
        pacer: Box<dyn FramePacer>,
        system: Box<dyn NativeWindowSystem>,
        parent: isize,
        width: i32,
        height: i32,
    ) -> Result<Self> {
        let mut surface = RenderSurface::new(device, descriptor, pacer)?;
        let (width, height) = control_size(width, height);
        let window = EmbeddedWindow::create(
            system,
            parent,
            window_dimension(width),
            window_dimension(height),
        )?;

        // SAFETY: 表面在 dispose 中先于窗口释放
        let source = unsafe { window.swapchain_source() };
        surface.attach(source, width, height)?;

        Ok(Self {
            surface,
            window,
            disposed: false,
        })
    }

    pub fn surface(&self) -> &RenderSurface {
        &self.surface
    }

    pub fn window_handle(&self) -> NativeWindowHandle {
        self.window.handle()
    }

    /// 指针事件监听器
    pub fn pointer(&self) -> &PointerListeners {
        self.window.pointer()
    }

    pub fn on_device_ready<F>(&self, handler: F)
    where
        F: FnMut(&SurfaceEvent) + Send + 'static,
    {
        self.surface.on_device_ready(handler);
    }

    pub fn on_resized<F>(&self, handler: F)
    where
        F: FnMut(&SurfaceEvent) + Send + 'static,
    {
        self.surface.on_resized(handler);
    }

    pub fn on_rendering<F>(&self, hook: F)
    where
        F: FnMut(&mut FrameContext<'_>) -> Result<()> + Send + 'static,
    {
        self.surface.on_rendering(hook);
    }

    pub fn start(&mut self) -> Result<()> {
        self.surface.start()
    }

    pub fn pause(&self) -> Result<()> {
        self.surface.pause()
    }

    pub fn resume(&self) -> Result<()> {
        self.surface.resume()
    }

    pub fn stop(&mut self) -> Result<()> {
        self.surface.stop()
    }

    pub fn state(&self) -> SurfaceState {
        self.surface.state()
    }

    /// 宿主控件尺寸变化
    ///
    /// 释放之后的调用被忽略。
    pub fn resize(&mut self, width: i32, height: i32) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        let (width, height) = control_size(width, height);
        self.window
            .resize(window_dimension(width), window_dimension(height))?;
        self.surface.notify_resize(width, height);
        Ok(())
    }

    /// 释放表面，然后销毁窗口（只执行一次）
    pub fn dispose(&mut self) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        self.disposed = true;

        let surface_result = self.surface.dispose();
        let window_result = self.window.destroy();
        surface_result?;
        window_result
    }
}

impl Drop for EmbeddedSurfaceControl {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            surface_warn!("Error while dropping embedded surface control: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::core::config::{GraphicsBackend, HostPlatform};
    use crate::gfx::headless::HeadlessDevice;
    use crate::native::message::{lparam_from_point, WM_MOUSEMOVE};
    use crate::native::window::testing::{Call, RecordingWindowSystem};
    use crate::pacer::{ManualPacer, ManualTrigger};

    fn control(
        device: Arc<HeadlessDevice>,
        width: i32,
        height: i32,
    ) -> (EmbeddedSurfaceControl, ManualTrigger, Arc<Mutex<Vec<Call>>>) {
        let (pacer, trigger) = ManualPacer::new();
        let (system, calls) = RecordingWindowSystem::new();
        let descriptor =
            SurfaceDescriptor::new("control", GraphicsBackend::Headless, HostPlatform::Headless);
        let control = EmbeddedSurfaceControl::new(
            device,
            descriptor,
            Box::new(pacer),
            Box::new(system),
            0x77,
            width,
            height,
        )
        .unwrap();
        (control, trigger, calls)
    }

    #[test]
    fn test_zero_sized_control_is_valid() {
        let device = Arc::new(HeadlessDevice::default());
        let (mut control, trigger, calls) = control(Arc::clone(&device), 0, 0);

        assert_eq!(control.state(), SurfaceState::Attached);
        assert_eq!(control.surface().swapchain_size(), Some((0, 0)));
        assert_eq!(calls.lock().unwrap()[0], Call::Create { parent: 0x77, width: 0, height: 0 });

        control.start().unwrap();
        trigger.tick().unwrap();
        control.dispose().unwrap();
    }

    #[test]
    fn test_resize_moves_window_then_latches() {
        let device = Arc::new(HeadlessDevice::default());
        let (mut control, trigger, calls) = control(Arc::clone(&device), 300, 300);
        control.start().unwrap();

        control.resize(150, -20).unwrap();
        let hwnd = control.window_handle().hwnd;
        assert!(calls
            .lock()
            .unwrap()
            .contains(&Call::Move { hwnd, width: 150, height: 0 }));

        trigger.tick().unwrap();
        assert_eq!(control.surface().swapchain_size(), Some((150, 0)));
        let resizes: Vec<(u32, u32)> = device.resize_calls().iter().map(|(_, w, h)| (*w, *h)).collect();
        assert_eq!(resizes, vec![(150, 0)]);
    }

    #[test]
    fn test_dispose_surface_before_window_once() {
        let device = Arc::new(HeadlessDevice::default());
        let (mut control, _trigger, calls) = control(Arc::clone(&device), 64, 64);
        control.start().unwrap();

        control.dispose().unwrap();
        control.dispose().unwrap();
        control.resize(10, 10).unwrap();
        drop(control);

        assert_eq!(device.swapchains_disposed(), 1);
        let destroys = calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, Call::Destroy { .. }))
            .count();
        assert_eq!(destroys, 1);
    }

    #[test]
    fn test_pointer_listeners_reach_router() {
        let device = Arc::new(HeadlessDevice::default());
        let (control, _trigger, _calls) = control(device, 32, 32);
        let entered = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&entered);
        control.pointer().on_mouse_enter(move |_| *sink.lock().unwrap() += 1);

        control.window.router().route(WM_MOUSEMOVE, 0, lparam_from_point(1, 1));
        control.window.router().route(WM_MOUSEMOVE, 0, lparam_from_point(2, 2));
        assert_eq!(*entered.lock().unwrap(), 1);
    }
}
