//! 渲染表面
//!
//! 持有绑定到原生可绘制对象的交换链，由刷新源驱动，每个节拍渲染一帧：
//!
//! 1. 锁存器中有未应用的尺寸时调整交换链，并触发 `Resized`
//! 2. 按注册顺序调用渲染回调，回调把命令记录到每表面的命令列表
//! 3. 每个回调结束记录后立即提交，下一个回调可以重新 `begin`
//! 4. 呈现
//!
//! 回调返回时命令列表仍在记录状态视为本帧出错，不会呈现。
//!
//! 同一个表面同一时间最多执行一个节拍。任何一步出错都会被记录，
//! 然后作为 `RenderFault` 交给刷新源，刷新源随即停止。
//!
//! # 使用示例
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use dist_surface::core::{Color, GraphicsBackend, HostPlatform};
//! use dist_surface::gfx::{GraphicsDevice, HeadlessDevice, SwapchainSource};
//! use dist_surface::pacer::TimerPacer;
//! use dist_surface::surface::{RenderSurface, SurfaceDescriptor};
//!
//! let device: Arc<dyn GraphicsDevice> = Arc::new(HeadlessDevice::default());
//! let descriptor = SurfaceDescriptor::new("doc", GraphicsBackend::Headless, HostPlatform::Headless);
//! let pacer = TimerPacer::new(Duration::from_millis(16), "doc");
//!
//! let mut surface = RenderSurface::new(device, descriptor, Box::new(pacer)).unwrap();
//! surface.on_rendering(|frame| {
//!     frame.commands.begin()?;
//!     frame.commands.set_framebuffer(frame.framebuffer)?;
//!     frame.commands.clear_color_target(0, Color::BLUE)?;
//!     frame.commands.end()
//! });
//! surface.attach(SwapchainSource::Headless, 300, 300).unwrap();
//! surface.start().unwrap();
//! surface.dispose().unwrap();
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, trace, warn};

use crate::core::config::{Config, DepthFormat, GraphicsBackend, HostPlatform};
use crate::core::error::{DistSurfaceError, GraphicsError, Result, SurfaceError};
use crate::core::event::{EventType, Listeners, SurfaceEvent};
use crate::gfx::command::{CommandList, CommandListState};
use crate::gfx::device::{Framebuffer, GraphicsDevice, Swapchain, SwapchainDescription, SwapchainSource};
use crate::pacer::{FramePacer, TickHandler, TickOutcome};
use crate::{surface_error, surface_info, surface_warn};
use super::resize::ResizeLatch;
use super::state::{AtomicSurfaceState, PlaybackState, SurfaceState};

/// 表面描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceDescriptor {
    /// 名称，用于日志
    pub name: String,
    pub backend: GraphicsBackend,
    pub host: HostPlatform,
    pub vsync: bool,
    pub depth_format: Option<DepthFormat>,
    pub color_srgb: bool,
}

impl SurfaceDescriptor {
    pub fn new(name: &str, backend: GraphicsBackend, host: HostPlatform) -> Self {
        Self {
            name: name.to_string(),
            backend,
            host,
            vsync: true,
            depth_format: None,
            color_srgb: false,
        }
    }

    /// 从配置构建
    pub fn from_config(name: &str, config: &Config) -> Self {
        Self {
            vsync: config.surface.vsync,
            depth_format: config.surface.depth_format,
            ..Self::new(name, config.graphics.backend, config.graphics.host)
        }
    }

    pub fn with_depth(mut self, depth_format: Option<DepthFormat>) -> Self {
        self.depth_format = depth_format;
        self
    }

    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }
}

/// 渲染回调看到的一帧
pub struct FrameContext<'a> {
    /// 帧序号，从 0 开始，只在成功呈现后递增
    pub frame_index: u64,
    /// 交换链当前尺寸
    pub width: u32,
    pub height: u32,
    /// 交换链当前帧缓冲
    pub framebuffer: Framebuffer,
    /// 每表面的命令列表
    pub commands: &'a mut CommandList,
    /// 图形设备
    pub device: &'a dyn GraphicsDevice,
}

type RenderingHook = Box<dyn FnMut(&mut FrameContext<'_>) -> Result<()> + Send>;

struct FrameResources {
    swapchain: Box<dyn Swapchain>,
    commands: CommandList,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 宿主线程、刷新源线程和句柄共享的表面状态
struct SurfaceShared {
    descriptor: SurfaceDescriptor,
    device: Arc<dyn GraphicsDevice>,
    state: AtomicSurfaceState,
    latch: ResizeLatch,
    tearing_down: AtomicBool,
    tick_guard: AtomicBool,
    device_ready_fired: AtomicBool,
    frame_index: AtomicU64,
    frames_rendered: AtomicU64,
    resources: Mutex<Option<FrameResources>>,
    events: Listeners<SurfaceEvent>,
    rendering: Mutex<Vec<RenderingHook>>,
}

impl SurfaceShared {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn invalid_state(&self, operation: &'static str) -> DistSurfaceError {
        SurfaceError::InvalidState {
            operation,
            state: self.state.get().name(),
        }
        .into()
    }

    fn notify_resize(&self, width: u32, height: u32) {
        if self.tearing_down.load(Ordering::Acquire) {
            trace!(surface = %self.name(), width, height, "Resize dropped during teardown");
            return;
        }
        self.latch.notify(width, height);
    }

    fn pause(&self) -> Result<()> {
        if self.state.transition(SurfaceState::Running, SurfaceState::Paused) {
            surface_info!(surface = %self.name(), "Surface paused");
            return Ok(());
        }
        match self.state.get() {
            SurfaceState::Paused => Ok(()),
            _ => Err(self.invalid_state("pause")),
        }
    }

    fn resume(&self) -> Result<()> {
        if self.state.transition(SurfaceState::Paused, SurfaceState::Running) {
            surface_info!(surface = %self.name(), "Surface resumed");
            return Ok(());
        }
        match self.state.get() {
            SurfaceState::Running => Ok(()),
            _ => Err(self.invalid_state("resume")),
        }
    }

    /// 一个节拍
    fn tick(&self) -> Result<TickOutcome> {
        if self.state.get() != SurfaceState::Running {
            return Ok(TickOutcome::Skipped);
        }
        if self
            .tick_guard
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            trace!(surface = %self.name(), "Tick already in progress, skipping");
            return Ok(TickOutcome::Skipped);
        }

        let frame = self.frame_index.load(Ordering::Acquire);
        let rendered = self.render_frame(frame);
        self.tick_guard.store(false, Ordering::Release);

        match rendered {
            Ok(true) => {
                self.frame_index.fetch_add(1, Ordering::AcqRel);
                self.frames_rendered.fetch_add(1, Ordering::AcqRel);
                Ok(TickOutcome::Rendered)
            }
            Ok(false) => Ok(TickOutcome::Skipped),
            Err(e) => {
                surface_error!(
                    surface = %self.name(),
                    frame,
                    "Encountered an error while rendering: {}",
                    e
                );
                self.state.set(SurfaceState::Stopped);
                Err(SurfaceError::RenderFault {
                    frame,
                    source: Box::new(e),
                }
                .into())
            }
        }
    }

    /// 返回 `false` 表示资源已经释放，没有渲染
    fn render_frame(&self, frame: u64) -> Result<bool> {
        let mut resources = lock(&self.resources);
        let resources = match resources.as_mut() {
            Some(resources) => resources,
            None => return Ok(false),
        };

        if let Some((width, height)) = self.latch.take_if_dirty() {
            resources.swapchain.resize(width, height)?;
            debug!(surface = %self.name(), width, height, "Applied pending resize");
            self.events.dispatch(&SurfaceEvent::Resized { width, height });
        }

        let (width, height) = resources.swapchain.size();
        let framebuffer = resources.swapchain.framebuffer();
        {
            let mut hooks = lock(&self.rendering);
            let mut context = FrameContext {
                frame_index: frame,
                width,
                height,
                framebuffer,
                commands: &mut resources.commands,
                device: self.device.as_ref(),
            };
            for (index, hook) in hooks.iter_mut().enumerate() {
                hook(&mut context)?;
                match context.commands.state() {
                    CommandListState::Executable => self.device.submit_commands(context.commands)?,
                    CommandListState::Recording => {
                        return Err(GraphicsError::CommandExecution(format!(
                            "rendering hook {} returned while the command list was still recording",
                            index
                        ))
                        .into());
                    }
                    _ => {}
                }
            }
        }

        self.device.swap_buffers(resources.swapchain.as_mut())?;

        trace!(surface = %self.name(), frame, "Frame presented");
        Ok(true)
    }
}

/// 可以跨线程使用的表面句柄
///
/// 布局回调、生命周期通知等来自宿主其他线程的调用通过它进入表面。
#[derive(Clone)]
pub struct SurfaceHandle {
    shared: Arc<SurfaceShared>,
}

impl SurfaceHandle {
    /// 请求新的交换链尺寸，在下一帧之前生效
    pub fn notify_resize(&self, width: u32, height: u32) {
        self.shared.notify_resize(width, height);
    }

    pub fn pause(&self) -> Result<()> {
        self.shared.pause()
    }

    pub fn resume(&self) -> Result<()> {
        self.shared.resume()
    }

    pub fn state(&self) -> SurfaceState {
        self.shared.state.get()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.shared.frames_rendered.load(Ordering::Acquire)
    }
}

/// 渲染表面
pub struct RenderSurface {
    shared: Arc<SurfaceShared>,
    pacer: Box<dyn FramePacer>,
    fault: Option<DistSurfaceError>,
}

impl RenderSurface {
    /// 创建表面
    ///
    /// 后端与宿主不匹配时立即返回不可恢复的错误，不尝试其他后端。
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        descriptor: SurfaceDescriptor,
        pacer: Box<dyn FramePacer>,
    ) -> Result<Self> {
        descriptor.host.check_backend(descriptor.backend)?;
        if device.is_disposed() {
            return Err(GraphicsError::DeviceDisposed.into());
        }
        if device.backend() != descriptor.backend && device.backend() != GraphicsBackend::Headless {
            warn!(
                surface = %descriptor.name,
                requested = descriptor.backend.name(),
                device = device.backend().name(),
                "Surface backend differs from the device backend"
            );
        }

        debug!(
            surface = %descriptor.name,
            backend = descriptor.backend.name(),
            host = descriptor.host.name(),
            pacer = pacer.kind().name(),
            "Render surface created"
        );

        Ok(Self {
            shared: Arc::new(SurfaceShared {
                descriptor,
                device,
                state: AtomicSurfaceState::new(SurfaceState::Uninitialized),
                latch: ResizeLatch::new(),
                tearing_down: AtomicBool::new(false),
                tick_guard: AtomicBool::new(false),
                device_ready_fired: AtomicBool::new(false),
                frame_index: AtomicU64::new(0),
                frames_rendered: AtomicU64::new(0),
                resources: Mutex::new(None),
                events: Listeners::new(),
                rendering: Mutex::new(Vec::new()),
            }),
            pacer,
            fault: None,
        })
    }

    /// 表面描述
    pub fn descriptor(&self) -> &SurfaceDescriptor {
        &self.shared.descriptor
    }

    /// 图形设备
    pub fn device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.shared.device
    }

    /// 跨线程句柄
    pub fn handle(&self) -> SurfaceHandle {
        SurfaceHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// 注册 `DeviceReady` 监听器（交换链创建后、首帧之前触发一次）
    pub fn on_device_ready<F>(&self, handler: F)
    where
        F: FnMut(&SurfaceEvent) + Send + 'static,
    {
        self.shared.events.add_for(EventType::DeviceReady, handler);
    }

    /// 注册 `Resized` 监听器（锁存的尺寸应用到交换链之后触发）
    pub fn on_resized<F>(&self, handler: F)
    where
        F: FnMut(&SurfaceEvent) + Send + 'static,
    {
        self.shared.events.add_for(EventType::Resized, handler);
    }

    /// 注册渲染回调，按注册顺序在每帧调用
    ///
    /// 回调自己 `begin`/`end` 命令列表，结束的记录在回调返回后提交。
    pub fn on_rendering<F>(&self, hook: F)
    where
        F: FnMut(&mut FrameContext<'_>) -> Result<()> + Send + 'static,
    {
        lock(&self.shared.rendering).push(Box::new(hook));
    }

    /// 绑定可绘制对象，创建交换链和命令列表
    pub fn attach(&mut self, source: SwapchainSource, width: u32, height: u32) -> Result<()> {
        let shared = &self.shared;
        if shared.state.get() != SurfaceState::Uninitialized {
            return Err(shared.invalid_state("attach"));
        }

        let description = SwapchainDescription {
            source,
            width,
            height,
            depth_format: shared.descriptor.depth_format,
            vsync: shared.descriptor.vsync,
            color_srgb: shared.descriptor.color_srgb,
        };
        let mut swapchain = shared.device.create_swapchain(&description)?;
        let commands = match shared.device.create_command_list() {
            Ok(commands) => commands,
            Err(e) => {
                swapchain.dispose();
                return Err(e);
            }
        };

        *lock(&shared.resources) = Some(FrameResources { swapchain, commands });
        shared.state.set(SurfaceState::Attached);
        surface_info!(surface = %shared.name(), width, height, "Surface attached");
        Ok(())
    }

    /// 触发 `DeviceReady` 并启动刷新源
    pub fn start(&mut self) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        if shared.state.get() != SurfaceState::Attached {
            return Err(shared.invalid_state("start"));
        }

        if !shared.device_ready_fired.swap(true, Ordering::AcqRel) {
            let size = lock(&shared.resources).as_ref().map(|r| r.swapchain.size());
            if let Some((width, height)) = size {
                shared.events.dispatch(&SurfaceEvent::DeviceReady { width, height });
            }
        }

        shared.state.set(SurfaceState::Running);
        let tick_target = Arc::clone(&shared);
        let handler: TickHandler = Arc::new(move || tick_target.tick());
        if let Err(e) = self.pacer.start(handler) {
            shared.state.set(SurfaceState::Stopped);
            surface_error!(surface = %shared.name(), "Failed to start frame pacer: {}", e);
            return Err(e);
        }

        surface_info!(surface = %shared.name(), pacer = self.pacer.kind().name(), "Surface started");
        Ok(())
    }

    /// 暂停渲染，不释放任何资源
    pub fn pause(&self) -> Result<()> {
        self.shared.pause()
    }

    /// 恢复渲染
    pub fn resume(&self) -> Result<()> {
        self.shared.resume()
    }

    /// 停止刷新源，阻塞到正在执行的节拍返回
    pub fn stop(&mut self) -> Result<()> {
        match self.shared.state.get() {
            SurfaceState::Disposed | SurfaceState::Stopped if !self.pacer.is_running() => {
                return Ok(())
            }
            _ => {}
        }

        self.pacer.stop()?;
        self.collect_fault();
        if self.shared.state.get() != SurfaceState::Disposed {
            self.shared.state.set(SurfaceState::Stopped);
        }
        surface_info!(surface = %self.shared.name(), "Surface stopped");
        Ok(())
    }

    /// 请求新的交换链尺寸，在下一帧之前生效
    ///
    /// 释放开始之后的请求被丢弃。
    pub fn notify_resize(&self, width: u32, height: u32) {
        self.shared.notify_resize(width, height);
    }

    /// 释放表面：停止刷新源，然后依次释放交换链和命令列表
    ///
    /// 幂等。渲染过程中发生过错误时，第一次调用返回该错误。
    pub fn dispose(&mut self) -> Result<()> {
        if self.shared.state.get() == SurfaceState::Disposed {
            return Ok(());
        }
        self.shared.tearing_down.store(true, Ordering::Release);

        let stopped = self.pacer.stop();
        self.collect_fault();

        if let Some(mut resources) = lock(&self.shared.resources).take() {
            resources.swapchain.dispose();
            resources.commands.dispose();
        }
        self.shared.state.set(SurfaceState::Disposed);
        surface_info!(
            surface = %self.shared.name(),
            frames = self.frames_rendered(),
            "Surface disposed"
        );

        stopped?;
        match self.fault.take() {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }

    /// 取出渲染错误（如果发生过）
    pub fn take_fault(&mut self) -> Option<DistSurfaceError> {
        self.collect_fault();
        self.fault.take()
    }

    fn collect_fault(&mut self) {
        if let Some(fault) = self.pacer.take_fault() {
            self.fault = Some(fault);
        }
    }

    /// 当前状态
    pub fn state(&self) -> SurfaceState {
        self.shared.state.get()
    }

    /// 当前播放状态
    pub fn playback(&self) -> PlaybackState {
        self.shared.state.get().playback()
    }

    /// 成功呈现的帧数
    pub fn frames_rendered(&self) -> u64 {
        self.shared.frames_rendered.load(Ordering::Acquire)
    }

    /// 交换链当前尺寸（未绑定或已释放时为 `None`）
    pub fn swapchain_size(&self) -> Option<(u32, u32)> {
        lock(&self.shared.resources)
            .as_ref()
            .map(|resources| resources.swapchain.size())
    }

    /// 刷新源
    pub fn pacer(&self) -> &dyn FramePacer {
        self.pacer.as_ref()
    }
}

impl Drop for RenderSurface {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            surface_warn!(surface = %self.shared.name(), "Error while dropping surface: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::color::Color;
    use crate::gfx::headless::HeadlessDevice;
    use crate::pacer::{ManualPacer, ManualTrigger};

    fn manual_surface(device: Arc<HeadlessDevice>) -> (RenderSurface, ManualTrigger) {
        let (pacer, trigger) = ManualPacer::new();
        let descriptor =
            SurfaceDescriptor::new("test", GraphicsBackend::Headless, HostPlatform::Headless);
        let surface = RenderSurface::new(device, descriptor, Box::new(pacer)).unwrap();
        (surface, trigger)
    }

    fn clear_to(color: Color) -> impl FnMut(&mut FrameContext<'_>) -> Result<()> + Send {
        move |frame| {
            frame.commands.begin()?;
            frame.commands.set_framebuffer(frame.framebuffer)?;
            frame.commands.clear_color_target(0, color)?;
            frame.commands.end()
        }
    }

    #[test]
    fn test_unsupported_backend_rejected() {
        let (pacer, _trigger) = ManualPacer::new();
        let descriptor =
            SurfaceDescriptor::new("test", GraphicsBackend::Metal, HostPlatform::Win32Forms);
        let err = RenderSurface::new(Arc::new(HeadlessDevice::default()), descriptor, Box::new(pacer))
            .err()
            .unwrap();
        assert!(err.is_unsupported_configuration());
    }

    #[test]
    fn test_lifecycle_order() {
        let device = Arc::new(HeadlessDevice::default());
        let (mut surface, trigger) = manual_surface(device.clone());
        surface.on_rendering(clear_to(Color::RED));

        assert_eq!(surface.state(), SurfaceState::Uninitialized);
        assert!(surface.start().is_err());

        surface.attach(SwapchainSource::Headless, 64, 32).unwrap();
        assert_eq!(surface.state(), SurfaceState::Attached);
        assert_eq!(surface.swapchain_size(), Some((64, 32)));

        surface.start().unwrap();
        assert_eq!(surface.playback(), PlaybackState::Running);
        assert_eq!(trigger.tick().unwrap(), TickOutcome::Rendered);

        surface.stop().unwrap();
        assert_eq!(surface.state(), SurfaceState::Stopped);
        assert_eq!(trigger.tick().unwrap(), TickOutcome::Skipped);

        surface.dispose().unwrap();
        assert_eq!(surface.state(), SurfaceState::Disposed);
        assert_eq!(surface.swapchain_size(), None);
        assert_eq!(device.present_count(), 1);
        assert_eq!(device.presented_frames()[0].clear_color, Some(Color::RED));
    }

    #[test]
    fn test_frame_without_hooks_still_presents() {
        let device = Arc::new(HeadlessDevice::default());
        let (mut surface, trigger) = manual_surface(device.clone());
        surface.attach(SwapchainSource::Headless, 8, 8).unwrap();
        surface.start().unwrap();

        assert_eq!(trigger.tick().unwrap(), TickOutcome::Rendered);
        assert_eq!(device.submission_count(), 0);
        assert_eq!(device.present_count(), 1);
        assert_eq!(device.presented_frames()[0].clear_color, None);
    }

    #[test]
    fn test_pause_and_resume() {
        let device = Arc::new(HeadlessDevice::default());
        let (mut surface, trigger) = manual_surface(device.clone());
        surface.attach(SwapchainSource::Headless, 8, 8).unwrap();
        assert!(surface.pause().is_err());

        surface.start().unwrap();
        surface.pause().unwrap();
        surface.pause().unwrap();
        assert_eq!(trigger.tick().unwrap(), TickOutcome::Skipped);
        assert_eq!(surface.frames_rendered(), 0);

        surface.handle().resume().unwrap();
        assert_eq!(trigger.tick().unwrap(), TickOutcome::Rendered);
        assert_eq!(surface.frames_rendered(), 1);
    }

    #[test]
    fn test_render_fault_stops_surface() {
        let device = Arc::new(HeadlessDevice::default());
        let (mut surface, trigger) = manual_surface(device.clone());
        surface.on_rendering(|frame| {
            if frame.frame_index == 1 {
                return Err(SurfaceError::Callback("shader exploded".to_string()).into());
            }
            Ok(())
        });
        surface.attach(SwapchainSource::Headless, 8, 8).unwrap();
        surface.start().unwrap();

        assert_eq!(trigger.tick().unwrap(), TickOutcome::Rendered);
        assert!(trigger.tick().is_err());
        assert_eq!(surface.playback(), PlaybackState::Stopped);
        assert_eq!(surface.frames_rendered(), 1);

        let fault = surface.take_fault().unwrap();
        match fault {
            DistSurfaceError::Surface(SurfaceError::RenderFault { frame, .. }) => assert_eq!(frame, 1),
            other => panic!("unexpected fault {:?}", other),
        }
        assert!(surface.dispose().is_ok());
    }

    #[test]
    fn test_dispose_returns_fault_once() {
        let device = Arc::new(HeadlessDevice::default());
        let (mut surface, trigger) = manual_surface(device.clone());
        surface.attach(SwapchainSource::Headless, 8, 8).unwrap();
        surface.start().unwrap();

        // 设备在表面之前释放：下一帧失败而不是访问已释放的资源
        device.dispose();
        assert!(trigger.tick().is_err());

        let err = surface.dispose().unwrap_err();
        assert!(err.to_string().contains("disposed"));
        assert!(surface.dispose().is_ok());
    }

    #[test]
    fn test_resize_dropped_after_teardown() {
        let device = Arc::new(HeadlessDevice::default());
        let (mut surface, _trigger) = manual_surface(device.clone());
        surface.attach(SwapchainSource::Headless, 8, 8).unwrap();
        let handle = surface.handle();

        surface.dispose().unwrap();
        handle.notify_resize(100, 100);
        assert!(!surface.shared.latch.is_dirty());
        assert_eq!(handle.state(), SurfaceState::Disposed);
        assert!(device.resize_calls().is_empty());
    }
}
