//! DistSurface 演示程序
//!
//! 用 winit 窗口作为宿主，把渲染表面绑定到窗口的原生句柄上，
//! 每帧用循环的颜色清屏。
//!
//! # 使用方法
//!
//! ```bash
//! # 使用配置文件
//! cargo run
//!
//! # 命令行覆盖后端和刷新源
//! cargo run -- --backend vulkan --pacer timer
//!
//! # 由窗口事件循环驱动渲染
//! cargo run -- --pacer manual
//! ```
//!
//! # 事件处理
//!
//! - `CloseRequested`：退出事件循环
//! - `Resized`：把新尺寸交给表面的尺寸锁存器，下一帧之前生效
//! - `RedrawRequested`：手动刷新源时驱动一帧
//! - `LoopExiting`：先释放表面，再释放设备

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use tracing::{debug, error, info};
use winit::dpi::PhysicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::WindowBuilder;

use dist_surface::core::{log, Config, PacerKind};
use dist_surface::demo::{clear_renderer, ColorCycle};
use dist_surface::gfx::{create_device, GraphicsDeviceOptions, SwapchainSource};
use dist_surface::pacer::{self, FramePacer, ManualPacer, ManualTrigger};
use dist_surface::surface::{RenderSurface, SurfaceDescriptor};

/// 非手动刷新源时检查渲染错误的间隔
const FAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

fn build_pacer(config: &Config) -> Result<(Box<dyn FramePacer>, Option<ManualTrigger>)> {
    match config.pacer_kind() {
        PacerKind::Manual => {
            let (pacer, trigger) = ManualPacer::new();
            Ok((Box::new(pacer), Some(trigger)))
        }
        kind => Ok((pacer::create(kind, &config.pacer, "dist-surface")?, None)),
    }
}

/// 随机的起始帧，每次启动从不同颜色开始
fn start_frame() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::from(d.subsec_nanos()))
        .unwrap_or_default()
}

fn main() -> Result<()> {
    // 1. 加载配置（在初始化日志之前）
    let mut config = Config::from_file_or_default("config.toml");
    config.apply_args(std::env::args());
    config.validate().context("Invalid configuration")?;

    // 2. 初始化日志系统
    let log_file = config
        .logging
        .file_output
        .then_some(config.logging.log_file.as_str());
    log::init_logger(config.logging.level, config.logging.file_output, log_file)?;
    info!(version = env!("CARGO_PKG_VERSION"), "DistSurface starting...");
    info!(
        backend = config.graphics.backend.name(),
        host = config.graphics.host.name(),
        pacer = config.pacer_kind().name(),
        width = config.surface.width,
        height = config.surface.height,
        "Surface configuration"
    );

    // 3. 宿主窗口
    let event_loop = EventLoop::new()?;
    let window = WindowBuilder::new()
        .with_title("DistSurface")
        .with_inner_size(PhysicalSize::new(config.surface.width, config.surface.height))
        .build(&event_loop)
        .context("Failed to create host window")?;

    // 4. 设备、刷新源和表面
    let device = create_device(
        config.graphics.backend,
        GraphicsDeviceOptions::from_config(&config),
    )
    .context("Failed to create graphics device")?;
    let (pacer, trigger) = build_pacer(&config)?;

    let mut surface = RenderSurface::new(
        Arc::clone(&device),
        SurfaceDescriptor::from_config("main", &config),
        pacer,
    )?;
    surface.on_device_ready(|event| info!(?event, "Device ready"));
    surface.on_resized(|event| debug!(?event, "Swapchain resized"));
    surface.on_rendering(clear_renderer(ColorCycle::default().with_start(start_frame())));

    let size = window.inner_size();
    // SAFETY: 表面在 LoopExiting 中释放，窗口由事件循环闭包持有到最后
    let source = unsafe { SwapchainSource::from_window(&window)? };
    surface.attach(source, size.width, size.height)?;
    surface.start()?;

    let handle = surface.handle();
    let mut surface = Some(surface);

    info!("Entering main loop...");
    event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { event, .. } => match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down...");
                elwt.exit();
            }
            WindowEvent::Resized(new_size) => {
                debug!(width = new_size.width, height = new_size.height, "Window resized");
                handle.notify_resize(new_size.width, new_size.height);
            }
            WindowEvent::RedrawRequested => {
                if let Some(trigger) = &trigger {
                    if let Err(e) = trigger.tick() {
                        match surface.as_mut().and_then(|s| s.take_fault()) {
                            Some(fault) => error!("Rendering stopped: {}", fault),
                            None => error!("Frame failed: {}", e),
                        }
                        elwt.exit();
                    }
                }
            }
            _ => (),
        },
        Event::AboutToWait => {
            if trigger.is_some() {
                window.request_redraw();
                elwt.set_control_flow(ControlFlow::Poll);
                return;
            }

            if let Some(fault) = surface.as_mut().and_then(|s| s.take_fault()) {
                error!("Rendering stopped: {}", fault);
                elwt.exit();
                return;
            }
            elwt.set_control_flow(ControlFlow::WaitUntil(Instant::now() + FAULT_POLL_INTERVAL));
        }
        Event::LoopExiting => {
            if let Some(mut surface) = surface.take() {
                if let Err(e) = surface.dispose() {
                    error!("Surface dispose failed: {}", e);
                }
            }
            device.dispose();
            info!("Shutdown complete");
        }
        _ => (),
    })?;

    Ok(())
}
