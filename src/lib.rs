//! DistSurface - 渲染表面生命周期管理
//!
//! 把图形设备的交换链绑定到宿主提供的原生可绘制对象上，由刷新源驱动逐帧渲染，
//! 把来自其他线程的尺寸变化合并后在帧之间应用，并按正确的顺序释放资源。
//! 窗体类宿主可以通过原生子窗口承载交换链。
//!
//! # 模块结构
//!
//! - `core`: 核心功能模块（配置、日志、错误处理、事件系统、颜色）
//! - `gfx`: 图形设备抽象（交换链、命令列表、wgpu 和离屏实现）
//! - `pacer`: 刷新源（显示链接、定时器、自旋线程、手动）
//! - `surface`: 渲染表面、尺寸锁存器和生命周期状态
//! - `native`: 原生子窗口嵌入和指针消息转换
//! - `demo`: 循环颜色清屏
//!
//! # 使用示例
//!
//! ```no_run
//! use std::sync::Arc;
//! use dist_surface::core::{GraphicsBackend, HostPlatform};
//! use dist_surface::demo::{clear_renderer, ColorCycle};
//! use dist_surface::gfx::{HeadlessDevice, SwapchainSource};
//! use dist_surface::pacer::ManualPacer;
//! use dist_surface::surface::{RenderSurface, SurfaceDescriptor};
//!
//! let device = Arc::new(HeadlessDevice::default());
//! let (pacer, trigger) = ManualPacer::new();
//! let descriptor = SurfaceDescriptor::new("demo", GraphicsBackend::Headless, HostPlatform::Headless);
//!
//! let mut surface = RenderSurface::new(device, descriptor, Box::new(pacer))?;
//! surface.on_rendering(clear_renderer(ColorCycle::default()));
//! surface.attach(SwapchainSource::Headless, 300, 300)?;
//! surface.start()?;
//!
//! trigger.tick()?;
//! surface.notify_resize(150, 150);
//! trigger.tick()?;
//!
//! surface.dispose()?;
//! # Ok::<(), dist_surface::core::DistSurfaceError>(())
//! ```

pub mod core;
pub mod demo;
pub mod gfx;
pub mod native;
pub mod pacer;
pub mod surface;
