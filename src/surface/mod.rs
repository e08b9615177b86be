//! 渲染表面模块
//!
//! # 模块组织
//!
//! - `render_surface`：交换链 + 刷新源驱动的逐帧渲染
//! - `resize`：跨线程的尺寸锁存器和布局尺寸换算
//! - `state`：表面生命周期和播放状态

pub mod render_surface;
pub mod resize;
pub mod state;

pub use render_surface::{FrameContext, RenderSurface, SurfaceDescriptor, SurfaceHandle};
pub use resize::{clamp_dimension, clamp_size, ResizeLatch};
pub use state::{PlaybackState, SurfaceState};
