//! 图形设备模块
//!
//! 渲染表面所依赖的图形设备抽象及其实现：
//! - `device`：`GraphicsDevice` / `Swapchain` trait、交换链描述和原生可绘制对象
//! - `command`：后端无关的命令列表
//! - `slot`：进程级的设备槽（最多一个存活设备）
//! - `headless`：离屏设备，用于测试和工具
//! - `wgpu`：基于 wgpu 的设备（Vulkan、Metal、DX12、OpenGL）
//!
//! 所有实现都通过 `create_device` 按后端选择。

pub mod command;
pub mod device;
pub mod headless;
pub mod slot;
pub mod wgpu;

use std::sync::Arc;

use crate::core::config::GraphicsBackend;
use crate::core::error::Result;

pub use command::{Command, CommandList, CommandListState};
pub use device::{
    Framebuffer, GraphicsDevice, GraphicsDeviceOptions, Swapchain, SwapchainDescription,
    SwapchainId, SwapchainSource,
};
pub use headless::{HeadlessDevice, PresentedFrame};
pub use slot::DeviceSlot;
pub use self::wgpu::WgpuDevice;

/// 按后端创建图形设备
///
/// `Headless` 使用离屏设备，其余后端使用只启用对应原生 API 的 wgpu 设备。
pub fn create_device(
    backend: GraphicsBackend,
    options: GraphicsDeviceOptions,
) -> Result<Arc<dyn GraphicsDevice>> {
    match backend {
        GraphicsBackend::Headless => Ok(Arc::new(HeadlessDevice::new(options))),
        _ => Ok(Arc::new(self::wgpu::WgpuDevice::new(backend, options)?)),
    }
}
