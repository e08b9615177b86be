//! wgpu 图形设备
//!
//! 用 wgpu 实现 `GraphicsDevice`，实例只启用所请求的原生 API，
//! 不会在不支持时悄悄换成其他后端。
//!
//! # 模块组织
//!
//! - `device`：实例/适配器/设备创建，命令翻译与提交
//! - `swapchain`：绑定原生可绘制对象的表面及其深度缓冲

mod device;
mod swapchain;

pub use device::WgpuDevice;
pub use swapchain::WgpuSwapchain;
