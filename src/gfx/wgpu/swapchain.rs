//! wgpu 交换链
//!
//! 一个 `wgpu::Surface` 加上可选的深度纹理。当前帧的表面纹理在第一次
//! 提交时获取，在 `swap_buffers` 时呈现。

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, trace, warn};

use crate::core::config::DepthFormat;
use crate::core::error::{GraphicsError, Result};
use crate::gfx::device::{Framebuffer, Swapchain, SwapchainId};

/// 设备与交换链共享的 wgpu 对象
pub(super) struct WgpuContext {
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

/// 表面目标（交换链的可变部分）
pub(super) struct SurfaceTarget {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    depth_format: Option<wgpu::TextureFormat>,
    depth_view: Option<wgpu::TextureView>,
    current: Option<wgpu::SurfaceTexture>,
}

pub(super) type SharedTarget = Arc<Mutex<SurfaceTarget>>;

pub(super) fn lock_target(target: &SharedTarget) -> MutexGuard<'_, SurfaceTarget> {
    target.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 深度格式映射
pub(super) fn depth_texture_format(format: DepthFormat) -> wgpu::TextureFormat {
    match format {
        DepthFormat::D16Unorm => wgpu::TextureFormat::Depth16Unorm,
        DepthFormat::D24UnormS8Uint => wgpu::TextureFormat::Depth24PlusStencil8,
        DepthFormat::D32Float => wgpu::TextureFormat::Depth32Float,
    }
}

impl SurfaceTarget {
    pub(super) fn new(
        context: &WgpuContext,
        surface: wgpu::Surface<'static>,
        width: u32,
        height: u32,
        vsync: bool,
        srgb: bool,
        depth_format: Option<DepthFormat>,
    ) -> Result<Self> {
        let caps = surface.get_capabilities(&context.adapter);
        if caps.formats.is_empty() {
            return Err(GraphicsError::SwapchainError(
                "surface is not supported by the adapter".to_string(),
            )
            .into());
        }

        // 按需要选择 sRGB 或线性格式，没有匹配时使用第一个
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb() == srgb)
            .unwrap_or(caps.formats[0]);

        let present_mode = if vsync {
            wgpu::PresentMode::Fifo
        } else if caps.present_modes.contains(&wgpu::PresentMode::Immediate) {
            wgpu::PresentMode::Immediate
        } else {
            wgpu::PresentMode::AutoNoVsync
        };

        debug!(?format, ?present_mode, "Surface format selected");

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width,
            height,
            present_mode,
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        let mut target = Self {
            surface,
            config,
            depth_format: depth_format.map(depth_texture_format),
            depth_view: None,
            current: None,
        };
        target.configure(context);
        Ok(target)
    }

    pub(super) fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn is_zero_sized(&self) -> bool {
        self.config.width == 0 || self.config.height == 0
    }

    /// 按当前尺寸配置表面并重建深度纹理
    ///
    /// wgpu 不接受零尺寸的配置，零尺寸时只丢弃深度纹理。
    fn configure(&mut self, context: &WgpuContext) {
        self.current = None;
        self.depth_view = None;
        if self.is_zero_sized() {
            return;
        }

        self.surface.configure(&context.device, &self.config);

        if let Some(format) = self.depth_format {
            let texture = context.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("Swapchain Depth"),
                size: wgpu::Extent3d {
                    width: self.config.width,
                    height: self.config.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            });
            self.depth_view = Some(texture.create_view(&wgpu::TextureViewDescriptor::default()));
        }
    }

    pub(super) fn resize(&mut self, context: &WgpuContext, width: u32, height: u32) {
        self.config.width = width;
        self.config.height = height;
        self.configure(context);
    }

    /// 获取当前帧的颜色视图
    ///
    /// 零尺寸或获取超时返回 `None`，本帧跳过绘制。
    pub(super) fn acquire(&mut self, context: &WgpuContext) -> Result<Option<wgpu::TextureView>> {
        if self.is_zero_sized() {
            return Ok(None);
        }

        if self.current.is_none() {
            let frame = match self.surface.get_current_texture() {
                Ok(frame) => frame,
                Err(wgpu::SurfaceError::Outdated) | Err(wgpu::SurfaceError::Lost) => {
                    debug!("Surface outdated, reconfiguring");
                    self.configure(context);
                    self.surface.get_current_texture().map_err(|e| {
                        GraphicsError::SwapchainError(format!("Failed to acquire frame: {}", e))
                    })?
                }
                Err(wgpu::SurfaceError::Timeout) => {
                    warn!("Timed out acquiring the next frame");
                    return Ok(None);
                }
                Err(e) => {
                    return Err(GraphicsError::SwapchainError(format!(
                        "Failed to acquire frame: {}",
                        e
                    ))
                    .into())
                }
            };
            self.current = Some(frame);
        }

        Ok(self
            .current
            .as_ref()
            .map(|frame| frame.texture.create_view(&wgpu::TextureViewDescriptor::default())))
    }

    pub(super) fn depth_view(&self) -> Option<&wgpu::TextureView> {
        self.depth_view.as_ref()
    }

    pub(super) fn has_depth_stencil(&self) -> bool {
        self.depth_format == Some(wgpu::TextureFormat::Depth24PlusStencil8)
    }

    /// 呈现已获取的帧，没有获取过则什么也不做
    pub(super) fn present(&mut self) {
        match self.current.take() {
            Some(frame) => frame.present(),
            None => trace!("Nothing acquired this frame, skipping present"),
        }
    }
}

/// wgpu 交换链
pub struct WgpuSwapchain {
    id: SwapchainId,
    has_depth: bool,
    size: (u32, u32),
    context: Arc<WgpuContext>,
    target: Option<SharedTarget>,
}

impl WgpuSwapchain {
    pub(super) fn new(
        id: SwapchainId,
        context: Arc<WgpuContext>,
        target: SharedTarget,
        has_depth: bool,
    ) -> Self {
        let size = lock_target(&target).size();
        Self {
            id,
            has_depth,
            size,
            context,
            target: Some(target),
        }
    }
}

impl Swapchain for WgpuSwapchain {
    fn id(&self) -> SwapchainId {
        self.id
    }

    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        let target = self.target.as_ref().ok_or_else(|| {
            GraphicsError::SwapchainError(format!("{} has been disposed", self.id))
        })?;
        lock_target(target).resize(&self.context, width, height);
        self.size = (width, height);
        debug!(id = %self.id, width, height, "Swapchain resized");
        Ok(())
    }

    fn framebuffer(&self) -> Framebuffer {
        Framebuffer {
            swapchain: self.id,
            width: self.size.0,
            height: self.size.1,
            color_targets: 1,
            has_depth: self.has_depth,
        }
    }

    fn dispose(&mut self) {
        if let Some(target) = self.target.take() {
            // 未呈现的帧直接丢弃
            lock_target(&target).current = None;
            debug!(id = %self.id, "Swapchain disposed");
        }
    }

    fn is_disposed(&self) -> bool {
        self.target.is_none()
    }
}

impl Drop for WgpuSwapchain {
    fn drop(&mut self) {
        self.dispose();
    }
}
