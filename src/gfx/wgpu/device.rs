//! wgpu 设备管理
//!
//! 负责：
//! - 创建只启用目标原生 API 的 wgpu 实例
//! - 选择适配器，创建逻辑设备和命令队列
//! - 为原生可绘制对象创建表面（交换链）
//! - 把后端无关的命令列表翻译成渲染通道并提交

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::{debug, info, trace};

use crate::core::color::Color;
use crate::core::config::GraphicsBackend;
use crate::core::error::{GraphicsError, Result};
use crate::gfx::command::{Command, CommandList};
use crate::gfx::device::{
    GraphicsDevice, GraphicsDeviceOptions, Swapchain, SwapchainDescription, SwapchainId,
};
use super::swapchain::{lock_target, SharedTarget, SurfaceTarget, WgpuContext, WgpuSwapchain};

/// 后端到 wgpu 实例后端集合的映射
///
/// wgpu 没有 Direct3D 11 后端，在 Windows 上使用 DX12 代替。
fn wgpu_backends(backend: GraphicsBackend) -> Result<wgpu::Backends> {
    match backend {
        GraphicsBackend::Vulkan => Ok(wgpu::Backends::VULKAN),
        GraphicsBackend::Direct3D11 => Ok(wgpu::Backends::DX12),
        GraphicsBackend::OpenGL | GraphicsBackend::OpenGLES => Ok(wgpu::Backends::GL),
        GraphicsBackend::Metal => Ok(wgpu::Backends::METAL),
        GraphicsBackend::Headless => Err(GraphicsError::DeviceCreation(
            "the headless backend is not provided by wgpu".to_string(),
        )
        .into()),
    }
}

/// 一次渲染通道：目标交换链及其清屏操作
struct PassDescription {
    swapchain: SwapchainId,
    clear_color: Option<Color>,
    clear_depth: Option<(f32, u8)>,
}

/// 把命令序列按帧缓冲切分成渲染通道
fn plan_passes(commands: &[Command]) -> Vec<PassDescription> {
    let mut passes: Vec<PassDescription> = Vec::new();
    for command in commands {
        match *command {
            Command::SetFramebuffer(framebuffer) => passes.push(PassDescription {
                swapchain: framebuffer.swapchain,
                clear_color: None,
                clear_depth: None,
            }),
            Command::ClearColorTarget { color, .. } => {
                if let Some(pass) = passes.last_mut() {
                    pass.clear_color = Some(color);
                }
            }
            Command::ClearDepthStencil { depth, stencil } => {
                if let Some(pass) = passes.last_mut() {
                    pass.clear_depth = Some((depth, stencil));
                }
            }
        }
    }
    passes
}

/// wgpu 图形设备
pub struct WgpuDevice {
    backend: GraphicsBackend,
    options: GraphicsDeviceOptions,
    instance: wgpu::Instance,
    context: Arc<WgpuContext>,
    targets: Mutex<HashMap<SwapchainId, Weak<Mutex<SurfaceTarget>>>>,
    submit_lock: Mutex<()>,
    disposed: AtomicBool,
}

impl WgpuDevice {
    /// 创建 wgpu 设备
    ///
    /// 适配器在没有任何表面的情况下选择，之后创建的表面必须与之兼容。
    pub fn new(backend: GraphicsBackend, options: GraphicsDeviceOptions) -> Result<Self> {
        info!(backend = backend.name(), "Initializing wgpu device");

        let backends = wgpu_backends(backend)?;
        let flags = if options.debug {
            wgpu::InstanceFlags::DEBUG | wgpu::InstanceFlags::VALIDATION
        } else {
            wgpu::InstanceFlags::default()
        };

        debug!(?backends, "Creating wgpu instance");
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends,
            flags,
            dx12_shader_compiler: Default::default(),
            gles_minor_version: wgpu::Gles3MinorVersion::Automatic,
        });

        debug!("Requesting adapter");
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| {
            GraphicsError::DeviceCreation(format!("No {} adapter available", backend.name()))
        })?;

        info!("Selected adapter: {:?}", adapter.get_info());

        debug!("Requesting device and queue");
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("DistSurface Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
            },
            None,
        ))
        .map_err(|e| GraphicsError::DeviceCreation(format!("Failed to create device: {}", e)))?;

        info!("wgpu device initialized successfully");

        Ok(Self {
            backend,
            options,
            instance,
            context: Arc::new(WgpuContext {
                adapter,
                device,
                queue,
            }),
            targets: Mutex::new(HashMap::new()),
            submit_lock: Mutex::new(()),
            disposed: AtomicBool::new(false),
        })
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(GraphicsError::DeviceDisposed.into());
        }
        Ok(())
    }

    fn targets(&self) -> MutexGuard<'_, HashMap<SwapchainId, Weak<Mutex<SurfaceTarget>>>> {
        self.targets.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn target(&self, id: SwapchainId) -> Result<SharedTarget> {
        self.targets()
            .get(&id)
            .and_then(Weak::upgrade)
            .ok_or_else(|| GraphicsError::SwapchainError(format!("{} is not alive", id)).into())
    }

    fn encode_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pass: &PassDescription,
    ) -> Result<()> {
        let target = self.target(pass.swapchain)?;
        let mut target = lock_target(&target);

        let view = match target.acquire(&self.context)? {
            Some(view) => view,
            None => {
                trace!(swapchain = %pass.swapchain, "No drawable this frame");
                return Ok(());
            }
        };

        let color_load = match pass.clear_color {
            Some(color) => {
                let [r, g, b, a] = color.to_f64_array();
                wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a })
            }
            None => wgpu::LoadOp::Load,
        };

        let has_stencil = target.has_depth_stencil();
        let depth_attachment = match (pass.clear_depth, target.depth_view()) {
            (Some((depth, stencil)), Some(depth_view)) => {
                Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(depth),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: has_stencil.then(|| wgpu::Operations {
                        load: wgpu::LoadOp::Clear(stencil as u32),
                        store: wgpu::StoreOp::Store,
                    }),
                })
            }
            _ => None,
        };

        let _render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Swapchain Clear Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: color_load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: depth_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        Ok(())
    }
}

impl GraphicsDevice for WgpuDevice {
    fn backend(&self) -> GraphicsBackend {
        self.backend
    }

    fn options(&self) -> &GraphicsDeviceOptions {
        &self.options
    }

    fn create_swapchain(&self, description: &SwapchainDescription) -> Result<Box<dyn Swapchain>> {
        self.ensure_alive()?;

        let (raw_window_handle, raw_display_handle) = description.source.to_raw_handles()?;

        // SAFETY: SwapchainSource 的构造函数要求调用者保证可绘制对象
        // 在交换链释放之前一直有效
        let surface = unsafe {
            self.instance
                .create_surface_unsafe(wgpu::SurfaceTargetUnsafe::RawHandle {
                    raw_display_handle,
                    raw_window_handle,
                })
        }
        .map_err(|e| GraphicsError::SwapchainError(format!("Failed to create surface: {}", e)))?;

        let target = SurfaceTarget::new(
            &self.context,
            surface,
            description.width,
            description.height,
            description.vsync,
            description.color_srgb,
            description.depth_format,
        )?;

        let id = SwapchainId::next();
        let target = Arc::new(Mutex::new(target));
        {
            let mut targets = self.targets();
            targets.retain(|_, weak| weak.strong_count() > 0);
            targets.insert(id, Arc::downgrade(&target));
        }

        info!(
            %id,
            width = description.width,
            height = description.height,
            "Swapchain created"
        );

        Ok(Box::new(WgpuSwapchain::new(
            id,
            Arc::clone(&self.context),
            target,
            description.depth_format.is_some(),
        )))
    }

    fn create_command_list(&self) -> Result<CommandList> {
        self.ensure_alive()?;
        Ok(CommandList::new())
    }

    fn submit_commands(&self, commands: &mut CommandList) -> Result<()> {
        self.ensure_alive()?;
        if !commands.is_executable() {
            return Err(GraphicsError::CommandExecution(format!(
                "command list is {:?}, expected Executable",
                commands.state()
            ))
            .into());
        }

        let _submission = self.submit_lock.lock().unwrap_or_else(|p| p.into_inner());

        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Surface Command Encoder"),
            });

        for pass in plan_passes(commands.commands()) {
            self.encode_pass(&mut encoder, &pass)?;
        }

        self.context.queue.submit(std::iter::once(encoder.finish()));
        commands.mark_submitted();
        Ok(())
    }

    fn swap_buffers(&self, swapchain: &mut dyn Swapchain) -> Result<()> {
        self.ensure_alive()?;
        if swapchain.is_disposed() {
            return Err(GraphicsError::SwapchainError(format!(
                "{} has been disposed",
                swapchain.id()
            ))
            .into());
        }

        let _submission = self.submit_lock.lock().unwrap_or_else(|p| p.into_inner());
        let target = self.target(swapchain.id())?;
        lock_target(&target).present();
        Ok(())
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.targets().clear();
        info!(backend = self.backend.name(), "wgpu device disposed");
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::device::Framebuffer;

    #[test]
    fn test_backend_mapping() {
        assert_eq!(wgpu_backends(GraphicsBackend::Vulkan).unwrap(), wgpu::Backends::VULKAN);
        assert_eq!(wgpu_backends(GraphicsBackend::Metal).unwrap(), wgpu::Backends::METAL);
        assert_eq!(wgpu_backends(GraphicsBackend::OpenGLES).unwrap(), wgpu::Backends::GL);
        assert_eq!(wgpu_backends(GraphicsBackend::Direct3D11).unwrap(), wgpu::Backends::DX12);
        assert!(wgpu_backends(GraphicsBackend::Headless).is_err());
    }

    #[test]
    fn test_plan_passes() {
        let swapchain = SwapchainId::next();
        let framebuffer = Framebuffer {
            swapchain,
            width: 8,
            height: 8,
            color_targets: 1,
            has_depth: true,
        };
        let commands = [
            Command::SetFramebuffer(framebuffer),
            Command::ClearColorTarget { index: 0, color: Color::ORANGE },
            Command::ClearDepthStencil { depth: 1.0, stencil: 0 },
        ];

        let passes = plan_passes(&commands);
        assert_eq!(passes.len(), 1);
        assert_eq!(passes[0].swapchain, swapchain);
        assert_eq!(passes[0].clear_color, Some(Color::ORANGE));
        assert_eq!(passes[0].clear_depth, Some((1.0, 0)));
    }
}
