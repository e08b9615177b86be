//! 离屏图形设备
//!
//! 不依赖任何窗口系统和 GPU 的设备实现。提交的命令会被解释执行到
//! 一个内存中的"后台缓冲"，`swap_buffers` 时把它记入呈现历史，
//! 供测试和工具检查每一帧实际清屏的颜色和尺寸。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, trace};

use crate::core::color::Color;
use crate::core::config::GraphicsBackend;
use crate::core::error::{GraphicsError, Result};
use super::command::{Command, CommandList};
use super::device::{
    Framebuffer, GraphicsDevice, GraphicsDeviceOptions, Swapchain, SwapchainDescription,
    SwapchainId,
};

/// 一次呈现的记录
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresentedFrame {
    pub swapchain: SwapchainId,
    pub width: u32,
    pub height: u32,
    /// 本帧最后一次清屏颜色（未清屏时为 `None`）
    pub clear_color: Option<Color>,
    /// 本帧是否清除了深度
    pub depth_cleared: bool,
}

#[derive(Debug, Default, Clone, Copy)]
struct BackBuffer {
    width: u32,
    height: u32,
    clear_color: Option<Color>,
    depth_cleared: bool,
}

/// 设备与其交换链共享的状态
#[derive(Debug, Default)]
struct HeadlessShared {
    disposed: AtomicBool,
    back_buffers: Mutex<HashMap<SwapchainId, BackBuffer>>,
    presented: Mutex<Vec<PresentedFrame>>,
    swapchains_created: AtomicUsize,
    swapchains_disposed: AtomicUsize,
    resizes: Mutex<Vec<(SwapchainId, u32, u32)>>,
    submissions: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 离屏设备
pub struct HeadlessDevice {
    options: GraphicsDeviceOptions,
    shared: Arc<HeadlessShared>,
    submit_lock: Mutex<()>,
}

impl HeadlessDevice {
    /// 创建离屏设备
    pub fn new(options: GraphicsDeviceOptions) -> Self {
        debug!("Headless device created");
        Self {
            options,
            shared: Arc::new(HeadlessShared::default()),
            submit_lock: Mutex::new(()),
        }
    }

    /// 呈现历史（按时间顺序）
    pub fn presented_frames(&self) -> Vec<PresentedFrame> {
        lock(&self.shared.presented).clone()
    }

    /// 已呈现的帧数
    pub fn present_count(&self) -> usize {
        lock(&self.shared.presented).len()
    }

    /// 交换链 resize 调用记录
    pub fn resize_calls(&self) -> Vec<(SwapchainId, u32, u32)> {
        lock(&self.shared.resizes).clone()
    }

    /// 已创建的交换链数量
    pub fn swapchains_created(&self) -> usize {
        self.shared.swapchains_created.load(Ordering::SeqCst)
    }

    /// 已释放的交换链数量
    pub fn swapchains_disposed(&self) -> usize {
        self.shared.swapchains_disposed.load(Ordering::SeqCst)
    }

    /// 成功提交的命令列表数量
    pub fn submission_count(&self) -> usize {
        self.shared.submissions.load(Ordering::SeqCst)
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.shared.disposed.load(Ordering::SeqCst) {
            return Err(GraphicsError::DeviceDisposed.into());
        }
        Ok(())
    }
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new(GraphicsDeviceOptions::default())
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn backend(&self) -> GraphicsBackend {
        GraphicsBackend::Headless
    }

    fn options(&self) -> &GraphicsDeviceOptions {
        &self.options
    }

    fn create_swapchain(&self, description: &SwapchainDescription) -> Result<Box<dyn Swapchain>> {
        self.ensure_alive()?;

        let id = SwapchainId::next();
        lock(&self.shared.back_buffers).insert(
            id,
            BackBuffer {
                width: description.width,
                height: description.height,
                ..BackBuffer::default()
            },
        );
        self.shared.swapchains_created.fetch_add(1, Ordering::SeqCst);

        debug!(
            %id,
            width = description.width,
            height = description.height,
            depth = ?description.depth_format,
            "Headless swapchain created"
        );

        Ok(Box::new(HeadlessSwapchain {
            id,
            width: description.width,
            height: description.height,
            has_depth: description.depth_format.is_some(),
            disposed: false,
            shared: Arc::clone(&self.shared),
        }))
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

        let _submission = lock(&self.submit_lock);
        let mut back_buffers = lock(&self.shared.back_buffers);
        let mut target: Option<Framebuffer> = None;

        for command in commands.commands() {
            match *command {
                Command::SetFramebuffer(framebuffer) => {
                    if !back_buffers.contains_key(&framebuffer.swapchain) {
                        return Err(GraphicsError::CommandExecution(format!(
                            "{} is not alive",
                            framebuffer.swapchain
                        ))
                        .into());
                    }
                    target = Some(framebuffer);
                }
                Command::ClearColorTarget { color, .. } => {
                    if let Some(buffer) = target.and_then(|fb| back_buffers.get_mut(&fb.swapchain)) {
                        buffer.clear_color = Some(color);
                    }
                }
                Command::ClearDepthStencil { .. } => {
                    if let Some(buffer) = target.and_then(|fb| back_buffers.get_mut(&fb.swapchain)) {
                        buffer.depth_cleared = true;
                    }
                }
            }
        }

        commands.mark_submitted();
        self.shared.submissions.fetch_add(1, Ordering::SeqCst);
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

        let _submission = lock(&self.submit_lock);
        let mut back_buffers = lock(&self.shared.back_buffers);
        let buffer = back_buffers.get_mut(&swapchain.id()).ok_or_else(|| {
            GraphicsError::SwapchainError(format!("{} is unknown", swapchain.id()))
        })?;

        let frame = PresentedFrame {
            swapchain: swapchain.id(),
            width: buffer.width,
            height: buffer.height,
            clear_color: buffer.clear_color.take(),
            depth_cleared: std::mem::take(&mut buffer.depth_cleared),
        };
        trace!(swapchain = %frame.swapchain, color = ?frame.clear_color, "Headless present");
        lock(&self.shared.presented).push(frame);
        Ok(())
    }

    fn dispose(&self) {
        if !self.shared.disposed.swap(true, Ordering::SeqCst) {
            debug!("Headless device disposed");
        }
    }

    fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::SeqCst)
    }
}

/// 离屏交换链
pub struct HeadlessSwapchain {
    id: SwapchainId,
    width: u32,
    height: u32,
    has_depth: bool,
    disposed: bool,
    shared: Arc<HeadlessShared>,
}

impl Swapchain for HeadlessSwapchain {
    fn id(&self) -> SwapchainId {
        self.id
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if self.disposed {
            return Err(GraphicsError::SwapchainError(format!("{} has been disposed", self.id)).into());
        }
        if self.shared.disposed.load(Ordering::SeqCst) {
            return Err(GraphicsError::DeviceDisposed.into());
        }

        self.width = width;
        self.height = height;
        if let Some(buffer) = lock(&self.shared.back_buffers).get_mut(&self.id) {
            buffer.width = width;
            buffer.height = height;
        }
        lock(&self.shared.resizes).push((self.id, width, height));
        Ok(())
    }

    fn framebuffer(&self) -> Framebuffer {
        Framebuffer {
            swapchain: self.id,
            width: self.width,
            height: self.height,
            color_targets: 1,
            has_depth: self.has_depth,
        }
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        lock(&self.shared.back_buffers).remove(&self.id);
        self.shared.swapchains_disposed.fetch_add(1, Ordering::SeqCst);
        debug!(id = %self.id, "Headless swapchain disposed");
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl Drop for HeadlessSwapchain {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::DepthFormat;
    use crate::gfx::device::SwapchainSource;

    fn record_clear(cl: &mut CommandList, fb: Framebuffer, color: Color) {
        cl.begin().unwrap();
        cl.set_framebuffer(fb).unwrap();
        cl.clear_color_target(0, color).unwrap();
        if fb.has_depth {
            cl.clear_depth_stencil(1.0).unwrap();
        }
        cl.end().unwrap();
    }

    #[test]
    fn test_submit_and_present() {
        let device = HeadlessDevice::default();
        let desc = SwapchainDescription::new(SwapchainSource::Headless, 300, 300)
            .with_depth(Some(DepthFormat::D32Float));
        let mut swapchain = device.create_swapchain(&desc).unwrap();
        let mut cl = device.create_command_list().unwrap();

        record_clear(&mut cl, swapchain.framebuffer(), Color::GREEN);
        device.submit_commands(&mut cl).unwrap();
        device.swap_buffers(swapchain.as_mut()).unwrap();

        let frames = device.presented_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].clear_color, Some(Color::GREEN));
        assert_eq!((frames[0].width, frames[0].height), (300, 300));
        assert!(frames[0].depth_cleared);
    }

    #[test]
    fn test_submit_requires_executable_list() {
        let device = HeadlessDevice::default();
        let mut cl = device.create_command_list().unwrap();
        assert!(device.submit_commands(&mut cl).is_err());
    }

    #[test]
    fn test_resize_and_dispose_swapchain() {
        let device = HeadlessDevice::default();
        let desc = SwapchainDescription::new(SwapchainSource::Headless, 300, 300);
        let mut swapchain = device.create_swapchain(&desc).unwrap();

        swapchain.resize(150, 150).unwrap();
        assert_eq!(swapchain.size(), (150, 150));
        assert_eq!(device.resize_calls(), vec![(swapchain.id(), 150, 150)]);

        swapchain.dispose();
        swapchain.dispose();
        assert_eq!(device.swapchains_disposed(), 1);
        assert!(device.swap_buffers(swapchain.as_mut()).is_err());
    }

    #[test]
    fn test_operations_fail_after_dispose() {
        let device = HeadlessDevice::default();
        device.dispose();
        device.dispose();

        assert!(device.is_disposed());
        let err = device.create_command_list().unwrap_err();
        assert!(err.is_device_disposed());
        let desc = SwapchainDescription::new(SwapchainSource::Headless, 1, 1);
        assert!(matches!(device.create_swapchain(&desc), Err(e) if e.is_device_disposed()));
    }
}
