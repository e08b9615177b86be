//! 命令列表模块
//!
//! 与后端无关的命令记录。渲染回调在一帧内记录
//! `begin → set_framebuffer → clear_* → end`，
//! 随后由设备的 `submit_commands` 统一翻译成具体图形 API 的调用。
//!
//! # 状态转换
//!
//! ```text
//! Initial ──begin──▶ Recording ──end──▶ Executable ──submit──▶ Submitted
//!    ▲                                                            │
//!    └─────────────────────────── begin ◀─────────────────────────┘
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::color::Color;
use crate::core::error::{GraphicsError, Result};
use super::device::Framebuffer;

static NEXT_COMMAND_LIST_ID: AtomicU64 = AtomicU64::new(1);

/// 命令列表状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandListState {
    /// 初始状态
    Initial,
    /// 正在记录
    Recording,
    /// 已完成记录，可以提交
    Executable,
    /// 已提交给设备
    Submitted,
    /// 已释放
    Disposed,
}

/// 单条记录的命令
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// 绑定帧缓冲
    SetFramebuffer(Framebuffer),
    /// 清除颜色目标
    ClearColorTarget { index: u32, color: Color },
    /// 清除深度/模板
    ClearDepthStencil { depth: f32, stencil: u8 },
}

/// 命令列表
///
/// 每个渲染表面持有一个，在每帧渲染回调中重复使用。
#[derive(Debug)]
pub struct CommandList {
    id: u64,
    state: CommandListState,
    commands: Vec<Command>,
    framebuffer: Option<Framebuffer>,
}

impl CommandList {
    /// 创建新的命令列表
    pub fn new() -> Self {
        Self {
            id: NEXT_COMMAND_LIST_ID.fetch_add(1, Ordering::Relaxed),
            state: CommandListState::Initial,
            commands: Vec::new(),
            framebuffer: None,
        }
    }

    /// 获取 ID
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 获取当前状态
    pub fn state(&self) -> CommandListState {
        self.state
    }

    /// 是否可以提交
    pub fn is_executable(&self) -> bool {
        self.state == CommandListState::Executable
    }

    /// 已记录的命令
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// 开始记录，丢弃上一帧的命令
    pub fn begin(&mut self) -> Result<()> {
        match self.state {
            CommandListState::Recording => {
                return Err(invalid("begin", "a recording is already in progress"));
            }
            CommandListState::Disposed => return Err(invalid("begin", "command list disposed")),
            _ => {}
        }

        self.commands.clear();
        self.framebuffer = None;
        self.state = CommandListState::Recording;
        Ok(())
    }

    /// 绑定帧缓冲
    pub fn set_framebuffer(&mut self, framebuffer: Framebuffer) -> Result<()> {
        self.ensure_recording("set_framebuffer")?;
        self.framebuffer = Some(framebuffer);
        self.commands.push(Command::SetFramebuffer(framebuffer));
        Ok(())
    }

    /// 清除颜色目标
    pub fn clear_color_target(&mut self, index: u32, color: Color) -> Result<()> {
        self.ensure_recording("clear_color_target")?;
        let framebuffer = self
            .framebuffer
            .ok_or_else(|| invalid("clear_color_target", "no framebuffer bound"))?;
        if index >= framebuffer.color_targets {
            return Err(invalid("clear_color_target", "color target index out of range"));
        }
        self.commands.push(Command::ClearColorTarget { index, color });
        Ok(())
    }

    /// 清除深度（模板值为 0）
    pub fn clear_depth_stencil(&mut self, depth: f32) -> Result<()> {
        self.clear_depth_stencil_with(depth, 0)
    }

    /// 清除深度和模板
    pub fn clear_depth_stencil_with(&mut self, depth: f32, stencil: u8) -> Result<()> {
        self.ensure_recording("clear_depth_stencil")?;
        let framebuffer = self
            .framebuffer
            .ok_or_else(|| invalid("clear_depth_stencil", "no framebuffer bound"))?;
        if !framebuffer.has_depth {
            return Err(invalid("clear_depth_stencil", "framebuffer has no depth target"));
        }
        self.commands.push(Command::ClearDepthStencil { depth, stencil });
        Ok(())
    }

    /// 结束记录
    pub fn end(&mut self) -> Result<()> {
        self.ensure_recording("end")?;
        self.state = CommandListState::Executable;
        Ok(())
    }

    /// 由设备在提交后调用
    pub(crate) fn mark_submitted(&mut self) {
        self.state = CommandListState::Submitted;
    }

    /// 释放命令列表
    pub fn dispose(&mut self) {
        self.commands.clear();
        self.framebuffer = None;
        self.state = CommandListState::Disposed;
    }

    fn ensure_recording(&self, operation: &str) -> Result<()> {
        if self.state != CommandListState::Recording {
            return Err(invalid(operation, "command list is not recording"));
        }
        Ok(())
    }
}

impl Default for CommandList {
    fn default() -> Self {
        Self::new()
    }
}

fn invalid(operation: &str, reason: &str) -> crate::core::error::DistSurfaceError {
    GraphicsError::CommandExecution(format!("{}: {}", operation, reason)).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::device::SwapchainId;

    fn framebuffer(has_depth: bool) -> Framebuffer {
        Framebuffer {
            swapchain: SwapchainId::next(),
            width: 4,
            height: 4,
            color_targets: 1,
            has_depth,
        }
    }

    #[test]
    fn test_record_and_end() {
        let mut cl = CommandList::new();
        assert_eq!(cl.state(), CommandListState::Initial);

        cl.begin().unwrap();
        cl.set_framebuffer(framebuffer(true)).unwrap();
        cl.clear_color_target(0, Color::RED).unwrap();
        cl.clear_depth_stencil(1.0).unwrap();
        cl.end().unwrap();

        assert!(cl.is_executable());
        assert_eq!(cl.commands().len(), 3);
        assert_eq!(
            cl.commands()[1],
            Command::ClearColorTarget { index: 0, color: Color::RED }
        );
    }

    #[test]
    fn test_begin_discards_previous_frame() {
        let mut cl = CommandList::new();
        cl.begin().unwrap();
        cl.set_framebuffer(framebuffer(false)).unwrap();
        cl.end().unwrap();
        cl.mark_submitted();

        cl.begin().unwrap();
        assert!(cl.commands().is_empty());
    }

    #[test]
    fn test_invalid_recording() {
        let mut cl = CommandList::new();
        assert!(cl.end().is_err());

        cl.begin().unwrap();
        assert!(cl.begin().is_err());
        assert!(cl.clear_color_target(0, Color::BLUE).is_err());

        cl.set_framebuffer(framebuffer(false)).unwrap();
        assert!(cl.clear_color_target(1, Color::BLUE).is_err());
        assert!(cl.clear_depth_stencil(1.0).is_err());

        cl.dispose();
        assert!(cl.begin().is_err());
    }
}
