//! 演示用的清屏渲染
//!
//! 七种颜色依次循环，每种颜色保持固定的帧数。

use crate::core::color::Color;
use crate::core::error::Result;
use crate::surface::FrameContext;

/// 默认的清屏颜色序列
pub const CLEAR_COLORS: [Color; 7] = [
    Color::RED,
    Color::ORANGE,
    Color::YELLOW,
    Color::GREEN,
    Color::BLUE,
    Color::rgb(0.8, 0.1, 0.3),
    Color::rgb(0.8, 0.1, 0.9),
];

/// 每种颜色保持的帧数
pub const FRAME_REPEAT_COUNT: u32 = 20;

/// 循环的颜色序列
#[derive(Debug, Clone)]
pub struct ColorCycle {
    colors: Vec<Color>,
    repeat: u32,
    index: u64,
}

impl Default for ColorCycle {
    fn default() -> Self {
        Self::new(CLEAR_COLORS.to_vec(), FRAME_REPEAT_COUNT)
    }
}

impl ColorCycle {
    /// 创建颜色序列，`repeat` 为 0 时按 1 处理
    pub fn new(colors: Vec<Color>, repeat: u32) -> Self {
        Self {
            colors,
            repeat: repeat.max(1),
            index: 0,
        }
    }

    /// 从序列中的某一帧开始
    pub fn with_start(mut self, frame: u64) -> Self {
        self.index = frame % self.period().max(1);
        self
    }

    /// 一个完整循环的帧数
    pub fn period(&self) -> u64 {
        self.colors.len() as u64 * u64::from(self.repeat)
    }

    /// 当前帧的颜色（序列为空时为黑色）
    pub fn current(&self) -> Color {
        let slot = (self.index / u64::from(self.repeat)) as usize;
        self.colors.get(slot).copied().unwrap_or_default()
    }

    /// 返回当前颜色并前进一帧
    pub fn advance(&mut self) -> Color {
        let color = self.current();
        self.index = (self.index + 1) % self.period().max(1);
        color
    }
}

/// 每帧用循环颜色清屏的渲染回调
pub fn clear_renderer(mut cycle: ColorCycle) -> impl FnMut(&mut FrameContext<'_>) -> Result<()> + Send {
    move |frame| {
        let color = cycle.advance();
        frame.commands.begin()?;
        frame.commands.set_framebuffer(frame.framebuffer)?;
        frame.commands.clear_color_target(0, color)?;
        if frame.framebuffer.has_depth {
            frame.commands.clear_depth_stencil(1.0)?;
        }
        frame.commands.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_color_repeats_then_wraps() {
        let mut cycle = ColorCycle::default();
        let seen: Vec<Color> = (0..cycle.period() + 1).map(|_| cycle.advance()).collect();

        for (i, color) in seen.iter().take(140).enumerate() {
            assert_eq!(*color, CLEAR_COLORS[i / 20]);
        }
        assert_eq!(seen[140], CLEAR_COLORS[0]);
    }

    #[test]
    fn test_start_offset_and_empty_sequence() {
        let cycle = ColorCycle::default().with_start(141);
        assert_eq!(cycle.current(), CLEAR_COLORS[0]);
        let cycle = ColorCycle::default().with_start(45);
        assert_eq!(cycle.current(), CLEAR_COLORS[2]);

        let mut empty = ColorCycle::new(Vec::new(), 0);
        assert_eq!(empty.advance(), Color::BLACK);
    }
}
