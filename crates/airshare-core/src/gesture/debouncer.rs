//! 手势去抖
//!
//! 把逐帧标签转换为边沿触发事件：同一手势保持多帧只触发一次。
//! 手部抖动时偶尔会有几帧识别为 `None`，所以一个手势只有在连续
//! `release_frames` 帧未出现后才视为松开，之后再次出现才会重新触发。
//! 切换到另一个手势则立即触发。

use super::Gesture;

/// 默认松开判定帧数
pub const DEFAULT_RELEASE_FRAMES: u32 = 3;

#[derive(Debug, Clone)]
pub struct GestureDebouncer {
    held: Gesture,
    missing_frames: u32,
    release_frames: u32,
}

impl Default for GestureDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_RELEASE_FRAMES)
    }
}

impl GestureDebouncer {
    /// `release_frames` 为 0 时按 1 处理（纯边沿触发）
    pub fn new(release_frames: u32) -> Self {
        Self {
            held: Gesture::None,
            missing_frames: 0,
            release_frames: release_frames.max(1),
        }
    }

    /// 输入一帧的标签，返回本帧触发的事件
    pub fn push(&mut self, raw: Gesture) -> Option<Gesture> {
        if raw == self.held {
            self.missing_frames = 0;
            return None;
        }

        if raw.is_none() {
            self.missing_frames += 1;
            if self.missing_frames >= self.release_frames {
                self.held = Gesture::None;
                self.missing_frames = 0;
            }
            return None;
        }

        self.held = raw;
        self.missing_frames = 0;
        Some(raw)
    }

    /// 当前保持中的手势
    pub fn held(&self) -> Gesture {
        self.held
    }

    pub fn reset(&mut self) {
        self.held = Gesture::None;
        self.missing_frames = 0;
    }
}
