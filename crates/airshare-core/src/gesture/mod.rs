//! 手势模块
//!
//! - **classifier**: 单帧手部关键点 → 手势标签（无状态）
//! - **debouncer**: 逐帧标签流 → 边沿触发事件

pub mod classifier;
pub mod debouncer;

pub use classifier::{HandLandmarks, classify};
pub use debouncer::GestureDebouncer;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 手势标签
///
/// 每帧最多一个。`None` 表示无手或无法识别，属于正常输入。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gesture {
    #[default]
    None,
    /// ✌ 食指和中指伸出：截图
    TwoFingers,
    /// ✊ 握拳：发送
    Fist,
    /// ✋ 张开手掌：进入接收模式
    OpenPalm,
}

impl Gesture {
    pub fn is_none(self) -> bool {
        self == Gesture::None
    }

    pub fn icon(self) -> &'static str {
        match self {
            Gesture::None => "·",
            Gesture::TwoFingers => "✌",
            Gesture::Fist => "✊",
            Gesture::OpenPalm => "✋",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Gesture::None => "none",
            Gesture::TwoFingers => "two_fingers",
            Gesture::Fist => "fist",
            Gesture::OpenPalm => "open_palm",
        }
    }
}

impl fmt::Display for Gesture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Gesture {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "" | "none" | "-" => Ok(Gesture::None),
            "two" | "two_fingers" | "twofingers" | "v" => Ok(Gesture::TwoFingers),
            "fist" => Ok(Gesture::Fist),
            "palm" | "open_palm" | "openpalm" => Ok(Gesture::OpenPalm),
            other => Err(format!("unknown gesture label: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_labels() {
        assert_eq!("two".parse::<Gesture>().unwrap(), Gesture::TwoFingers);
        assert_eq!("Open-Palm".parse::<Gesture>().unwrap(), Gesture::OpenPalm);
        assert_eq!("FIST".parse::<Gesture>().unwrap(), Gesture::Fist);
        assert_eq!("".parse::<Gesture>().unwrap(), Gesture::None);
        assert!("wave".parse::<Gesture>().is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        for g in [
            Gesture::None,
            Gesture::TwoFingers,
            Gesture::Fist,
            Gesture::OpenPalm,
        ] {
            assert_eq!(g.to_string().parse::<Gesture>().unwrap(), g);
        }
    }
}
