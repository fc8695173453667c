//! 标准输入帧解析
//!
//! 每行一帧：手势标签（`none` / `two` / `fist` / `palm`），或 21 个 `[x, y]`
//! 关键点组成的 JSON 数组。另有几个控制命令：`q` 退出、`s` 查看状态、
//! `p <地址>` 修改对端、`r` 丢弃当前截图。

use airshare_core::gesture::classifier;
use airshare_core::{Gesture, HandLandmarks, PeerAddress};

#[derive(Debug, Clone, PartialEq)]
pub enum InputLine {
    Frame(Gesture),
    Quit,
    Status,
    Reset,
    SetPeer(Option<PeerAddress>),
}

pub fn parse_line(line: &str) -> anyhow::Result<InputLine> {
    let line = line.trim();

    if line.starts_with('[') {
        let points: Vec<(f32, f32)> = serde_json::from_str(line)?;
        let hand = HandLandmarks::from_points(&points).ok_or_else(|| {
            anyhow::anyhow!(
                "expected {} landmarks, got {}",
                classifier::LANDMARK_COUNT,
                points.len()
            )
        })?;
        return Ok(InputLine::Frame(classifier::classify(&hand)));
    }

    match line.split_once(char::is_whitespace) {
        Some(("p", addr)) => {
            let addr = addr.trim();
            if addr.is_empty() || addr == "-" {
                Ok(InputLine::SetPeer(None))
            } else {
                Ok(InputLine::SetPeer(Some(addr.parse()?)))
            }
        }
        _ => match line {
            "q" | "quit" => Ok(InputLine::Quit),
            "s" | "status" => Ok(InputLine::Status),
            "r" | "reset" => Ok(InputLine::Reset),
            "p" => Ok(InputLine::SetPeer(None)),
            label => Ok(InputLine::Frame(
                label.parse::<Gesture>().map_err(anyhow::Error::msg)?,
            )),
        },
    }
}
