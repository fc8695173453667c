//! 会话事件
//!
//! 控制器和后台接收服务通过有界 channel 推送状态变化，供界面层显示。
//! 发送端使用 `try_send`，channel 满时丢弃事件而不阻塞。

use crate::receiver::ArmMode;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Captured { path: PathBuf, bytes: u64 },
    CaptureFailed(String),
    SendStarted { destination: String },
    SendCompleted { destination: String, bytes: u64 },
    SendFailed(String),
    ReceiveArmed { mode: ArmMode, addr: SocketAddr },
    ReceiveCompleted { path: PathBuf, bytes: u64, from: SocketAddr },
    ReceiveFailed(String),
    ReceiveTimedOut,
    ReceiveDisarmed,
}

pub type EventSender = mpsc::Sender<SessionEvent>;

pub fn event_channel() -> (EventSender, mpsc::Receiver<SessionEvent>) {
    mpsc::channel(32)
}

pub(crate) fn emit(tx: Option<&EventSender>, event: SessionEvent) {
    if let Some(tx) = tx {
        let _ = tx.try_send(event);
    }
}
