//! 文件传输模块
//!
//! 包含:
//! - TCP 推送协议（大小头 + ACK + 分块数据）
//! - HTTP 拉取共享（对端用浏览器下载）
//! - 两者共用的 [`Transport`] 接口

pub mod error;
pub mod http_share;
pub mod protocol;
pub mod push;

pub use error::TransferError;
pub use http_share::{HttpPullTransport, HttpShareServer};
pub use protocol::{AcceptOutcome, ReceivedFile, SendPolicy};
pub use push::TcpPushTransport;

pub use crate::net::PeerAddress;

use async_trait::async_trait;
use std::path::Path;

/// 一次成功发送的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    /// 发送（或共享）的字节数
    pub bytes: u64,
    /// 成功时是第几次尝试
    pub attempts: u32,
    /// 对端地址或下载 URL
    pub destination: String,
}

/// 发送截图的传输方式
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;

    /// 是否需要配置对端地址
    fn requires_peer(&self) -> bool {
        true
    }

    /// 发送本地文件；不会删除文件
    async fn send(
        &self,
        payload: &Path,
        peer: Option<&PeerAddress>,
    ) -> Result<SendReport, TransferError>;
}
