//! TCP 推送传输

use super::{PeerAddress, SendPolicy, SendReport, TransferError, Transport, protocol};
use async_trait::async_trait;
use std::path::Path;

/// 通过 [`protocol`] 直接推送到对端的接收服务
#[derive(Debug, Clone, Default)]
pub struct TcpPushTransport {
    policy: SendPolicy,
}

impl TcpPushTransport {
    pub fn new(policy: SendPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SendPolicy {
        &self.policy
    }
}

#[async_trait]
impl Transport for TcpPushTransport {
    fn name(&self) -> &'static str {
        "tcp"
    }

    async fn send(
        &self,
        payload: &Path,
        peer: Option<&PeerAddress>,
    ) -> Result<SendReport, TransferError> {
        protocol::send_file(payload, peer, &self.policy).await
    }
}
