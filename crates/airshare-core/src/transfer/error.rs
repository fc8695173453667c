//! 传输错误分类

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransferError {
    /// 本地没有可发送的截图
    #[error("no payload captured at {}", .0.display())]
    NoPayload(PathBuf),

    #[error("no peer address configured")]
    NoPeerConfigured,

    /// 对端可达但拒绝连接：接收方当前未处于接收模式
    #[error("peer {peer} is not ready to receive (refused {attempts} attempts)")]
    PeerNotReady { peer: String, attempts: u32 },

    #[error("connecting to {peer} timed out after {timeout:?}")]
    ConnectTimeout { peer: String, timeout: Duration },

    /// 大小头非法或连接提前关闭
    #[error("transfer incomplete: {0}")]
    TransferIncomplete(String),

    #[error("address {0} is already in use")]
    AddressInUse(SocketAddr),

    #[error("i/o failure: {0}")]
    Io(#[from] io::Error),
}

impl TransferError {
    pub(crate) fn incomplete(received: u64, expected: u64) -> Self {
        TransferError::TransferIncomplete(format!(
            "connection closed after {received} of {expected} bytes"
        ))
    }

    /// 发送端是否应在重试预算内再次尝试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransferError::ConnectTimeout { .. }
                | TransferError::TransferIncomplete(_)
                | TransferError::Io(_)
        )
    }

    /// 是否为连接被拒绝
    pub fn is_refused(&self) -> bool {
        matches!(self, TransferError::Io(e) if e.kind() == io::ErrorKind::ConnectionRefused)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        let refused: TransferError = io::Error::from(io::ErrorKind::ConnectionRefused).into();
        assert!(refused.is_refused());
        assert!(refused.is_retryable());

        assert!(!TransferError::NoPeerConfigured.is_retryable());
        assert!(!TransferError::NoPayload(PathBuf::from("x.png")).is_retryable());
        assert!(TransferError::incomplete(10, 20).is_retryable());
        assert!(!TransferError::incomplete(10, 20).is_refused());
    }

    #[test]
    fn test_incomplete_message() {
        let err = TransferError::incomplete(512, 2048);
        assert_eq!(
            err.to_string(),
            "transfer incomplete: connection closed after 512 of 2048 bytes"
        );
    }
}
