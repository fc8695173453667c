//! 对端地址与本机网络信息

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::str::FromStr;

/// 传输协议固定端口
pub const DEFAULT_PORT: u16 = 5001;

/// 对端地址解析失败
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid peer address: {0:?}")]
pub struct InvalidPeerAddress(pub String);

/// 传输对端（主机 + 端口）
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerAddress {
    host: String,
    port: u16,
}

impl PeerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl From<SocketAddr> for PeerAddress {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for PeerAddress {
    type Err = InvalidPeerAddress;

    /// 接受 `host`、`host:port`、`[v6]:port` 或裸 IPv6；未指定端口时使用 [`DEFAULT_PORT`]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(InvalidPeerAddress(s.to_string()));
        }

        if let Ok(addr) = s.parse::<SocketAddr>() {
            return Ok(addr.into());
        }
        if let Ok(ip) = s.parse::<IpAddr>() {
            return Ok(Self::new(ip.to_string(), DEFAULT_PORT));
        }

        match s.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| InvalidPeerAddress(s.to_string()))?;
                if host.is_empty() || host.contains(':') {
                    return Err(InvalidPeerAddress(s.to_string()));
                }
                Ok(Self::new(host, port))
            }
            None if s.chars().any(char::is_whitespace) => Err(InvalidPeerAddress(s.to_string())),
            None => Ok(Self::new(s, DEFAULT_PORT)),
        }
    }
}

/// 获取本机局域网 IP
///
/// 通过未发送数据的 UDP "连接" 让系统选择出口网卡；失败时回退到 127.0.0.1。
pub fn local_ip() -> IpAddr {
    UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|socket| {
            socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80))?;
            socket.local_addr()
        })
        .map_or(IpAddr::V4(Ipv4Addr::LOCALHOST), |addr| addr.ip())
}

/// 获取设备名称（主机名）
pub fn device_name() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "AirShare".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_only() {
        let peer: PeerAddress = "192.168.1.20".parse().unwrap();
        assert_eq!(peer.host(), "192.168.1.20");
        assert_eq!(peer.port(), DEFAULT_PORT);
    }

    #[test]
    fn test_parse_host_port() {
        let peer: PeerAddress = "laptop.local:6000".parse().unwrap();
        assert_eq!(peer.host(), "laptop.local");
        assert_eq!(peer.port(), 6000);
        assert_eq!(peer.to_string(), "laptop.local:6000");
    }

    #[test]
    fn test_parse_ipv6() {
        let peer: PeerAddress = "[::1]:7000".parse().unwrap();
        assert_eq!(peer.host(), "::1");
        assert_eq!(peer.port(), 7000);
        assert_eq!(peer.to_string(), "[::1]:7000");

        let bare: PeerAddress = "fe80::1".parse().unwrap();
        assert_eq!(bare.port(), DEFAULT_PORT);
    }

    #[test]
    fn test_parse_invalid() {
        assert!("".parse::<PeerAddress>().is_err());
        assert!("host:notaport".parse::<PeerAddress>().is_err());
        assert!("two words".parse::<PeerAddress>().is_err());
    }
}
