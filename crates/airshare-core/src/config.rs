//! 应用配置和持久化
//!
//! 提供对端地址、角色模式、路径和各类超时的存储和读取。

use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::gesture::debouncer::DEFAULT_RELEASE_FRAMES;
use crate::net::{DEFAULT_PORT, PeerAddress};
use crate::receiver::ReceiverConfig;
use crate::session::{Role, SessionOptions};
use crate::transfer::SendPolicy;
use crate::transfer::http_share::DEFAULT_SHARE_PORT;

/// 会话模式
///
/// `Symmetric` 无固定角色；`Sender` / `Receiver` 为协商模式下的固定角色。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    #[default]
    Symmetric,
    Sender,
    Receiver,
}

impl SessionMode {
    /// 协商模式下的角色，对称模式为 `None`
    pub fn role(self) -> Option<Role> {
        match self {
            SessionMode::Symmetric => None,
            SessionMode::Sender => Some(Role::Sender),
            SessionMode::Receiver => Some(Role::Receiver),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SessionMode::Symmetric => "symmetric",
            SessionMode::Sender => "sender",
            SessionMode::Receiver => "receiver",
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for SessionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "symmetric" | "sym" => Ok(SessionMode::Symmetric),
            "sender" | "s" => Ok(SessionMode::Sender),
            "receiver" | "r" => Ok(SessionMode::Receiver),
            other => Err(format!("unknown session mode: {other}")),
        }
    }
}

/// 发送方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// 直接推送到对端接收服务
    #[default]
    Tcp,
    /// 本机 HTTP 共享，对端自行下载
    Http,
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tcp" | "push" => Ok(TransportKind::Tcp),
            "http" | "pull" => Ok(TransportKind::Http),
            other => Err(format!("unknown transport: {other}")),
        }
    }
}

/// 应用设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// 对端地址（`host` 或 `host:port`）
    pub peer: Option<String>,
    /// 本机接收端口
    pub port: u16,
    pub mode: SessionMode,
    pub transport: TransportKind,
    /// 截图保存路径
    pub capture_path: PathBuf,
    /// 接收文件保存路径
    pub receive_path: PathBuf,
    /// 截图来源文件（由外部截屏工具写入）
    pub capture_source: Option<PathBuf>,
    /// 打开收到图片的程序，如 `xdg-open`
    pub display_command: Option<String>,
    pub connect_timeout_secs: u64,
    pub send_attempts: u32,
    pub retry_backoff_ms: u64,
    /// 一次性接收窗口
    pub receive_window_secs: u64,
    pub poll_interval_ms: u64,
    pub io_timeout_secs: u64,
    pub capture_cooldown_ms: u64,
    /// 手势松开判定帧数
    pub release_frames: u32,
    /// HTTP 共享端口
    pub share_port: u16,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            peer: None,
            port: DEFAULT_PORT,
            mode: SessionMode::Symmetric,
            transport: TransportKind::Tcp,
            capture_path: PathBuf::from("screenshot.png"),
            receive_path: PathBuf::from("received_screenshot.png"),
            capture_source: None,
            display_command: None,
            connect_timeout_secs: 5,
            send_attempts: 3,
            retry_backoff_ms: 2000,
            receive_window_secs: 60,
            poll_interval_ms: 1000,
            io_timeout_secs: 30,
            capture_cooldown_ms: 1000,
            release_frames: DEFAULT_RELEASE_FRAMES,
            share_port: DEFAULT_SHARE_PORT,
        }
    }
}

impl AppSettings {
    /// 获取配置文件路径
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("airshare");
        config_dir.join("settings.toml")
    }

    /// 加载设置（如果文件不存在则使用默认值）
    pub fn load() -> Self {
        let path = Self::config_path();
        if path.exists() {
            match fs::read_to_string(&path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(settings) => {
                        debug!("Loaded settings from {:?}", path);
                        return settings;
                    }
                    Err(e) => {
                        log::warn!("Failed to parse settings: {}, using defaults", e);
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read settings file: {}, using defaults", e);
                }
            }
        }
        Self::default()
    }

    /// 保存设置
    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, self.to_toml()?)?;
        debug!("Saved settings to {:?}", path);
        Ok(())
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// 校验设置间的约束
    pub fn validate(&self) -> anyhow::Result<()> {
        if same_path(&self.capture_path, &self.receive_path) {
            anyhow::bail!(
                "capture_path and receive_path must differ (both are {:?})",
                self.capture_path
            );
        }
        if self.port == self.share_port && self.transport == TransportKind::Http {
            anyhow::bail!("port and share_port must differ when sharing over HTTP");
        }
        self.peer_address()?;
        Ok(())
    }

    pub fn peer_address(&self) -> anyhow::Result<Option<PeerAddress>> {
        match self.peer.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => Ok(Some(raw.parse()?)),
        }
    }

    pub fn send_policy(&self) -> SendPolicy {
        SendPolicy {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            attempts: self.send_attempts.max(1),
            backoff: Duration::from_millis(self.retry_backoff_ms),
            io_timeout: Duration::from_secs(self.io_timeout_secs),
        }
    }

    pub fn receiver_config(&self) -> ReceiverConfig {
        ReceiverConfig {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port)),
            receive_path: self.receive_path.clone(),
            one_shot_window: Duration::from_secs(self.receive_window_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            io_timeout: Duration::from_secs(self.io_timeout_secs),
        }
    }

    pub fn session_options(&self) -> anyhow::Result<SessionOptions> {
        Ok(SessionOptions {
            mode: self.mode,
            capture_path: self.capture_path.clone(),
            capture_cooldown: Duration::from_millis(self.capture_cooldown_ms),
            peer: self.peer_address()?,
        })
    }

    pub fn share_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.share_port))
    }
}

/// 判断两个路径是否指向同一位置
///
/// 相对路径按当前目录补全，并按字面消去 `.` 和 `..`，不访问文件系统。
pub fn same_path(a: &Path, b: &Path) -> bool {
    normalize_path(a) == normalize_path(b)
}

fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component);
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}
