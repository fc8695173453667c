//! AirShare Core Library
//!
//! 手势触发的局域网点对点截图传输引擎
//!
//! # 模块
//!
//! - **gesture**: 手势分类（关键点 → 标签）与边沿触发去抖
//! - **transfer**: TCP 传输协议（大小头 + ACK + 数据流）及 HTTP 拉取共享
//! - **receiver**: 后台接收服务（一次性 / 常驻两种布防模式）
//! - **session**: 手势到动作的会话状态机
//! - **capture**: 截屏与显示协作者接口
//! - **config**: 应用设置与持久化
//! - **net**: 对端地址与本机 IP
//!
//! # 使用示例
//!
//! ```ignore
//! use airshare_core::{AppSettings, GestureDebouncer, SessionController};
//!
//! let settings = AppSettings::load();
//! let receiver = Arc::new(ReceiveServer::new(settings.receiver_config()));
//! let transport = Arc::new(TcpPushTransport::new(settings.send_policy()));
//! let mut session = SessionController::new(settings.session_options()?, capture, transport, receiver)?;
//! session.start().await?;
//!
//! let mut debouncer = GestureDebouncer::new(settings.release_frames);
//! for label in frames {
//!     if let Some(gesture) = debouncer.push(label) {
//!         session.handle(gesture).await;
//!     }
//! }
//! session.shutdown().await;
//! ```

pub mod capture;
pub mod config;
pub mod events;
pub mod gesture;
pub mod net;
pub mod receiver;
pub mod session;
pub mod transfer;

pub use capture::{CommandDisplay, FileCapture, ImageDisplay, ScreenCapture};
pub use config::{AppSettings, SessionMode, TransportKind};
pub use events::{EventSender, SessionEvent, event_channel};
pub use gesture::{Gesture, GestureDebouncer, HandLandmarks, classify};
pub use net::{DEFAULT_PORT, PeerAddress, local_ip};
pub use receiver::{ArmMode, ArmOutcome, ReceiveServer, ReceiverConfig};
pub use session::{
    ControllerState, Outcome, Payload, Role, SessionController, SessionOptions, SessionStatus,
};
pub use transfer::{
    HttpPullTransport, HttpShareServer, SendPolicy, SendReport, TcpPushTransport, TransferError,
    Transport,
};
