//! 会话控制器
//!
//! 手势 → 动作的状态机:
//!
//! ```text
//! Idle --✌--> Captured --✊--> Sending --成功--> Idle
//!                  ^                  |
//!                  +------失败--------+
//! ```
//!
//! `receive_armed` 与截图/发送状态正交，由 [`ReceiveServer`] 维护。
//!
//! 两种角色模型:
//! - **对称模式**：任一端都可截图、发送；✋ 进入一次性接收
//! - **协商模式**：启动时固定为发送端或接收端；接收端立即常驻监听并忽略所有手势

use log::{debug, info, warn};

use crate::capture::ScreenCapture;
use crate::config::{SessionMode, same_path};
use crate::events::{EventSender, SessionEvent, emit};
use crate::gesture::Gesture;
use crate::net::PeerAddress;
use crate::receiver::{ArmMode, ArmOutcome, ReceiveServer};
use crate::transfer::{SendReport, TransferError, Transport};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// 协商模式下的角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    /// 已截图，等待发送
    Captured,
    Sending,
}

/// 当前待发送的截图
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub path: PathBuf,
    pub size: u64,
}

/// 供界面层渲染的状态快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub mode: SessionMode,
    pub state: ControllerState,
    pub receive_armed: bool,
    pub peer: Option<PeerAddress>,
}

impl SessionStatus {
    pub fn text(&self) -> &'static str {
        if self.mode == SessionMode::Receiver {
            return "Receiving mode active";
        }
        match self.state {
            ControllerState::Sending => "Sending...",
            ControllerState::Captured => "Screenshot taken - Ready to send",
            ControllerState::Idle if self.receive_armed => "Receiving mode active",
            ControllerState::Idle => "Ready",
        }
    }

    pub fn peer_text(&self) -> String {
        match &self.peer {
            Some(peer) => format!("Partner: {peer}"),
            None => "Partner: Not set".to_string(),
        }
    }
}

/// 一次手势分发的结果
#[derive(Debug)]
pub enum Outcome {
    /// 当前状态或模式下不响应该手势
    Ignored,
    Captured(Payload),
    CaptureFailed(String),
    Sent(SendReport),
    SendFailed(TransferError),
    ReceiveArmed(SocketAddr),
    AlreadyArmed,
    ArmFailed(TransferError),
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub mode: SessionMode,
    /// 截图保存路径，不能与接收路径相同
    pub capture_path: PathBuf,
    /// 两次截图之间的最短间隔
    pub capture_cooldown: Duration,
    pub peer: Option<PeerAddress>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            mode: SessionMode::Symmetric,
            capture_path: PathBuf::from("screenshot.png"),
            capture_cooldown: Duration::from_secs(1),
            peer: None,
        }
    }
}

pub struct SessionController {
    options: SessionOptions,
    state: ControllerState,
    payload: Option<Payload>,
    last_capture: Option<Instant>,
    capture: Arc<dyn ScreenCapture>,
    transport: Arc<dyn Transport>,
    receiver: Arc<ReceiveServer>,
    events: Option<EventSender>,
}

impl SessionController {
    pub fn new(
        options: SessionOptions,
        capture: Arc<dyn ScreenCapture>,
        transport: Arc<dyn Transport>,
        receiver: Arc<ReceiveServer>,
    ) -> anyhow::Result<Self> {
        if same_path(&options.capture_path, &receiver.config().receive_path) {
            anyhow::bail!(
                "capture path and receive path must differ (both are {:?})",
                options.capture_path
            );
        }

        Ok(Self {
            options,
            state: ControllerState::Idle,
            payload: None,
            last_capture: None,
            capture,
            transport,
            receiver,
            events: None,
        })
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// 会话开始：协商模式的接收端立即常驻监听
    pub async fn start(&mut self) -> Result<(), TransferError> {
        if self.options.mode.role() == Some(Role::Receiver) {
            self.receiver.arm(ArmMode::Persistent).await?;
        }
        info!("Session started in {} mode", self.options.mode);
        Ok(())
    }

    /// 会话结束：撤防并等待后台任务释放端口
    pub async fn shutdown(&mut self) {
        if self.receiver.disarm().await {
            info!("Receiver stopped");
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    pub fn mode(&self) -> SessionMode {
        self.options.mode
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            mode: self.options.mode,
            state: self.state,
            receive_armed: self.receiver.is_armed(),
            peer: self.options.peer.clone(),
        }
    }

    pub fn peer(&self) -> Option<&PeerAddress> {
        self.options.peer.as_ref()
    }

    pub fn set_peer(&mut self, peer: Option<PeerAddress>) {
        match &peer {
            Some(p) => info!("Partner set to {}", p),
            None => info!("Partner cleared"),
        }
        self.options.peer = peer;
    }

    /// 分发一个去抖后的手势事件
    pub async fn handle(&mut self, gesture: Gesture) -> Outcome {
        let role = self.options.mode.role();
        let outcome = match (gesture, role) {
            (Gesture::None, _) | (_, Some(Role::Receiver)) => Outcome::Ignored,
            (Gesture::TwoFingers, _) => self.capture().await,
            (Gesture::Fist, _) => match self.send().await {
                Ok(report) => Outcome::Sent(report),
                Err(e) => Outcome::SendFailed(e),
            },
            (Gesture::OpenPalm, None) => self.arm_receiver().await,
            (Gesture::OpenPalm, Some(Role::Sender)) => Outcome::Ignored,
        };
        debug!("{} {} -> {:?}", gesture.icon(), gesture, outcome);
        outcome
    }

    /// 截图并保存为待发送的 payload
    pub async fn capture(&mut self) -> Outcome {
        if self.state != ControllerState::Idle {
            debug!("Capture ignored, payload already pending");
            return Outcome::Ignored;
        }
        if let Some(last) = self.last_capture {
            if last.elapsed() < self.options.capture_cooldown {
                debug!("Capture ignored, cooldown active");
                return Outcome::Ignored;
            }
        }

        let bytes = match self.capture.capture() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Error taking screenshot: {:#}", e);
                emit(
                    self.events.as_ref(),
                    SessionEvent::CaptureFailed(e.to_string()),
                );
                return Outcome::CaptureFailed(format!("{e:#}"));
            }
        };

        let path = self.options.capture_path.clone();
        if let Err(e) = write_payload(&path, &bytes).await {
            warn!("Failed to store screenshot at {:?}: {}", path, e);
            emit(
                self.events.as_ref(),
                SessionEvent::CaptureFailed(e.to_string()),
            );
            return Outcome::CaptureFailed(e.to_string());
        }

        let payload = Payload {
            path: path.clone(),
            size: bytes.len() as u64,
        };
        self.payload = Some(payload.clone());
        self.state = ControllerState::Captured;
        self.last_capture = Some(Instant::now());

        info!("Screenshot taken ({} bytes)", payload.size);
        emit(
            self.events.as_ref(),
            SessionEvent::Captured {
                path,
                bytes: payload.size,
            },
        );
        Outcome::Captured(payload)
    }

    /// 发送当前 payload
    ///
    /// 成功后回到 `Idle`；失败时保持 `Captured`，可以再次 ✊ 重试。
    /// 本地截图文件不会被删除。
    pub async fn send(&mut self) -> Result<SendReport, TransferError> {
        let Some(payload) = self.payload.clone() else {
            warn!("No screenshot found to send");
            return Err(TransferError::NoPayload(self.options.capture_path.clone()));
        };
        if self.transport.requires_peer() && self.options.peer.is_none() {
            warn!("No partner address configured");
            return Err(TransferError::NoPeerConfigured);
        }

        let destination = self
            .options
            .peer
            .as_ref()
            .map_or_else(|| self.transport.name().to_string(), ToString::to_string);
        self.state = ControllerState::Sending;
        emit(
            self.events.as_ref(),
            SessionEvent::SendStarted {
                destination: destination.clone(),
            },
        );

        let result = self
            .transport
            .send(&payload.path, self.options.peer.as_ref())
            .await;

        match &result {
            Ok(report) => {
                self.state = ControllerState::Idle;
                self.payload = None;
                info!("Screenshot sent to {}", report.destination);
                emit(
                    self.events.as_ref(),
                    SessionEvent::SendCompleted {
                        destination: report.destination.clone(),
                        bytes: report.bytes,
                    },
                );
            }
            Err(e) => {
                self.state = ControllerState::Captured;
                warn!("Sending to {} failed: {}", destination, e);
                emit(self.events.as_ref(), SessionEvent::SendFailed(e.to_string()));
            }
        }
        result
    }

    /// 丢弃待发送的截图，回到 `Idle`
    pub fn reset(&mut self) {
        if self.payload.take().is_some() {
            info!("Screenshot reset");
        }
        self.state = ControllerState::Idle;
    }

    async fn arm_receiver(&mut self) -> Outcome {
        if self.receiver.is_armed() {
            return Outcome::AlreadyArmed;
        }
        match self.receiver.arm(ArmMode::OneShot).await {
            Ok(ArmOutcome::Armed(addr)) => Outcome::ReceiveArmed(addr),
            Ok(ArmOutcome::AlreadyArmed) => Outcome::AlreadyArmed,
            Err(e) => {
                warn!("Failed to enter receive mode: {}", e);
                Outcome::ArmFailed(e)
            }
        }
    }
}

async fn write_payload(path: &std::path::Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receiver::ReceiverConfig;
    use async_trait::async_trait;
    use std::net::Ipv4Addr;
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StaticCapture(Vec<u8>);

    impl ScreenCapture for StaticCapture {
        fn capture(&self) -> anyhow::Result<Vec<u8>> {
            Ok(self.0.clone())
        }
    }

    /// 记录调用次数，按预设结果返回
    struct ScriptedTransport {
        calls: AtomicU32,
        fail: Mutex<bool>,
    }

    impl ScriptedTransport {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                fail: Mutex::new(fail),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn send(
            &self,
            payload: &Path,
            peer: Option<&PeerAddress>,
        ) -> Result<SendReport, TransferError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if *self.fail.lock().unwrap() {
                return Err(TransferError::PeerNotReady {
                    peer: peer.map(ToString::to_string).unwrap_or_default(),
                    attempts: 3,
                });
            }
            Ok(SendReport {
                bytes: std::fs::metadata(payload)?.len(),
                attempts: 1,
                destination: peer.map(ToString::to_string).unwrap_or_default(),
            })
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        transport: Arc<ScriptedTransport>,
        session: SessionController,
    }

    fn fixture(mode: SessionMode, fail: bool, peer: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let receiver = Arc::new(ReceiveServer::new(ReceiverConfig {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            receive_path: dir.path().join("received.png"),
            one_shot_window: Duration::from_secs(30),
            poll_interval: Duration::from_millis(20),
            io_timeout: Duration::from_secs(5),
        }));
        let transport = ScriptedTransport::new(fail);
        let options = SessionOptions {
            mode,
            capture_path: dir.path().join("screenshot.png"),
            capture_cooldown: Duration::from_secs(1),
            peer: peer.then(|| PeerAddress::new("127.0.0.1", 5001)),
        };
        let session = SessionController::new(
            options,
            Arc::new(StaticCapture(b"frame".to_vec())),
            transport.clone(),
            receiver,
        )
        .unwrap();
        Fixture {
            dir,
            transport,
            session,
        }
    }

    #[tokio::test]
    async fn test_capture_then_send() {
        let mut f = fixture(SessionMode::Symmetric, false, true);

        assert!(matches!(f.session.handle(Gesture::TwoFingers).await, Outcome::Captured(_)));
        assert_eq!(f.session.state(), ControllerState::Captured);
        assert_eq!(f.session.status().text(), "Screenshot taken - Ready to send");

        let Outcome::Sent(report) = f.session.handle(Gesture::Fist).await else {
            panic!("expected send to succeed");
        };
        assert_eq!(report.bytes, 5);
        assert_eq!(f.session.state(), ControllerState::Idle);
        assert!(f.session.payload().is_none());
        // 本地文件保留
        assert!(f.dir.path().join("screenshot.png").exists());
    }

    #[tokio::test]
    async fn test_send_without_capture_reports_no_payload() {
        let mut f = fixture(SessionMode::Symmetric, false, true);
        let outcome = f.session.handle(Gesture::Fist).await;
        assert!(matches!(outcome, Outcome::SendFailed(TransferError::NoPayload(_))));
        assert_eq!(f.transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_send_without_peer_reports_not_configured() {
        let mut f = fixture(SessionMode::Symmetric, false, false);
        f.session.handle(Gesture::TwoFingers).await;
        let outcome = f.session.handle(Gesture::Fist).await;
        assert!(matches!(outcome, Outcome::SendFailed(TransferError::NoPeerConfigured)));
        assert_eq!(f.transport.calls(), 0);
        assert_eq!(f.session.state(), ControllerState::Captured);
    }

    #[tokio::test]
    async fn test_failed_send_stays_captured_for_retry() {
        let mut f = fixture(SessionMode::Symmetric, true, true);
        f.session.handle(Gesture::TwoFingers).await;

        let outcome = f.session.handle(Gesture::Fist).await;
        assert!(matches!(outcome, Outcome::SendFailed(TransferError::PeerNotReady { .. })));
        assert_eq!(f.session.state(), ControllerState::Captured);
        assert!(f.session.payload().is_some());

        *f.transport.fail.lock().unwrap() = false;
        assert!(matches!(f.session.handle(Gesture::Fist).await, Outcome::Sent(_)));
        assert_eq!(f.transport.calls(), 2);
        assert_eq!(f.session.state(), ControllerState::Idle);
    }

    #[tokio::test]
    async fn test_no_recapture_while_pending() {
        let mut f = fixture(SessionMode::Symmetric, false, true);
        f.session.handle(Gesture::TwoFingers).await;
        assert!(matches!(f.session.handle(Gesture::TwoFingers).await, Outcome::Ignored));
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_cooldown() {
        let mut f = fixture(SessionMode::Symmetric, false, true);
        f.session.handle(Gesture::TwoFingers).await;
        f.session.handle(Gesture::Fist).await;
        assert_eq!(f.session.state(), ControllerState::Idle);

        // 冷却期内忽略
        assert!(matches!(f.session.handle(Gesture::TwoFingers).await, Outcome::Ignored));

        tokio::time::advance(Duration::from_millis(1100)).await;
        assert!(matches!(f.session.handle(Gesture::TwoFingers).await, Outcome::Captured(_)));
    }

    #[tokio::test]
    async fn test_open_palm_arms_once() {
        let mut f = fixture(SessionMode::Symmetric, false, true);
        assert!(matches!(f.session.handle(Gesture::OpenPalm).await, Outcome::ReceiveArmed(_)));
        assert!(f.session.status().receive_armed);
        assert!(matches!(f.session.handle(Gesture::OpenPalm).await, Outcome::AlreadyArmed));

        f.session.shutdown().await;
        assert!(!f.session.status().receive_armed);
    }

    #[tokio::test]
    async fn test_sender_role_ignores_open_palm() {
        let mut f = fixture(SessionMode::Sender, false, true);
        f.session.start().await.unwrap();
        assert!(matches!(f.session.handle(Gesture::OpenPalm).await, Outcome::Ignored));
        assert!(!f.session.status().receive_armed);
        assert!(matches!(f.session.handle(Gesture::TwoFingers).await, Outcome::Captured(_)));
    }

    #[tokio::test]
    async fn test_receiver_role_arms_and_ignores_gestures() {
        let mut f = fixture(SessionMode::Receiver, false, true);
        f.session.start().await.unwrap();
        assert!(f.session.status().receive_armed);
        assert_eq!(f.session.status().text(), "Receiving mode active");

        for g in [Gesture::TwoFingers, Gesture::Fist, Gesture::OpenPalm] {
            assert!(matches!(f.session.handle(g).await, Outcome::Ignored));
        }
        assert_eq!(f.transport.calls(), 0);

        f.session.shutdown().await;
        assert!(!f.session.status().receive_armed);
    }

    #[test]
    fn test_rejects_aliased_paths() {
        let receiver = Arc::new(ReceiveServer::new(ReceiverConfig {
            receive_path: PathBuf::from("same.png"),
            ..Default::default()
        }));
        let options = SessionOptions {
            capture_path: PathBuf::from("same.png"),
            ..Default::default()
        };
        let result = SessionController::new(
            options,
            Arc::new(StaticCapture(Vec::new())),
            ScriptedTransport::new(false),
            receiver,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_equivalent_paths() {
        let dir = tempfile::tempdir().unwrap();
        let receiver = Arc::new(ReceiveServer::new(ReceiverConfig {
            receive_path: dir.path().join("same.png"),
            ..Default::default()
        }));
        let options = SessionOptions {
            capture_path: dir.path().join(".").join("shots").join("..").join("same.png"),
            ..Default::default()
        };
        let result = SessionController::new(
            options,
            Arc::new(StaticCapture(Vec::new())),
            ScriptedTransport::new(false),
            receiver,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_status_text() {
        let mut status = SessionStatus {
            mode: SessionMode::Symmetric,
            state: ControllerState::Idle,
            receive_armed: false,
            peer: None,
        };
        assert_eq!(status.text(), "Ready");
        assert_eq!(status.peer_text(), "Partner: Not set");

        status.receive_armed = true;
        assert_eq!(status.text(), "Receiving mode active");

        status.state = ControllerState::Sending;
        status.peer = Some(PeerAddress::new("10.0.0.2", 5001));
        assert_eq!(status.text(), "Sending...");
        assert_eq!(status.peer_text(), "Partner: 10.0.0.2:5001");
    }
}
