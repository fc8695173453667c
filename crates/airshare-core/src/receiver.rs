//! 后台接收服务
//!
//! 在独立的 tokio 任务中运行 accept / 接收循环，生命周期:
//!
//! - **一次性布防**：最多接收一个文件，窗口（默认 60 秒）结束、成功或失败后自动撤防。
//!   窗口是硬限制，窗口结束时仍在进行的传输会被中止
//! - **常驻布防**：持续接收，直到显式撤防或会话结束
//!
//! 两种模式都以较短的 accept 超时（默认 1 秒）轮询取消令牌，撤防不会中断常驻模式下传输中的连接。
//! 监听套接字在清除布防标志之前释放，因此撤防后可以立即重新绑定同一端口。

use log::{debug, error, info, warn};

use crate::capture::ImageDisplay;
use crate::events::{EventSender, SessionEvent, emit};
use crate::transfer::TransferError;
use crate::transfer::protocol::{self, ReceivedFile};
use serde::{Deserialize, Serialize};
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// 布防模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArmMode {
    OneShot,
    Persistent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmOutcome {
    /// 新开始监听，附带实际绑定地址
    Armed(SocketAddr),
    /// 已在监听，本次调用无效果
    AlreadyArmed,
}

#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    pub bind_addr: SocketAddr,
    /// 收到的文件保存路径（每次覆盖）
    pub receive_path: PathBuf,
    /// 一次性布防的等待窗口
    pub one_shot_window: Duration,
    /// accept 轮询间隔，决定撤防的响应速度
    pub poll_interval: Duration,
    /// 已建立连接上单次读写的超时
    pub io_timeout: Duration,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, crate::net::DEFAULT_PORT)),
            receive_path: PathBuf::from("received_screenshot.png"),
            one_shot_window: Duration::from_secs(60),
            poll_interval: Duration::from_secs(1),
            io_timeout: Duration::from_secs(30),
        }
    }
}

struct ActiveListener {
    mode: ArmMode,
    addr: SocketAddr,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// 后台任务共享的上下文
#[derive(Clone)]
struct ListenerContext {
    config: ReceiverConfig,
    armed: Arc<AtomicBool>,
    events: Option<EventSender>,
    display: Option<Arc<dyn ImageDisplay>>,
}

pub struct ReceiveServer {
    config: ReceiverConfig,
    /// 由控制器置位、后台任务清除
    armed: Arc<AtomicBool>,
    active: Mutex<Option<ActiveListener>>,
    events: Option<EventSender>,
    display: Option<Arc<dyn ImageDisplay>>,
}

impl ReceiveServer {
    pub fn new(config: ReceiverConfig) -> Self {
        Self {
            config,
            armed: Arc::new(AtomicBool::new(false)),
            active: Mutex::new(None),
            events: None,
            display: None,
        }
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_display(mut self, display: Arc<dyn ImageDisplay>) -> Self {
        self.display = Some(display);
        self
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    /// 当前是否在监听
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// 当前监听的模式与地址
    pub async fn active(&self) -> Option<(ArmMode, SocketAddr)> {
        if !self.is_armed() {
            return None;
        }
        self.active.lock().await.as_ref().map(|a| (a.mode, a.addr))
    }

    /// 开始监听
    ///
    /// 已在监听时返回 [`ArmOutcome::AlreadyArmed`]，不会创建第二个监听者。
    pub async fn arm(&self, mode: ArmMode) -> Result<ArmOutcome, TransferError> {
        let mut active = self.active.lock().await;
        if self.is_armed() {
            debug!("Receiver already armed, ignoring arm request");
            return Ok(ArmOutcome::AlreadyArmed);
        }

        // 回收已自动撤防的上一个任务，确保旧套接字已关闭
        if let Some(previous) = active.take() {
            if let Err(e) = previous.handle.await {
                error!("Previous receive task failed: {}", e);
            }
        }

        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| {
                if e.kind() == io::ErrorKind::AddrInUse {
                    TransferError::AddressInUse(self.config.bind_addr)
                } else {
                    e.into()
                }
            })?;
        let addr = listener.local_addr()?;

        self.armed.store(true, Ordering::Release);

        let cancel = CancellationToken::new();
        let ctx = ListenerContext {
            config: self.config.clone(),
            armed: self.armed.clone(),
            events: self.events.clone(),
            display: self.display.clone(),
        };
        let handle = tokio::spawn(run_listener(listener, mode, ctx, cancel.clone()));

        match mode {
            ArmMode::OneShot => info!(
                "Ready to receive on {} ({:?} window)",
                addr, self.config.one_shot_window
            ),
            ArmMode::Persistent => info!("Ready to receive on {} until stopped", addr),
        }
        emit(self.events.as_ref(), SessionEvent::ReceiveArmed { mode, addr });

        *active = Some(ActiveListener {
            mode,
            addr,
            cancel,
            handle,
        });
        Ok(ArmOutcome::Armed(addr))
    }

    /// 停止监听并等待后台任务退出，返回之前是否有任务
    ///
    /// 返回时监听套接字已经释放。
    pub async fn disarm(&self) -> bool {
        let Some(active) = self.active.lock().await.take() else {
            return false;
        };
        active.cancel.cancel();
        if let Err(e) = active.handle.await {
            error!("Receive task failed: {}", e);
            self.armed.store(false, Ordering::Release);
        }
        true
    }
}

async fn run_listener(
    listener: TcpListener,
    mode: ArmMode,
    ctx: ListenerContext,
    cancel: CancellationToken,
) {
    let deadline = match mode {
        ArmMode::OneShot => Some(Instant::now() + ctx.config.one_shot_window),
        ArmMode::Persistent => None,
    };

    loop {
        if cancel.is_cancelled() {
            debug!("Receive loop cancelled");
            break;
        }

        let wait = match deadline {
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    info!("Receive window elapsed without an incoming transfer");
                    emit(ctx.events.as_ref(), SessionEvent::ReceiveTimedOut);
                    break;
                }
                left.min(ctx.config.poll_interval)
            }
            None => ctx.config.poll_interval,
        };

        let (stream, from) = match protocol::accept_within(&listener, wait).await {
            Ok(Some(conn)) => conn,
            Ok(None) => continue,
            Err(e) => {
                // accept 本身失败（如 EMFILE）时等待一个轮询周期再重试
                warn!("Failed to accept connection: {}", e);
                tokio::time::sleep(ctx.config.poll_interval).await;
                continue;
            }
        };

        let receive = protocol::receive_from(
            stream,
            from,
            &ctx.config.receive_path,
            ctx.config.io_timeout,
        );
        let outcome = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, receive).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    ctx.on_window_elapsed(from).await;
                    break;
                }
            },
            None => receive.await,
        };

        match outcome {
            Ok(file) => ctx.on_received(&file),
            Err(e) => ctx.on_failed(&e),
        }

        if mode == ArmMode::OneShot {
            break;
        }
    }

    drop(listener);
    ctx.armed.store(false, Ordering::Release);
    debug!("Receiver disarmed");
    emit(ctx.events.as_ref(), SessionEvent::ReceiveDisarmed);
}

impl ListenerContext {
    fn on_received(&self, file: &ReceivedFile) {
        info!("Screenshot received from {} ({} bytes)", file.from, file.size);
        emit(
            self.events.as_ref(),
            SessionEvent::ReceiveCompleted {
                path: file.path.clone(),
                bytes: file.size,
                from: file.from,
            },
        );

        if let Some(display) = &self.display {
            if let Err(e) = display.show(&file.path) {
                warn!("Failed to open received image: {:#}", e);
            }
        }
    }

    /// 一次性窗口在传输途中结束：中止连接并清理临时文件
    async fn on_window_elapsed(&self, from: SocketAddr) {
        warn!(
            "Receive window elapsed while receiving from {}, transfer aborted",
            from
        );
        let part = protocol::part_path(&self.config.receive_path);
        if let Err(e) = tokio::fs::remove_file(&part).await {
            if e.kind() != io::ErrorKind::NotFound {
                debug!("Failed to remove partial file {:?}: {}", part, e);
            }
        }
        emit(self.events.as_ref(), SessionEvent::ReceiveTimedOut);
    }

    fn on_failed(&self, err: &TransferError) {
        warn!("Receive failed: {}", err);
        emit(
            self.events.as_ref(),
            SessionEvent::ReceiveFailed(err.to_string()),
        );
    }
}
