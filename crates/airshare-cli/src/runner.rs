//! 子命令执行
//!
//! 组装核心组件（接收服务、传输方式、截屏来源），驱动会话并把结果打印到终端。

use crate::input::{self, InputLine};
use airshare_core::capture::NoCapture;
use airshare_core::net::device_name;
use airshare_core::transfer::protocol;
use airshare_core::{
    AppSettings, ArmMode, ArmOutcome, CommandDisplay, FileCapture, GestureDebouncer,
    HttpPullTransport, HttpShareServer, Outcome, PeerAddress, ReceiveServer, ScreenCapture,
    SessionController, SessionEvent, TcpPushTransport, TransferError, Transport, TransportKind,
    event_channel, local_ip,
};
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

/// 手势会话：逐行读取标准输入，去抖后交给会话控制器
pub async fn run_session(settings: &AppSettings) -> Result<()> {
    let (tx, mut events) = event_channel();
    let receiver = Arc::new(build_receiver(settings).with_events(tx.clone()));

    let share = (settings.transport == TransportKind::Http)
        .then(|| Arc::new(HttpShareServer::new(settings.share_addr())));
    let transport: Arc<dyn Transport> = match &share {
        Some(server) => Arc::new(HttpPullTransport::new(server.clone(), local_ip())),
        None => Arc::new(TcpPushTransport::new(settings.send_policy())),
    };
    let capture: Arc<dyn ScreenCapture> = match &settings.capture_source {
        Some(source) => Arc::new(FileCapture::new(source.clone())),
        None => Arc::new(NoCapture),
    };

    let mut session =
        SessionController::new(settings.session_options()?, capture, transport, receiver)?
            .with_events(tx);
    session.start().await?;

    print_banner(settings);
    println!("{}", session.status().text());

    let mut debouncer = GestureDebouncer::new(settings.release_frames);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    debug!("stdin closed");
                    break;
                };
                match input::parse_line(&line) {
                    Ok(InputLine::Frame(raw)) => {
                        if let Some(gesture) = debouncer.push(raw) {
                            print_outcome(&session.handle(gesture).await);
                        }
                    }
                    Ok(InputLine::Status) => {
                        let status = session.status();
                        println!("{} | {} | {}", status.mode, status.text(), status.peer_text());
                    }
                    Ok(InputLine::SetPeer(peer)) => {
                        session.set_peer(peer);
                        println!("{}", session.status().peer_text());
                    }
                    Ok(InputLine::Reset) => {
                        session.reset();
                        debouncer.reset();
                        println!("{}", session.status().text());
                    }
                    Ok(InputLine::Quit) => break,
                    Err(e) => warn!("Ignoring input {:?}: {:#}", line, e),
                }
            }
            Some(event) = events.recv() => print_event(&event),
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    session.shutdown().await;
    if let Some(server) = share {
        server.stop().await;
    }
    println!("👋 已退出");
    Ok(())
}

/// 直接发送一个文件，不经过手势
pub async fn send_once(settings: &AppSettings, file: &Path, peer: Option<PeerAddress>) -> Result<()> {
    println!("📤 发送文件: {}", file.display());
    if let Some(peer) = &peer {
        println!("   目标设备: {peer}");
    }

    match protocol::send_file(file, peer.as_ref(), &settings.send_policy()).await {
        Ok(report) => {
            println!(
                "✅ 已发送 {} 字节到 {} (第 {} 次尝试)",
                report.bytes, report.destination, report.attempts
            );
            Ok(())
        }
        Err(e) => {
            println!("❌ {}", describe_send_error(&e));
            Err(e.into())
        }
    }
}

/// 接收模式：一次性接收或常驻到 Ctrl-C
pub async fn receive(settings: &AppSettings, persistent: bool) -> Result<()> {
    let (tx, mut events) = event_channel();
    let receiver = build_receiver(settings).with_events(tx);
    let mode = if persistent {
        ArmMode::Persistent
    } else {
        ArmMode::OneShot
    };

    if let ArmOutcome::Armed(addr) = receiver.arm(mode).await? {
        debug!("Receiver bound to {}", addr);
    }
    print_banner(settings);
    println!(
        "📥 接收模式 (保存到: {})",
        receiver.config().receive_path.display()
    );

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                print_event(&event);
                if event == SessionEvent::ReceiveDisarmed {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                receiver.disarm().await;
                break;
            }
        }
    }

    Ok(())
}

fn build_receiver(settings: &AppSettings) -> ReceiveServer {
    let receiver = ReceiveServer::new(settings.receiver_config());
    match &settings.display_command {
        Some(program) => receiver.with_display(Arc::new(CommandDisplay::new(program.clone()))),
        None => receiver,
    }
}

fn print_banner(settings: &AppSettings) {
    println!("🖐  AirShare - {} ({})", device_name(), settings.mode);
    println!("   本机 IP: {}:{}", local_ip(), settings.port);
    if let Ok(Some(peer)) = settings.peer_address() {
        println!("   对端: {peer}");
    }
    println!("   ✌  截图   ✊ 发送   🖐 接收 (60s)");
    println!("   s 状态   p <地址> 修改对端   r 丢弃截图   q 退出");
}

fn print_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Ignored => {}
        Outcome::Captured(payload) => {
            println!("📸 截图完成 ({} 字节), ✊ 发送", payload.size);
        }
        Outcome::CaptureFailed(reason) => println!("❌ 截图失败: {reason}"),
        Outcome::Sent(report) => {
            println!("✅ 已发送到 {} ({} 字节)", report.destination, report.bytes);
        }
        Outcome::SendFailed(e) => println!("❌ {}", describe_send_error(e)),
        Outcome::ReceiveArmed(addr) => println!("📥 等待接收 ({addr})..."),
        Outcome::AlreadyArmed => println!("📥 已在接收模式"),
        Outcome::ArmFailed(e) => println!("❌ 无法进入接收模式: {e}"),
    }
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::ReceiveCompleted { path, bytes, from } => {
            println!("📩 收到 {} 字节 (来自 {}), 已保存到 {}", bytes, from, path.display());
        }
        SessionEvent::ReceiveFailed(reason) => println!("⚠️  接收失败: {reason}"),
        SessionEvent::ReceiveTimedOut => println!("⌛ 等待超时，未收到截图"),
        SessionEvent::ReceiveDisarmed => println!("📴 接收模式已关闭"),
        SessionEvent::ReceiveArmed { mode, addr } => debug!("Receiver armed {:?} on {}", mode, addr),
        other => debug!("{:?}", other),
    }
}

fn describe_send_error(e: &TransferError) -> String {
    match e {
        TransferError::NoPayload(_) => "没有可发送的截图，先 ✌ 截图".to_string(),
        TransferError::NoPeerConfigured => "未设置对端地址 (p <地址>)".to_string(),
        TransferError::PeerNotReady { peer, .. } => format!("{peer} 未就绪，请对方先 🖐 进入接收模式"),
        other => format!("发送失败: {other}"),
    }
}
