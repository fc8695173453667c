//! AirShare CLI
//!
//! 手势触发的局域网截图互传。手势识别和截屏由外部负责，本程序从标准输入
//! 逐行读取帧（手势标签或关键点），通过会话状态机执行截图、发送和接收。
//!
//! # 日志
//!
//! 默认输出 info 级别到 stderr，可通过 RUST_LOG 调整：
//!
//! ```bash
//! RUST_LOG=debug airshare run --peer 192.168.1.20
//! ```

mod input;
mod runner;

use airshare_core::{AppSettings, PeerAddress, SessionMode, TransportKind};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "airshare", version, about = "AirShare - 手势触发的局域网截图互传")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 启动手势会话（从标准输入读取帧）
    Run {
        /// 会话模式: symmetric / sender / receiver
        #[arg(short, long)]
        mode: Option<SessionMode>,
        /// 对端地址 (host 或 host:port)
        #[arg(short, long)]
        peer: Option<PeerAddress>,
        /// 截图来源文件（外部截屏工具写入）
        #[arg(short, long)]
        capture_source: Option<PathBuf>,
        /// 发送方式: tcp / http
        #[arg(short, long)]
        transport: Option<TransportKind>,
    },
    /// 直接发送一个文件
    Send {
        /// 要发送的文件路径
        file: PathBuf,
        /// 对端地址 (host 或 host:port)
        #[arg(short, long)]
        peer: Option<PeerAddress>,
    },
    /// 进入接收模式
    Receive {
        /// 持续接收直到 Ctrl-C（默认只接收一次）
        #[arg(long)]
        persistent: bool,
        /// 保存路径
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// 查看当前配置
    Config {
        /// 将当前有效配置写入配置文件
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let mut settings = AppSettings::load();

    match cli.command {
        Commands::Run {
            mode,
            peer,
            capture_source,
            transport,
        } => {
            if let Some(mode) = mode {
                settings.mode = mode;
            }
            if let Some(peer) = peer {
                settings.peer = Some(peer.to_string());
            }
            if capture_source.is_some() {
                settings.capture_source = capture_source;
            }
            if let Some(transport) = transport {
                settings.transport = transport;
            }
            settings.validate()?;
            runner::run_session(&settings).await?;
        }
        Commands::Send { file, peer } => {
            let peer = match peer {
                Some(peer) => Some(peer),
                None => settings.peer_address()?,
            };
            runner::send_once(&settings, &file, peer).await?;
        }
        Commands::Receive { persistent, output } => {
            if let Some(output) = output {
                settings.receive_path = output;
            }
            runner::receive(&settings, persistent).await?;
        }
        Commands::Config { save } => {
            println!("# {}", AppSettings::config_path().display());
            println!("{}", settings.to_toml()?);
            if save {
                settings.save()?;
                println!("✅ 配置已保存");
            }
        }
    }

    Ok(())
}

/// 初始化日志系统
///
/// 桥接 log crate（airshare-core 使用）到 tracing
fn init_logging() {
    let _ = tracing_log::LogTracer::init();

    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,airshare_core=debug")),
        )
        .try_init();
}
