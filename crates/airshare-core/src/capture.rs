//! 截屏与显示协作者
//!
//! 核心只依赖"截取当前屏幕 → 字节"与"显示收到的图片"两个接口，
//! 真正的截屏实现由界面层提供。

use anyhow::Context;
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// 截取当前屏幕
pub trait ScreenCapture: Send + Sync {
    fn capture(&self) -> anyhow::Result<Vec<u8>>;
}

/// 显示收到的图片（可选副作用，失败不影响传输结果）
pub trait ImageDisplay: Send + Sync {
    fn show(&self, path: &Path) -> anyhow::Result<()>;
}

/// 从固定文件读取图片作为"截屏"结果
///
/// 用于没有图形环境的机器，或由外部截屏工具预先写好文件的场景。
#[derive(Debug, Clone)]
pub struct FileCapture {
    source: PathBuf,
}

impl FileCapture {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

impl ScreenCapture for FileCapture {
    fn capture(&self) -> anyhow::Result<Vec<u8>> {
        std::fs::read(&self.source)
            .with_context(|| format!("failed to read capture source {:?}", self.source))
    }
}

/// 没有配置截屏来源时使用
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCapture;

impl ScreenCapture for NoCapture {
    fn capture(&self) -> anyhow::Result<Vec<u8>> {
        anyhow::bail!("no capture source configured")
    }
}

/// 用外部程序打开图片（如 `xdg-open`），不等待其退出
#[derive(Debug, Clone)]
pub struct CommandDisplay {
    program: String,
}

impl CommandDisplay {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl ImageDisplay for CommandDisplay {
    /// 启动查看程序后立即返回，由运行时中的任务等待子进程退出
    fn show(&self, path: &Path) -> anyhow::Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .context("opening an image requires a tokio runtime")?;
        let mut child = Command::new(&self.program)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to launch {}", self.program))?;
        debug!("Opened {:?} with {} (pid {:?})", path, self.program, child.id());

        let program = self.program.clone();
        runtime.spawn(async move {
            match child.wait().await {
                Ok(status) if !status.success() => {
                    warn!("{} exited with {}", program, status);
                }
                Ok(_) => {}
                Err(e) => warn!("Failed to wait for {}: {}", program, e),
            }
        });
        Ok(())
    }
}
