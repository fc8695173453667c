//! 单文件 TCP 传输协议
//!
//! 帧格式（两端必须一致）：
//!
//! 1. 客户端连接服务端端口
//! 2. 客户端发送十进制 ASCII 的文件大小（无长度前缀、无结束符）
//! 3. 服务端读取最多 1024 字节作为大小头，回复 `ACK`
//! 4. 客户端按 1024 字节分块发送文件内容
//! 5. 服务端读满声明的大小；提前断开则丢弃本次传输
//! 6. 服务端覆盖写入固定的接收路径
//!
//! 接收时先写入 `<path>.part`，读满后再原子地重命名为目标文件；
//! 传输不完整时删除临时文件，保留上一次成功接收的文件。

use log::{debug, info, warn};

use super::{PeerAddress, SendReport, TransferError};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// 确认令牌
pub const ACK: &[u8; 3] = b"ACK";
/// 大小头读取缓冲区
pub const HEADER_BUF_SIZE: usize = 1024;
/// 数据块大小
pub const CHUNK_SIZE: usize = 1024;

/// 发送重试策略
#[derive(Debug, Clone)]
pub struct SendPolicy {
    /// 单次连接超时
    pub connect_timeout: Duration,
    /// 总尝试次数（含第一次）
    pub attempts: u32,
    /// 两次尝试之间的固定等待
    pub backoff: Duration,
    /// 已建立连接上单次读写的超时
    pub io_timeout: Duration,
}

impl Default for SendPolicy {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            attempts: 3,
            backoff: Duration::from_secs(2),
            io_timeout: Duration::from_secs(30),
        }
    }
}

/// 一次 accept 的结果
#[derive(Debug)]
pub enum AcceptOutcome {
    /// 在超时前收到完整文件
    Received(ReceivedFile),
    /// 等待超时，调用方可继续轮询或放弃
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    pub path: PathBuf,
    pub size: u64,
    pub from: SocketAddr,
}

/// 发送文件，按 [`SendPolicy`] 重试
///
/// 文件不存在返回 `NoPayload`，未配置对端返回 `NoPeerConfigured`，两者都不会发起连接。
/// 最后一次尝试仍被拒绝时返回 `PeerNotReady`；其他失败返回最后一次的错误。
pub async fn send_file(
    payload: &Path,
    peer: Option<&PeerAddress>,
    policy: &SendPolicy,
) -> Result<SendReport, TransferError> {
    ensure_payload(payload).await?;
    let peer = peer.ok_or(TransferError::NoPeerConfigured)?;
    let attempts = policy.attempts.max(1);

    info!("Sending {:?} to {}", payload, peer);

    let mut attempt = 1;
    loop {
        match send_once(payload, peer, policy).await {
            Ok(bytes) => {
                info!("Sent {} bytes to {} (attempt {}/{})", bytes, peer, attempt, attempts);
                return Ok(SendReport {
                    bytes,
                    attempts: attempt,
                    destination: peer.to_string(),
                });
            }
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                if e.is_refused() {
                    warn!(
                        "Connection refused by {} (attempt {}/{}), receiver may not be in receive mode",
                        peer, attempt, attempts
                    );
                } else {
                    warn!("Send attempt {}/{} to {} failed: {}", attempt, attempts, peer, e);
                }

                if attempt >= attempts {
                    if e.is_refused() {
                        return Err(TransferError::PeerNotReady {
                            peer: peer.to_string(),
                            attempts,
                        });
                    }
                    return Err(e);
                }

                tokio::time::sleep(policy.backoff).await;
                attempt += 1;
            }
        }
    }
}

async fn ensure_payload(payload: &Path) -> Result<u64, TransferError> {
    match fs::metadata(payload).await {
        Ok(meta) if meta.is_file() => Ok(meta.len()),
        Ok(_) => Err(TransferError::NoPayload(payload.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(TransferError::NoPayload(payload.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}

/// 单次发送尝试，使用全新的连接
async fn send_once(
    payload: &Path,
    peer: &PeerAddress,
    policy: &SendPolicy,
) -> Result<u64, TransferError> {
    // 先打开文件，保证没有截图时不会建立连接
    let mut file = match File::open(payload).await {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(TransferError::NoPayload(payload.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };
    let size = file.metadata().await?.len();

    let connect = TcpStream::connect((peer.host(), peer.port()));
    let mut stream = match tokio::time::timeout(policy.connect_timeout, connect).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(TransferError::ConnectTimeout {
                peer: peer.to_string(),
                timeout: policy.connect_timeout,
            });
        }
    };
    debug!("Connected to {}, declaring {} bytes", peer, size);

    let sent = send_stream(&mut stream, &mut file, size, policy.io_timeout).await?;
    with_io_timeout(policy.io_timeout, stream.shutdown()).await?;
    Ok(sent)
}

/// 在已建立的连接上执行发送端协议：大小头 → 等待 ACK → 数据
pub async fn send_stream<S, R>(
    stream: &mut S,
    body: &mut R,
    size: u64,
    io_timeout: Duration,
) -> Result<u64, TransferError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    with_io_timeout(io_timeout, stream.write_all(size.to_string().as_bytes())).await?;

    let mut ack = [0u8; ACK.len()];
    with_io_timeout(io_timeout, stream.read_exact(&mut ack)).await?;
    if &ack != ACK {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unexpected acknowledgement {:?}", String::from_utf8_lossy(&ack)),
        )
        .into());
    }

    let mut body = body.take(size);
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut sent: u64 = 0;
    loop {
        let n = body.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        with_io_timeout(io_timeout, stream.write_all(&buf[..n])).await?;
        sent += n as u64;
    }

    if sent != size {
        // 文件在发送过程中被截断
        return Err(TransferError::TransferIncomplete(format!(
            "payload shrank while sending: {sent} of {size} bytes"
        )));
    }
    with_io_timeout(io_timeout, stream.flush()).await?;
    Ok(sent)
}

/// 接受一个连接并接收文件
///
/// `accept_timeout` 内没有连接时返回 [`AcceptOutcome::TimedOut`]，不视为错误。
pub async fn receive_one(
    listener: &TcpListener,
    accept_timeout: Duration,
    dest: &Path,
    io_timeout: Duration,
) -> Result<AcceptOutcome, TransferError> {
    match accept_within(listener, accept_timeout).await? {
        Some((stream, from)) => Ok(AcceptOutcome::Received(
            receive_from(stream, from, dest, io_timeout).await?,
        )),
        None => Ok(AcceptOutcome::TimedOut),
    }
}

/// 在 `timeout` 内等待一个连接，超时返回 `None`
pub async fn accept_within(
    listener: &TcpListener,
    timeout: Duration,
) -> io::Result<Option<(TcpStream, SocketAddr)>> {
    match tokio::time::timeout(timeout, listener.accept()).await {
        Ok(result) => result.map(Some),
        Err(_) => Ok(None),
    }
}

/// 在已接受的连接上接收一个文件
pub async fn receive_from(
    mut stream: TcpStream,
    from: SocketAddr,
    dest: &Path,
    io_timeout: Duration,
) -> Result<ReceivedFile, TransferError> {
    info!("Receiving payload from {}", from);
    let size = receive_stream(&mut stream, dest, io_timeout).await?;
    info!("Received {} bytes from {} into {:?}", size, from, dest);

    Ok(ReceivedFile {
        path: dest.to_path_buf(),
        size,
        from,
    })
}

/// 在已接受的连接上执行接收端协议，成功时返回文件大小
pub async fn receive_stream<S>(
    stream: &mut S,
    dest: &Path,
    io_timeout: Duration,
) -> Result<u64, TransferError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut header = [0u8; HEADER_BUF_SIZE];
    let n = with_io_timeout(io_timeout, stream.read(&mut header)).await?;
    let size = parse_size_header(&header[..n])?;
    debug!("Peer declared {} bytes", size);

    with_io_timeout(io_timeout, stream.write_all(ACK)).await?;

    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    let part = part_path(dest);
    let result = receive_body(stream, &part, size, io_timeout).await;
    match result {
        Ok(()) => {
            fs::rename(&part, dest).await?;
            Ok(size)
        }
        Err(e) => {
            if let Err(cleanup) = fs::remove_file(&part).await {
                debug!("Failed to remove partial file {:?}: {}", part, cleanup);
            }
            Err(e)
        }
    }
}

async fn receive_body<S>(
    stream: &mut S,
    part: &Path,
    size: u64,
    io_timeout: Duration,
) -> Result<(), TransferError>
where
    S: AsyncRead + Unpin,
{
    let mut file = File::create(part).await?;
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut received: u64 = 0;

    while received < size {
        let remaining = usize::try_from(size - received).unwrap_or(usize::MAX);
        let want = remaining.min(CHUNK_SIZE);
        let n = with_io_timeout(io_timeout, stream.read(&mut buf[..want])).await?;
        if n == 0 {
            return Err(TransferError::incomplete(received, size));
        }
        file.write_all(&buf[..n]).await?;
        received += n as u64;
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}

/// 解析十进制大小头
pub fn parse_size_header(raw: &[u8]) -> Result<u64, TransferError> {
    if raw.is_empty() {
        return Err(TransferError::TransferIncomplete(
            "connection closed before size header".to_string(),
        ));
    }
    let text = std::str::from_utf8(raw).map_err(|_| {
        TransferError::TransferIncomplete("size header is not valid UTF-8".to_string())
    })?;
    text.trim().parse::<u64>().map_err(|_| {
        TransferError::TransferIncomplete(format!("malformed size header {:?}", text.trim()))
    })
}

/// 接收过程中使用的临时文件路径
pub(crate) fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map_or_else(|| "received".into(), ToOwned::to_owned);
    name.push(".part");
    dest.with_file_name(name)
}

async fn with_io_timeout<T>(
    limit: Duration,
    fut: impl Future<Output = io::Result<T>>,
) -> Result<T, TransferError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("peer stalled for {limit:?}"),
        )
        .into()),
    }
}
