//! HTTP 拉取共享
//!
//! 不主动推送，而是在本机开一个只读 HTTP 服务，对端通过
//! `GET /shared/<文件名>` 下载当前截图。适用于对端没有运行 AirShare
//! （例如手机浏览器）的情况。

use log::{debug, error, info};

use super::{PeerAddress, SendReport, TransferError, Transport};
use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    extract::{Path as UrlPath, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::fs::File;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// 默认共享端口
pub const DEFAULT_SHARE_PORT: u16 = 8000;

struct ShareState {
    file: RwLock<PathBuf>,
}

impl ShareState {
    fn current(&self) -> PathBuf {
        self.file
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, path: &Path) {
        *self.file.write().unwrap_or_else(PoisonError::into_inner) = path.to_path_buf();
    }
}

struct RunningShare {
    addr: SocketAddr,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

/// 共享当前截图的 HTTP 服务
pub struct HttpShareServer {
    bind_addr: SocketAddr,
    state: Arc<ShareState>,
    running: Mutex<Option<RunningShare>>,
}

impl HttpShareServer {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            state: Arc::new(ShareState {
                file: RwLock::new(PathBuf::new()),
            }),
            running: Mutex::new(None),
        }
    }

    /// 开始（或继续）共享 `file`，返回实际监听地址
    ///
    /// 服务已在运行时只更新共享的文件。
    pub async fn share(&self, file: &Path) -> Result<SocketAddr, TransferError> {
        self.state.set(file);

        let mut running = self.running.lock().await;
        if let Some(current) = running.as_ref() {
            if !current.handle.is_finished() {
                debug!("HTTP share already running on {}", current.addr);
                return Ok(current.addr);
            }
        }

        let listener = TcpListener::bind(self.bind_addr).await.map_err(|e| {
            if e.kind() == io::ErrorKind::AddrInUse {
                TransferError::AddressInUse(self.bind_addr)
            } else {
                e.into()
            }
        })?;
        let addr = listener.local_addr()?;

        let app = Router::new()
            .route("/shared/:name", get(handle_shared))
            .with_state(self.state.clone());

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(signal.cancelled_owned())
                .await
            {
                error!("HTTP share server error: {}", e);
            }
        });

        info!("Sharing {:?} over HTTP on {}", file, addr);
        *running = Some(RunningShare {
            addr,
            shutdown,
            handle,
        });
        Ok(addr)
    }

    /// 停止共享，返回之前是否在运行
    pub async fn stop(&self) -> bool {
        let Some(running) = self.running.lock().await.take() else {
            return false;
        };
        running.shutdown.cancel();
        if let Err(e) = running.handle.await {
            error!("HTTP share task failed: {}", e);
        }
        info!("HTTP share on {} stopped", running.addr);
        true
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }
}

async fn handle_shared(
    UrlPath(name): UrlPath<String>,
    State(state): State<Arc<ShareState>>,
) -> impl IntoResponse {
    let path = state.current();
    let shared_name = path.file_name().map(|n| n.to_string_lossy().to_string());
    if shared_name.as_deref() != Some(name.as_str()) {
        return (StatusCode::NOT_FOUND, "File not found").into_response();
    }

    match File::open(&path).await {
        Ok(file) => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            let stream = tokio_util::io::ReaderStream::new(file);
            (
                [(header::CONTENT_TYPE, mime.to_string())],
                Body::from_stream(stream),
            )
                .into_response()
        }
        Err(_) => (StatusCode::NOT_FOUND, "File not found").into_response(),
    }
}

/// 以 HTTP 共享作为"发送"：不需要对端地址，成功时返回下载 URL
pub struct HttpPullTransport {
    server: Arc<HttpShareServer>,
    advertise_host: IpAddr,
}

impl HttpPullTransport {
    pub fn new(server: Arc<HttpShareServer>, advertise_host: IpAddr) -> Self {
        Self {
            server,
            advertise_host,
        }
    }

    pub fn server(&self) -> &Arc<HttpShareServer> {
        &self.server
    }
}

#[async_trait]
impl Transport for HttpPullTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    fn requires_peer(&self) -> bool {
        false
    }

    async fn send(
        &self,
        payload: &Path,
        _peer: Option<&PeerAddress>,
    ) -> Result<SendReport, TransferError> {
        let meta = match tokio::fs::metadata(payload).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Err(TransferError::NoPayload(payload.to_path_buf())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(TransferError::NoPayload(payload.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };

        let addr = self.server.share(payload).await?;
        let name = payload
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let host = PeerAddress::new(self.advertise_host.to_string(), addr.port());
        let url = format!("http://{host}/shared/{name}");
        info!("Screenshot available at {}", url);

        Ok(SendReport {
            bytes: meta.len(),
            attempts: 1,
            destination: url,
        })
    }
}
