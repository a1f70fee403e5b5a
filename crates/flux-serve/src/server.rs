use crate::connection::{ConnectionGuard, ConnectionTracker};
use crate::coordinator::ServingUnit;
use crate::error::{Result, ServeError};
use crate::tls::{load_tls_config, TlsConfig};
use async_trait::async_trait;
use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use hyper_util::service::TowerToHyperService;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// HTTP 服务（HTTP/1.1 与 HTTP/2）
///
/// 克隆开销很小，所有克隆共享同一份状态。服务只能运行一次：
/// 调用 [`ServingUnit::shutdown`] 之后，所有 `serve` 系列方法都返回
/// [`ServeError::Closed`]。
#[derive(Clone)]
pub struct HttpServer {
    inner: Arc<Inner>,
}

struct Inner {
    addr: String,
    router: Router,
    /// 停止接受新连接，已有连接优雅关闭
    closing: CancellationToken,
    /// 截止时间已过，强制断开剩余连接
    force_close: CancellationToken,
    connections: ConnectionTracker,
    local_addr: watch::Sender<Option<SocketAddr>>,
}

impl HttpServer {
    pub fn new(addr: impl Into<String>, router: Router) -> Self {
        let (local_addr, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                addr: addr.into(),
                router,
                closing: CancellationToken::new(),
                force_close: CancellationToken::new(),
                connections: ConnectionTracker::new(),
                local_addr,
            }),
        }
    }

    /// 配置的监听地址
    pub fn addr(&self) -> &str {
        &self.inner.addr
    }

    /// 实际绑定的地址，开始服务之前为 `None`
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.inner.local_addr.borrow()
    }

    /// 等待服务开始监听并返回绑定地址
    pub async fn wait_until_listening(&self) -> Option<SocketAddr> {
        let mut rx = self.inner.local_addr.subscribe();
        let addr = rx.wait_for(Option::is_some).await.ok()?;
        *addr
    }

    /// 活跃连接数
    pub fn active_connections(&self) -> usize {
        self.inner.connections.active_count()
    }

    /// 是否已开始关闭
    pub fn is_closing(&self) -> bool {
        self.inner.closing.is_cancelled()
    }

    /// 绑定配置的地址并提供服务
    pub async fn listen_and_serve(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// 绑定配置的地址并提供 TLS 服务
    pub async fn listen_and_serve_tls(&self, tls: &TlsConfig) -> Result<()> {
        let listener = self.bind().await?;
        self.serve_tls(listener, tls).await
    }

    /// 在已绑定的监听器上提供服务
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        self.accept_loop(listener, None).await
    }

    /// 在已绑定的监听器上提供 TLS 服务
    pub async fn serve_tls(&self, listener: TcpListener, tls: &TlsConfig) -> Result<()> {
        if self.is_closing() {
            return Err(ServeError::Closed);
        }
        let config = load_tls_config(tls)?;
        self.accept_loop(listener, Some(TlsAcceptor::from(config)))
            .await
    }

    async fn bind(&self) -> Result<TcpListener> {
        if self.is_closing() {
            return Err(ServeError::Closed);
        }
        TcpListener::bind(&self.inner.addr)
            .await
            .map_err(|e| ServeError::bind(&self.inner.addr, e))
    }

    async fn accept_loop(&self, listener: TcpListener, tls: Option<TlsAcceptor>) -> Result<()> {
        let inner = &self.inner;
        if inner.closing.is_cancelled() {
            return Err(ServeError::Closed);
        }

        let local_addr = listener.local_addr()?;
        inner.local_addr.send_replace(Some(local_addr));
        info!(
            "HTTP server listening on {} (tls: {})",
            local_addr,
            tls.is_some()
        );

        loop {
            let (stream, remote_addr) = tokio::select! {
                biased;

                _ = inner.closing.cancelled() => {
                    info!("Stopped accepting connections on {}", local_addr);
                    return Err(ServeError::Closed);
                }
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) if is_transient(&e) => {
                        debug!("Transient accept error on {}: {}", local_addr, e);
                        continue;
                    }
                    Err(e) => {
                        error!("Accept failed on {}: {}", local_addr, e);
                        return Err(ServeError::Accept(e));
                    }
                },
            };

            let guard = match inner.connections.acquire() {
                Some(guard) => guard,
                None => {
                    debug!("Dropping connection from {}: shutting down", remote_addr);
                    continue;
                }
            };

            let conn = Connection {
                router: inner.router.clone(),
                closing: inner.closing.clone(),
                force_close: inner.force_close.clone(),
                remote_addr,
            };
            tokio::spawn(conn.serve(stream, tls.clone(), guard));
        }
    }
}

/// 停止接受连接，等待已有连接排空
///
/// 截止时间到达后强制断开剩余连接。HTTP/2 连接上已派发到执行器的
/// 请求处理任务不会随连接一起中止，可能在返回之后继续运行。
#[async_trait]
impl ServingUnit for HttpServer {
    async fn shutdown(&self, deadline: Option<Instant>) -> Result<()> {
        let inner = &self.inner;

        inner.connections.start_shutdown();
        inner.closing.cancel();

        if inner.connections.drain(deadline).await {
            return Ok(());
        }

        warn!(
            "Forcing {} connections closed",
            inner.connections.active_count()
        );
        inner.force_close.cancel();
        Err(ServeError::DeadlineExceeded)
    }
}

/// 单个连接的服务任务
struct Connection {
    router: Router,
    closing: CancellationToken,
    force_close: CancellationToken,
    remote_addr: SocketAddr,
}

impl Connection {
    async fn serve(self, stream: TcpStream, tls: Option<TlsAcceptor>, _guard: ConnectionGuard) {
        trace!("Connection from {} accepted", self.remote_addr);
        let _ = stream.set_nodelay(true);

        let acceptor = match tls {
            Some(acceptor) => acceptor,
            None => return self.drive(stream).await,
        };

        // 握手尚未完成的连接没有进行中的请求，关闭时直接断开
        let handshake = tokio::select! {
            res = acceptor.accept(stream) => res,
            _ = self.closing.cancelled() => {
                debug!("Closing connection from {} before TLS handshake", self.remote_addr);
                return;
            }
            _ = self.force_close.cancelled() => return,
        };
        match handshake {
            Ok(stream) => self.drive(stream).await,
            Err(e) => debug!("TLS handshake with {} failed: {}", self.remote_addr, e),
        }
    }

    async fn drive<I>(&self, io: I)
    where
        I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let service = TowerToHyperService::new(self.router.clone());
        let builder = Builder::new(TokioExecutor::new());
        let conn = builder.serve_connection_with_upgrades(TokioIo::new(io), service);
        tokio::pin!(conn);

        let mut draining = false;
        let result = loop {
            tokio::select! {
                res = conn.as_mut() => break res,
                _ = self.closing.cancelled(), if !draining => {
                    trace!("Gracefully closing connection from {}", self.remote_addr);
                    draining = true;
                    conn.as_mut().graceful_shutdown();
                }
                _ = self.force_close.cancelled() => {
                    debug!("Connection from {} forcibly closed", self.remote_addr);
                    return;
                }
            }
        };

        if let Err(e) = result {
            debug!("Error serving connection from {}: {}", self.remote_addr, e);
        }
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
    )
}
