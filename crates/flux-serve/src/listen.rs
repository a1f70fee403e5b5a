//! 带取消信号的服务入口
//!
//! 四个入口共享同一套协调逻辑，只是运行服务的方式不同。信号触发后
//! 等待服务关闭完成，并返回关闭结果。

use crate::coordinator::coordinate;
use crate::error::Result;
use crate::policy::ShutdownPolicy;
use crate::server::HttpServer;
use crate::tls::TlsConfig;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// 同 [`HttpServer::listen_and_serve`]，在 `signal` 取消时关闭服务
pub async fn listen_and_serve(
    signal: CancellationToken,
    server: &HttpServer,
    policy: ShutdownPolicy,
) -> Result<()> {
    coordinate(signal, policy, server.clone(), server.listen_and_serve()).await
}

/// 同 [`HttpServer::listen_and_serve_tls`]，在 `signal` 取消时关闭服务
pub async fn listen_and_serve_tls(
    signal: CancellationToken,
    server: &HttpServer,
    tls: &TlsConfig,
    policy: ShutdownPolicy,
) -> Result<()> {
    coordinate(signal, policy, server.clone(), server.listen_and_serve_tls(tls)).await
}

/// 同 [`HttpServer::serve`]，在 `signal` 取消时关闭服务
pub async fn serve(
    signal: CancellationToken,
    server: &HttpServer,
    listener: TcpListener,
    policy: ShutdownPolicy,
) -> Result<()> {
    coordinate(signal, policy, server.clone(), server.serve(listener)).await
}

/// 同 [`HttpServer::serve_tls`]，在 `signal` 取消时关闭服务
pub async fn serve_tls(
    signal: CancellationToken,
    server: &HttpServer,
    listener: TcpListener,
    tls: &TlsConfig,
    policy: ShutdownPolicy,
) -> Result<()> {
    coordinate(signal, policy, server.clone(), server.serve_tls(listener, tls)).await
}
