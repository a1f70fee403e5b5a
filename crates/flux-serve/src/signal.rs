use std::io;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// 关闭信号类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGTERM - 优雅关闭
    Term,

    /// SIGINT - Ctrl+C
    Interrupt,

    /// 手动触发
    Manual,
}

/// 信号处理器
///
/// 把进程信号转换为取消令牌，令牌一旦取消便保持取消状态。
#[derive(Clone, Default)]
pub struct SignalHandler {
    token: CancellationToken,
}

impl SignalHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取取消令牌（所有克隆共享取消状态）
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// 是否已触发关闭
    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 手动触发关闭
    pub fn trigger_shutdown(&self) {
        info!("Manual shutdown triggered");
        self.token.cancel();
    }

    /// 等待系统信号并取消令牌
    #[cfg(unix)]
    pub async fn wait_for_system_signal(&self) -> io::Result<ShutdownSignal> {
        use signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        let received = tokio::select! {
            _ = sigterm.recv() => ShutdownSignal::Term,
            _ = sigint.recv() => ShutdownSignal::Interrupt,
            _ = self.token.cancelled() => ShutdownSignal::Manual,
        };

        info!("Received shutdown signal: {:?}", received);
        self.token.cancel();
        Ok(received)
    }

    /// 等待系统信号并取消令牌（Windows 版本）
    #[cfg(not(unix))]
    pub async fn wait_for_system_signal(&self) -> io::Result<ShutdownSignal> {
        let received = tokio::select! {
            res = signal::ctrl_c() => {
                res?;
                ShutdownSignal::Interrupt
            }
            _ = self.token.cancelled() => ShutdownSignal::Manual,
        };

        info!("Received shutdown signal: {:?}", received);
        self.token.cancel();
        Ok(received)
    }
}
