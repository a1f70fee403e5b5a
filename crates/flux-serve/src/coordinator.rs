use crate::error::{Result, ServeError};
use crate::policy::ShutdownPolicy;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 可被协调器关闭的服务单元
///
/// 实现方必须允许一次 `run` 与一次并发的 `shutdown` 同时进行。
/// `shutdown` 之后，正在运行的服务应以 [`ServeError::Closed`] 返回。
#[async_trait]
pub trait ServingUnit: Clone + Send + Sync + 'static {
    /// 请求优雅关闭，在连接排空或 `deadline` 到达后返回
    ///
    /// `deadline` 为 `None` 时无限等待；超时返回 [`ServeError::DeadlineExceeded`]。
    async fn shutdown(&self, deadline: Option<Instant>) -> Result<()>;
}

/// 单次运行的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Running,
    /// 服务自身失败（非关闭哨兵）
    Failed,
    ShuttingDown,
    Done,
}

impl RunPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Failed | RunPhase::Done)
    }
}

/// 运行协调器
///
/// 在调用方任务上运行服务，同时由一个后台任务等待取消信号并驱动关闭。
/// 每个协调器只负责一次运行。
pub struct Coordinator {
    signal: CancellationToken,
    policy: ShutdownPolicy,
    phase: Arc<watch::Sender<RunPhase>>,
}

impl Coordinator {
    pub fn new(signal: CancellationToken, policy: ShutdownPolicy) -> Self {
        let (phase, _) = watch::channel(RunPhase::Idle);
        Self {
            signal,
            policy,
            phase: Arc::new(phase),
        }
    }

    /// 当前阶段
    pub fn phase(&self) -> RunPhase {
        *self.phase.borrow()
    }

    /// 订阅阶段变化
    pub fn subscribe(&self) -> watch::Receiver<RunPhase> {
        self.phase.subscribe()
    }

    /// 运行 `run` 直到服务停止，返回唯一的运行结果
    ///
    /// - `run` 以非 [`ServeError::Closed`] 的错误结束时立即返回该错误；
    /// - 否则等待关闭分支完成，调用 `after_shutdown` 并返回关闭结果。
    pub async fn run<S, F>(self, unit: S, run: F) -> Result<()>
    where
        S: ServingUnit,
        F: Future<Output = Result<()>>,
    {
        let Coordinator {
            signal,
            policy,
            phase,
        } = self;

        info!(
            "Server run started (shutdown timeout: {:?})",
            policy.shutdown_timeout()
        );
        transition(&phase, RunPhase::Running);

        let (result_tx, result_rx) = oneshot::channel();
        {
            let policy = policy.clone();
            let phase = phase.clone();
            tokio::spawn(async move {
                signal.cancelled().await;

                let deadline = policy.deadline_from(Instant::now());
                info!(
                    "Received shutdown signal, shutting down (timeout: {:?})",
                    policy.shutdown_timeout()
                );
                transition(&phase, RunPhase::ShuttingDown);

                policy.before_shutdown();
                let result = unit.shutdown(deadline).await;
                let _ = result_tx.send(result);
            });
        }

        if let Err(err) = run.await {
            if !err.is_closed() {
                error!("Server failed: {}", err);
                transition(&phase, RunPhase::Failed);
                return Err(err);
            }
            debug!("Server closed, waiting for shutdown to complete");
        }

        let result = result_rx.await.unwrap_or_else(|_| {
            Err(ServeError::Internal(
                "shutdown task ended without a result".to_string(),
            ))
        });

        match &result {
            Ok(()) => info!("Server shut down gracefully"),
            Err(e) => warn!("Server shutdown failed: {}", e),
        }

        policy.after_shutdown(result.as_ref().err());
        transition(&phase, RunPhase::Done);

        result
    }
}

/// 以给定的信号与策略运行一次服务
pub async fn coordinate<S, F>(
    signal: CancellationToken,
    policy: ShutdownPolicy,
    unit: S,
    run: F,
) -> Result<()>
where
    S: ServingUnit,
    F: Future<Output = Result<()>>,
{
    Coordinator::new(signal, policy).run(unit, run).await
}

// 终态之后的迁移被忽略
fn transition(phase: &watch::Sender<RunPhase>, next: RunPhase) -> bool {
    phase.send_if_modified(|current| {
        if current.is_terminal() || *current == next {
            return false;
        }
        debug!("Run phase: {:?} -> {:?}", current, next);
        *current = next;
        true
    })
}
