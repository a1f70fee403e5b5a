use crate::error::ServeError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// 默认关闭超时
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// 关闭前回调，参数为配置的关闭超时
pub type BeforeShutdownHook = Arc<dyn Fn(Duration) + Send + Sync>;

/// 关闭后回调，关闭成功时参数为 `None`
pub type AfterShutdownHook = Arc<dyn Fn(Option<&ServeError>) + Send + Sync>;

/// 关闭策略
///
/// 一次运行内不可变。`shutdown_timeout` 为零表示无限等待连接排空。
#[derive(Clone)]
pub struct ShutdownPolicy {
    shutdown_timeout: Duration,
    before_shutdown: BeforeShutdownHook,
    after_shutdown: AfterShutdownHook,
}

impl ShutdownPolicy {
    pub fn builder() -> ShutdownPolicyBuilder {
        ShutdownPolicyBuilder::new()
    }

    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// 根据当前时间计算关闭截止时间，`None` 表示不设上限
    pub fn deadline_from(&self, now: Instant) -> Option<Instant> {
        if self.shutdown_timeout.is_zero() {
            None
        } else {
            Some(now + self.shutdown_timeout)
        }
    }

    pub(crate) fn before_shutdown(&self) {
        (self.before_shutdown)(self.shutdown_timeout)
    }

    pub(crate) fn after_shutdown(&self, err: Option<&ServeError>) {
        (self.after_shutdown)(err)
    }
}

impl Default for ShutdownPolicy {
    fn default() -> Self {
        ShutdownPolicyBuilder::new().build()
    }
}

impl fmt::Debug for ShutdownPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownPolicy")
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish_non_exhaustive()
    }
}

/// 关闭策略构建器
pub struct ShutdownPolicyBuilder {
    shutdown_timeout: Duration,
    before_shutdown: Option<BeforeShutdownHook>,
    after_shutdown: Option<AfterShutdownHook>,
}

impl ShutdownPolicyBuilder {
    pub fn new() -> Self {
        Self {
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            before_shutdown: None,
            after_shutdown: None,
        }
    }

    /// 设置关闭超时，`Duration::ZERO` 关闭超时限制
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// 注册在发起关闭之前调用的回调
    pub fn before_shutdown<F>(mut self, hook: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.before_shutdown = Some(Arc::new(hook));
        self
    }

    /// 注册在关闭完成之后调用的回调
    pub fn after_shutdown<F>(mut self, hook: F) -> Self
    where
        F: Fn(Option<&ServeError>) + Send + Sync + 'static,
    {
        self.after_shutdown = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> ShutdownPolicy {
        ShutdownPolicy {
            shutdown_timeout: self.shutdown_timeout,
            before_shutdown: self.before_shutdown.unwrap_or_else(|| Arc::new(|_: Duration| {})),
            after_shutdown: self.after_shutdown.unwrap_or_else(|| Arc::new(|_: Option<&ServeError>| {})),
        }
    }
}

impl Default for ShutdownPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}
