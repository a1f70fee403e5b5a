use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// 连接跟踪器
#[derive(Clone, Default)]
pub struct ConnectionTracker {
    active_connections: Arc<AtomicUsize>,
    is_shutting_down: Arc<AtomicBool>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 尝试登记一个新连接，关闭开始后返回 `None`
    pub fn acquire(&self) -> Option<ConnectionGuard> {
        if self.is_shutting_down.load(Ordering::SeqCst) {
            debug!("Rejecting new connection: shutting down");
            return None;
        }

        let count = self.active_connections.fetch_add(1, Ordering::SeqCst);
        debug!("Connection acquired, active: {}", count + 1);

        Some(ConnectionGuard::new(self.active_connections.clone()))
    }

    /// 开始关闭
    pub fn start_shutdown(&self) {
        if !self.is_shutting_down.swap(true, Ordering::SeqCst) {
            info!(
                "Starting connection drain, {} connections active",
                self.active_count()
            );
        }
    }

    /// 排空所有连接，直到全部释放或到达截止时间
    ///
    /// 返回 `true` 表示所有连接已排空。`deadline` 为 `None` 时无限等待。
    pub async fn drain(&self, deadline: Option<Instant>) -> bool {
        self.start_shutdown();

        let start = Instant::now();
        let mut last_count = self.active_count();

        while self.active_count() > 0 {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    warn!(
                        "Drain deadline exceeded after {:?}, {} connections still active",
                        start.elapsed(),
                        self.active_count()
                    );
                    return false;
                }
            }

            let current_count = self.active_count();
            if current_count != last_count {
                info!(
                    "Draining connections: {} remaining ({:?} elapsed)",
                    current_count,
                    start.elapsed()
                );
                last_count = current_count;
            }

            let wake = Instant::now() + DRAIN_POLL_INTERVAL;
            match deadline {
                Some(deadline) => tokio::time::sleep_until(wake.min(deadline)).await,
                None => sleep(DRAIN_POLL_INTERVAL).await,
            }
        }

        info!("All connections drained in {:?}", start.elapsed());
        true
    }

    /// 获取活跃连接数
    pub fn active_count(&self) -> usize {
        self.active_connections.load(Ordering::SeqCst)
    }

    /// 是否正在关闭
    pub fn is_shutting_down(&self) -> bool {
        self.is_shutting_down.load(Ordering::SeqCst)
    }
}

/// 连接守卫，析构时释放计数
pub struct ConnectionGuard {
    counter: Arc<AtomicUsize>,
}

impl ConnectionGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        Self { counter }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let prev = self.counter.fetch_sub(1, Ordering::SeqCst);
        debug!("Connection released, active: {}", prev - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connection_tracker() {
        let tracker = ConnectionTracker::new();

        let guard1 = tracker.acquire().unwrap();
        let guard2 = tracker.acquire().unwrap();
        assert_eq!(tracker.active_count(), 2);

        drop(guard1);
        assert_eq!(tracker.active_count(), 1);

        drop(guard2);
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_connections() {
        let tracker = ConnectionTracker::new();

        let _guard = tracker.acquire().unwrap();
        tracker.start_shutdown();

        assert!(tracker.is_shutting_down());
        assert!(tracker.acquire().is_none());
        assert_eq!(tracker.active_count(), 1);
    }

    #[tokio::test]
    async fn test_drain_connections() {
        let tracker = ConnectionTracker::new();

        let guard1 = tracker.acquire().unwrap();
        let guard2 = tracker.acquire().unwrap();

        tokio::spawn(async move {
            sleep(Duration::from_millis(200)).await;
            drop(guard1);
            sleep(Duration::from_millis(200)).await;
            drop(guard2);
        });

        let deadline = Instant::now() + Duration::from_secs(5);
        assert!(tracker.drain(Some(deadline)).await);
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn test_drain_deadline() {
        let tracker = ConnectionTracker::new();
        let _guard = tracker.acquire().unwrap();

        let start = Instant::now();
        let drained = tracker.drain(Some(start + Duration::from_millis(300))).await;

        assert!(!drained);
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(tracker.active_count(), 1);
    }

    #[tokio::test]
    async fn test_drain_without_deadline_waits() {
        let tracker = ConnectionTracker::new();
        let guard = tracker.acquire().unwrap();

        tokio::spawn(async move {
            sleep(Duration::from_millis(300)).await;
            drop(guard);
        });

        let start = Instant::now();
        assert!(tracker.drain(None).await);
        assert!(start.elapsed() >= Duration::from_millis(250));
    }
}
