use thiserror::Error;

/// 服务运行与关闭过程中的统一错误类型
#[derive(Error, Debug)]
pub enum ServeError {
    /// 服务已被 `shutdown` 关闭（哨兵错误，协调器不会向上报告）
    #[error("server closed")]
    Closed,

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("accept error: {0}")]
    Accept(std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    /// 关闭截止时间已过，仍有连接未排空
    #[error("shutdown deadline exceeded")]
    DeadlineExceeded,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServeError {
    /// 是否为关闭哨兵
    pub fn is_closed(&self) -> bool {
        matches!(self, ServeError::Closed)
    }

    /// 是否为关闭超时
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, ServeError::DeadlineExceeded)
    }

    pub(crate) fn bind(addr: impl ToString, source: std::io::Error) -> Self {
        ServeError::Bind {
            addr: addr.to_string(),
            source,
        }
    }
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, ServeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_is_matched_by_variant() {
        assert!(ServeError::Closed.is_closed());
        assert!(!ServeError::DeadlineExceeded.is_closed());
        assert!(!ServeError::Internal("server closed".to_string()).is_closed());
    }

    #[test]
    fn test_bind_error_message() {
        let err = ServeError::bind(
            "127.0.0.1:80",
            std::io::Error::from(std::io::ErrorKind::AddrInUse),
        );
        assert!(err.to_string().starts_with("failed to bind 127.0.0.1:80"));
        assert!(!err.is_closed());
    }
}
