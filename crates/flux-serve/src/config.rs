use crate::policy::ShutdownPolicyBuilder;
use crate::tls::TlsConfig;
use anyhow::{anyhow, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// 环境变量前缀，例如 `FLUX_SERVE__SERVER__PORT=8080`
pub const ENV_PREFIX: &str = "FLUX_SERVE";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ServeConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub tls: Option<TlsSection>,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TlsSection {
    /// TLS 证书文件路径
    pub cert_path: String,

    /// TLS 私钥文件路径
    pub key_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ShutdownConfig {
    /// 关闭超时（秒），0 表示无限等待
    #[serde(default = "default_shutdown_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

// 默认值函数
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ServeConfig {
    /// 加载配置：TOML 文件（不存在时使用默认值）叠加环境变量
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut builder = Config::builder();

        if path.exists() {
            builder = builder.add_source(File::new(
                path.to_str().ok_or_else(|| anyhow!("Invalid config path"))?,
                FileFormat::Toml,
            ));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: ServeConfig = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 验证配置
    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(anyhow!("server.host must not be empty"));
        }

        if let Some(tls) = &self.tls {
            if tls.cert_path.trim().is_empty() || tls.key_path.trim().is_empty() {
                return Err(anyhow!("tls.cert_path and tls.key_path must both be set"));
            }
        }

        Ok(())
    }
}

impl ServerConfig {
    /// 监听地址
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl TlsSection {
    pub fn to_tls_config(&self) -> TlsConfig {
        TlsConfig::new(&self.cert_path, &self.key_path)
    }
}

impl ShutdownConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// 以配置的超时创建关闭策略构建器，回调由调用方补充
    pub fn policy_builder(&self) -> ShutdownPolicyBuilder {
        ShutdownPolicyBuilder::new().shutdown_timeout(self.timeout())
    }
}

// Default trait 实现
impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_defaults_when_file_missing() {
        let temp_dir = tempdir().unwrap();
        let config = ServeConfig::load(temp_dir.path().join("missing.toml")).unwrap();

        assert_eq!(config.server.addr(), "127.0.0.1:3000");
        assert!(config.tls.is_none());
        assert_eq!(config.shutdown.timeout(), Duration::from_secs(30));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("serve.toml");
        let content = r#"
[server]
host = "0.0.0.0"
port = 8443

[tls]
cert_path = "certs/cert.pem"
key_path = "certs/key.pem"

[shutdown]
timeout_secs = 0

[logging]
level = "debug"
"#;
        fs::write(&path, content).unwrap();

        let config = ServeConfig::load(&path).unwrap();

        assert_eq!(config.server.addr(), "0.0.0.0:8443");
        assert_eq!(
            config.tls.as_ref().unwrap().to_tls_config(),
            TlsConfig::new("certs/cert.pem", "certs/key.pem")
        );
        assert_eq!(config.logging.level, "debug");

        let policy = config.shutdown.policy_builder().build();
        assert_eq!(policy.shutdown_timeout(), Duration::ZERO);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("serve.toml");
        fs::write(&path, "[shutdown]\ntimeout_secs = 5\n").unwrap();

        let config = ServeConfig::load(&path).unwrap();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.shutdown.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_validate_rejects_empty_tls_paths() {
        let config = ServeConfig {
            tls: Some(TlsSection {
                cert_path: "cert.pem".to_string(),
                key_path: " ".to_string(),
            }),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ServeConfig {
            server: ServerConfig {
                host: String::new(),
                port: 80,
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());

        assert!(ServeConfig::default().validate().is_ok());
    }
}
