use crate::error::{Result, ServeError};
use rustls::{Certificate, PrivateKey, ServerConfig};
use rustls_pemfile::{certs, pkcs8_private_keys, rsa_private_keys};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// TLS 证书材料（按路径提供，由服务在运行时加载）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    /// 证书链文件路径（PEM）
    pub cert_path: PathBuf,
    /// 私钥文件路径（PEM，PKCS#8 或 PKCS#1）
    pub key_path: PathBuf,
}

impl TlsConfig {
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        }
    }
}

/// 加载 TLS 配置
pub fn load_tls_config(config: &TlsConfig) -> Result<Arc<ServerConfig>> {
    // 1. 加载证书链
    let mut cert_reader = open(&config.cert_path)?;
    let cert_chain: Vec<Certificate> = certs(&mut cert_reader)
        .map_err(|e| tls_error("Failed to parse certificate", &config.cert_path, e))?
        .into_iter()
        .map(Certificate)
        .collect();

    if cert_chain.is_empty() {
        return Err(ServeError::Tls(format!(
            "No certificate found in {}",
            config.cert_path.display()
        )));
    }

    // 2. 加载私钥
    let private_key = load_private_key(&config.key_path)?;

    // 3. 构建 ServerConfig
    let mut tls_config = ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(cert_chain, private_key)
        .map_err(|e| ServeError::Tls(format!("Failed to build TLS config: {}", e)))?;

    tls_config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(Arc::new(tls_config))
}

fn load_private_key(path: &Path) -> Result<PrivateKey> {
    let mut keys = pkcs8_private_keys(&mut open(path)?)
        .map_err(|e| tls_error("Failed to parse private key", path, e))?;

    if keys.is_empty() {
        keys = rsa_private_keys(&mut open(path)?)
            .map_err(|e| tls_error("Failed to parse private key", path, e))?;
    }

    if keys.is_empty() {
        return Err(ServeError::Tls(format!(
            "No private key found in {}",
            path.display()
        )));
    }

    Ok(PrivateKey(keys.remove(0)))
}

fn open(path: &Path) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| tls_error("Failed to open", path, e))
}

fn tls_error(what: &str, path: &Path, err: std::io::Error) -> ServeError {
    ServeError::Tls(format!("{} {}: {}", what, path.display(), err))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn testdata(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("testdata").join(name)
    }

    #[test]
    fn test_tls_config_creation() {
        let config = TlsConfig::new("cert.pem", "key.pem");
        assert_eq!(config.cert_path, PathBuf::from("cert.pem"));
        assert_eq!(config.key_path, PathBuf::from("key.pem"));
    }

    #[test]
    fn test_load_tls_config() {
        let config = TlsConfig::new(testdata("cert.pem"), testdata("key.pem"));
        let server_config = load_tls_config(&config).unwrap();
        assert_eq!(
            server_config.alpn_protocols,
            vec![b"h2".to_vec(), b"http/1.1".to_vec()]
        );
    }

    #[test]
    fn test_missing_files() {
        let config = TlsConfig::new(testdata("missing.pem"), testdata("key.pem"));
        let err = load_tls_config(&config).unwrap_err();
        assert!(matches!(err, ServeError::Tls(_)));
        assert!(err.to_string().contains("missing.pem"));
    }

    #[test]
    fn test_key_file_without_key() {
        // 证书文件中没有私钥
        let config = TlsConfig::new(testdata("cert.pem"), testdata("cert.pem"));
        let err = load_tls_config(&config).unwrap_err();
        assert!(err.to_string().contains("No private key"));
    }
}
