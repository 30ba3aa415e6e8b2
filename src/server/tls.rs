//! 前门 TLS 凭据
//!
//! 服务端凭据是一个不透明的 `rustls::ServerConfig`，由调用方构建或从 PEM 加载。
//! ALPN 为空时补上 `h2` 与 `http/1.1`，同一个加密端口仍可同时承载 gRPC 与网关请求。

use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::ServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};

use crate::error::{KitError, Result};

/// TLS 记录层握手报文的首字节
pub(crate) const TLS_HANDSHAKE_RECORD: u8 = 0x16;

/// 从 PEM 文本构建服务端 TLS 配置
pub fn server_config_from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Arc<ServerConfig>> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(cert_pem))
        .collect::<std::result::Result<Vec<CertificateDer<'static>>, _>>()
        .map_err(|e| KitError::Tls(format!("invalid certificate: {e}")))?;
    if certs.is_empty() {
        return Err(KitError::Tls("no certificate found in PEM".to_string()));
    }

    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut BufReader::new(key_pem))
        .map_err(|e| KitError::Tls(format!("invalid private key: {e}")))?
        .ok_or_else(|| KitError::Tls("no private key found in PEM".to_string()))?;

    let config =
        ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(|e| KitError::Tls(e.to_string()))?
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| KitError::Tls(e.to_string()))?;

    Ok(with_alpn(Arc::new(config)))
}

/// 从证书与私钥文件加载服务端 TLS 配置
pub fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<Arc<ServerConfig>> {
    let cert_pem = std::fs::read(cert_path).map_err(|e| {
        KitError::Tls(format!("certificate file {}: {e}", cert_path.display()))
    })?;
    let key_pem = std::fs::read(key_path)
        .map_err(|e| KitError::Tls(format!("private key file {}: {e}", key_path.display())))?;
    server_config_from_pem(&cert_pem, &key_pem)
}

/// ALPN 为空时声明 `h2` 与 `http/1.1`
pub fn with_alpn(config: Arc<ServerConfig>) -> Arc<ServerConfig> {
    if !config.alpn_protocols.is_empty() {
        return config;
    }
    let mut config = Arc::unwrap_or_clone(config);
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Arc::new(config)
}
