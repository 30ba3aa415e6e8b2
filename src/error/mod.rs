//! 错误处理模块
//!
//! 配置错误（监听失败、无效地址、注册顺序错误）在启动阶段立即返回；
//! 单次调用的错误始终是 `tonic::Status`，由重试调度原样透传。

pub mod grpc;

use std::net::SocketAddr;
use thiserror::Error;

pub use grpc::status_code_from_headers;

/// duplex-kit 统一错误类型
#[derive(Error, Debug)]
pub enum KitError {
    /// 监听端口绑定失败（不会重试）
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// 无法解析的监听或拨号地址
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// 不支持的下游地址（只接受 http / https）
    #[error("invalid delegate `{uri}`: {reason}")]
    InvalidDelegate { uri: String, reason: String },

    /// 网关注册早于 RPC 服务注册
    #[error("no gRPC service registered before gateway handler registration")]
    NoServicesRegistered,

    /// tonic 传输层错误
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// TLS 证书或私钥无法加载
    #[error("tls error: {0}")]
    Tls(String),

    /// 配置文件错误
    #[error("configuration error: {0}")]
    Config(String),

    /// 服务未在超时内就绪
    #[error("server at {addr} not ready: {reason}")]
    NotReady { addr: SocketAddr, reason: String },

    /// 指标注册失败（例如同一注册表重复注册）
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl KitError {
    pub fn bind(addr: impl Into<String>, source: std::io::Error) -> Self {
        KitError::Bind {
            addr: addr.into(),
            source,
        }
    }

    pub fn invalid_delegate(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        KitError::InvalidDelegate {
            uri: uri.into(),
            reason: reason.into(),
        }
    }

    /// 是否为启动阶段的致命配置错误
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            KitError::Bind { .. }
                | KitError::InvalidAddress(_)
                | KitError::InvalidDelegate { .. }
                | KitError::NoServicesRegistered
                | KitError::Tls(_)
                | KitError::Config(_)
        )
    }
}

impl From<toml::de::Error> for KitError {
    fn from(err: toml::de::Error) -> Self {
        KitError::Config(err.to_string())
    }
}

/// duplex-kit 结果类型
pub type Result<T> = std::result::Result<T, KitError>;
