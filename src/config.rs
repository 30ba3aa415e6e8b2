//! 配置
//!
//! 所有段落都有默认值，TOML 文件里只需写需要覆盖的字段。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{KitError, Result};
use crate::metrics::ProfilingConfig;
use crate::retry::RetryPolicy;
use crate::server::{DuplexOption, MuxOption, ServerOption, tls};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub metrics: MetricsConfig,
    pub client: ClientConfig,
    pub logging: LoggingConfig,
}

/// 前门配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 是否接受明文连接；关闭时必须同时配置证书与私钥
    pub cleartext: bool,
    pub max_concurrent_streams: Option<u32>,
    /// 网关请求体上限（字节）
    pub body_limit: Option<usize>,
    /// 网关请求超时（毫秒）
    pub gateway_timeout_ms: Option<u64>,
    /// PEM 证书链路径
    pub tls_cert: Option<PathBuf>,
    /// PEM 私钥路径
    pub tls_key: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cleartext: true,
            max_concurrent_streams: None,
            body_limit: None,
            gateway_timeout_ms: None,
            tls_cert: None,
            tls_key: None,
        }
    }
}

impl ServerConfig {
    /// 转换为前门配置项，配置了证书时在此加载
    pub fn to_options(&self) -> Result<Vec<DuplexOption>> {
        let mut options = vec![
            ServerOption::Host(self.host.clone()).into(),
            ServerOption::Cleartext(self.cleartext).into(),
        ];
        if let Some(max) = self.max_concurrent_streams {
            options.push(ServerOption::MaxConcurrentStreams(max).into());
        }
        if let Some(limit) = self.body_limit {
            options.push(MuxOption::BodyLimit(limit).into());
        }
        if let Some(ms) = self.gateway_timeout_ms {
            options.push(MuxOption::Timeout(Duration::from_millis(ms)).into());
        }
        match (&self.tls_cert, &self.tls_key) {
            (Some(cert), Some(key)) => {
                options.push(ServerOption::Tls(tls::load_tls_config(cert, key)?).into());
            }
            (None, None) => {}
            _ => {
                return Err(KitError::Config(
                    "tls_cert and tls_key must be set together".to_string(),
                ));
            }
        }
        Ok(options)
    }
}

/// 指标旁路配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
    pub profiling: ProfilingConfig,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 9090,
            profiling: ProfilingConfig::default(),
        }
    }
}

/// 下游客户端配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// 下游 URL，`http://` 或 `https://`
    pub delegate: String,
    pub connect_timeout_ms: u64,
    pub timeout_ms: Option<u64>,
    pub tcp_nodelay: bool,
    /// 默认重试预算（总调用次数），0 表示不重试
    pub max_retry: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            delegate: "http://localhost:80".to_string(),
            connect_timeout_ms: 5_000,
            timeout_ms: None,
            tcp_nodelay: true,
            max_retry: 0,
        }
    }
}

impl ClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_budget(self.max_retry)
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` 指令，`RUST_LOG` 存在时优先
    pub level: String,
    /// 输出 JSON 格式
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}
