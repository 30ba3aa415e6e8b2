//! 前门配置项
//!
//! 每个配置项在编译期就声明了它的归属：服务端、回环拨号或网关多路复用器。
//! [`DuplexServer::new`](super::DuplexServer::new) 只需按变体分发，不存在
//! "无法识别的配置项" 这一运行期错误。

use std::sync::Arc;
use std::time::Duration;

use rustls::ServerConfig as TlsServerConfig;
use tonic::transport::{ClientTlsConfig, Endpoint};
use tower::Layer;

use crate::client::HookedChannel;
use crate::error::{KitError, Result};
use crate::interceptor::{CallHook, HookChain, HookLayer};

/// 前门配置项
#[derive(Clone)]
pub enum DuplexOption {
    Server(ServerOption),
    Dial(DialOption),
    Mux(MuxOption),
}

/// 服务端配置项
#[derive(Clone)]
pub enum ServerOption {
    /// 入站钩子，按加入顺序执行
    Hook(Arc<dyn CallHook>),
    /// 是否接受明文连接（HTTP/1.1 与 h2c）；关闭时必须配置 `Tls`
    Cleartext(bool),
    /// 加密监听的服务端凭据
    Tls(Arc<TlsServerConfig>),
    /// 每个 HTTP/2 连接允许的最大并发流
    MaxConcurrentStreams(u32),
    /// 监听地址，默认 `0.0.0.0`
    Host(String),
}

/// 回环拨号配置项，作用于网关回连本进程的 Channel
#[derive(Clone)]
pub enum DialOption {
    /// 出站钩子，按加入顺序执行
    Hook(Arc<dyn CallHook>),
    ConnectTimeout(Duration),
    Timeout(Duration),
    TcpNodelay(bool),
    /// 回环拨号走 TLS，前门只接受加密连接时必须配置
    Tls(ClientTlsConfig),
}

/// 网关多路复用器配置项
#[derive(Clone, Debug)]
pub enum MuxOption {
    /// 请求体大小上限（字节）
    BodyLimit(usize),
    /// 单个网关请求的超时
    Timeout(Duration),
}

impl From<ServerOption> for DuplexOption {
    fn from(opt: ServerOption) -> Self {
        DuplexOption::Server(opt)
    }
}

impl From<DialOption> for DuplexOption {
    fn from(opt: DialOption) -> Self {
        DuplexOption::Dial(opt)
    }
}

impl From<MuxOption> for DuplexOption {
    fn from(opt: MuxOption) -> Self {
        DuplexOption::Mux(opt)
    }
}

/// 服务端配置
#[derive(Clone, Debug)]
pub struct ServerOptions {
    pub hooks: HookChain,
    pub cleartext: bool,
    pub max_concurrent_streams: Option<u32>,
    pub host: String,
    pub tls: Option<Arc<TlsServerConfig>>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            hooks: HookChain::new(),
            cleartext: true,
            max_concurrent_streams: None,
            host: "0.0.0.0".to_string(),
            tls: None,
        }
    }
}

impl ServerOptions {
    pub fn apply(&mut self, opt: ServerOption) {
        match opt {
            ServerOption::Hook(hook) => self.hooks.push(hook),
            ServerOption::Cleartext(enabled) => self.cleartext = enabled,
            ServerOption::MaxConcurrentStreams(max) => self.max_concurrent_streams = Some(max),
            ServerOption::Host(host) => self.host = host,
            ServerOption::Tls(config) => self.tls = Some(super::tls::with_alpn(config)),
        }
    }
}

/// 回环拨号配置
///
/// 构建后只读，可在并发请求间共享。
#[derive(Clone, Debug, Default)]
pub struct DialOptions {
    hooks: HookChain,
    connect_timeout: Option<Duration>,
    timeout: Option<Duration>,
    tcp_nodelay: Option<bool>,
    tls: Option<ClientTlsConfig>,
}

impl DialOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, opt: DialOption) {
        match opt {
            DialOption::Hook(hook) => self.hooks.push(hook),
            DialOption::ConnectTimeout(timeout) => self.connect_timeout = Some(timeout),
            DialOption::Timeout(timeout) => self.timeout = Some(timeout),
            DialOption::TcpNodelay(enabled) => self.tcp_nodelay = Some(enabled),
            DialOption::Tls(config) => self.tls = Some(config),
        }
    }

    pub fn hooks(&self) -> &HookChain {
        &self.hooks
    }

    /// 为 `address` 构建 Endpoint
    ///
    /// 缺少 scheme 时按拨号配置补全：配置了 TLS 用 `https://`，否则用明文 `http://`。
    pub fn endpoint(&self, address: &str) -> Result<Endpoint> {
        let uri = if address.contains("://") {
            address.to_string()
        } else if self.tls.is_some() {
            format!("https://{address}")
        } else {
            format!("http://{address}")
        };

        let mut endpoint = Endpoint::from_shared(uri)
            .map_err(|e| KitError::InvalidAddress(format!("{address}: {e}")))?;
        if let Some(tls) = &self.tls {
            endpoint = endpoint.tls_config(tls.clone())?;
        }
        if let Some(timeout) = self.connect_timeout {
            endpoint = endpoint.connect_timeout(timeout);
        }
        if let Some(timeout) = self.timeout {
            endpoint = endpoint.timeout(timeout);
        }
        if let Some(enabled) = self.tcp_nodelay {
            endpoint = endpoint.tcp_nodelay(enabled);
        }
        Ok(endpoint)
    }

    /// 延迟建立连接的 Channel，首次调用时才真正拨号
    ///
    /// 必须在 tokio 运行时内调用。
    pub fn connect_lazy(&self, address: &str) -> Result<HookedChannel> {
        let channel = self.endpoint(address)?.connect_lazy();
        Ok(HookLayer::outbound(self.hooks.clone()).layer(channel))
    }

    /// 立即拨号
    pub async fn connect(&self, address: &str) -> Result<HookedChannel> {
        let channel = self.endpoint(address)?.connect().await?;
        Ok(HookLayer::outbound(self.hooks.clone()).layer(channel))
    }
}
