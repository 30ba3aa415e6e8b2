//! gRPC 客户端模块
//!
//! 把下游地址（`http://host[:port]` / `https://host[:port]`）映射成拨号地址，
//! 构建带钩子的 Channel，并附带默认的重试预算。

use std::time::Duration;

use http::Uri;
use http::uri::PathAndQuery;
use tonic::client::Grpc;
use tonic::codec::{Codec, Streaming};
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tonic::{Request, Response, Status};
use tower::Layer;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{KitError, Result};
use crate::interceptor::{
    CallHook, ClientIdentity, HookChain, HookLayer, HookService, PreserveTraceParent,
};
use crate::metrics::{MetricsRegistry, RpcMetrics};
use crate::retry::{RetryDispatch, RetryPolicy};

/// 接收消息大小上限（100 MiB），供生成的客户端调用 `max_decoding_message_size`
pub const MAX_RECV_MSG_SIZE: usize = 100 * 1024 * 1024;

/// 发送消息大小上限（100 MiB），供生成的客户端调用 `max_encoding_message_size`
pub const MAX_SEND_MSG_SIZE: usize = 100 * 1024 * 1024;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// 包裹了出站钩子的 Channel
pub type HookedChannel = HookService<Channel>;

/// 把下游 URL 映射为 `(host:port, 是否启用 TLS)`
///
/// `http` 默认 80 端口，`https` 默认 443 端口，显式端口优先。
pub fn delegate_address(uri: &str) -> Result<(String, bool)> {
    let parsed: Uri = uri
        .parse()
        .map_err(|e: http::uri::InvalidUri| KitError::invalid_delegate(uri, e.to_string()))?;

    let (tls, default_port) = match parsed.scheme_str() {
        Some("http") => (false, 80),
        Some("https") => (true, 443),
        Some(other) => {
            return Err(KitError::invalid_delegate(
                uri,
                format!("unsupported scheme `{other}`"),
            ));
        }
        None => return Err(KitError::invalid_delegate(uri, "missing scheme")),
    };

    let host = parsed
        .host()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| KitError::invalid_delegate(uri, "missing host"))?;
    let port = parsed.port_u16().unwrap_or(default_port);

    Ok((format!("{host}:{port}"), tls))
}

/// 客户端构建器
#[derive(Clone, Debug)]
pub struct ClientBuilder {
    address: String,
    tls: Option<ClientTlsConfig>,
    connect_timeout: Duration,
    timeout: Option<Duration>,
    tcp_nodelay: bool,
    hooks: HookChain,
    max_retry: u32,
}

impl ClientBuilder {
    /// 明文连接 `host:port`
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            tls: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            timeout: None,
            tcp_nodelay: true,
            hooks: HookChain::new(),
            max_retry: 0,
        }
    }

    /// 从下游 URL 创建；`https` 使用系统根证书
    pub fn from_delegate(uri: &str) -> Result<Self> {
        let (address, tls) = delegate_address(uri)?;
        let mut builder = Self::new(address);
        if tls {
            builder.tls = Some(ClientTlsConfig::new().with_native_roots());
        }
        Ok(builder)
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let mut builder = Self::from_delegate(&config.delegate)?
            .connect_timeout(config.connect_timeout())
            .tcp_nodelay(config.tcp_nodelay)
            .max_retry(config.max_retry);
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        Ok(builder)
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }

    /// 使用自定义 TLS 配置（证书材料由调用方提供）
    pub fn tls_config(mut self, tls: ClientTlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// 追加一个出站钩子
    pub fn hook(mut self, hook: impl CallHook) -> Self {
        self.hooks = self.hooks.with(hook);
        self
    }

    /// 追加一组出站钩子
    pub fn hooks(mut self, hooks: HookChain) -> Self {
        self.hooks.extend(hooks);
        self
    }

    /// 追加默认的出站钩子：traceparent 中继和客户端身份
    pub fn with_default_hooks(self) -> Self {
        self.hook(PreserveTraceParent).hook(ClientIdentity::new())
    }

    /// 追加客户端 RPC 指标
    pub fn with_metrics(self, registry: &MetricsRegistry) -> Result<Self> {
        let metrics = RpcMetrics::client(registry, true)?;
        Ok(self.hook(metrics))
    }

    /// 默认重试预算（总调用次数），0 表示不重试
    pub fn max_retry(mut self, max_retry: u32) -> Self {
        self.max_retry = max_retry;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// 默认重试策略：对所有方法生效的兜底谓词
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_budget(self.max_retry)
    }

    pub fn endpoint(&self) -> Result<Endpoint> {
        let scheme = if self.tls.is_some() { "https" } else { "http" };
        let mut endpoint = Endpoint::from_shared(format!("{scheme}://{}", self.address))
            .map_err(|e| KitError::InvalidAddress(format!("{}: {e}", self.address)))?
            .connect_timeout(self.connect_timeout)
            .tcp_nodelay(self.tcp_nodelay);

        if let Some(timeout) = self.timeout {
            endpoint = endpoint.timeout(timeout);
        }
        if let Some(tls) = self.tls.clone() {
            endpoint = endpoint.tls_config(tls)?;
        }
        Ok(endpoint)
    }

    /// 立即连接
    pub async fn build(self) -> Result<HookedChannel> {
        let channel = self.endpoint()?.connect().await?;
        debug!(address = %self.address, tls = self.is_tls(), "gRPC channel connected");
        Ok(HookLayer::outbound(self.hooks).layer(channel))
    }

    /// 延迟连接，首次调用时才拨号；需要在 tokio 运行时内调用
    pub fn build_lazy(self) -> Result<HookedChannel> {
        let channel = self.endpoint()?.connect_lazy();
        Ok(HookLayer::outbound(self.hooks).layer(channel))
    }

    /// 构建 Channel 和对应的重试调度
    pub async fn build_client(self) -> Result<GrpcClient> {
        let dispatch = RetryDispatch::new(self.retry_policy());
        let channel = self.build().await?;
        Ok(GrpcClient { channel, dispatch })
    }
}

/// gRPC 客户端：Channel 加重试调度
#[derive(Clone)]
pub struct GrpcClient {
    channel: HookedChannel,
    dispatch: RetryDispatch,
}

impl GrpcClient {
    pub fn new(channel: HookedChannel, dispatch: RetryDispatch) -> Self {
        Self { channel, dispatch }
    }

    pub fn channel(&self) -> HookedChannel {
        self.channel.clone()
    }

    pub fn dispatch(&self) -> &RetryDispatch {
        &self.dispatch
    }

    /// 一元调用
    ///
    /// `path` 同时用于选择重试策略和发出请求。每次尝试都用原始消息和元数据重建请求。
    pub async fn unary<M1, M2, C>(
        &self,
        path: PathAndQuery,
        request: Request<M1>,
        codec: C,
    ) -> std::result::Result<Response<M2>, Status>
    where
        M1: Clone + Send + Sync + 'static,
        M2: Send + Sync + 'static,
        C: Codec<Encode = M1, Decode = M2> + Clone,
    {
        let (metadata, _, message) = request.into_parts();
        self.dispatch
            .unary(path.path(), || {
                let mut request = Request::new(message.clone());
                *request.metadata_mut() = metadata.clone();
                let mut grpc = self.grpc();
                let path = path.clone();
                let codec = codec.clone();
                async move {
                    grpc.ready().await.map_err(not_ready)?;
                    grpc.unary(request, path, codec).await
                }
            })
            .await
    }

    /// 服务端流式调用，只重试流的建立
    pub async fn server_streaming<M1, M2, C>(
        &self,
        path: PathAndQuery,
        request: Request<M1>,
        codec: C,
    ) -> std::result::Result<Response<Streaming<M2>>, Status>
    where
        M1: Clone + Send + Sync + 'static,
        M2: Send + Sync + 'static,
        C: Codec<Encode = M1, Decode = M2> + Clone,
    {
        let (metadata, _, message) = request.into_parts();
        self.dispatch
            .streaming(path.path(), || {
                let mut request = Request::new(message.clone());
                *request.metadata_mut() = metadata.clone();
                let mut grpc = self.grpc();
                let path = path.clone();
                let codec = codec.clone();
                async move {
                    grpc.ready().await.map_err(not_ready)?;
                    grpc.server_streaming(request, path, codec).await
                }
            })
            .await
    }

    fn grpc(&self) -> Grpc<HookedChannel> {
        Grpc::new(self.channel.clone())
            .max_decoding_message_size(MAX_RECV_MSG_SIZE)
            .max_encoding_message_size(MAX_SEND_MSG_SIZE)
    }
}

fn not_ready(err: tonic::transport::Error) -> Status {
    Status::unavailable(format!("service was not ready: {err}"))
}
