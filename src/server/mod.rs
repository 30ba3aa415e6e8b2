//! 双协议前门
//!
//! 同一个端口同时提供 gRPC 和 HTTP/JSON：每个请求按协议版本和 `Content-Type`
//! 分类后交给 tonic 路由或 axum 网关。网关处理器通过回环地址拨回本进程的
//! gRPC 后端完成 JSON 到 RPC 的翻译。
//!
//! ```ignore
//! let mut server = DuplexServer::new(8080, [
//!     ServerOption::Hook(Arc::new(RestoreTraceParent)).into(),
//!     DialOption::Hook(Arc::new(PreserveTraceParent)).into(),
//! ]);
//! server.add_service(GreeterServer::new(greeter));
//! server.register_handler(|mux, loopback, dial| {
//!     let channel = dial.connect_lazy(loopback)?;
//!     mux.route("/v1/hello", post(hello_gateway).with_state(channel));
//!     Ok(())
//! })?;
//! server.serve().await?;
//! ```

pub mod classify;
pub mod gateway;
pub mod options;
pub mod switch;
pub mod tls;

pub use classify::{Backend, GRPC_CONTENT_TYPE, classify, classify_request};
pub use gateway::GatewayMux;
pub use options::{DialOption, DialOptions, DuplexOption, MuxOption, ServerOption, ServerOptions};
pub use switch::ProtocolSwitch;

use std::convert::Infallible;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use hyper_util::service::TowerToHyperService;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tonic::body::Body as TonicBody;
use tonic::server::NamedService;
use tonic::service::{Routes, RoutesBuilder};
use tower::{Layer, Service};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::{KitError, Result};
use crate::interceptor::{CallHook, Direction, HookLayer, HookService};
use crate::metrics::{self, MetricsRegistry, ProfilingConfig, RpcMetrics};

/// 非连接级的 accept 错误（例如文件描述符耗尽）之后的等待时间
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

type FrontDoor = TowerToHyperService<ProtocolSwitch<HookService<Routes>, Router>>;
type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 双协议服务器
pub struct DuplexServer {
    rpc: RoutesBuilder,
    services: Vec<&'static str>,
    gateway: GatewayMux,
    loopback: String,
    dial_options: DialOptions,
    server_options: ServerOptions,
    port: u16,
}

impl DuplexServer {
    /// 创建服务器，配置项按变体分发到各自的子构建器
    pub fn new(port: u16, options: impl IntoIterator<Item = DuplexOption>) -> Self {
        let mut server_options = ServerOptions::default();
        let mut dial_options = DialOptions::new();
        let mut gateway = GatewayMux::new();

        for opt in options {
            match opt {
                DuplexOption::Server(opt) => server_options.apply(opt),
                DuplexOption::Dial(opt) => dial_options.apply(opt),
                DuplexOption::Mux(opt) => gateway.apply(opt),
            }
        }

        Self {
            rpc: RoutesBuilder::default(),
            services: Vec::new(),
            gateway,
            loopback: format!("localhost:{port}"),
            dial_options,
            server_options,
            port,
        }
    }

    /// 从配置文件的 `[server]` 段创建，`extra` 追加在配置项之后
    ///
    /// 配置了证书路径时在此加载，加载失败返回 [`KitError::Tls`]。
    pub fn from_config(
        config: &ServerConfig,
        extra: impl IntoIterator<Item = DuplexOption>,
    ) -> Result<Self> {
        let options = config.to_options()?.into_iter().chain(extra);
        Ok(Self::new(config.port, options))
    }

    /// 挂载一个 tonic 服务
    pub fn add_service<S>(&mut self, svc: S) -> &mut Self
    where
        S: Service<http::Request<TonicBody>, Error = Infallible>
            + NamedService
            + Clone
            + Send
            + Sync
            + 'static,
        S::Response: axum::response::IntoResponse,
        S::Future: Send + 'static,
    {
        debug!(service = S::NAME, "gRPC service attached");
        self.services.push(S::NAME);
        self.rpc.add_service(svc);
        self
    }

    /// 注册网关处理器
    ///
    /// `f` 收到网关多路复用器、回环地址和拨号配置。必须在对应服务挂载之后调用。
    pub fn register_handler<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut GatewayMux, &str, &DialOptions) -> Result<()>,
    {
        if self.services.is_empty() {
            return Err(KitError::NoServicesRegistered);
        }

        f(&mut self.gateway, &self.loopback, &self.dial_options)?;
        info!(loopback = %self.loopback, "gateway handler registered");
        Ok(())
    }

    /// 在 `host:port` 上监听并阻塞服务
    pub async fn serve(self) -> Result<()> {
        let addr = format!("{}:{}", self.server_options.host, self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| KitError::bind(&addr, e))?;
        self.serve_with_listener(listener).await
    }

    /// 在已绑定的监听器上服务
    ///
    /// 未配置 TLS 时接受 HTTP/1.1 与 h2c；配置了 TLS 且关闭明文时只接受加密连接；
    /// 两者都开启时按首字节区分 TLS 握手与明文请求。关闭明文却没有 TLS 配置时
    /// 返回 [`KitError::Config`]。
    pub async fn serve_with_listener(self, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr()?;
        let ServerOptions {
            hooks,
            cleartext,
            max_concurrent_streams,
            tls,
            ..
        } = self.server_options;

        if !cleartext && tls.is_none() {
            return Err(KitError::Config(
                "cleartext disabled without a TLS server configuration".to_string(),
            ));
        }

        let hooks = Arc::new(hooks);
        let acceptor = tls.map(TlsAcceptor::from);
        let rpc = HookLayer::new(hooks.clone(), Direction::Inbound).layer(self.rpc.routes());
        let switch = ProtocolSwitch::new(rpc, self.gateway.into_router());

        let mut builder = ConnBuilder::new(TokioExecutor::new());
        if let Some(max) = max_concurrent_streams {
            builder.http2().max_concurrent_streams(max);
        }

        info!(
            addr = %local_addr,
            services = ?self.services,
            cleartext,
            tls = acceptor.is_some(),
            "duplex server listening"
        );

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(v) => v,
                Err(e) if is_connection_error(&e) => {
                    debug!(error = %e, "connection dropped before accept");
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "accept error");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    continue;
                }
            };

            let hooks = hooks.clone();
            let service = TowerToHyperService::new(switch.clone());
            let builder = builder.clone();
            let acceptor = acceptor.clone();

            tokio::spawn(async move {
                hooks.on_connection_start(Some(peer));

                let served = serve_connection(&builder, stream, service, acceptor, cleartext).await;
                if let Err(e) = served {
                    debug!(peer = %peer, error = %e, "connection error");
                }

                hooks.on_connection_end(Some(peer));
            });
        }
    }

    /// 安装服务端 RPC 指标并在 `host:port` 上启动指标旁路监听
    pub async fn register_listen_and_serve_metrics(
        &mut self,
        registry: &MetricsRegistry,
        port: u16,
        profiling: ProfilingConfig,
    ) -> Result<JoinHandle<()>> {
        let addr = format!("{}:{}", self.server_options.host, port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| KitError::bind(&addr, e))?;
        self.register_and_serve_metrics(registry, listener, profiling)
    }

    /// 安装服务端 RPC 指标并在已绑定的监听器上启动指标旁路
    pub fn register_and_serve_metrics(
        &mut self,
        registry: &MetricsRegistry,
        listener: TcpListener,
        profiling: ProfilingConfig,
    ) -> Result<JoinHandle<()>> {
        self.register_metrics(registry)?;
        Ok(metrics::spawn_metrics_server_on(listener, registry.clone(), profiling))
    }

    fn register_metrics(&mut self, registry: &MetricsRegistry) -> Result<()> {
        if self.services.is_empty() {
            return Err(KitError::NoServicesRegistered);
        }
        let hook = RpcMetrics::server(registry, true)?;
        self.server_options.hooks.push(Arc::new(hook) as Arc<dyn CallHook>);
        Ok(())
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn host(&self) -> &str {
        &self.server_options.host
    }

    /// 网关回连使用的回环地址，`localhost:<port>`
    pub fn loopback(&self) -> &str {
        &self.loopback
    }

    pub fn dial_options(&self) -> &DialOptions {
        &self.dial_options
    }

    pub fn server_options(&self) -> &ServerOptions {
        &self.server_options
    }

    /// 已挂载服务的全名
    pub fn services(&self) -> &[&'static str] {
        &self.services
    }
}

/// 服务单个连接，必要时先完成 TLS 握手
async fn serve_connection(
    builder: &ConnBuilder<TokioExecutor>,
    stream: TcpStream,
    service: FrontDoor,
    acceptor: Option<TlsAcceptor>,
    cleartext: bool,
) -> std::result::Result<(), BoxError> {
    let Some(acceptor) = acceptor else {
        return builder.serve_connection(TokioIo::new(stream), service).await;
    };
    if cleartext && !starts_with_tls_handshake(&stream).await? {
        return builder.serve_connection(TokioIo::new(stream), service).await;
    }

    let stream = acceptor.accept(stream).await?;
    builder.serve_connection(TokioIo::new(stream), service).await
}

async fn starts_with_tls_handshake(stream: &TcpStream) -> io::Result<bool> {
    let mut first = [0u8; 1];
    let n = stream.peek(&mut first).await?;
    Ok(n == 1 && first[0] == tls::TLS_HANDSHAKE_RECORD)
}

/// 只影响单个连接的 accept 错误，立即继续 accept
fn is_connection_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}
