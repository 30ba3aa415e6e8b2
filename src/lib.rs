//! Duplex Kit
//!
//! Serves gRPC and HTTP/JSON on one port, dispatches outgoing calls through a
//! per-method retry policy, and relays `traceparent` across hops that drop it.

pub mod config;
pub mod error;
pub mod logging;

// gRPC 基础功能模块
pub mod client;
pub mod interceptor;
pub mod metrics;
pub mod retry;
pub mod server;
pub mod utils;

// Re-exports
pub use config::{ClientConfig, Config, LoggingConfig, MetricsConfig, ServerConfig};
pub use error::{KitError, Result};
pub use logging::init_tracing;

// gRPC 相关 re-exports
pub use client::{
    ClientBuilder, GrpcClient, HookedChannel, MAX_RECV_MSG_SIZE, MAX_SEND_MSG_SIZE,
    delegate_address,
};
pub use interceptor::{
    CLIENT_ID_HEADER, CallHook, CallInfo, ClientIdentity, Direction, HookChain, HookLayer,
    HookService, LoggingHook, ORIGINAL_TRACE_PARENT_HEADER, PreserveTraceParent,
    REQUEST_ID_HEADER, RestoreTraceParent, TRACE_PARENT_HEADER,
};
pub use metrics::{MetricsRegistry, ProfilingConfig, RpcMetrics};
pub use retry::{
    Backoff, ExponentialBackoff, FixedBackoff, RetryConfig, RetryDispatch, RetryPolicy,
    RetryPredicate,
};
pub use server::{
    Backend, DialOption, DialOptions, DuplexOption, DuplexServer, GatewayMux, MuxOption,
    ServerOption, classify,
};
pub use server::tls::{load_tls_config, server_config_from_pem};
pub use utils::wait_for_server_ready;
