//! 调用钩子模块
//!
//! 钩子在调用发送之前（客户端）或处理器执行之前（服务端）拿到调用的元数据，
//! 可以读写其中的头部。所有钩子实现同一个 [`CallHook`] 接口，由集成方按顺序
//! 组合成 [`HookChain`]，再通过 [`HookLayer`] 安装到 tonic 的 Channel 或服务路由上。

pub mod client_id;
pub mod composite;
pub mod layer;
pub mod logging;
pub mod trace_context;

pub use client_id::{CLIENT_ID_HEADER, ClientIdentity, REQUEST_ID_HEADER};
pub use composite::HookChain;
pub use layer::{HookLayer, HookService};
pub use logging::LoggingHook;
pub use trace_context::{
    ORIGINAL_TRACE_PARENT_HEADER, PreserveTraceParent, RestoreTraceParent, TRACE_PARENT_HEADER,
};

use std::net::SocketAddr;
use std::time::Instant;
use tonic::Code;
use tonic::metadata::MetadataMap;

/// 调用方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// 客户端发出的调用
    Outbound,
    /// 服务端收到的调用
    Inbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Outbound => "outbound",
            Direction::Inbound => "inbound",
        }
    }
}

/// 单次调用的描述信息
#[derive(Debug, Clone)]
pub struct CallInfo {
    /// 完整方法路径，形如 `/package.Service/Method`
    pub method: String,
    pub direction: Direction,
    pub started: Instant,
}

impl CallInfo {
    pub fn new(method: impl Into<String>, direction: Direction) -> Self {
        Self {
            method: method.into(),
            direction,
            started: Instant::now(),
        }
    }

    /// 拆分出服务名和方法名，无法识别的路径返回 `("unknown", path)`
    pub fn service_and_method(&self) -> (&str, &str) {
        self.method
            .trim_start_matches('/')
            .split_once('/')
            .unwrap_or(("unknown", self.method.as_str()))
    }
}

/// 调用钩子
///
/// 默认实现全部为空操作，实现方只需覆盖关心的时机。钩子必须是无状态或内部
/// 自行同步的，因为同一个实例会被并发调用共享。
pub trait CallHook: Send + Sync + 'static {
    /// 调用开始：客户端在头部发送之前，服务端在处理器执行之前
    fn on_call_start(&self, _info: &CallInfo, _metadata: &mut MetadataMap) {}

    /// 调用结束，`code` 为最终的 gRPC 状态码
    fn on_call_end(&self, _info: &CallInfo, _code: Code) {}

    /// 连接建立
    fn on_connection_start(&self, _peer: Option<SocketAddr>) {}

    /// 连接关闭
    fn on_connection_end(&self, _peer: Option<SocketAddr>) {}
}
