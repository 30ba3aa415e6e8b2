use std::net::SocketAddr;

use super::{CallHook, CallInfo};
use tonic::Code;
use tonic::metadata::MetadataMap;
use tracing::{debug, info, warn};

/// 日志钩子
///
/// 在调用开始和结束时输出结构化日志，结束日志带上耗时和状态码。
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHook;

impl LoggingHook {
    pub fn new() -> Self {
        Self
    }
}

impl CallHook for LoggingHook {
    fn on_call_start(&self, info: &CallInfo, metadata: &mut MetadataMap) {
        let request_id = metadata
            .get(super::REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        debug!(
            method = %info.method,
            direction = info.direction.as_str(),
            request_id,
            "gRPC call started"
        );
    }

    fn on_call_end(&self, info: &CallInfo, code: Code) {
        let elapsed_ms = info.started.elapsed().as_millis() as u64;
        if code == Code::Ok {
            info!(
                method = %info.method,
                direction = info.direction.as_str(),
                elapsed_ms,
                "gRPC call finished"
            );
        } else {
            warn!(
                method = %info.method,
                direction = info.direction.as_str(),
                elapsed_ms,
                code = ?code,
                "gRPC call failed"
            );
        }
    }

    fn on_connection_start(&self, peer: Option<SocketAddr>) {
        debug!(peer = ?peer, "connection opened");
    }

    fn on_connection_end(&self, peer: Option<SocketAddr>) {
        debug!(peer = ?peer, "connection closed");
    }
}
