//! gRPC 错误处理
//!
//! 提供 KitError 与 tonic Status 之间的转换，以及状态码提取

use super::KitError;
use http::HeaderMap;
use tonic::{Code, Status};

/// grpc-status 头部名
pub const GRPC_STATUS_HEADER: &str = "grpc-status";

impl From<KitError> for Status {
    fn from(err: KitError) -> Self {
        match err {
            KitError::Transport(e) => Status::unavailable(e.to_string()),
            KitError::NotReady { .. } => Status::unavailable(err.to_string()),
            KitError::Io(e) => Status::unavailable(e.to_string()),
            KitError::InvalidAddress(_) | KitError::InvalidDelegate { .. } => {
                Status::invalid_argument(err.to_string())
            }
            KitError::Bind { .. }
            | KitError::NoServicesRegistered
            | KitError::Tls(_)
            | KitError::Config(_) => Status::failed_precondition(err.to_string()),
            KitError::Metrics(e) => Status::internal(e.to_string()),
        }
    }
}

/// 从响应头部或 trailers 中读取 grpc-status
///
/// 头部不含 grpc-status 时返回 `None`（状态码要等到 trailers 才能确定）。
pub fn status_code_from_headers(headers: &HeaderMap) -> Option<Code> {
    headers
        .get(GRPC_STATUS_HEADER)
        .map(|value| Code::from_bytes(value.as_bytes()))
}
