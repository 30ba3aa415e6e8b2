//! 请求分类
//!
//! 分类只看两件事：传输层协议版本和 `Content-Type`。HTTP/2 且内容类型包含
//! `application/grpc` 的请求交给 gRPC 后端，其余全部交给 HTTP 网关。

use http::header::CONTENT_TYPE;
use http::{Request, Version};

/// gRPC 媒体类型标记（同时覆盖 `application/grpc+proto` 等变体）
pub const GRPC_CONTENT_TYPE: &str = "application/grpc";

/// 请求的目标后端
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Rpc,
    Gateway,
}

/// 按 `(协议版本, Content-Type)` 分类，纯函数
pub fn classify(version: Version, content_type: Option<&str>) -> Backend {
    let is_grpc = content_type.is_some_and(|ct| ct.contains(GRPC_CONTENT_TYPE));
    if version == Version::HTTP_2 && is_grpc {
        Backend::Rpc
    } else {
        Backend::Gateway
    }
}

pub fn classify_request<B>(req: &Request<B>) -> Backend {
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    classify(req.version(), content_type)
}
