//! 钩子的 tower 适配层
//!
//! [`HookService`] 可以包裹客户端的 `tonic::transport::Channel`，也可以包裹服务端的
//! `tonic::service::Routes`。请求头在转发给内层服务之前交给钩子处理，因此出站
//! 钩子一定早于头部发送，入站钩子一定早于处理器执行。

use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::future::BoxFuture;
use http::StatusCode;
use http_body::Body as HttpBody;
use http_body_util::BodyExt;
use tonic::Code;
use tonic::body::Body as TonicBody;
use tonic::metadata::MetadataMap;
use tower::{Layer, Service};

use super::{CallHook, CallInfo, Direction};
use crate::error::status_code_from_headers;

/// 钩子中间件层
#[derive(Clone)]
pub struct HookLayer {
    hooks: Arc<dyn CallHook>,
    direction: Direction,
}

impl HookLayer {
    pub fn new(hooks: Arc<dyn CallHook>, direction: Direction) -> Self {
        Self { hooks, direction }
    }

    /// 客户端方向，用于包裹 Channel
    pub fn outbound(hooks: impl CallHook) -> Self {
        Self::new(Arc::new(hooks), Direction::Outbound)
    }

    /// 服务端方向，用于包裹服务路由
    pub fn inbound(hooks: impl CallHook) -> Self {
        Self::new(Arc::new(hooks), Direction::Inbound)
    }
}

impl<S> Layer<S> for HookLayer {
    type Service = HookService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        HookService {
            inner,
            hooks: self.hooks.clone(),
            direction: self.direction,
        }
    }
}

/// 运行钩子链的服务包装
#[derive(Clone)]
pub struct HookService<S> {
    inner: S,
    hooks: Arc<dyn CallHook>,
    direction: Direction,
}

impl<S> HookService<S> {
    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, B, RB> Service<http::Request<B>> for HookService<S>
where
    S: Service<http::Request<B>, Response = http::Response<RB>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
    RB: HttpBody<Data = Bytes> + Send + 'static,
    RB::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Response = http::Response<TonicBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: http::Request<B>) -> Self::Future {
        let info = CallInfo::new(req.uri().path(), self.direction);

        let mut metadata = MetadataMap::from_headers(std::mem::take(req.headers_mut()));
        self.hooks.on_call_start(&info, &mut metadata);
        *req.headers_mut() = metadata.into_headers();

        // 内层服务已经 ready，取走它并留下一个克隆
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let hooks = self.hooks.clone();

        Box::pin(async move {
            match inner.call(req).await {
                Ok(response) => Ok(observe_response(response, hooks, info)),
                Err(err) => {
                    hooks.on_call_end(&info, Code::Unavailable);
                    Err(err)
                }
            }
        })
    }
}

/// 在响应头（trailers-only）或 trailers 帧上报告最终状态码
fn observe_response<RB>(
    response: http::Response<RB>,
    hooks: Arc<dyn CallHook>,
    info: CallInfo,
) -> http::Response<TonicBody>
where
    RB: HttpBody<Data = Bytes> + Send + 'static,
    RB::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    if let Some(code) = status_code_from_headers(response.headers()) {
        hooks.on_call_end(&info, code);
        return response.map(TonicBody::new);
    }

    if response.status() != StatusCode::OK {
        hooks.on_call_end(&info, code_from_http_status(response.status()));
        return response.map(TonicBody::new);
    }

    let mut end = CallEnd {
        hooks,
        info,
        reported: false,
    };
    response.map(|body| {
        TonicBody::new(body.map_frame(move |frame| {
            if let Some(trailers) = frame.trailers_ref() {
                end.report(status_code_from_headers(trailers).unwrap_or(Code::Unknown));
            }
            frame
        }))
    })
}

/// 响应体上的一次性结束报告
///
/// 响应体在 trailers 之前被丢弃（调用取消、流未读完）时按 `Cancelled` 报告。
struct CallEnd {
    hooks: Arc<dyn CallHook>,
    info: CallInfo,
    reported: bool,
}

impl CallEnd {
    fn report(&mut self, code: Code) {
        if !self.reported {
            self.reported = true;
            self.hooks.on_call_end(&self.info, code);
        }
    }
}

impl Drop for CallEnd {
    fn drop(&mut self) {
        self.report(Code::Cancelled);
    }
}

/// HTTP 状态码到 gRPC 状态码的映射（gRPC over HTTP/2 规范）
fn code_from_http_status(status: StatusCode) -> Code {
    match status {
        StatusCode::BAD_REQUEST => Code::Internal,
        StatusCode::UNAUTHORIZED => Code::Unauthenticated,
        StatusCode::FORBIDDEN => Code::PermissionDenied,
        StatusCode::NOT_FOUND => Code::Unimplemented,
        StatusCode::TOO_MANY_REQUESTS
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => Code::Unavailable,
        _ => Code::Unknown,
    }
}
