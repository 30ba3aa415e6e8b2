use std::convert::Infallible;
use std::task::{Context, Poll};

use axum::body::Body as AxumBody;
use axum::response::Response as AxumResponse;
use bytes::Bytes;
use futures::future::BoxFuture;
use http::{Request, Response};
use http_body::Body as HttpBody;
use tower::{Service, ServiceExt};

use super::classify::{Backend, classify_request};

/// 按请求分类把请求交给 gRPC 后端或 HTTP 网关
///
/// 两个后端都是 `Infallible` 服务，每个请求克隆一份后 `oneshot`，所以自身总是 ready。
#[derive(Clone, Debug)]
pub struct ProtocolSwitch<G, H> {
    rpc: G,
    gateway: H,
}

impl<G, H> ProtocolSwitch<G, H> {
    pub fn new(rpc: G, gateway: H) -> Self {
        Self { rpc, gateway }
    }
}

impl<B, G, GB, H, HB> Service<Request<B>> for ProtocolSwitch<G, H>
where
    B: Send + 'static,
    G: Service<Request<B>, Response = Response<GB>, Error = Infallible> + Clone + Send + 'static,
    G::Future: Send + 'static,
    GB: HttpBody<Data = Bytes> + Send + 'static,
    GB::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    H: Service<Request<B>, Response = Response<HB>, Error = Infallible> + Clone + Send + 'static,
    H::Future: Send + 'static,
    HB: HttpBody<Data = Bytes> + Send + 'static,
    HB::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Response = AxumResponse;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        match classify_request(&req) {
            Backend::Rpc => {
                let rpc = self.rpc.clone();
                Box::pin(async move {
                    let response = rpc.oneshot(req).await?;
                    // AxumBody::new 保留 trailers 帧，grpc-status 在里面
                    Ok(response.map(AxumBody::new))
                })
            }
            Backend::Gateway => {
                let gateway = self.gateway.clone();
                Box::pin(async move {
                    let response = gateway.oneshot(req).await?;
                    Ok(response.map(AxumBody::new))
                })
            }
        }
    }
}
