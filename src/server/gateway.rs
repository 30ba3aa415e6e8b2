use std::time::Duration;

use axum::Router;
use axum::routing::MethodRouter;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use super::options::MuxOption;

/// HTTP/JSON 网关多路复用器
///
/// 包装一个 axum `Router`。网关处理器负责把 JSON 请求翻译成对回环地址的
/// gRPC 调用，再把响应序列化回 JSON。
#[derive(Debug)]
pub struct GatewayMux {
    router: Router,
    body_limit: Option<usize>,
    timeout: Option<Duration>,
}

impl Default for GatewayMux {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayMux {
    pub fn new() -> Self {
        Self {
            router: Router::new(),
            body_limit: None,
            timeout: None,
        }
    }

    pub fn apply(&mut self, opt: MuxOption) {
        match opt {
            MuxOption::BodyLimit(limit) => self.body_limit = Some(limit),
            MuxOption::Timeout(timeout) => self.timeout = Some(timeout),
        }
    }

    /// 注册一条网关路由
    pub fn route(&mut self, path: &str, method_router: MethodRouter) -> &mut Self {
        let router = std::mem::replace(&mut self.router, Router::new());
        self.router = router.route(path, method_router);
        self
    }

    /// 合并一个已有的 Router
    pub fn merge(&mut self, other: Router) -> &mut Self {
        let router = std::mem::replace(&mut self.router, Router::new());
        self.router = router.merge(other);
        self
    }

    /// 生成最终的 Router，配置项在这里以中间件形式生效
    #[allow(deprecated)]
    pub fn into_router(self) -> Router {
        let mut router = self.router;
        if let Some(limit) = self.body_limit {
            router = router.layer(RequestBodyLimitLayer::new(limit));
        }
        if let Some(timeout) = self.timeout {
            router = router.layer(TimeoutLayer::new(timeout));
        }
        router
    }
}
