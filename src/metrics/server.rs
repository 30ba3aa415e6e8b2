//! 指标旁路监听
//!
//! 与前门分开的独立端口，只提供 `/metrics` 和按开关启用的调试端点。

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::MetricsRegistry;

/// 调试端点开关
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilingConfig {
    /// `/debug/runtime`：tokio 运行时统计
    pub runtime: bool,
    /// `/debug/build`：包名和版本
    pub build_info: bool,
}

impl ProfilingConfig {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn enabled() -> Self {
        Self {
            runtime: true,
            build_info: true,
        }
    }
}

/// 构建指标路由
pub fn metrics_router(registry: MetricsRegistry, profiling: ProfilingConfig) -> Router {
    let mut router = Router::new().route("/metrics", get(render_metrics));

    if profiling.runtime {
        router = router.route("/debug/runtime", get(runtime_stats));
    }
    if profiling.build_info {
        router = router.route("/debug/build", get(build_info));
    }

    router.with_state(registry)
}

/// 在已绑定的监听器上提供指标
pub fn spawn_metrics_server_on(
    listener: TcpListener,
    registry: MetricsRegistry,
    profiling: ProfilingConfig,
) -> JoinHandle<()> {
    let router = metrics_router(registry, profiling);

    tokio::spawn(async move {
        match listener.local_addr() {
            Ok(addr) => info!(addr = %addr, ?profiling, "metrics listener started"),
            Err(e) => error!(error = %e, "metrics listener has no local address"),
        }

        if let Err(e) = axum::serve(listener, router).await {
            error!(error = %e, "metrics listener stopped");
        }
    })
}

async fn render_metrics(State(registry): State<MetricsRegistry>) -> impl IntoResponse {
    match registry.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn runtime_stats() -> Json<serde_json::Value> {
    let metrics = tokio::runtime::Handle::current().metrics();
    Json(json!({
        "workers": metrics.num_workers(),
        "alive_tasks": metrics.num_alive_tasks(),
        "global_queue_depth": metrics.global_queue_depth(),
    }))
}

async fn build_info() -> Json<serde_json::Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
