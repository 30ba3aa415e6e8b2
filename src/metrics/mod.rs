//! RPC 指标
//!
//! 指标状态由显式的 [`MetricsRegistry`] 持有，在启动时构建一次后按需传递。
//! [`RpcMetrics`] 作为调用钩子安装在服务端或客户端一侧，统计调用开始次数、
//! 结束状态码分布以及（可选的）处理耗时。

mod server;

pub use server::{ProfilingConfig, metrics_router, spawn_metrics_server_on};

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use tonic::Code;
use tonic::metadata::MetadataMap;

use crate::error::Result;
use crate::interceptor::{CLIENT_ID_HEADER, CallHook, CallInfo};

/// 处理耗时直方图的桶（秒），覆盖从 100ms 到约一小时的长调用
pub const HANDLING_TIME_BUCKETS: [f64; 15] = [
    0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0, 2400.0, 3666.0,
];

/// Prometheus 注册表
#[derive(Clone, Default)]
pub struct MetricsRegistry {
    registry: Registry,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// 以 Prometheus 文本格式导出全部指标
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| crate::error::KitError::Metrics(prometheus::Error::Msg(e.to_string())))
    }
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("families", &self.registry.gather().len())
            .finish()
    }
}

/// RPC 指标钩子
#[derive(Clone)]
pub struct RpcMetrics {
    started: IntCounterVec,
    handled: IntCounterVec,
    handling_seconds: Option<HistogramVec>,
}

impl RpcMetrics {
    /// 服务端指标：`grpc_server_*`
    pub fn server(registry: &MetricsRegistry, handling_time: bool) -> Result<Self> {
        Self::register(registry, "server", handling_time)
    }

    /// 客户端指标：`grpc_client_*`
    pub fn client(registry: &MetricsRegistry, handling_time: bool) -> Result<Self> {
        Self::register(registry, "client", handling_time)
    }

    fn register(registry: &MetricsRegistry, side: &str, handling_time: bool) -> Result<Self> {
        let started = IntCounterVec::new(
            Opts::new(
                format!("grpc_{side}_started_total"),
                format!("Total number of RPCs started on the {side}."),
            ),
            &["grpc_service", "grpc_method", "client_id"],
        )?;
        let handled = IntCounterVec::new(
            Opts::new(
                format!("grpc_{side}_handled_total"),
                format!("Total number of RPCs completed on the {side}, regardless of success or failure."),
            ),
            &["grpc_service", "grpc_method", "grpc_code"],
        )?;

        registry.registry.register(Box::new(started.clone()))?;
        registry.registry.register(Box::new(handled.clone()))?;

        let handling_seconds = if handling_time {
            let histogram = HistogramVec::new(
                HistogramOpts::new(
                    format!("grpc_{side}_handling_seconds"),
                    format!("Histogram of response latency (seconds) of RPCs handled by the {side}."),
                )
                .buckets(HANDLING_TIME_BUCKETS.to_vec()),
                &["grpc_service", "grpc_method"],
            )?;
            registry.registry.register(Box::new(histogram.clone()))?;
            Some(histogram)
        } else {
            None
        };

        Ok(Self {
            started,
            handled,
            handling_seconds,
        })
    }
}

impl std::fmt::Debug for RpcMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcMetrics")
            .field("handling_time", &self.handling_seconds.is_some())
            .finish()
    }
}

impl CallHook for RpcMetrics {
    fn on_call_start(&self, info: &CallInfo, metadata: &mut MetadataMap) {
        let (service, method) = info.service_and_method();
        let client_id = metadata
            .get(CLIENT_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown");
        self.started
            .with_label_values(&[service, method, client_id])
            .inc();
    }

    fn on_call_end(&self, info: &CallInfo, code: Code) {
        let (service, method) = info.service_and_method();
        self.handled
            .with_label_values(&[service, method, code_label(code)])
            .inc();

        if let Some(histogram) = &self.handling_seconds {
            histogram
                .with_label_values(&[service, method])
                .observe(info.started.elapsed().as_secs_f64());
        }
    }
}

/// 状态码的标签取值，与其他语言 gRPC 实现导出的名称一致
pub fn code_label(code: Code) -> &'static str {
    match code {
        Code::Ok => "OK",
        Code::Cancelled => "Canceled",
        Code::Unknown => "Unknown",
        Code::InvalidArgument => "InvalidArgument",
        Code::DeadlineExceeded => "DeadlineExceeded",
        Code::NotFound => "NotFound",
        Code::AlreadyExists => "AlreadyExists",
        Code::PermissionDenied => "PermissionDenied",
        Code::ResourceExhausted => "ResourceExhausted",
        Code::FailedPrecondition => "FailedPrecondition",
        Code::Aborted => "Aborted",
        Code::OutOfRange => "OutOfRange",
        Code::Unimplemented => "Unimplemented",
        Code::Internal => "Internal",
        Code::Unavailable => "Unavailable",
        Code::DataLoss => "DataLoss",
        Code::Unauthenticated => "Unauthenticated",
    }
}
