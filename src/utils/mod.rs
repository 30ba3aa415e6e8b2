//! 工具函数模块

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tonic::Request;
use tracing::debug;

use crate::error::{KitError, Result};
use crate::interceptor::{CLIENT_ID_HEADER, REQUEST_ID_HEADER, TRACE_PARENT_HEADER};

fn metadata_str<T>(req: &Request<T>, key: &str) -> Option<String> {
    req.metadata()
        .get(key)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// 提取请求ID
pub fn extract_request_id<T>(req: &Request<T>) -> Option<String> {
    metadata_str(req, REQUEST_ID_HEADER)
}

/// 提取客户端ID
pub fn extract_client_id<T>(req: &Request<T>) -> Option<String> {
    metadata_str(req, CLIENT_ID_HEADER)
}

/// 提取 traceparent（服务端钩子恢复之后的值）
pub fn extract_trace_parent<T>(req: &Request<T>) -> Option<String> {
    metadata_str(req, TRACE_PARENT_HEADER)
}

/// 等待服务启动就绪（通过 TCP 连接重试）
///
/// 使用指数退避策略重试连接，直到服务真正可以接受连接。
///
/// ```rust,no_run
/// use duplex_kit::utils::wait_for_server_ready;
///
/// # async fn example() -> duplex_kit::Result<()> {
/// wait_for_server_ready("127.0.0.1:8080".parse().unwrap()).await?;
/// # Ok(())
/// # }
/// ```
pub async fn wait_for_server_ready(address: SocketAddr) -> Result<()> {
    const MAX_RETRIES: u32 = 30;
    const INITIAL_DELAY_MS: u64 = 50;
    const MAX_DELAY_MS: u64 = 500;
    const TOTAL_TIMEOUT: Duration = Duration::from_secs(10);

    let start = Instant::now();
    let mut delay_ms = INITIAL_DELAY_MS;

    for attempt in 1..=MAX_RETRIES {
        if start.elapsed() > TOTAL_TIMEOUT {
            return Err(KitError::NotReady {
                addr: address,
                reason: format!("timed out after {}s", TOTAL_TIMEOUT.as_secs()),
            });
        }

        match timeout(Duration::from_millis(100), TcpStream::connect(address)).await {
            Ok(Ok(_)) => {
                debug!(
                    address = %address,
                    attempts = attempt,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "server is ready"
                );
                return Ok(());
            }
            Ok(Err(e)) => {
                debug!(address = %address, attempt, error = %e, "connection attempt failed, retrying");
            }
            Err(_) => {
                debug!(address = %address, attempt, "connection attempt timed out, retrying");
            }
        }

        sleep(Duration::from_millis(delay_ms)).await;
        delay_ms = (delay_ms * 2).min(MAX_DELAY_MS);
    }

    Err(KitError::NotReady {
        addr: address,
        reason: format!("no connection after {MAX_RETRIES} attempts"),
    })
}
