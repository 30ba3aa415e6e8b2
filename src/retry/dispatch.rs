//! 重试调度
//!
//! 每次调用按方法名从 [`RetryPolicy`] 选出配置：没有匹配时原样调用一次并原样
//! 返回错误；有匹配时在可重试的状态码上按退避策略重试，直到达到最大调用次数，
//! 最后一次的错误原样返回给调用方。
//!
//! ```rust,ignore
//! let dispatch = RetryDispatch::new(RetryPolicy::new(vec![
//!     RetryPredicate::method("/helloworld.Greeter/SayHello", RetryConfig::new(3)),
//! ]));
//!
//! let reply = dispatch
//!     .unary("/helloworld.Greeter/SayHello", || {
//!         let mut client = client.clone();
//!         let request = request.clone();
//!         async move { client.say_hello(request).await }
//!     })
//!     .await?;
//! ```

use std::future::Future;

use tonic::Status;
use tracing::{debug, warn};

use super::{RetryConfig, RetryPolicy};

/// 重试调度器
///
/// 调度器本身只持有只读的策略，重试次数和退避计时都保存在单次调用内部，
/// 并发调用之间不共享任何可变状态。
#[derive(Clone, Debug, Default)]
pub struct RetryDispatch {
    policy: RetryPolicy,
}

impl RetryDispatch {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 一元调用
    ///
    /// `call` 每次尝试都会被调用一次，需要自行重建请求。
    pub async fn unary<T, F, Fut>(&self, method: &str, mut call: F) -> Result<T, Status>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Status>>,
    {
        match self.policy.select(method) {
            Some(config) => execute(method, config, call).await,
            None => call().await,
        }
    }

    /// 流式调用
    ///
    /// 只重试流的建立：`open` 返回流句柄之后，句柄原样交给调用方，之后流上的
    /// 错误不会触发重新建立，已经送达的消息不会被重放。
    pub async fn streaming<S, F, Fut>(&self, method: &str, mut open: F) -> Result<S, Status>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<S, Status>>,
    {
        match self.policy.select(method) {
            Some(config) => execute(method, config, open).await,
            None => open().await,
        }
    }
}

async fn execute<T, F, Fut>(method: &str, config: &RetryConfig, mut call: F) -> Result<T, Status>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Status>>,
{
    let mut attempt: u32 = 1;
    loop {
        let status = match call().await {
            Ok(value) => return Ok(value),
            Err(status) => status,
        };

        if !config.should_retry(attempt, &status) {
            if attempt > 1 {
                warn!(
                    method,
                    attempts = attempt,
                    code = ?status.code(),
                    "retries exhausted"
                );
            }
            return Err(status);
        }

        let delay = config.backoff_duration(attempt);
        debug!(
            method,
            attempt,
            code = ?status.code(),
            delay_ms = delay.as_millis() as u64,
            "retrying call"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
