//! 重试策略模块
//!
//! - [`RetryPolicy`]：按方法名选择重试配置的有序谓词列表，首个匹配生效
//! - [`RetryDispatch`]：包裹一元调用和流式调用，按选中的配置执行重试
//! - [`Backoff`]：退避策略，提供指数退避和固定延迟两种实现

pub mod dispatch;
pub mod exponential;
pub mod fixed;
pub mod policy;

pub use dispatch::RetryDispatch;
pub use exponential::ExponentialBackoff;
pub use fixed::FixedBackoff;
pub use policy::{MethodMatcher, RetryPolicy, RetryPredicate};

use std::sync::Arc;
use std::time::Duration;
use tonic::{Code, Status};

/// 默认的指数退避基准延迟
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);

/// 默认可重试的状态码
pub const DEFAULT_RETRYABLE_CODES: [Code; 2] = [Code::Unavailable, Code::ResourceExhausted];

/// 退避策略 trait
///
/// `attempt` 是即将发起的重试序号，从 1 开始。
pub trait Backoff: Send + Sync + std::fmt::Debug {
    fn delay(&self, attempt: u32) -> Duration;
}

/// 单个谓词对应的重试配置
///
/// `max_attempts` 是总调用次数（含首次调用），0 和 1 都表示只调用一次。
#[derive(Clone, Debug)]
pub struct RetryConfig {
    max_attempts: u32,
    backoff: Arc<dyn Backoff>,
    retryable_codes: Vec<Code>,
}

impl RetryConfig {
    /// 指数退避（基准 100ms），重试 `Unavailable` 和 `ResourceExhausted`
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Arc::new(ExponentialBackoff::new(DEFAULT_BASE_DELAY)),
            retryable_codes: DEFAULT_RETRYABLE_CODES.to_vec(),
        }
    }

    /// 不重试
    pub fn disabled() -> Self {
        Self::new(1)
    }

    pub fn with_backoff(mut self, backoff: impl Backoff + 'static) -> Self {
        self.backoff = Arc::new(backoff);
        self
    }

    pub fn with_codes(mut self, codes: impl IntoIterator<Item = Code>) -> Self {
        self.retryable_codes = codes.into_iter().collect();
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn retryable_codes(&self) -> &[Code] {
        &self.retryable_codes
    }

    pub fn is_retryable(&self, code: Code) -> bool {
        self.retryable_codes.contains(&code)
    }

    /// 第 `attempt` 次调用失败后是否还能再试
    pub fn should_retry(&self, attempt: u32, status: &Status) -> bool {
        attempt < self.max_attempts && self.is_retryable(status.code())
    }

    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::disabled()
    }
}
