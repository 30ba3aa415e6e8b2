use std::sync::Arc;

use super::RetryConfig;

/// 方法名匹配函数，参数为完整方法路径 `/package.Service/Method`
pub type MethodMatcher = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// 重试谓词：方法匹配函数 + 重试配置
#[derive(Clone)]
pub struct RetryPredicate {
    matcher: MethodMatcher,
    config: RetryConfig,
}

impl RetryPredicate {
    pub fn new<F>(matcher: F, config: RetryConfig) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self {
            matcher: Arc::new(matcher),
            config,
        }
    }

    /// 精确匹配单个方法
    pub fn method(method: impl Into<String>, config: RetryConfig) -> Self {
        let method = method.into();
        Self::new(move |m| m == method, config)
    }

    /// 匹配某个服务下的全部方法，`service` 形如 `package.Service`
    pub fn service(service: impl Into<String>, config: RetryConfig) -> Self {
        let prefix = format!("/{}/", service.into());
        Self::new(move |m| m.starts_with(&prefix), config)
    }

    /// 匹配全部方法，应放在策略的最后
    pub fn catch_all(config: RetryConfig) -> Self {
        Self::new(|_| true, config)
    }

    pub fn matches(&self, method: &str) -> bool {
        (self.matcher)(method)
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

impl std::fmt::Debug for RetryPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPredicate")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// 重试策略
///
/// 有序的谓词列表，启动时构建一次，之后只读共享。求值按顺序进行，首个匹配的
/// 谓词生效，靠前的谓词会遮蔽后面与之重叠的谓词。没有谓词匹配时不重试。
#[derive(Clone, Debug, Default)]
pub struct RetryPolicy {
    predicates: Arc<[RetryPredicate]>,
}

impl RetryPolicy {
    pub fn new(predicates: Vec<RetryPredicate>) -> Self {
        Self {
            predicates: predicates.into(),
        }
    }

    /// 空策略，所有调用直接透传
    pub fn none() -> Self {
        Self::default()
    }

    /// 单个兜底谓词的策略
    pub fn catch_all(config: RetryConfig) -> Self {
        Self::new(vec![RetryPredicate::catch_all(config)])
    }

    /// 按总调用次数构建默认策略：0 不重试，否则所有方法共用一条兜底规则
    pub fn with_budget(max_retry: u32) -> Self {
        if max_retry == 0 {
            Self::none()
        } else {
            Self::catch_all(RetryConfig::new(max_retry))
        }
    }

    /// 返回首个匹配谓词的配置
    pub fn select(&self, method: &str) -> Option<&RetryConfig> {
        self.predicates
            .iter()
            .find(|predicate| predicate.matches(method))
            .map(RetryPredicate::config)
    }

    pub fn predicates(&self) -> &[RetryPredicate] {
        &self.predicates
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

impl FromIterator<RetryPredicate> for RetryPolicy {
    fn from_iter<I: IntoIterator<Item = RetryPredicate>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
