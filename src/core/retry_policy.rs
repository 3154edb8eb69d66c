use crate::core::error::ExchangeError;
/// 智能重试策略
///
/// 只用于幂等的只读请求（行情、余额、持仓）。下单永远不经过本模块：
/// 盲目重试有重复成交风险，失败的下单由上层带新external_id重新决策。
use std::time::Duration;
use tokio::time::sleep;

/// 重试策略配置
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// 最大尝试次数
    pub max_attempts: u32,
    /// 初始延迟（毫秒）
    pub initial_delay_ms: u64,
    /// 最大延迟（毫秒）
    pub max_delay_ms: u64,
    /// 指数退避因子
    pub backoff_factor: f64,
    /// 是否添加抖动
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 10000,
            backoff_factor: 2.0,
            jitter: true,
        }
    }
}

/// 指数退避重试策略
pub struct ExponentialBackoffRetry {
    config: RetryConfig,
}

impl ExponentialBackoffRetry {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// 判断是否应该重试
    pub fn should_retry(&self, error: &ExchangeError, attempt: u32) -> bool {
        if attempt + 1 >= self.config.max_attempts {
            return false;
        }
        error.is_retryable()
    }

    /// 计算重试延迟
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay =
            self.config.initial_delay_ms as f64 * self.config.backoff_factor.powi(attempt as i32);

        let mut delay_ms = base_delay.min(self.config.max_delay_ms as f64) as u64;

        // 添加抖动以避免雷同重试
        if self.config.jitter && delay_ms > 0 {
            use rand::Rng;
            let jitter = rand::rngs::OsRng.gen_range(0..=delay_ms / 4);
            delay_ms += jitter;
        }

        Duration::from_millis(delay_ms.min(self.config.max_delay_ms))
    }

    /// 执行带重试的操作
    pub async fn execute_with_retry<F, T, Fut>(&self, operation: F) -> Result<T, ExchangeError>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: std::future::Future<Output = Result<T, ExchangeError>> + Send,
        T: Send,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        log::info!("✅ 操作在第{}次尝试后成功", attempt + 1);
                    }
                    return Ok(result);
                }
                Err(error) => {
                    if !self.should_retry(&error, attempt) {
                        if attempt > 0 {
                            log::error!("❌ 操作在{}次尝试后仍失败: {}", attempt + 1, error);
                        }
                        return Err(error);
                    }

                    let delay = self.calculate_delay(attempt);
                    log::warn!(
                        "⚠️ 操作失败，将在{:.2}秒后重试 (尝试 {}/{}): {}",
                        delay.as_secs_f64(),
                        attempt + 1,
                        self.config.max_attempts,
                        error
                    );

                    attempt += 1;

                    sleep(delay).await;
                }
            }
        }
    }
}

/// 重试助手函数（默认策略：3次尝试，1-10秒指数退避）
pub async fn retry_async<F, T, Fut>(operation: F) -> Result<T, ExchangeError>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<T, ExchangeError>> + Send,
    T: Send,
{
    let policy = ExponentialBackoffRetry::new(RetryConfig::default());
    policy.execute_with_retry(operation).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_should_retry_respects_max_attempts() {
        let policy = ExponentialBackoffRetry::new(RetryConfig::default());
        let error = ExchangeError::TimeoutError {
            operation: "get_market_info".to_string(),
            timeout_seconds: 30,
        };

        assert!(policy.should_retry(&error, 0));
        assert!(policy.should_retry(&error, 1));
        assert!(!policy.should_retry(&error, 2));
    }

    #[test]
    fn test_should_not_retry_rejection() {
        let policy = ExponentialBackoffRetry::new(RetryConfig::default());
        let error = ExchangeError::OrderRejected("bad size".to_string());
        assert!(!policy.should_retry(&error, 0));
    }

    #[test]
    fn test_delay_bounded() {
        let policy = ExponentialBackoffRetry::new(RetryConfig::default());
        for attempt in 0..10 {
            let delay = policy.calculate_delay(attempt);
            assert!(delay <= Duration::from_millis(10000));
        }
        assert!(policy.calculate_delay(0) >= Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_retry_eventually_succeeds() {
        let calls = AtomicU32::new(0);
        let policy = ExponentialBackoffRetry::new(RetryConfig {
            initial_delay_ms: 1,
            max_delay_ms: 5,
            jitter: false,
            ..Default::default()
        });

        let result: Result<u32, ExchangeError> = policy
            .execute_with_retry(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ExchangeError::TimeoutError {
                            operation: "probe".to_string(),
                            timeout_seconds: 1,
                        })
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
