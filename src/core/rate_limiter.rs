//! 令牌桶限流器
//! 每个交易所一个实例，所有REST调用共享

use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// 限流器内部状态
struct BucketState {
    tokens: f64,
    last_update: Instant,
}

/// 令牌桶限流器（按分钟配置请求数，支持突发容量）
///
/// acquire会挂起调用方直到获得令牌，但绝不丢弃或重排请求。
pub struct RateLimiter {
    rate_per_second: f64,
    burst_size: f64,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32, burst_size: Option<u32>) -> Self {
        let rate_per_second = requests_per_minute as f64 / 60.0;
        let burst = burst_size
            .map(|b| b as f64)
            .unwrap_or_else(|| rate_per_second.max(1.0).floor());

        Self {
            rate_per_second,
            burst_size: burst,
            state: Mutex::new(BucketState {
                tokens: burst,
                last_update: Instant::now(),
            }),
        }
    }

    /// 等待直到可以发送请求，返回等待时长（秒）
    pub async fn acquire(&self) -> f64 {
        let mut state = self.state.lock().await;

        let now = Instant::now();
        let elapsed = now.duration_since(state.last_update).as_secs_f64();

        // 按流速补充令牌
        state.tokens = (state.tokens + elapsed * self.rate_per_second).min(self.burst_size);
        state.last_update = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            return 0.0;
        }

        let wait_time = (1.0 - state.tokens) / self.rate_per_second;
        tokio::time::sleep(Duration::from_secs_f64(wait_time)).await;

        state.tokens = 0.0;
        state.last_update = Instant::now();

        wait_time
    }

    /// 当前可用令牌数
    pub async fn available_tokens(&self) -> f64 {
        let state = self.state.lock().await;
        let elapsed = state.last_update.elapsed().as_secs_f64();
        (state.tokens + elapsed * self.rate_per_second).min(self.burst_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_burst_then_throttle() {
        let limiter = RateLimiter::new(600, Some(3));

        // 突发容量内不等待
        assert_eq!(limiter.acquire().await, 0.0);
        assert_eq!(limiter.acquire().await, 0.0);
        assert_eq!(limiter.acquire().await, 0.0);

        // 桶空后需要等待
        let waited = limiter.acquire().await;
        assert!(waited > 0.0);
    }

    #[tokio::test]
    async fn test_tokens_refill_over_time() {
        let limiter = RateLimiter::new(6000, Some(2));
        limiter.acquire().await;
        limiter.acquire().await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        let available = limiter.available_tokens().await;
        assert!(available > 0.0);
    }
}
