//! 时间工具
//! 周期计时与不可预测的随机休眠

use rand::{rngs::OsRng, Rng};
use std::time::{Duration, Instant};

/// 毫秒级Unix时间戳
pub fn current_timestamp_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// 随机时长休眠（秒级区间，毫秒级精度）
///
/// 使用OS熵源而非可复现的伪随机序列，避免外部观察者
/// 从休眠节奏推断机器人行为。返回实际休眠秒数。
pub async fn sleep_random(min_seconds: u64, max_seconds: u64) -> f64 {
    let duration_secs = if min_seconds >= max_seconds {
        min_seconds as f64
    } else {
        let range_ms = (max_seconds - min_seconds) * 1000;
        let offset_ms = OsRng.gen_range(0..range_ms);
        min_seconds as f64 + offset_ms as f64 / 1000.0
    };

    tokio::time::sleep(Duration::from_secs_f64(duration_secs)).await;
    duration_secs
}

/// 带抖动的休眠，打散同步化的轮询节奏
pub async fn sleep_with_jitter(base_seconds: f64, jitter_percent: f64) -> f64 {
    let jitter_range_ms = (base_seconds * jitter_percent * 1000.0) as i64;
    let duration = if jitter_range_ms > 0 {
        let jitter = OsRng.gen_range(-jitter_range_ms..=jitter_range_ms);
        (base_seconds + jitter as f64 / 1000.0).max(0.1)
    } else {
        base_seconds
    };

    tokio::time::sleep(Duration::from_secs_f64(duration)).await;
    duration
}

/// 周期计时器
#[derive(Debug, Clone)]
pub struct CycleTimer {
    start: Option<Instant>,
}

impl CycleTimer {
    pub fn new() -> Self {
        Self { start: None }
    }

    pub fn start(&mut self) {
        self.start = Some(Instant::now());
    }

    /// 启动以来的总耗时（秒），未启动时返回0
    pub fn elapsed_secs(&self) -> f64 {
        self.start.map(|s| s.elapsed().as_secs_f64()).unwrap_or(0.0)
    }

    /// 启动以来的总耗时（毫秒）
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed_secs() * 1000.0
    }
}

impl Default for CycleTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_before_start() {
        let timer = CycleTimer::new();
        assert_eq!(timer.elapsed_secs(), 0.0);
    }

    #[tokio::test]
    async fn test_timer_measures_elapsed() {
        let mut timer = CycleTimer::new();
        timer.start();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(timer.elapsed_ms() >= 20.0);
    }

    #[tokio::test]
    async fn test_sleep_random_bounds() {
        // 区间退化时取下界
        let slept = sleep_random(0, 0).await;
        assert_eq!(slept, 0.0);
    }
}
