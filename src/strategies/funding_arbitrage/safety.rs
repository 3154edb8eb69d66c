//! 安全监控与紧急处置模块
//!
//! 进程级看门狗，独立于任何单个周期运行：
//! 1. 追踪连续失败次数
//! 2. 监控单边敞口
//! 3. 处理系统信号（ctrl-c）
//! 4. 执行紧急清仓
//!
//! 状态转移全部是单向标志或简单计数器：失败计数成功即清零；
//! 紧急标志一旦置位便是进程终态，不可自动复位。

use crate::core::constants::{
    SAFETY_LOOP_INTERVAL_SECONDS, SIZE_IMBALANCE_TOLERANCE,
};
use crate::core::exchange::Exchange;
use crate::core::retry_policy::retry_async;
use crate::core::types::PositionInfo;
use futures_util::future::join_all;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// 紧急处置触发原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmergencyReason {
    UserInterrupt,
    ConsecutiveFailures,
    UnhedgedExposure,
    MarginCall,
    ConnectionLost,
    SystemError,
    ManualTrigger,
}

impl std::fmt::Display for EmergencyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            EmergencyReason::UserInterrupt => "user_interrupt",
            EmergencyReason::ConsecutiveFailures => "consecutive_failures",
            EmergencyReason::UnhedgedExposure => "unhedged_exposure",
            EmergencyReason::MarginCall => "margin_call",
            EmergencyReason::ConnectionLost => "connection_lost",
            EmergencyReason::SystemError => "system_error",
            EmergencyReason::ManualTrigger => "manual_trigger",
        };
        write!(f, "{}", s)
    }
}

/// 紧急处置的结构化记录
#[derive(Debug, Clone)]
pub struct EmergencyAction {
    pub reason: EmergencyReason,
    pub timestamp_ms: i64,
    pub positions_closed: Vec<String>,
    pub orders_cancelled: u32,
    pub success: bool,
    pub details: String,
}

/// 紧急事件回调
pub type EmergencyCallback = Arc<dyn Fn(&EmergencyAction) + Send + Sync>;

/// 安全监控器
pub struct SafetyMonitor {
    extended: Arc<dyn Exchange>,
    tradexyz: Arc<dyn Exchange>,
    max_failures: u32,
    check_interval: Duration,

    // 状态（单向标志/简单计数器，无需多字段锁）
    consecutive_failures: AtomicU32,
    emergency_triggered: AtomicBool,
    shutdown_requested: AtomicBool,
    emergency_reason: std::sync::Mutex<Option<EmergencyReason>>,
    monitored_tokens: RwLock<HashSet<String>>,

    on_emergency: std::sync::Mutex<Option<EmergencyCallback>>,
}

impl SafetyMonitor {
    pub fn new(
        extended: Arc<dyn Exchange>,
        tradexyz: Arc<dyn Exchange>,
        max_consecutive_failures: u32,
    ) -> Self {
        Self {
            extended,
            tradexyz,
            max_failures: max_consecutive_failures,
            check_interval: Duration::from_secs(SAFETY_LOOP_INTERVAL_SECONDS),
            consecutive_failures: AtomicU32::new(0),
            emergency_triggered: AtomicBool::new(false),
            shutdown_requested: AtomicBool::new(false),
            emergency_reason: std::sync::Mutex::new(None),
            monitored_tokens: RwLock::new(HashSet::new()),
            on_emergency: std::sync::Mutex::new(None),
        }
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    // === 状态访问 ===

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    pub fn emergency_triggered(&self) -> bool {
        self.emergency_triggered.load(Ordering::SeqCst)
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    pub fn emergency_reason(&self) -> Option<EmergencyReason> {
        *self.emergency_reason.lock().expect("Lock poisoned")
    }

    /// 注册紧急事件回调
    pub fn set_emergency_callback(&self, callback: EmergencyCallback) {
        *self.on_emergency.lock().expect("Lock poisoned") = Some(callback);
    }

    // === 失败计数 ===

    /// 记录一次周期失败
    ///
    /// 达到连续失败上限视为系统性故障而非运气差，
    /// 永久置位紧急标志。返回是否触发紧急状态。
    pub fn record_failure(&self) -> bool {
        let count = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;

        log::warn!("⚠️ 记录周期失败 ({}/{})", count, self.max_failures);

        if count >= self.max_failures {
            log::error!("❌ 达到连续失败上限，触发紧急状态");
            self.trigger_emergency(EmergencyReason::ConsecutiveFailures);
            return true;
        }

        false
    }

    /// 记录一次周期成功（清零失败计数）
    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    /// 置位紧急标志（单向，不执行清仓）
    pub fn trigger_emergency(&self, reason: EmergencyReason) {
        self.emergency_triggered.store(true, Ordering::SeqCst);
        let mut guard = self.emergency_reason.lock().expect("Lock poisoned");
        if guard.is_none() {
            *guard = Some(reason);
        }
    }

    /// 请求优雅停机（完成当前周期后停止）
    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
    }

    // === 监控币种 ===

    pub async fn add_monitored_token(&self, token: &str) {
        self.monitored_tokens.write().await.insert(token.to_string());
    }

    pub async fn remove_monitored_token(&self, token: &str) {
        self.monitored_tokens.write().await.remove(token);
    }

    pub async fn monitored_tokens(&self) -> HashSet<String> {
        self.monitored_tokens.read().await.clone()
    }

    // === 敞口检查 ===

    /// 检查双边敞口是否平衡
    ///
    /// 对每个受监控币种要求：双边同时有仓（只有一边=单边敞口，失败）、
    /// 方向相反（同向=双倍敞口，失败）、数量差在容差内（超出仅告警）。
    pub async fn check_exposure(&self) -> bool {
        let ext_positions = match self.fetch_positions(&self.extended).await {
            Ok(p) => p,
            Err(e) => {
                log::error!("❌ 获取Extended持仓失败: {}", e);
                return false;
            }
        };
        let xyz_positions = match self.fetch_positions(&self.tradexyz).await {
            Ok(p) => p,
            Err(e) => {
                log::error!("❌ 获取TradeXYZ持仓失败: {}", e);
                return false;
            }
        };

        let tokens = self.monitored_tokens.read().await;

        for token in tokens.iter() {
            let ext_pos = Self::find_position(&ext_positions, token);
            let xyz_pos = Self::find_position(&xyz_positions, token);

            match (ext_pos, xyz_pos) {
                (None, None) => continue,
                (Some(_), None) | (None, Some(_)) => {
                    log::error!(
                        "❌ 检测到单边敞口: {} (Extended={}, TradeXYZ={})",
                        token,
                        ext_pos.is_some(),
                        xyz_pos.is_some()
                    );
                    return false;
                }
                (Some(ext), Some(xyz)) => {
                    if ext.side == xyz.side {
                        log::error!("❌ 检测到同向敞口: {} 双边均为{}", token, ext.side);
                        return false;
                    }

                    let size_diff = (ext.size - xyz.size).abs();
                    let max_size = ext.size.max(xyz.size);
                    if max_size > 0.0 && size_diff / max_size > SIZE_IMBALANCE_TOLERANCE {
                        // 数量不平衡只告警，不触发紧急
                        log::warn!(
                            "⚠️ 仓位数量不平衡: {} Extended={} TradeXYZ={}",
                            token,
                            ext.size,
                            xyz.size
                        );
                    }
                }
            }
        }

        true
    }

    /// 执行紧急处置
    ///
    /// 1. 撤掉双边全部挂单  2. 强平双边全部仓位  3. 记录并回调
    /// 每个交易所独立、尽力而为：一边失败不阻止另一边的尝试。
    pub async fn execute_emergency(&self, reason: EmergencyReason) -> EmergencyAction {
        self.trigger_emergency(reason);

        log::error!("🚨 启动紧急清仓: {}", reason);

        let timestamp_ms = chrono::Utc::now().timestamp_millis();

        let mut positions_closed: Vec<String> = Vec::new();
        let mut orders_cancelled: u32 = 0;
        let mut success = true;
        let mut details: Vec<String> = Vec::new();

        // 撤单
        match self.extended.cancel_all_orders(None).await {
            Ok(n) => {
                orders_cancelled += n;
                details.push(format!("Extended: 取消{}个挂单", n));
            }
            Err(e) => {
                log::error!("❌ 取消Extended挂单失败: {}", e);
                success = false;
                details.push(format!("Extended撤单失败: {}", e));
            }
        }
        match self.tradexyz.cancel_all_orders(None).await {
            Ok(n) => {
                orders_cancelled += n;
                details.push(format!("TradeXYZ: 取消{}个挂单", n));
            }
            Err(e) => {
                log::error!("❌ 取消TradeXYZ挂单失败: {}", e);
                success = false;
                details.push(format!("TradeXYZ撤单失败: {}", e));
            }
        }

        // 清仓
        let (ext_closed, ext_ok) = self
            .close_all_on_venue(&self.extended, "Extended")
            .await;
        positions_closed.extend(ext_closed);
        success &= ext_ok;

        let (xyz_closed, xyz_ok) = self
            .close_all_on_venue(&self.tradexyz, "TradeXYZ")
            .await;
        positions_closed.extend(xyz_closed);
        success &= xyz_ok;

        let action = EmergencyAction {
            reason,
            timestamp_ms,
            positions_closed,
            orders_cancelled,
            success,
            details: details.join("; "),
        };

        // 通知回调
        let callback = self.on_emergency.lock().expect("Lock poisoned").clone();
        if let Some(cb) = callback {
            cb(&action);
        }

        log::error!(
            "🚨 紧急清仓完成: 平仓{}个, 撤单{}个, success={}",
            action.positions_closed.len(),
            action.orders_cancelled,
            action.success
        );

        action
    }

    /// 验证双边已无任何持仓
    pub async fn verify_all_closed(&self) -> bool {
        let ext = match self.extended.get_positions(None).await {
            Ok(p) => p,
            Err(e) => {
                log::error!("❌ 持仓验证失败: {}", e);
                return false;
            }
        };
        let xyz = match self.tradexyz.get_positions(None).await {
            Ok(p) => p,
            Err(e) => {
                log::error!("❌ 持仓验证失败: {}", e);
                return false;
            }
        };

        if !ext.is_empty() {
            log::warn!("⚠️ Extended仍有{}个持仓", ext.len());
            return false;
        }
        if !xyz.is_empty() {
            log::warn!("⚠️ TradeXYZ仍有{}个持仓", xyz.len());
            return false;
        }

        true
    }

    /// 状态快照
    pub async fn get_status(&self) -> serde_json::Value {
        let tokens: Vec<String> = self.monitored_tokens.read().await.iter().cloned().collect();
        serde_json::json!({
            "consecutive_failures": self.consecutive_failures(),
            "emergency_triggered": self.emergency_triggered(),
            "shutdown_requested": self.shutdown_requested(),
            "emergency_reason": self.emergency_reason().map(|r| r.to_string()),
            "monitored_tokens": tokens,
        })
    }

    /// 安装ctrl-c信号处理
    ///
    /// 第一次信号请求优雅停机（跑完当前周期）；若紧急处置已在进行中
    /// 再次收到信号则立即退出进程。
    pub fn install_signal_handler(self: &Arc<Self>) {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                if tokio::signal::ctrl_c().await.is_err() {
                    break;
                }

                if monitor.emergency_triggered() && monitor.shutdown_requested() {
                    log::warn!("⚠️ 紧急处置进行中再次收到信号，立即退出");
                    std::process::exit(1);
                }

                log::warn!("⚠️ 收到终止信号，开始优雅停机");
                monitor.request_shutdown();
            }
        });
    }

    /// 独立安全检查循环
    ///
    /// 与周期执行并发运行，贯穿进程生命周期。周期性检查敞口平衡和
    /// 交易所连接，任何失败升级为紧急清仓。
    pub async fn run_safety_loop(self: Arc<Self>) {
        log::info!("🛡️ 安全监控循环启动 (间隔{}秒)", self.check_interval.as_secs());

        while !self.shutdown_requested() && !self.emergency_triggered() {
            // 敞口平衡检查
            if !self.monitored_tokens.read().await.is_empty() {
                let balanced = self.check_exposure().await;
                if !balanced {
                    self.execute_emergency(EmergencyReason::UnhedgedExposure).await;
                    break;
                }
            }

            // 连接检查
            if !self.extended.is_connected() {
                log::error!("❌ Extended连接丢失");
                self.execute_emergency(EmergencyReason::ConnectionLost).await;
                break;
            }
            if !self.tradexyz.is_connected() {
                log::error!("❌ TradeXYZ连接丢失");
                self.execute_emergency(EmergencyReason::ConnectionLost).await;
                break;
            }

            tokio::time::sleep(self.check_interval).await;
        }

        log::info!("🛡️ 安全监控循环结束");
    }

    // === 内部辅助 ===

    /// 带重试地拉取持仓（幂等读操作）
    async fn fetch_positions(
        &self,
        exchange: &Arc<dyn Exchange>,
    ) -> crate::core::types::Result<Vec<PositionInfo>> {
        retry_async(|| async { exchange.get_positions(None).await }).await
    }

    /// 按币种在持仓列表中查找（符号形如 "BTC-USD" 或 "BTC"）
    fn find_position<'a>(positions: &'a [PositionInfo], token: &str) -> Option<&'a PositionInfo> {
        positions.iter().find(|p| {
            p.symbol == token || p.symbol.split('-').next() == Some(token)
        })
    }

    /// 强平单个交易所的全部仓位
    async fn close_all_on_venue(
        &self,
        exchange: &Arc<dyn Exchange>,
        label: &str,
    ) -> (Vec<String>, bool) {
        let positions = match exchange.get_positions(None).await {
            Ok(p) => p,
            Err(e) => {
                log::error!("❌ 获取{}持仓失败: {}", label, e);
                return (Vec::new(), false);
            }
        };

        let close_futures = positions.iter().map(|pos| {
            let symbol = pos.symbol.clone();
            async move {
                match exchange.close_position(&symbol, None).await {
                    Ok(trade) if trade.success => Ok(symbol),
                    Ok(trade) => Err((
                        symbol,
                        trade
                            .error_message
                            .unwrap_or_else(|| "平仓被拒".to_string()),
                    )),
                    Err(e) => Err((symbol, e.to_string())),
                }
            }
        });

        let mut closed = Vec::new();
        let mut all_ok = true;

        for result in join_all(close_futures).await {
            match result {
                Ok(symbol) => closed.push(format!("{}:{}", label, symbol)),
                Err((symbol, e)) => {
                    log::error!("❌ 平{}仓位{}失败: {}", label, symbol, e);
                    all_ok = false;
                }
            }
        }

        (closed, all_ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::PositionSide;
    use crate::exchanges::mock::MockExchange;

    fn monitor(ext: Arc<MockExchange>, xyz: Arc<MockExchange>) -> SafetyMonitor {
        SafetyMonitor::new(ext, xyz, 3)
    }

    fn default_monitor() -> SafetyMonitor {
        monitor(MockExchange::extended(), MockExchange::tradexyz())
    }

    #[test]
    fn test_initial_state() {
        let safety = default_monitor();
        assert_eq!(safety.consecutive_failures(), 0);
        assert!(!safety.emergency_triggered());
        assert!(!safety.shutdown_requested());
    }

    #[test]
    fn test_failure_counter_and_ceiling() {
        let safety = default_monitor();

        assert!(!safety.record_failure());
        assert_eq!(safety.consecutive_failures(), 1);
        assert!(!safety.record_failure());
        assert_eq!(safety.consecutive_failures(), 2);

        // 第三次触发紧急
        assert!(safety.record_failure());
        assert!(safety.emergency_triggered());
        assert_eq!(
            safety.emergency_reason(),
            Some(EmergencyReason::ConsecutiveFailures)
        );
    }

    #[test]
    fn test_success_resets_counter_without_emergency() {
        let safety = default_monitor();

        safety.record_failure();
        safety.record_failure();
        safety.record_success();
        assert_eq!(safety.consecutive_failures(), 0);

        safety.record_failure();
        safety.record_failure();
        assert!(!safety.emergency_triggered());
    }

    #[test]
    fn test_emergency_flag_is_one_way() {
        let safety = default_monitor();
        safety.trigger_emergency(EmergencyReason::ManualTrigger);
        assert!(safety.emergency_triggered());

        // 成功不会复位紧急标志
        safety.record_success();
        assert!(safety.emergency_triggered());
        // 首个原因保留
        safety.trigger_emergency(EmergencyReason::UnhedgedExposure);
        assert_eq!(safety.emergency_reason(), Some(EmergencyReason::ManualTrigger));
    }

    #[tokio::test]
    async fn test_monitored_token_tracking() {
        let safety = default_monitor();
        safety.add_monitored_token("BTC").await;
        safety.add_monitored_token("ETH").await;
        safety.remove_monitored_token("BTC").await;

        let tokens = safety.monitored_tokens().await;
        assert!(!tokens.contains("BTC"));
        assert!(tokens.contains("ETH"));
    }

    #[tokio::test]
    async fn test_exposure_balanced_positions_pass() {
        let ext = MockExchange::extended();
        let xyz = MockExchange::tradexyz();
        ext.seed_position("BTC-USD", PositionSide::Long, 0.1, 50_000.0, 10);
        xyz.seed_position("BTC", PositionSide::Short, 0.1, 50_000.0, 10);

        let safety = monitor(ext, xyz);
        safety.add_monitored_token("BTC").await;

        assert!(safety.check_exposure().await);
    }

    #[tokio::test]
    async fn test_exposure_one_sided_fails() {
        let ext = MockExchange::extended();
        let xyz = MockExchange::tradexyz();
        ext.seed_position("BTC-USD", PositionSide::Long, 0.1, 50_000.0, 10);

        let safety = monitor(ext, xyz);
        safety.add_monitored_token("BTC").await;

        assert!(!safety.check_exposure().await);
    }

    #[tokio::test]
    async fn test_exposure_same_side_fails() {
        let ext = MockExchange::extended();
        let xyz = MockExchange::tradexyz();
        ext.seed_position("BTC-USD", PositionSide::Long, 0.1, 50_000.0, 10);
        xyz.seed_position("BTC", PositionSide::Long, 0.1, 50_000.0, 10);

        let safety = monitor(ext, xyz);
        safety.add_monitored_token("BTC").await;

        assert!(!safety.check_exposure().await);
    }

    #[tokio::test]
    async fn test_exposure_size_imbalance_warns_but_passes() {
        let ext = MockExchange::extended();
        let xyz = MockExchange::tradexyz();
        // 5%不平衡，超过1%容差，但只告警
        ext.seed_position("BTC-USD", PositionSide::Long, 0.105, 50_000.0, 10);
        xyz.seed_position("BTC", PositionSide::Short, 0.1, 50_000.0, 10);

        let safety = monitor(ext, xyz);
        safety.add_monitored_token("BTC").await;

        assert!(safety.check_exposure().await);
    }

    #[tokio::test]
    async fn test_exposure_no_monitored_tokens_passes() {
        let safety = default_monitor();
        assert!(safety.check_exposure().await);
    }

    #[tokio::test]
    async fn test_execute_emergency_sweeps_both_venues() {
        let ext = MockExchange::extended();
        let xyz = MockExchange::tradexyz();
        ext.seed_position("BTC-USD", PositionSide::Long, 0.1, 50_000.0, 10);
        xyz.seed_position("BTC", PositionSide::Short, 0.1, 50_000.0, 10);

        let safety = monitor(ext.clone(), xyz.clone());
        let action = safety.execute_emergency(EmergencyReason::ManualTrigger).await;

        assert!(action.success);
        assert_eq!(action.positions_closed.len(), 2);
        assert!(safety.emergency_triggered());
        assert!(safety.verify_all_closed().await);
    }

    #[tokio::test]
    async fn test_emergency_one_venue_failing_does_not_block_other() {
        let ext = MockExchange::extended();
        let xyz = MockExchange::tradexyz();
        ext.seed_position("BTC-USD", PositionSide::Long, 0.1, 50_000.0, 10);
        xyz.seed_position("BTC", PositionSide::Short, 0.1, 50_000.0, 10);
        ext.fail_close_position("venue down");

        let safety = monitor(ext.clone(), xyz.clone());
        let action = safety.execute_emergency(EmergencyReason::SystemError).await;

        assert!(!action.success);
        // TradeXYZ侧仍然完成了清仓
        assert!(action
            .positions_closed
            .iter()
            .any(|p| p.starts_with("TradeXYZ")));
    }

    #[tokio::test]
    async fn test_emergency_callback_invoked() {
        use std::sync::atomic::AtomicBool;

        let safety = default_monitor();
        let invoked = Arc::new(AtomicBool::new(false));
        let invoked_clone = Arc::clone(&invoked);

        safety.set_emergency_callback(Arc::new(move |action: &EmergencyAction| {
            assert_eq!(action.reason, EmergencyReason::ManualTrigger);
            invoked_clone.store(true, Ordering::SeqCst);
        }));

        safety.execute_emergency(EmergencyReason::ManualTrigger).await;
        assert!(invoked.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_safety_loop_escalates_unhedged_exposure() {
        let ext = MockExchange::extended();
        let xyz = MockExchange::tradexyz();
        // 只有一边有仓位
        ext.seed_position("BTC-USD", PositionSide::Long, 0.1, 50_000.0, 10);

        let safety = Arc::new(
            monitor(ext, xyz).with_check_interval(Duration::from_millis(10)),
        );
        safety.add_monitored_token("BTC").await;

        let handle = tokio::spawn(Arc::clone(&safety).run_safety_loop());
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("安全循环应自行退出")
            .unwrap();

        assert!(safety.emergency_triggered());
        assert_eq!(
            safety.emergency_reason(),
            Some(EmergencyReason::UnhedgedExposure)
        );
    }

    #[tokio::test]
    async fn test_safety_loop_exits_on_shutdown() {
        let safety = Arc::new(
            default_monitor().with_check_interval(Duration::from_millis(10)),
        );
        safety.request_shutdown();

        let handle = tokio::spawn(Arc::clone(&safety).run_safety_loop());
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("停机后安全循环应立即退出")
            .unwrap();

        assert!(!safety.emergency_triggered());
    }

    #[tokio::test]
    async fn test_get_status_snapshot() {
        let safety = default_monitor();
        safety.record_failure();
        safety.add_monitored_token("BTC").await;

        let status = safety.get_status().await;
        assert_eq!(status["consecutive_failures"], 1);
        assert_eq!(status["emergency_triggered"], false);
        assert!(status["monitored_tokens"]
            .as_array()
            .unwrap()
            .iter()
            .any(|t| t == "BTC"));
    }
}
