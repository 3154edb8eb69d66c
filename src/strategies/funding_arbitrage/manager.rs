//! 交易周期编排模块
//!
//! 一个周期 = IDLE → OPENING → HOLDING → CLOSING → COOLDOWN，
//! ERROR/EMERGENCY为任意阶段可达的吸收态。每一步都有显式的
//! 失败出口：产出失败的CycleResult而不是把错误抛过函数边界。
//!
//! 编排以下组件：
//! - CryptoRandomizer  不可预测的参数与选边
//! - FundingAnalyzer   费率优化建议
//! - PositionSizer     资金管理
//! - RiskValidator     交易前安全检查
//! - AtomicExecutor    双腿原子执行
//! - SafetyMonitor     紧急处置

use super::executor::AtomicExecutor;
use super::funding::{FundingAnalysisResult, FundingAnalyzer};
use super::randomizer::CryptoRandomizer;
use super::result::{CycleResult, CycleResultBuilder};
use super::risk::RiskValidator;
use super::safety::SafetyMonitor;
use super::sizing::PositionSizer;
use crate::core::config::Settings;
use crate::core::constants::{FUNDING_INTERVAL_SECONDS, SAFETY_CHECK_INTERVAL_SECONDS};
use crate::core::exchange::Exchange;
use crate::core::retry_policy::retry_async;
use crate::core::types::{BalanceSnapshot, CycleState, ExchangeName, PositionSide, Result};
use crate::core::ExchangeError;
use crate::utils::timing::CycleTimer;
use crate::utils::webhook::{get_global_notifier, MessageLevel};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 仓位数量的小数位（双边交易所均接受的精度）
const SIZE_PRECISION: u32 = 6;

/// 默认维持保证金率
const MAINTENANCE_MARGIN_RATE: f64 = 0.005;

/// 交易周期管理器
pub struct TradeManager {
    extended: Arc<dyn Exchange>,
    tradexyz: Arc<dyn Exchange>,
    settings: Settings,

    randomizer: CryptoRandomizer,
    analyzer: FundingAnalyzer,
    sizer: PositionSizer,
    validator: RiskValidator,
    executor: AtomicExecutor,
    safety: Arc<SafetyMonitor>,

    running: AtomicBool,
    current_state: std::sync::Mutex<CycleState>,
    hold_check_interval: Duration,
}

impl TradeManager {
    pub fn new(
        extended: Arc<dyn Exchange>,
        tradexyz: Arc<dyn Exchange>,
        settings: Settings,
    ) -> Self {
        let randomizer = CryptoRandomizer::new(
            settings.risk.min_equity_usage,
            settings.risk.max_equity_usage,
            settings.risk.min_leverage,
            settings.risk.max_leverage,
            settings.risk.min_hold_duration_secs,
            settings.risk.max_hold_duration_secs,
            settings.risk.min_cooldown_secs,
            settings.risk.max_cooldown_secs,
        );

        let sizer = PositionSizer::new(
            settings.risk.min_balance_usd,
            settings.risk.max_position_value_usd,
        );

        let validator = RiskValidator::new(
            settings.risk.max_position_value_usd,
            settings.risk.min_balance_usd,
        )
        .with_leverage_bounds(settings.risk.min_leverage, settings.risk.max_leverage);

        let executor = AtomicExecutor::new(
            Arc::clone(&extended),
            Arc::clone(&tradexyz),
            settings.execution.order_timeout_secs,
            settings.execution.parallel_open,
        );

        let safety = Arc::new(SafetyMonitor::new(
            Arc::clone(&extended),
            Arc::clone(&tradexyz),
            settings.risk.max_consecutive_failures,
        ));

        Self {
            extended,
            tradexyz,
            settings,
            randomizer,
            analyzer: FundingAnalyzer::new(),
            sizer,
            validator,
            executor,
            safety,
            running: AtomicBool::new(false),
            current_state: std::sync::Mutex::new(CycleState::Idle),
            hold_check_interval: Duration::from_secs(SAFETY_CHECK_INTERVAL_SECONDS),
        }
    }

    /// 覆盖持仓轮询间隔（默认30秒）
    pub fn with_hold_check_interval(mut self, interval: Duration) -> Self {
        self.hold_check_interval = interval;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn current_state(&self) -> CycleState {
        *self.current_state.lock().expect("Lock poisoned")
    }

    /// 安全监控器句柄（用于信号安装与独立安全循环）
    pub fn safety(&self) -> Arc<SafetyMonitor> {
        Arc::clone(&self.safety)
    }

    /// 启动管理器：连接交易所、装好信号处理与紧急通知
    pub async fn start(&self) -> Result<()> {
        log::info!("🚀 启动交易管理器");

        if !self.settings.simulation.enabled {
            log::warn!("⚠️ LIVE模式已启用，真实资金风险！");

            // 分阶段保护：live初期禁止高杠杆/高权益占用
            if self.settings.risk.max_leverage > 10 {
                return Err(ExchangeError::ConfigError(
                    "live杠杆过高，先用<=10x逐步放大".to_string(),
                ));
            }
            if self.settings.risk.max_equity_usage > 0.50 {
                return Err(ExchangeError::ConfigError(
                    "live权益占用过高，先用<=50%逐步放大".to_string(),
                ));
            }

            log::warn!(
                "LIVE配置: 杠杆 {}-{}x, 权益 {:.0}%-{:.0}%",
                self.settings.risk.min_leverage,
                self.settings.risk.max_leverage,
                self.settings.risk.min_equity_usage * 100.0,
                self.settings.risk.max_equity_usage * 100.0
            );
        }

        // 连接双边交易所，任一失败都不允许开始
        let ext_connected = self.extended.connect().await?;
        let xyz_connected = self.tradexyz.connect().await?;

        if !ext_connected || !xyz_connected {
            return Err(ExchangeError::NotConnected(
                "一侧或双侧交易所连接失败".to_string(),
            ));
        }

        // 紧急事件 → webhook推送
        if let Some(notifier) = get_global_notifier() {
            self.safety.set_emergency_callback(Arc::new(move |action| {
                let notifier = Arc::clone(&notifier);
                let body = format!(
                    "原因: {} | 平仓: {} | 撤单: {} | success: {}",
                    action.reason,
                    action.positions_closed.len(),
                    action.orders_cancelled,
                    action.success
                );
                tokio::spawn(async move {
                    notifier.send_event("紧急清仓", &body, MessageLevel::Critical).await;
                });
            }));
        }

        self.running.store(true, Ordering::SeqCst);
        log::info!("✅ 交易管理器已启动");
        Ok(())
    }

    /// 优雅停止
    pub async fn stop(&self) -> Result<()> {
        log::info!("停止交易管理器...");

        self.running.store(false, Ordering::SeqCst);
        self.safety.request_shutdown();

        if let Err(e) = self.extended.disconnect().await {
            log::warn!("⚠️ Extended断开失败: {}", e);
        }
        if let Err(e) = self.tradexyz.disconnect().await {
            log::warn!("⚠️ TradeXYZ断开失败: {}", e);
        }

        log::info!("交易管理器已停止");
        Ok(())
    }

    /// 执行一个完整的交易周期
    pub async fn run_cycle(&self) -> CycleResult {
        let cycle_id: String = CryptoRandomizer::generate_external_id()[..8].to_string();
        let start_time = chrono::Utc::now();
        let mut timer = CycleTimer::new();
        timer.start();

        log::info!("📈 周期开始: {}", cycle_id);
        self.set_state(CycleState::Idle);

        // 阶段1：生成随机参数
        let params = match self.randomizer.generate_cycle_params(None) {
            Ok(p) => p,
            Err(e) => {
                self.safety.record_failure();
                return CycleResultBuilder::new(&cycle_id, start_time)
                    .with_error(&format!("参数生成失败: {}", e), CycleState::Error)
                    .build(&timer);
            }
        };

        log::info!(
            "🎲 周期参数: token={} equity={:.1}% leverage={}x hold={}s",
            params.token,
            params.equity_usage * 100.0,
            params.leverage,
            params.hold_duration_secs
        );

        // 阶段2：获取余额和行情（幂等读，带退避重试）
        let (ext_balance, xyz_balance) = match self.fetch_balances().await {
            Ok(b) => b,
            Err(e) => {
                self.safety.record_failure();
                return CycleResultBuilder::new(&cycle_id, start_time)
                    .with_params(
                        &params.token,
                        params.equity_usage,
                        params.leverage,
                        params.hold_duration_secs,
                    )
                    .with_error(&format!("获取余额失败: {}", e), CycleState::Error)
                    .build(&timer);
            }
        };

        log::info!(
            "💰 账户余额: Extended ${:.2} / TradeXYZ ${:.2}",
            ext_balance.available,
            xyz_balance.available
        );

        let ext_symbol = self.extended.market_symbol(&params.token);
        let xyz_symbol = self.tradexyz.market_symbol(&params.token);

        let ext_market = match retry_async(|| async {
            self.extended.get_market_info(&ext_symbol).await
        })
        .await
        {
            Ok(m) => m,
            Err(e) => {
                self.safety.record_failure();
                return CycleResultBuilder::new(&cycle_id, start_time)
                    .with_params(
                        &params.token,
                        params.equity_usage,
                        params.leverage,
                        params.hold_duration_secs,
                    )
                    .with_error(&format!("获取Extended行情失败: {}", e), CycleState::Error)
                    .build(&timer);
            }
        };

        let xyz_market = match retry_async(|| async {
            self.tradexyz.get_market_info(&xyz_symbol).await
        })
        .await
        {
            Ok(m) => m,
            Err(e) => {
                self.safety.record_failure();
                return CycleResultBuilder::new(&cycle_id, start_time)
                    .with_params(
                        &params.token,
                        params.equity_usage,
                        params.leverage,
                        params.hold_duration_secs,
                    )
                    .with_error(&format!("获取TradeXYZ行情失败: {}", e), CycleState::Error)
                    .build(&timer);
            }
        };

        // 阶段3：分析资金费率
        let funding_analysis = self.analyzer.analyze(
            ext_market.funding_rate,
            xyz_market.funding_rate,
            &params.token,
            ext_market.next_funding_time,
            xyz_market.next_funding_time,
            0.0,
        );

        log::info!(
            "📊 资金费率: {} Extended={} TradeXYZ={} bias={:?}",
            params.token,
            FundingAnalyzer::format_rate(ext_market.funding_rate),
            FundingAnalyzer::format_rate(xyz_market.funding_rate),
            funding_analysis.bias_strength
        );

        // 阶段4：带费率偏置的概率性选边
        let ((_, extended_side), (_, tradexyz_side)) = self
            .randomizer
            .assign_sides_with_bias(ext_market.funding_rate, xyz_market.funding_rate);

        let funding_favored = funding_analysis.recommended_short_exchange
            == ExchangeName::Extended
            && extended_side == PositionSide::Short;

        log::info!(
            "🎯 选边: Extended={} TradeXYZ={} (顺应费率={})",
            extended_side,
            tradexyz_side,
            funding_favored
        );

        // 阶段5：计算仓位
        let sizing = self.sizer.calculate_size(
            &params.token,
            ext_market.mark_price,
            &ext_balance,
            &xyz_balance,
            params.equity_usage,
            params.leverage,
            ext_market.min_order_size,
            SIZE_PRECISION,
        );

        if !sizing.fits_constraints {
            log::warn!(
                "⚠️ 仓位计算被拒，跳过周期: {}",
                sizing.constraint_notes.join("; ")
            );
            self.safety.record_failure();

            return CycleResultBuilder::new(&cycle_id, start_time)
                .with_params(
                    &params.token,
                    params.equity_usage,
                    params.leverage,
                    params.hold_duration_secs,
                )
                .with_positions(Some(extended_side), Some(tradexyz_side), 0.0, 0.0)
                .with_funding(funding_analysis)
                .with_error(
                    &format!("仓位计算被拒: {}", sizing.constraint_notes.join("; ")),
                    CycleState::Error,
                )
                .build(&timer);
        }

        log::info!(
            "📐 仓位: {} {} (${:.2}, 单腿保证金 ${:.2})",
            sizing.position_size,
            params.token,
            sizing.position_value_usd,
            sizing.margin_required_per_leg
        );

        // 阶段6：风险校验
        let risk_assessment = self.validator.validate_pre_trade(
            &sizing,
            &ext_balance,
            &xyz_balance,
            ext_market.mark_price,
            MAINTENANCE_MARGIN_RATE,
            MAINTENANCE_MARGIN_RATE,
        );

        for warning in &risk_assessment.warnings {
            log::warn!("⚠️ 风险警告: {}", warning);
        }

        if !risk_assessment.can_proceed() {
            let error_msg = risk_assessment.blocking_issues.join("; ");
            log::warn!("⚠️ 风险校验未通过: {}", error_msg);
            self.safety.record_failure();

            return CycleResultBuilder::new(&cycle_id, start_time)
                .with_params(
                    &params.token,
                    params.equity_usage,
                    params.leverage,
                    params.hold_duration_secs,
                )
                .with_positions(Some(extended_side), Some(tradexyz_side), 0.0, 0.0)
                .with_funding(funding_analysis)
                .with_error(&format!("风险校验未通过: {}", error_msg), CycleState::Error)
                .build(&timer);
        }

        // 阶段7：原子开仓
        self.set_state(CycleState::Opening);
        self.safety.add_monitored_token(&params.token).await;

        let open_result = self
            .executor
            .open_positions(
                &params.token,
                sizing.position_size,
                extended_side,
                tradexyz_side,
                params.leverage,
                ext_market.mark_price,
            )
            .await;

        if !open_result.success {
            let error_msg = open_result
                .error_message
                .clone()
                .unwrap_or_else(|| "开仓失败".to_string());

            self.safety.record_failure();
            self.safety.remove_monitored_token(&params.token).await;

            return CycleResultBuilder::new(&cycle_id, start_time)
                .with_params(
                    &params.token,
                    params.equity_usage,
                    params.leverage,
                    params.hold_duration_secs,
                )
                .with_positions(Some(extended_side), Some(tradexyz_side), 0.0, 0.0)
                .with_funding(funding_analysis)
                .with_open_result(open_result)
                .with_error(&error_msg, CycleState::Error)
                .build(&timer);
        }

        // 阶段8：持仓（周期性轮询安全标志，限定紧急检测延迟）
        self.set_state(CycleState::Holding);
        log::info!("⏳ 持仓 {}s: {}", params.hold_duration_secs, cycle_id);

        let actual_hold = self.hold_with_safety_checks(params.hold_duration_secs).await;

        // 持仓期间触发紧急 → 不做常规平仓，安全循环在独立处理清仓
        if self.safety.emergency_triggered() {
            return CycleResultBuilder::new(&cycle_id, start_time)
                .with_params(
                    &params.token,
                    params.equity_usage,
                    params.leverage,
                    actual_hold as u64,
                )
                .with_positions(
                    Some(extended_side),
                    Some(tradexyz_side),
                    sizing.position_size,
                    sizing.position_value_usd,
                )
                .with_funding(funding_analysis)
                .with_open_result(open_result)
                .with_error("持仓期间触发紧急状态", CycleState::Emergency)
                .build(&timer);
        }

        // 阶段9：原子平仓（无论成败都取消监控注册）
        self.set_state(CycleState::Closing);

        let close_result = self.executor.close_positions(&params.token, None, None).await;

        self.safety.remove_monitored_token(&params.token).await;

        if !close_result.success {
            let error_msg = close_result
                .error_message
                .clone()
                .unwrap_or_else(|| "平仓失败".to_string());

            self.safety.record_failure();

            return CycleResultBuilder::new(&cycle_id, start_time)
                .with_params(
                    &params.token,
                    params.equity_usage,
                    params.leverage,
                    actual_hold as u64,
                )
                .with_positions(
                    Some(extended_side),
                    Some(tradexyz_side),
                    sizing.position_size,
                    sizing.position_value_usd,
                )
                .with_funding(funding_analysis)
                .with_open_result(open_result)
                .with_close_result(close_result)
                .with_error(&error_msg, CycleState::Error)
                .build(&timer);
        }

        // 阶段10：估算资金收益（单快照线性近似，非账本对账）
        let funding_earned = Self::calculate_estimated_funding(
            &funding_analysis,
            sizing.position_value_usd,
            actual_hold,
        );

        // 阶段11：记录成功并冻结结果
        self.safety.record_success();
        self.set_state(CycleState::Cooldown);

        log::info!(
            "✅ 周期完成: {} 耗时{:.1}s 估算收益${:.4}",
            cycle_id,
            timer.elapsed_secs(),
            funding_earned
        );

        CycleResultBuilder::new(&cycle_id, start_time)
            .with_params(
                &params.token,
                params.equity_usage,
                params.leverage,
                actual_hold as u64,
            )
            .with_positions(
                Some(extended_side),
                Some(tradexyz_side),
                sizing.position_size,
                sizing.position_value_usd,
            )
            .with_funding(funding_analysis)
            .with_open_result(open_result)
            .with_close_result(close_result)
            .with_success(CycleState::Cooldown, funding_earned)
            .build(&timer)
    }

    /// 连续运行：周期 → 随机冷却 → 周期，直到停机或紧急
    pub async fn run_continuous(&self) {
        while self.is_running() && !self.safety.shutdown_requested() {
            if self.safety.emergency_triggered() {
                log::warn!("⚠️ 紧急状态已触发，停止连续运行");
                break;
            }

            let result = self.run_cycle().await;

            if !result.success {
                log::warn!(
                    "⚠️ 周期失败: {} ({})",
                    result.cycle_id,
                    result.error_message.as_deref().unwrap_or("unknown")
                );
            }

            // 随机冷却，期间持续观察停机/紧急标志
            if self.is_running()
                && !self.safety.shutdown_requested()
                && !self.safety.emergency_triggered()
            {
                self.set_state(CycleState::Cooldown);
                let cooldown = self.randomizer.generate_cooldown();
                log::info!("💤 进入冷却 {}s", cooldown);
                self.interruptible_sleep(cooldown).await;
            }
        }

        log::info!("连续运行结束");
    }

    // === 内部辅助 ===

    fn set_state(&self, state: CycleState) {
        *self.current_state.lock().expect("Lock poisoned") = state;
    }

    /// 获取双边余额快照（模拟模式下注入模拟余额）
    async fn fetch_balances(&self) -> Result<(BalanceSnapshot, BalanceSnapshot)> {
        if self.settings.simulation.enabled {
            let sim = self.settings.simulation.balance_usd;
            return Ok((
                BalanceSnapshot::new(sim, sim, 0.0),
                BalanceSnapshot::new(sim, sim, 0.0),
            ));
        }

        let ext = retry_async(|| async { self.extended.get_balance().await }).await?;
        let xyz = retry_async(|| async { self.tradexyz.get_balance().await }).await?;
        Ok((ext, xyz))
    }

    /// 持仓等待，按固定间隔轮询安全标志而非整段休眠，
    /// 限定长持仓期间的紧急检测延迟。返回实际持仓秒数。
    async fn hold_with_safety_checks(&self, total_duration_secs: u64) -> f64 {
        let check_interval = self.hold_check_interval.as_secs_f64();
        let mut elapsed: f64 = 0.0;

        while elapsed < total_duration_secs as f64 {
            if self.safety.shutdown_requested() || self.safety.emergency_triggered() {
                break;
            }

            let sleep_secs = check_interval.min(total_duration_secs as f64 - elapsed);
            tokio::time::sleep(Duration::from_secs_f64(sleep_secs)).await;
            elapsed += sleep_secs;
        }

        elapsed
    }

    /// 可中断的冷却休眠
    async fn interruptible_sleep(&self, total_secs: u64) {
        let mut remaining = total_secs as f64;
        while remaining > 0.0 {
            if self.safety.shutdown_requested() || self.safety.emergency_triggered() {
                return;
            }
            let chunk = remaining.min(self.hold_check_interval.as_secs_f64());
            tokio::time::sleep(Duration::from_secs_f64(chunk)).await;
            remaining -= chunk;
        }
    }

    /// 估算周期内赚取的资金费
    ///
    /// 按8小时结算周期对持仓时长做线性折算，假设费率保持周期开始时
    /// 的快照值。这是有意为之的近似，不与交易所账本对账。
    fn calculate_estimated_funding(
        funding_analysis: &FundingAnalysisResult,
        position_value: f64,
        hold_duration_secs: f64,
    ) -> f64 {
        let funding_periods = hold_duration_secs / FUNDING_INTERVAL_SECONDS as f64;
        position_value * funding_analysis.rate_difference * funding_periods
    }
}

#[cfg(test)]
mod tests {
    use super::super::safety::EmergencyReason;
    use super::*;
    use crate::exchanges::mock::MockExchange;

    /// 测试用设置：持仓/冷却时长压到0，参数固定便于断言
    fn test_settings() -> Settings {
        let mut settings = Settings::default();
        settings.simulation.enabled = true;
        settings.simulation.balance_usd = 10_000.0;
        settings.risk.min_equity_usage = 0.5;
        settings.risk.max_equity_usage = 0.5;
        settings.risk.min_leverage = 10;
        settings.risk.max_leverage = 10;
        settings.risk.min_hold_duration_secs = 0;
        settings.risk.max_hold_duration_secs = 0;
        settings.risk.min_cooldown_secs = 0;
        settings.risk.max_cooldown_secs = 0;
        settings
    }

    fn make_manager(
        ext: Arc<MockExchange>,
        xyz: Arc<MockExchange>,
        settings: Settings,
    ) -> TradeManager {
        TradeManager::new(ext, xyz, settings)
    }

    #[tokio::test]
    async fn test_full_cycle_end_to_end() {
        let ext = MockExchange::extended().with_mark_price(50_000.0);
        let xyz = MockExchange::tradexyz().with_mark_price(50_000.0);
        ext.set_funding_rate(0.0003);
        xyz.set_funding_rate(-0.0001);

        let manager = make_manager(ext.clone(), xyz.clone(), test_settings());
        manager.start().await.unwrap();

        let result = manager.run_cycle().await;

        assert!(result.success, "error: {:?}", result.error_message);
        assert_eq!(result.state, CycleState::Cooldown);
        // 10000 × 0.5 × 10 / 50000 × 0.95 = 0.95
        assert!((result.position_size - 0.95).abs() < 1e-6);
        assert!((result.position_value - 47_500.0).abs() < 1.0);
        assert!(result.open_result.as_ref().unwrap().success);
        assert!(result.close_result.as_ref().unwrap().success);
        assert!(result.extended_side.is_some());
        // 开平配对后币种不再被监控
        assert!(manager.safety().monitored_tokens().await.is_empty());
        // 成功周期清零失败计数
        assert_eq!(manager.safety().consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_cycle_open_failure_records_failure_and_deregisters() {
        let ext = MockExchange::extended().with_mark_price(50_000.0);
        let xyz = MockExchange::tradexyz().with_mark_price(50_000.0);
        xyz.fail_place_order("insufficient margin");

        let manager = make_manager(ext.clone(), xyz.clone(), test_settings());
        manager.start().await.unwrap();

        let result = manager.run_cycle().await;

        assert!(!result.success);
        assert_eq!(result.state, CycleState::Error);
        assert_eq!(manager.safety().consecutive_failures(), 1);
        assert!(manager.safety().monitored_tokens().await.is_empty());
        // 回滚已执行
        let open = result.open_result.unwrap();
        assert!(open.rollback_performed);
    }

    #[tokio::test]
    async fn test_cycle_sizing_rejection_makes_no_venue_calls() {
        let ext = MockExchange::extended().with_mark_price(50_000.0);
        let xyz = MockExchange::tradexyz().with_mark_price(50_000.0);

        let mut settings = test_settings();
        settings.simulation.balance_usd = 0.0; // 余额为零 → 仓位计算必拒

        let manager = make_manager(ext.clone(), xyz.clone(), settings);
        manager.start().await.unwrap();

        let result = manager.run_cycle().await;

        assert!(!result.success);
        assert_eq!(result.position_size, 0.0);
        // 未发生任何下单
        assert_eq!(ext.place_order_calls(), 0);
        assert_eq!(xyz.place_order_calls(), 0);
    }

    #[tokio::test]
    async fn test_cycle_emergency_during_hold_skips_normal_close() {
        let ext = MockExchange::extended().with_mark_price(50_000.0);
        let xyz = MockExchange::tradexyz().with_mark_price(50_000.0);

        let mut settings = test_settings();
        // 让持仓阶段真实存在，以便紧急标志在hold轮询中被观察到
        settings.risk.min_hold_duration_secs = 60;
        settings.risk.max_hold_duration_secs = 60;

        let manager = Arc::new(
            make_manager(ext.clone(), xyz.clone(), settings)
                .with_hold_check_interval(Duration::from_millis(20)),
        );
        manager.start().await.unwrap();

        let safety = manager.safety();
        let mgr = Arc::clone(&manager);
        let cycle = tokio::spawn(async move { mgr.run_cycle().await });

        // 等开仓完成后触发紧急
        tokio::time::sleep(Duration::from_millis(200)).await;
        safety.trigger_emergency(EmergencyReason::ManualTrigger);

        let result = tokio::time::timeout(Duration::from_secs(10), cycle)
            .await
            .expect("hold轮询应尽快观察到紧急标志")
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.state, CycleState::Emergency);
        // 未做常规平仓
        assert!(result.close_result.is_none());
    }

    #[tokio::test]
    async fn test_continuous_stops_on_emergency() {
        let ext = MockExchange::extended().with_mark_price(50_000.0);
        let xyz = MockExchange::tradexyz().with_mark_price(50_000.0);
        // 每个周期都开仓失败 → 3次后触发紧急 → 连续循环自行停止
        ext.fail_place_order("down");
        xyz.fail_place_order("down");

        let manager = make_manager(ext, xyz, test_settings());
        manager.start().await.unwrap();

        tokio::time::timeout(Duration::from_secs(10), manager.run_continuous())
            .await
            .expect("达到失败上限后连续循环应停止");

        assert!(manager.safety().emergency_triggered());
        assert_eq!(manager.safety().consecutive_failures(), 3);
    }

    #[tokio::test]
    async fn test_continuous_stops_on_shutdown_without_new_cycle() {
        let ext = MockExchange::extended().with_mark_price(50_000.0);
        let xyz = MockExchange::tradexyz().with_mark_price(50_000.0);

        let manager = make_manager(ext.clone(), xyz, test_settings());
        manager.start().await.unwrap();
        manager.safety().request_shutdown();

        tokio::time::timeout(Duration::from_secs(1), manager.run_continuous())
            .await
            .expect("停机标志置位后不应再启动新周期");

        assert_eq!(ext.place_order_calls(), 0);
    }

    #[tokio::test]
    async fn test_live_mode_guard_rails() {
        let ext = MockExchange::extended();
        let xyz = MockExchange::tradexyz();

        let mut settings = test_settings();
        settings.simulation.enabled = false;
        settings.risk.max_leverage = 20; // live下禁止

        let manager = make_manager(ext, xyz, settings);
        assert!(manager.start().await.is_err());
    }

    #[test]
    fn test_estimated_funding_prorated() {
        let analyzer = FundingAnalyzer::new();
        let analysis = analyzer.analyze(0.0004, -0.0001, "BTC", 0, 0, 0.0);

        // rate_difference = 0.0005; 4小时 = 半个结算周期
        let earned =
            TradeManager::calculate_estimated_funding(&analysis, 10_000.0, 14_400.0);
        assert!((earned - 10_000.0 * 0.0005 * 0.5).abs() < 1e-9);

        // 零持仓时长 → 零收益
        let earned = TradeManager::calculate_estimated_funding(&analysis, 10_000.0, 0.0);
        assert_eq!(earned, 0.0);
    }
}
