//! 原子化双腿执行模块
//!
//! 把双交易所的对冲开仓/平仓作为一个单元执行：
//! 1. 两条腿尽量同时成交
//! 2. 单腿失败时自动回滚成功腿
//! 3. 任何路径下都不留下单边敞口
//!
//! 两个外部系统之间没有共享事务边界，这里的"原子性"是
//! 补偿式的：失败路径全部收敛到回滚或紧急清仓。

use super::randomizer::CryptoRandomizer;
use crate::core::exchange::Exchange;
use crate::core::types::{ExchangeName, OrderRequest, PositionSide, TradeResult};
use crate::core::ExchangeError;
use std::sync::Arc;
use std::time::Duration;

/// 原子执行状态机
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Pending,
    OpeningFirst,
    OpeningSecond,
    Complete,
    RollingBack,
    RolledBack,
    Failed,
}

/// 单腿失败分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegErrorKind {
    /// 交易所拒单
    Rejected,
    /// 超时
    Timeout,
    /// 意外异常
    Unexpected,
    /// 未尝试（顺序模式下被第一腿失败短路）
    NotAttempted,
}

/// 单腿错误
#[derive(Debug, Clone)]
pub struct LegError {
    pub kind: LegErrorKind,
    pub message: String,
}

/// 单腿执行结果
#[derive(Debug, Clone)]
pub struct LegResult {
    pub exchange: ExchangeName,
    pub side: Option<PositionSide>,
    pub success: bool,
    pub trade: Option<TradeResult>,
    pub error: Option<LegError>,
}

impl LegResult {
    fn not_attempted(exchange: ExchangeName, side: PositionSide) -> Self {
        Self {
            exchange,
            side: Some(side),
            success: false,
            trade: None,
            error: Some(LegError {
                kind: LegErrorKind::NotAttempted,
                message: "未尝试 - 第一腿失败".to_string(),
            }),
        }
    }
}

/// 原子执行结果
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// 双腿全部成功才为true
    pub success: bool,
    pub state: ExecutionState,

    pub extended_leg: Option<LegResult>,
    pub tradexyz_leg: Option<LegResult>,

    pub execution_time_ms: f64,

    pub error_message: Option<String>,
    /// 是否执行了补偿回滚
    pub rollback_performed: bool,
    /// 回滚本身是否成功（无需回滚时为true）
    pub rollback_success: bool,
}

/// 原子化双腿执行器
pub struct AtomicExecutor {
    extended: Arc<dyn Exchange>,
    tradexyz: Arc<dyn Exchange>,
    max_execution_time: Duration,
    parallel_open: bool,
    current_state: std::sync::Mutex<ExecutionState>,
}

impl AtomicExecutor {
    pub fn new(
        extended: Arc<dyn Exchange>,
        tradexyz: Arc<dyn Exchange>,
        max_execution_time_secs: u64,
        parallel_open: bool,
    ) -> Self {
        Self {
            extended,
            tradexyz,
            max_execution_time: Duration::from_secs(max_execution_time_secs),
            parallel_open,
            current_state: std::sync::Mutex::new(ExecutionState::Pending),
        }
    }

    /// 当前执行状态
    pub fn current_state(&self) -> ExecutionState {
        *self.current_state.lock().expect("Lock poisoned")
    }

    fn set_state(&self, state: ExecutionState) {
        *self.current_state.lock().expect("Lock poisoned") = state;
    }

    /// 原子化开仓
    ///
    /// 杠杆设置失败不直接终止——若真有问题会体现在下单失败上。
    /// 整个尝试受硬超时约束，超时或意外错误走幂等紧急回滚。
    pub async fn open_positions(
        &self,
        token: &str,
        size: f64,
        extended_side: PositionSide,
        tradexyz_side: PositionSide,
        leverage: u32,
        price: f64,
    ) -> ExecutionResult {
        let started = std::time::Instant::now();
        self.set_state(ExecutionState::Pending);

        log::debug!(
            "开始原子开仓: {} size={} Extended={} TradeXYZ={} {}x",
            token,
            size,
            extended_side,
            tradexyz_side,
            leverage
        );

        // 并发设置双边杠杆
        let ext_symbol = self.extended.market_symbol(token);
        let xyz_symbol = self.tradexyz.market_symbol(token);
        let (ext_lev, xyz_lev) = tokio::join!(
            self.extended.set_leverage(&ext_symbol, leverage),
            self.tradexyz.set_leverage(&xyz_symbol, leverage),
        );
        if let Err(e) = ext_lev {
            log::warn!("⚠️ Extended设置杠杆失败: {}", e);
        }
        if let Err(e) = xyz_lev {
            log::warn!("⚠️ TradeXYZ设置杠杆失败: {}", e);
        }

        // 开双腿（整体硬超时）
        let attempt = async {
            if self.parallel_open {
                self.open_parallel(token, size, extended_side, tradexyz_side, price)
                    .await
            } else {
                self.open_sequential(token, size, extended_side, tradexyz_side, price)
                    .await
            }
        };

        let (extended_leg, tradexyz_leg) =
            match tokio::time::timeout(self.max_execution_time, attempt).await {
                Ok(legs) => legs,
                Err(_) => {
                    log::error!("❌ 开仓执行超时，启动紧急回滚");
                    let rollback_success = self.emergency_rollback(token).await;
                    self.set_state(ExecutionState::Failed);

                    return ExecutionResult {
                        success: false,
                        state: ExecutionState::Failed,
                        extended_leg: None,
                        tradexyz_leg: None,
                        execution_time_ms: started.elapsed().as_secs_f64() * 1000.0,
                        error_message: Some("执行超时".to_string()),
                        rollback_performed: true,
                        rollback_success,
                    };
                }
            };

        if extended_leg.success && tradexyz_leg.success {
            self.set_state(ExecutionState::Complete);

            // 优先使用实际成交价记录日志，没有则退回提交价
            let ext_fill = extended_leg
                .trade
                .as_ref()
                .map(|t| t.average_price)
                .filter(|p| *p > 0.0)
                .unwrap_or(price);
            let xyz_fill = tradexyz_leg
                .trade
                .as_ref()
                .map(|t| t.average_price)
                .filter(|p| *p > 0.0)
                .unwrap_or(price);

            log::info!(
                "✅ 双腿开仓成功: Extended {} {} @ {:.2}, TradeXYZ {} {} @ {:.2}",
                extended_side,
                size,
                ext_fill,
                tradexyz_side,
                size,
                xyz_fill
            );

            return ExecutionResult {
                success: true,
                state: ExecutionState::Complete,
                extended_leg: Some(extended_leg),
                tradexyz_leg: Some(tradexyz_leg),
                execution_time_ms: started.elapsed().as_secs_f64() * 1000.0,
                error_message: None,
                rollback_performed: false,
                rollback_success: true,
            };
        }

        // 部分或全部失败
        self.handle_open_failure(extended_leg, tradexyz_leg, token, started)
            .await
    }

    /// 原子化平仓
    ///
    /// 双腿并发、各自独立、尽力而为。平仓是终态操作，没有可回滚的
    /// 目标，但每条腿的结果都如实上报。
    pub async fn close_positions(
        &self,
        token: &str,
        extended_size: Option<f64>,
        tradexyz_size: Option<f64>,
    ) -> ExecutionResult {
        let started = std::time::Instant::now();

        log::debug!("开始原子平仓: {}", token);

        let ext_symbol = self.extended.market_symbol(token);
        let xyz_symbol = self.tradexyz.market_symbol(token);

        let (ext_result, xyz_result) = tokio::join!(
            self.extended.close_position(&ext_symbol, extended_size),
            self.tradexyz.close_position(&xyz_symbol, tradexyz_size),
        );

        let extended_leg = Self::build_close_leg(ExchangeName::Extended, ext_result);
        let tradexyz_leg = Self::build_close_leg(ExchangeName::TradeXyz, xyz_result);

        let both_success = extended_leg.success && tradexyz_leg.success;

        if both_success {
            log::info!("✅ 双腿平仓成功: {}", token);
        } else if extended_leg.success {
            log::warn!(
                "⚠️ Extended已平但TradeXYZ失败: {:?}",
                tradexyz_leg.error.as_ref().map(|e| &e.message)
            );
        } else if tradexyz_leg.success {
            log::warn!(
                "⚠️ TradeXYZ已平但Extended失败: {:?}",
                extended_leg.error.as_ref().map(|e| &e.message)
            );
        } else {
            log::error!("❌ 双腿平仓均失败: {}", token);
        }

        ExecutionResult {
            success: both_success,
            state: if both_success {
                ExecutionState::Complete
            } else {
                ExecutionState::Failed
            },
            extended_leg: Some(extended_leg),
            tradexyz_leg: Some(tradexyz_leg),
            execution_time_ms: started.elapsed().as_secs_f64() * 1000.0,
            error_message: if both_success {
                None
            } else {
                Some("一侧或双侧平仓失败".to_string())
            },
            rollback_performed: false,
            rollback_success: true,
        }
    }

    /// 并行开双腿，最小化成交时间差
    async fn open_parallel(
        &self,
        token: &str,
        size: f64,
        extended_side: PositionSide,
        tradexyz_side: PositionSide,
        price: f64,
    ) -> (LegResult, LegResult) {
        self.set_state(ExecutionState::OpeningFirst);
        tokio::join!(
            self.place_leg(ExchangeName::Extended, token, extended_side, size, price),
            self.place_leg(ExchangeName::TradeXyz, token, tradexyz_side, size, price),
        )
    }

    /// 顺序开腿，第一腿失败立即短路
    async fn open_sequential(
        &self,
        token: &str,
        size: f64,
        extended_side: PositionSide,
        tradexyz_side: PositionSide,
        price: f64,
    ) -> (LegResult, LegResult) {
        self.set_state(ExecutionState::OpeningFirst);
        let extended_leg = self
            .place_leg(ExchangeName::Extended, token, extended_side, size, price)
            .await;

        if !extended_leg.success {
            // 第一腿失败，无需回滚，第二腿不再尝试
            return (
                extended_leg,
                LegResult::not_attempted(ExchangeName::TradeXyz, tradexyz_side),
            );
        }

        self.set_state(ExecutionState::OpeningSecond);
        let tradexyz_leg = self
            .place_leg(ExchangeName::TradeXyz, token, tradexyz_side, size, price)
            .await;

        (extended_leg, tradexyz_leg)
    }

    /// 执行单腿下单，任何错误都收敛为失败的LegResult，绝不向外抛出，
    /// 以免丢失另一条腿的结果
    async fn place_leg(
        &self,
        venue: ExchangeName,
        token: &str,
        side: PositionSide,
        size: f64,
        price: f64,
    ) -> LegResult {
        let exchange = self.venue_handle(venue);
        let symbol = exchange.market_symbol(token);

        // 每次下单尝试都用新的幂等外部ID
        let request = OrderRequest::market(&symbol, side, size)
            .with_price(price)
            .with_external_id(CryptoRandomizer::generate_external_id());

        match exchange.place_order(request).await {
            Ok(trade) if trade.success => LegResult {
                exchange: venue,
                side: Some(side),
                success: true,
                trade: Some(trade),
                error: None,
            },
            Ok(trade) => {
                let message = trade
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "未知拒单原因".to_string());
                LegResult {
                    exchange: venue,
                    side: Some(side),
                    success: false,
                    trade: Some(trade),
                    error: Some(LegError {
                        kind: LegErrorKind::Rejected,
                        message,
                    }),
                }
            }
            Err(e) => LegResult {
                exchange: venue,
                side: Some(side),
                success: false,
                trade: None,
                error: Some(LegError {
                    kind: Self::classify_error(&e),
                    message: e.to_string(),
                }),
            },
        }
    }

    fn classify_error(error: &ExchangeError) -> LegErrorKind {
        match error {
            ExchangeError::TimeoutError { .. } => LegErrorKind::Timeout,
            ExchangeError::NetworkError(e) if e.is_timeout() => LegErrorKind::Timeout,
            ExchangeError::OrderRejected(_) => LegErrorKind::Rejected,
            _ => LegErrorKind::Unexpected,
        }
    }

    /// 处理开仓失败：恰好一腿成功时执行补偿平仓
    ///
    /// 回滚失败是最坏结果（单边敞口），必须与"无需回滚"区分上报。
    async fn handle_open_failure(
        &self,
        extended_leg: LegResult,
        tradexyz_leg: LegResult,
        token: &str,
        started: std::time::Instant,
    ) -> ExecutionResult {
        self.set_state(ExecutionState::RollingBack);

        let mut rollback_performed = false;
        let mut rollback_success = true;

        if extended_leg.success && !tradexyz_leg.success {
            log::warn!("⚠️ 回滚Extended仓位: {}", token);
            rollback_performed = true;
            rollback_success = self.rollback_leg(&self.extended, token).await;
        } else if tradexyz_leg.success && !extended_leg.success {
            log::warn!("⚠️ 回滚TradeXYZ仓位: {}", token);
            rollback_performed = true;
            rollback_success = self.rollback_leg(&self.tradexyz, token).await;
        }

        let state = if !rollback_performed {
            // 双腿都失败，没有敞口
            ExecutionState::Failed
        } else if rollback_success {
            ExecutionState::RolledBack
        } else {
            ExecutionState::Failed
        };
        self.set_state(state);

        let mut errors: Vec<String> = Vec::new();
        if let Some(err) = &extended_leg.error {
            errors.push(format!("Extended: {}", err.message));
        }
        if let Some(err) = &tradexyz_leg.error {
            errors.push(format!("TradeXYZ: {}", err.message));
        }

        ExecutionResult {
            success: false,
            state,
            extended_leg: Some(extended_leg),
            tradexyz_leg: Some(tradexyz_leg),
            execution_time_ms: started.elapsed().as_secs_f64() * 1000.0,
            error_message: Some(errors.join("; ")),
            rollback_performed,
            rollback_success,
        }
    }

    /// 对单腿执行补偿平仓，拒单与异常都算回滚失败
    async fn rollback_leg(&self, exchange: &Arc<dyn Exchange>, token: &str) -> bool {
        let symbol = exchange.market_symbol(token);
        match exchange.close_position(&symbol, None).await {
            Ok(trade) if trade.success => true,
            Ok(trade) => {
                log::error!(
                    "❌ {}回滚被拒: {}",
                    exchange.name(),
                    trade.error_message.as_deref().unwrap_or("unknown")
                );
                false
            }
            Err(e) => {
                log::error!("❌ {}回滚失败: {}", exchange.name(), e);
                false
            }
        }
    }

    /// 幂等紧急回滚：撤掉双边全部挂单，再强平双边可能产生的仓位。
    /// 无论哪条代码路径触发，重复执行都安全。
    async fn emergency_rollback(&self, token: &str) -> bool {
        log::warn!("🚨 执行紧急回滚: {}", token);

        let mut success = true;

        let ext_symbol = self.extended.market_symbol(token);
        let xyz_symbol = self.tradexyz.market_symbol(token);

        if let Err(e) = self.extended.cancel_all_orders(Some(&ext_symbol)).await {
            log::error!("❌ 取消Extended挂单失败: {}", e);
            success = false;
        }
        if let Err(e) = self.tradexyz.cancel_all_orders(Some(&xyz_symbol)).await {
            log::error!("❌ 取消TradeXYZ挂单失败: {}", e);
            success = false;
        }

        match self.extended.close_position(&ext_symbol, None).await {
            Ok(trade) if !trade.success => {
                log::error!(
                    "❌ 平Extended仓位被拒: {}",
                    trade.error_message.as_deref().unwrap_or("unknown")
                );
                success = false;
            }
            Ok(_) | Err(ExchangeError::PositionNotFound { .. }) => {}
            Err(e) => {
                log::error!("❌ 平Extended仓位失败: {}", e);
                success = false;
            }
        }
        match self.tradexyz.close_position(&xyz_symbol, None).await {
            Ok(trade) if !trade.success => {
                log::error!(
                    "❌ 平TradeXYZ仓位被拒: {}",
                    trade.error_message.as_deref().unwrap_or("unknown")
                );
                success = false;
            }
            Ok(_) | Err(ExchangeError::PositionNotFound { .. }) => {}
            Err(e) => {
                log::error!("❌ 平TradeXYZ仓位失败: {}", e);
                success = false;
            }
        }

        success
    }

    fn venue_handle(&self, venue: ExchangeName) -> &Arc<dyn Exchange> {
        match venue {
            ExchangeName::Extended => &self.extended,
            ExchangeName::TradeXyz => &self.tradexyz,
        }
    }

    fn build_close_leg(
        venue: ExchangeName,
        result: Result<TradeResult, ExchangeError>,
    ) -> LegResult {
        match result {
            Ok(trade) if trade.success => LegResult {
                exchange: venue,
                side: None,
                success: true,
                trade: Some(trade),
                error: None,
            },
            Ok(trade) => {
                let message = trade
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "未知拒单原因".to_string());
                LegResult {
                    exchange: venue,
                    side: None,
                    success: false,
                    trade: Some(trade),
                    error: Some(LegError {
                        kind: LegErrorKind::Rejected,
                        message,
                    }),
                }
            }
            Err(e) => LegResult {
                exchange: venue,
                side: None,
                success: false,
                trade: None,
                error: Some(LegError {
                    kind: Self::classify_error(&e),
                    message: e.to_string(),
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchanges::mock::MockExchange;

    fn make_executor(
        ext: Arc<MockExchange>,
        xyz: Arc<MockExchange>,
        parallel: bool,
    ) -> AtomicExecutor {
        AtomicExecutor::new(ext, xyz, 30, parallel)
    }

    #[tokio::test]
    async fn test_open_both_legs_succeed() {
        let ext = MockExchange::extended();
        let xyz = MockExchange::tradexyz();
        let executor = make_executor(ext.clone(), xyz.clone(), true);

        let result = executor
            .open_positions("BTC", 0.1, PositionSide::Long, PositionSide::Short, 10, 50_000.0)
            .await;

        assert!(result.success);
        assert_eq!(result.state, ExecutionState::Complete);
        assert_eq!(executor.current_state(), ExecutionState::Complete);
        assert!(!result.rollback_performed);
        assert!(result.extended_leg.unwrap().success);
        assert!(result.tradexyz_leg.unwrap().success);
        assert_eq!(ext.place_order_calls(), 1);
        assert_eq!(xyz.place_order_calls(), 1);
    }

    #[tokio::test]
    async fn test_open_tradexyz_fails_rolls_back_extended() {
        let ext = MockExchange::extended();
        let xyz = MockExchange::tradexyz();
        xyz.fail_place_order("insufficient margin");

        let executor = make_executor(ext.clone(), xyz.clone(), true);

        let result = executor
            .open_positions("BTC", 0.1, PositionSide::Long, PositionSide::Short, 10, 50_000.0)
            .await;

        assert!(!result.success);
        assert!(result.rollback_performed);
        assert!(result.rollback_success);
        assert_eq!(result.state, ExecutionState::RolledBack);
        // Extended的补偿平仓应恰好调用一次
        assert_eq!(ext.close_position_calls(), 1);
        assert_eq!(xyz.close_position_calls(), 0);

        let xyz_leg = result.tradexyz_leg.unwrap();
        assert_eq!(xyz_leg.error.unwrap().kind, LegErrorKind::Rejected);
    }

    #[tokio::test]
    async fn test_open_extended_fails_rolls_back_tradexyz() {
        let ext = MockExchange::extended();
        let xyz = MockExchange::tradexyz();
        ext.fail_place_order("rejected by venue");

        let executor = make_executor(ext.clone(), xyz.clone(), true);

        let result = executor
            .open_positions("ETH", 1.0, PositionSide::Short, PositionSide::Long, 12, 3_000.0)
            .await;

        assert!(!result.success);
        assert!(result.rollback_performed);
        assert_eq!(xyz.close_position_calls(), 1);
        assert_eq!(ext.close_position_calls(), 0);
    }

    #[tokio::test]
    async fn test_open_both_fail_no_rollback_needed() {
        let ext = MockExchange::extended();
        let xyz = MockExchange::tradexyz();
        ext.fail_place_order("down");
        xyz.fail_place_order("down");

        let executor = make_executor(ext.clone(), xyz.clone(), true);

        let result = executor
            .open_positions("BTC", 0.1, PositionSide::Long, PositionSide::Short, 10, 50_000.0)
            .await;

        assert!(!result.success);
        assert!(!result.rollback_performed);
        assert!(result.rollback_success);
        assert_eq!(result.state, ExecutionState::Failed);
        assert_eq!(ext.close_position_calls(), 0);
        assert_eq!(xyz.close_position_calls(), 0);
    }

    #[tokio::test]
    async fn test_sequential_short_circuits_second_leg() {
        let ext = MockExchange::extended();
        let xyz = MockExchange::tradexyz();
        ext.fail_place_order("rejected");

        let executor = make_executor(ext.clone(), xyz.clone(), false);

        let result = executor
            .open_positions("SOL", 10.0, PositionSide::Long, PositionSide::Short, 10, 150.0)
            .await;

        assert!(!result.success);
        // 第二腿未尝试
        assert_eq!(xyz.place_order_calls(), 0);
        let xyz_leg = result.tradexyz_leg.unwrap();
        assert_eq!(xyz_leg.error.unwrap().kind, LegErrorKind::NotAttempted);
        // 第一腿失败，无需回滚
        assert!(!result.rollback_performed);
    }

    #[tokio::test]
    async fn test_sequential_rollback_contract_matches_parallel() {
        // 顺序模式下第二腿失败，同样必须回滚第一腿
        let ext = MockExchange::extended();
        let xyz = MockExchange::tradexyz();
        xyz.fail_place_order("margin");

        let executor = make_executor(ext.clone(), xyz.clone(), false);

        let result = executor
            .open_positions("BTC", 0.1, PositionSide::Long, PositionSide::Short, 10, 50_000.0)
            .await;

        assert!(!result.success);
        assert!(result.rollback_performed);
        assert_eq!(ext.close_position_calls(), 1);
    }

    #[tokio::test]
    async fn test_leverage_set_on_both_before_open() {
        let ext = MockExchange::extended();
        let xyz = MockExchange::tradexyz();
        let executor = make_executor(ext.clone(), xyz.clone(), true);

        executor
            .open_positions("BTC", 0.1, PositionSide::Long, PositionSide::Short, 15, 50_000.0)
            .await;

        assert_eq!(ext.last_leverage(), Some(15));
        assert_eq!(xyz.last_leverage(), Some(15));
    }

    #[tokio::test]
    async fn test_leverage_failure_is_not_fatal() {
        let ext = MockExchange::extended();
        let xyz = MockExchange::tradexyz();
        ext.fail_set_leverage();

        let executor = make_executor(ext.clone(), xyz.clone(), true);

        let result = executor
            .open_positions("BTC", 0.1, PositionSide::Long, PositionSide::Short, 10, 50_000.0)
            .await;

        // 杠杆设置失败不阻断下单
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_close_both_succeed() {
        let ext = MockExchange::extended();
        let xyz = MockExchange::tradexyz();
        ext.seed_position("BTC-USD", PositionSide::Long, 0.1, 50_000.0, 10);
        xyz.seed_position("BTC", PositionSide::Short, 0.1, 50_000.0, 10);

        let executor = make_executor(ext.clone(), xyz.clone(), true);
        let result = executor.close_positions("BTC", None, None).await;

        assert!(result.success);
        assert_eq!(result.state, ExecutionState::Complete);
        assert!(!result.rollback_performed);
    }

    #[tokio::test]
    async fn test_close_partial_failure_reports_both_legs() {
        let ext = MockExchange::extended();
        let xyz = MockExchange::tradexyz();
        ext.seed_position("BTC-USD", PositionSide::Long, 0.1, 50_000.0, 10);
        xyz.seed_position("BTC", PositionSide::Short, 0.1, 50_000.0, 10);
        xyz.fail_close_position("venue busy");

        let executor = make_executor(ext.clone(), xyz.clone(), true);
        let result = executor.close_positions("BTC", None, None).await;

        assert!(!result.success);
        let ext_leg = result.extended_leg.expect("extended leg必须有结果");
        let xyz_leg = result.tradexyz_leg.expect("tradexyz leg必须有结果");
        assert!(ext_leg.success);
        assert!(!xyz_leg.success);
    }

    #[tokio::test]
    async fn test_execution_time_tracked() {
        let ext = MockExchange::extended();
        let xyz = MockExchange::tradexyz();
        let executor = make_executor(ext, xyz, true);

        let result = executor
            .open_positions("BTC", 0.1, PositionSide::Long, PositionSide::Short, 10, 50_000.0)
            .await;

        assert!(result.execution_time_ms >= 0.0);
    }
}
