//! 周期结果构造模块
//!
//! CycleResult按累加器方式增量填充，build()一次性冻结。
//! 每条提前退出路径都通过同一个构造器出口，避免重复拼装。

use super::executor::ExecutionResult;
use super::funding::FundingAnalysisResult;
use crate::core::types::{CycleState, PositionSide};
use crate::utils::timing::CycleTimer;
use chrono::{DateTime, Utc};

/// 一个完整交易周期的结果
#[derive(Debug, Clone)]
pub struct CycleResult {
    pub cycle_id: String,
    pub success: bool,
    pub state: CycleState,

    // 周期参数
    pub token: String,
    pub equity_usage: f64,
    pub leverage: u32,
    pub hold_duration_secs: u64,

    // 仓位
    pub extended_side: Option<PositionSide>,
    pub tradexyz_side: Option<PositionSide>,
    pub position_size: f64,
    pub position_value: f64,

    // 资金费率
    pub funding_analysis: Option<FundingAnalysisResult>,
    pub funding_earned: f64,

    // 时间
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_duration_secs: f64,

    // 执行
    pub open_result: Option<ExecutionResult>,
    pub close_result: Option<ExecutionResult>,

    // 错误
    pub error_message: Option<String>,
}

/// CycleResult累加器
pub struct CycleResultBuilder {
    cycle_id: String,
    start_time: DateTime<Utc>,

    token: String,
    equity_usage: f64,
    leverage: u32,
    hold_duration_secs: u64,

    extended_side: Option<PositionSide>,
    tradexyz_side: Option<PositionSide>,
    position_size: f64,
    position_value: f64,

    funding_analysis: Option<FundingAnalysisResult>,
    funding_earned: f64,

    open_result: Option<ExecutionResult>,
    close_result: Option<ExecutionResult>,

    success: bool,
    state: CycleState,
    error_message: Option<String>,
}

impl CycleResultBuilder {
    pub fn new(cycle_id: &str, start_time: DateTime<Utc>) -> Self {
        Self {
            cycle_id: cycle_id.to_string(),
            start_time,
            token: "UNKNOWN".to_string(),
            equity_usage: 0.0,
            leverage: 0,
            hold_duration_secs: 0,
            extended_side: None,
            tradexyz_side: None,
            position_size: 0.0,
            position_value: 0.0,
            funding_analysis: None,
            funding_earned: 0.0,
            open_result: None,
            close_result: None,
            success: true,
            state: CycleState::Idle,
            error_message: None,
        }
    }

    /// 设置周期参数
    pub fn with_params(
        mut self,
        token: &str,
        equity_usage: f64,
        leverage: u32,
        hold_duration_secs: u64,
    ) -> Self {
        self.token = token.to_string();
        self.equity_usage = equity_usage;
        self.leverage = leverage;
        self.hold_duration_secs = hold_duration_secs;
        self
    }

    /// 设置仓位信息
    pub fn with_positions(
        mut self,
        extended_side: Option<PositionSide>,
        tradexyz_side: Option<PositionSide>,
        size: f64,
        value: f64,
    ) -> Self {
        self.extended_side = extended_side;
        self.tradexyz_side = tradexyz_side;
        self.position_size = size;
        self.position_value = value;
        self
    }

    /// 设置资金费率分析
    pub fn with_funding(mut self, analysis: FundingAnalysisResult) -> Self {
        self.funding_analysis = Some(analysis);
        self
    }

    /// 设置执行结果
    pub fn with_open_result(mut self, open_result: ExecutionResult) -> Self {
        self.open_result = Some(open_result);
        self
    }

    pub fn with_close_result(mut self, close_result: ExecutionResult) -> Self {
        self.close_result = Some(close_result);
        self
    }

    /// 标记周期失败
    pub fn with_error(mut self, message: &str, state: CycleState) -> Self {
        self.success = false;
        self.state = state;
        self.error_message = Some(message.to_string());
        self
    }

    /// 标记周期成功
    pub fn with_success(mut self, state: CycleState, funding_earned: f64) -> Self {
        self.success = true;
        self.state = state;
        self.funding_earned = funding_earned;
        self
    }

    /// 冻结为最终结果
    pub fn build(self, timer: &CycleTimer) -> CycleResult {
        CycleResult {
            cycle_id: self.cycle_id,
            success: self.success,
            state: self.state,
            token: self.token,
            equity_usage: self.equity_usage,
            leverage: self.leverage,
            hold_duration_secs: self.hold_duration_secs,
            extended_side: self.extended_side,
            tradexyz_side: self.tradexyz_side,
            position_size: self.position_size,
            position_value: self.position_value,
            funding_analysis: self.funding_analysis,
            funding_earned: self.funding_earned,
            start_time: self.start_time,
            end_time: Some(Utc::now()),
            total_duration_secs: timer.elapsed_secs(),
            open_result: self.open_result,
            close_result: self.close_result,
            error_message: self.error_message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_path_produces_failed_result() {
        let timer = CycleTimer::new();
        let result = CycleResultBuilder::new("abc12345", Utc::now())
            .with_params("BTC", 0.5, 10, 3600)
            .with_error("sizing rejected", CycleState::Error)
            .build(&timer);

        assert!(!result.success);
        assert_eq!(result.state, CycleState::Error);
        assert_eq!(result.error_message.as_deref(), Some("sizing rejected"));
        assert_eq!(result.token, "BTC");
        assert_eq!(result.position_size, 0.0);
        assert!(result.end_time.is_some());
    }

    #[test]
    fn test_emergency_state_preserved() {
        let timer = CycleTimer::new();
        let result = CycleResultBuilder::new("abc12345", Utc::now())
            .with_params("ETH", 0.6, 15, 1800)
            .with_positions(Some(PositionSide::Long), Some(PositionSide::Short), 1.0, 3000.0)
            .with_error("emergency during hold", CycleState::Emergency)
            .build(&timer);

        assert!(!result.success);
        assert_eq!(result.state, CycleState::Emergency);
        assert_eq!(result.position_size, 1.0);
    }

    #[test]
    fn test_success_path() {
        let timer = CycleTimer::new();
        let result = CycleResultBuilder::new("abc12345", Utc::now())
            .with_params("BTC", 0.5, 10, 3600)
            .with_positions(Some(PositionSide::Short), Some(PositionSide::Long), 0.95, 47_500.0)
            .with_success(CycleState::Cooldown, 12.5)
            .build(&timer);

        assert!(result.success);
        assert_eq!(result.state, CycleState::Cooldown);
        assert_eq!(result.funding_earned, 12.5);
        assert!(result.error_message.is_none());
    }

    #[test]
    fn test_defaults_before_any_with() {
        let timer = CycleTimer::new();
        let result = CycleResultBuilder::new("deadbeef", Utc::now())
            .with_error("exploded early", CycleState::Error)
            .build(&timer);

        assert_eq!(result.token, "UNKNOWN");
        assert_eq!(result.leverage, 0);
        assert!(result.open_result.is_none());
        assert!(result.close_result.is_none());
    }
}
