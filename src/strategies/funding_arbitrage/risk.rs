//! 交易前风险校验模块
//!
//! 五项独立检查：最低余额、仓位上限、保证金充足性、
//! 强平距离、杠杆范围。逐项给出 通过/严重度/说明。

use super::sizing::SizingResult;
use crate::core::constants::defaults;
use crate::core::types::BalanceSnapshot;
use serde_json::{json, Value};

/// 风险等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
            RiskLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// 单项风险检查结果
#[derive(Debug, Clone)]
pub struct RiskCheckResult {
    pub passed: bool,
    pub risk_level: RiskLevel,
    pub check_name: &'static str,
    pub message: String,
    pub details: Value,
}

/// 完整的风险评估
#[derive(Debug, Clone)]
pub struct RiskAssessment {
    pub checks: Vec<RiskCheckResult>,
    pub overall_passed: bool,
    pub overall_risk_level: RiskLevel,
    pub blocking_issues: Vec<String>,
    pub warnings: Vec<String>,
}

impl RiskAssessment {
    /// 是否允许继续交易
    pub fn can_proceed(&self) -> bool {
        self.overall_passed && self.overall_risk_level != RiskLevel::Critical
    }
}

/// 风险校验器
pub struct RiskValidator {
    max_position_value: f64,
    min_balance_required: f64,
    min_margin_ratio: f64,
    min_leverage: u32,
    max_leverage: u32,
}

impl RiskValidator {
    pub fn new(max_position_value: f64, min_balance_required: f64) -> Self {
        Self {
            max_position_value,
            min_balance_required,
            min_margin_ratio: 0.2,
            min_leverage: defaults::MIN_LEVERAGE,
            max_leverage: defaults::MAX_LEVERAGE,
        }
    }

    pub fn with_leverage_bounds(mut self, min_leverage: u32, max_leverage: u32) -> Self {
        self.min_leverage = min_leverage;
        self.max_leverage = max_leverage;
        self
    }

    /// 交易前综合风险校验
    pub fn validate_pre_trade(
        &self,
        sizing: &SizingResult,
        extended_balance: &BalanceSnapshot,
        tradexyz_balance: &BalanceSnapshot,
        current_price: f64,
        extended_maintenance_margin: f64,
        tradexyz_maintenance_margin: f64,
    ) -> RiskAssessment {
        let checks = vec![
            self.check_minimum_balance(extended_balance, tradexyz_balance),
            self.check_position_limits(sizing),
            self.check_margin_sufficiency(sizing, extended_balance, tradexyz_balance),
            self.check_liquidation_risk(
                sizing,
                current_price,
                extended_maintenance_margin,
                tradexyz_maintenance_margin,
            ),
            self.check_leverage(sizing),
        ];

        self.aggregate_results(checks)
    }

    /// 检查1：最低余额
    fn check_minimum_balance(
        &self,
        extended_balance: &BalanceSnapshot,
        tradexyz_balance: &BalanceSnapshot,
    ) -> RiskCheckResult {
        let min_available = extended_balance.available.min(tradexyz_balance.available);
        let details = json!({
            "extended_available": extended_balance.available,
            "tradexyz_available": tradexyz_balance.available,
            "minimum_required": self.min_balance_required,
        });

        if min_available < self.min_balance_required {
            return RiskCheckResult {
                passed: false,
                risk_level: RiskLevel::Critical,
                check_name: "minimum_balance",
                message: format!(
                    "可用余额 ${:.2} 低于下限 ${:.2}",
                    min_available, self.min_balance_required
                ),
                details,
            };
        }

        if min_available < self.min_balance_required * 2.0 {
            return RiskCheckResult {
                passed: true,
                risk_level: RiskLevel::Medium,
                check_name: "minimum_balance",
                message: format!("余额 ${:.2} 偏低但可接受", min_available),
                details,
            };
        }

        RiskCheckResult {
            passed: true,
            risk_level: RiskLevel::Low,
            check_name: "minimum_balance",
            message: "余额检查通过".to_string(),
            details,
        }
    }

    /// 检查2：仓位上限
    fn check_position_limits(&self, sizing: &SizingResult) -> RiskCheckResult {
        if sizing.position_size <= 0.0 {
            return RiskCheckResult {
                passed: false,
                risk_level: RiskLevel::Critical,
                check_name: "position_limits",
                message: "仓位数量为零或负数".to_string(),
                details: json!({ "position_size": sizing.position_size }),
            };
        }

        if sizing.position_value_usd > self.max_position_value {
            return RiskCheckResult {
                passed: false,
                risk_level: RiskLevel::High,
                check_name: "position_limits",
                message: format!(
                    "仓位价值 ${:.2} 超过上限 ${:.2}",
                    sizing.position_value_usd, self.max_position_value
                ),
                details: json!({
                    "position_value": sizing.position_value_usd,
                    "max_allowed": self.max_position_value,
                }),
            };
        }

        RiskCheckResult {
            passed: true,
            risk_level: RiskLevel::Low,
            check_name: "position_limits",
            message: "仓位上限检查通过".to_string(),
            details: json!({
                "position_value": sizing.position_value_usd,
                "max_allowed": self.max_position_value,
            }),
        }
    }

    /// 检查3：保证金充足性（含缓冲）
    fn check_margin_sufficiency(
        &self,
        sizing: &SizingResult,
        extended_balance: &BalanceSnapshot,
        tradexyz_balance: &BalanceSnapshot,
    ) -> RiskCheckResult {
        let required_with_buffer =
            sizing.margin_required_per_leg * (1.0 + self.min_margin_ratio);

        let extended_ok = extended_balance.available >= required_with_buffer;
        let tradexyz_ok = tradexyz_balance.available >= required_with_buffer;

        if !extended_ok || !tradexyz_ok {
            let mut issues = Vec::new();
            if !extended_ok {
                issues.push(format!(
                    "Extended: ${:.2} < ${:.2}",
                    extended_balance.available, required_with_buffer
                ));
            }
            if !tradexyz_ok {
                issues.push(format!(
                    "TradeXYZ: ${:.2} < ${:.2}",
                    tradexyz_balance.available, required_with_buffer
                ));
            }

            return RiskCheckResult {
                passed: false,
                risk_level: RiskLevel::High,
                check_name: "margin_sufficiency",
                message: format!("含缓冲保证金不足: {}", issues.join("; ")),
                details: json!({
                    "required_with_buffer": required_with_buffer,
                    "extended_available": extended_balance.available,
                    "tradexyz_available": tradexyz_balance.available,
                    "buffer_ratio": self.min_margin_ratio,
                }),
            };
        }

        let extended_util = if extended_balance.available > 0.0 {
            sizing.margin_required_per_leg / extended_balance.available
        } else {
            1.0
        };
        let tradexyz_util = if tradexyz_balance.available > 0.0 {
            sizing.margin_required_per_leg / tradexyz_balance.available
        } else {
            1.0
        };
        let max_util = extended_util.max(tradexyz_util);

        let risk_level = if max_util > 0.9 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };

        RiskCheckResult {
            passed: true,
            risk_level,
            check_name: "margin_sufficiency",
            message: format!("保证金检查通过 (最大占用率: {:.1}%)", max_util * 100.0),
            details: json!({
                "extended_utilization": extended_util,
                "tradexyz_utilization": tradexyz_util,
            }),
        }
    }

    /// 检查4：强平距离
    ///
    /// 近似强平距离 = 1/杠杆 − 维持保证金率
    fn check_liquidation_risk(
        &self,
        sizing: &SizingResult,
        current_price: f64,
        extended_mm: f64,
        tradexyz_mm: f64,
    ) -> RiskCheckResult {
        if sizing.leverage == 0 || current_price <= 0.0 {
            return RiskCheckResult {
                passed: false,
                risk_level: RiskLevel::Critical,
                check_name: "liquidation_risk",
                message: "无效的杠杆或价格，无法计算强平距离".to_string(),
                details: json!({}),
            };
        }

        let leverage = sizing.leverage as f64;

        let long_liq_distance = 1.0 / leverage - extended_mm;
        let long_liq_price = current_price * (1.0 - long_liq_distance);

        let short_liq_distance = 1.0 / leverage - tradexyz_mm;
        let short_liq_price = current_price * (1.0 + short_liq_distance);

        let min_safe_distance = 0.03;

        let long_distance_pct = (current_price - long_liq_price).abs() / current_price;
        let short_distance_pct = (short_liq_price - current_price).abs() / current_price;

        if long_distance_pct < min_safe_distance || short_distance_pct < min_safe_distance {
            return RiskCheckResult {
                passed: false,
                risk_level: RiskLevel::High,
                check_name: "liquidation_risk",
                message: format!(
                    "强平距离过近: 多头 {:.1}%, 空头 {:.1}%",
                    long_distance_pct * 100.0,
                    short_distance_pct * 100.0
                ),
                details: json!({
                    "current_price": current_price,
                    "long_liq_price": long_liq_price,
                    "short_liq_price": short_liq_price,
                    "long_distance_pct": long_distance_pct,
                    "short_distance_pct": short_distance_pct,
                }),
            };
        }

        let risk_level = if long_distance_pct.min(short_distance_pct) < 0.05 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };

        RiskCheckResult {
            passed: true,
            risk_level,
            check_name: "liquidation_risk",
            message: format!(
                "强平距离安全 (多头: {:.1}%, 空头: {:.1}%)",
                long_distance_pct * 100.0,
                short_distance_pct * 100.0
            ),
            details: json!({
                "long_liq_price": long_liq_price,
                "short_liq_price": short_liq_price,
            }),
        }
    }

    /// 检查5：杠杆范围
    fn check_leverage(&self, sizing: &SizingResult) -> RiskCheckResult {
        let leverage = sizing.leverage;

        if leverage > self.max_leverage {
            return RiskCheckResult {
                passed: false,
                risk_level: RiskLevel::High,
                check_name: "leverage",
                message: format!("杠杆 {}x 超过上限 {}x", leverage, self.max_leverage),
                details: json!({ "leverage": leverage, "max_allowed": self.max_leverage }),
            };
        }

        // 低于目标区间是安全方向，不阻断
        if leverage < self.min_leverage {
            return RiskCheckResult {
                passed: true,
                risk_level: RiskLevel::Low,
                check_name: "leverage",
                message: format!(
                    "杠杆 {}x 低于目标区间 ({}-{}x)",
                    leverage, self.min_leverage, self.max_leverage
                ),
                details: json!({ "leverage": leverage }),
            };
        }

        let risk_level = if leverage <= 15 {
            RiskLevel::Low
        } else {
            RiskLevel::Medium
        };

        RiskCheckResult {
            passed: true,
            risk_level,
            check_name: "leverage",
            message: format!("杠杆 {}x 在可接受范围内", leverage),
            details: json!({ "leverage": leverage }),
        }
    }

    /// 汇总：overall_passed = 全部通过; overall_risk = 最高严重度;
    /// 未通过项成为阻断问题，通过但Medium/High的成为警告
    fn aggregate_results(&self, checks: Vec<RiskCheckResult>) -> RiskAssessment {
        let mut blocking: Vec<String> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();

        let overall_passed = checks.iter().all(|c| c.passed);

        for check in &checks {
            if !check.passed {
                blocking.push(format!("{}: {}", check.check_name, check.message));
            } else if check.risk_level == RiskLevel::Medium || check.risk_level == RiskLevel::High
            {
                warnings.push(format!("{}: {}", check.check_name, check.message));
            }
        }

        let overall_risk = checks
            .iter()
            .map(|c| c.risk_level)
            .max()
            .unwrap_or(RiskLevel::Low);

        RiskAssessment {
            checks,
            overall_passed,
            overall_risk_level: overall_risk,
            blocking_issues: blocking,
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balance(available: f64) -> BalanceSnapshot {
        BalanceSnapshot::new(available, available, 0.0)
    }

    fn nominal_sizing() -> SizingResult {
        SizingResult {
            token: "BTC".to_string(),
            position_size: 0.1,
            position_value_usd: 5_000.0,
            margin_required_per_leg: 500.0,
            total_margin_required: 1_000.0,
            equity_usage: 0.5,
            leverage: 10,
            effective_leverage: 10.0,
            available_balance_used: 500.0,
            fits_constraints: true,
            constraint_notes: vec![],
        }
    }

    fn validator() -> RiskValidator {
        RiskValidator::new(100_000.0, 100.0)
    }

    #[test]
    fn test_all_nominal_gives_low_risk() {
        let assessment = validator().validate_pre_trade(
            &nominal_sizing(),
            &balance(10_000.0),
            &balance(10_000.0),
            50_000.0,
            0.005,
            0.005,
        );

        assert!(assessment.overall_passed);
        assert_eq!(assessment.overall_risk_level, RiskLevel::Low);
        assert!(assessment.can_proceed());
        assert!(assessment.blocking_issues.is_empty());
        assert_eq!(assessment.checks.len(), 5);
    }

    #[test]
    fn test_below_minimum_balance_is_critical() {
        let assessment = validator().validate_pre_trade(
            &nominal_sizing(),
            &balance(50.0),
            &balance(10_000.0),
            50_000.0,
            0.005,
            0.005,
        );

        assert!(!assessment.overall_passed);
        assert_eq!(assessment.overall_risk_level, RiskLevel::Critical);
        assert!(!assessment.can_proceed());
    }

    #[test]
    fn test_low_balance_is_medium_warning() {
        // 在下限与2倍下限之间：通过但告警
        let mut sizing = nominal_sizing();
        sizing.margin_required_per_leg = 50.0;
        sizing.position_value_usd = 500.0;

        let assessment = validator().validate_pre_trade(
            &sizing,
            &balance(150.0),
            &balance(10_000.0),
            50_000.0,
            0.005,
            0.005,
        );

        assert!(assessment.overall_passed);
        assert!(assessment
            .warnings
            .iter()
            .any(|w| w.contains("minimum_balance")));
    }

    #[test]
    fn test_zero_size_is_critical() {
        let mut sizing = nominal_sizing();
        sizing.position_size = 0.0;

        let assessment = validator().validate_pre_trade(
            &sizing,
            &balance(10_000.0),
            &balance(10_000.0),
            50_000.0,
            0.005,
            0.005,
        );

        assert!(!assessment.can_proceed());
        assert_eq!(assessment.overall_risk_level, RiskLevel::Critical);
    }

    #[test]
    fn test_oversized_position_is_high() {
        let mut sizing = nominal_sizing();
        sizing.position_value_usd = 200_000.0;

        let assessment = validator().validate_pre_trade(
            &sizing,
            &balance(500_000.0),
            &balance(500_000.0),
            50_000.0,
            0.005,
            0.005,
        );

        assert!(!assessment.overall_passed);
        assert!(assessment
            .blocking_issues
            .iter()
            .any(|i| i.contains("position_limits")));
    }

    #[test]
    fn test_insufficient_margin_buffer_blocks() {
        let mut sizing = nominal_sizing();
        sizing.margin_required_per_leg = 9_000.0;

        let assessment = validator().validate_pre_trade(
            &sizing,
            &balance(10_000.0),
            &balance(10_000.0),
            50_000.0,
            0.005,
            0.005,
        );

        // 9000 × 1.2 = 10800 > 10000
        assert!(!assessment.overall_passed);
        assert!(assessment
            .blocking_issues
            .iter()
            .any(|i| i.contains("margin_sufficiency")));
    }

    #[test]
    fn test_excessive_leverage_blocks() {
        let mut sizing = nominal_sizing();
        sizing.leverage = 25;

        let assessment = validator().validate_pre_trade(
            &sizing,
            &balance(10_000.0),
            &balance(10_000.0),
            50_000.0,
            0.005,
            0.005,
        );

        assert!(!assessment.overall_passed);
        assert!(assessment.blocking_issues.iter().any(|i| i.contains("leverage")));
    }

    #[test]
    fn test_under_leverage_is_non_blocking() {
        let mut sizing = nominal_sizing();
        sizing.leverage = 5;
        // 5x时强平距离约20%，安全

        let assessment = validator().validate_pre_trade(
            &sizing,
            &balance(10_000.0),
            &balance(10_000.0),
            50_000.0,
            0.005,
            0.005,
        );

        assert!(assessment.overall_passed);
        assert!(assessment.can_proceed());
    }

    #[test]
    fn test_invalid_price_critical_for_liquidation() {
        let assessment = validator().validate_pre_trade(
            &nominal_sizing(),
            &balance(10_000.0),
            &balance(10_000.0),
            0.0,
            0.005,
            0.005,
        );

        assert!(!assessment.can_proceed());
        assert_eq!(assessment.overall_risk_level, RiskLevel::Critical);
    }
}
