//! 资金费率分析模块
//!
//! 纯函数分析：给出偏置分档、建议的多空分配和预期收益。
//! 分析结果只是建议——有约束力的概率性选边由随机化器完成。

use crate::core::constants::{
    FUNDING_BIAS_LARGE_MIN, FUNDING_BIAS_SMALL_MAX, MIN_MEANINGFUL_FUNDING_DIFF,
};
use crate::core::types::ExchangeName;

/// 费率偏置强度分档
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FundingBias {
    /// 差异无意义
    None,
    /// < 0.01% - 接近随机
    Small,
    /// 0.01% - 0.05% - 温和偏置
    Moderate,
    /// > 0.05% - 强偏置
    Large,
}

/// 单个交易所的资金费率信息
#[derive(Debug, Clone)]
pub struct FundingRateInfo {
    pub exchange: ExchangeName,
    pub rate: f64,
    pub next_funding_time: i64,
    pub token: String,
}

impl FundingRateInfo {
    /// 费率的百分比表示
    pub fn rate_percent(&self) -> f64 {
        self.rate * 100.0
    }

    /// 多头付空头
    pub fn is_positive(&self) -> bool {
        self.rate > 0.0
    }
}

/// 资金费率分析结果
#[derive(Debug, Clone)]
pub struct FundingAnalysisResult {
    pub extended_rate: FundingRateInfo,
    pub tradexyz_rate: FundingRateInfo,

    pub rate_difference: f64,
    pub bias_strength: FundingBias,

    // 建议分配（可能被概率性选边覆盖）
    pub recommended_short_exchange: ExchangeName,
    pub recommended_long_exchange: ExchangeName,

    /// 预期小时资金收益（正=赚取，负=支付）
    pub expected_hourly_funding_income: f64,
}

impl FundingAnalysisResult {
    /// 费率差是否大到值得优化
    pub fn favorable_for_optimization(&self) -> bool {
        self.bias_strength != FundingBias::None
    }
}

/// 资金费率分析器
///
/// 费率经济学：正费率 = 多头付空头 → 偏好做空；负费率反之。
pub struct FundingAnalyzer {
    min_meaningful_diff: f64,
}

impl FundingAnalyzer {
    pub fn new() -> Self {
        Self {
            min_meaningful_diff: MIN_MEANINGFUL_FUNDING_DIFF,
        }
    }

    pub fn with_min_diff(min_meaningful_diff: f64) -> Self {
        Self { min_meaningful_diff }
    }

    /// 分析双边费率并给出最优分配建议
    pub fn analyze(
        &self,
        extended_rate: f64,
        tradexyz_rate: f64,
        token: &str,
        extended_next_funding: i64,
        tradexyz_next_funding: i64,
        position_value_usd: f64,
    ) -> FundingAnalysisResult {
        let extended_info = FundingRateInfo {
            exchange: ExchangeName::Extended,
            rate: extended_rate,
            next_funding_time: extended_next_funding,
            token: token.to_string(),
        };

        let tradexyz_info = FundingRateInfo {
            exchange: ExchangeName::TradeXyz,
            rate: tradexyz_rate,
            next_funding_time: tradexyz_next_funding,
            token: token.to_string(),
        };

        let rate_difference = (extended_rate - tradexyz_rate).abs();
        let bias_strength = self.determine_bias_strength(rate_difference);

        // 费率更高的一侧做空（向多头收费）
        let (recommended_short, recommended_long) = if extended_rate > tradexyz_rate {
            (ExchangeName::Extended, ExchangeName::TradeXyz)
        } else {
            (ExchangeName::TradeXyz, ExchangeName::Extended)
        };

        let expected_income = self.calculate_expected_income(
            extended_rate,
            tradexyz_rate,
            recommended_short,
            position_value_usd,
        );

        FundingAnalysisResult {
            extended_rate: extended_info,
            tradexyz_rate: tradexyz_info,
            rate_difference,
            bias_strength,
            recommended_short_exchange: recommended_short,
            recommended_long_exchange: recommended_long,
            expected_hourly_funding_income: expected_income,
        }
    }

    fn determine_bias_strength(&self, rate_difference: f64) -> FundingBias {
        if rate_difference < self.min_meaningful_diff {
            FundingBias::None
        } else if rate_difference < FUNDING_BIAS_SMALL_MAX {
            FundingBias::Small
        } else if rate_difference < FUNDING_BIAS_LARGE_MIN {
            FundingBias::Moderate
        } else {
            FundingBias::Large
        }
    }

    /// 预期小时资金收益
    ///
    /// 对冲组合：空头侧收取费率、多头侧支付费率，
    /// 净收益 = 仓位价值 × (空头侧费率 − 多头侧费率)。
    fn calculate_expected_income(
        &self,
        extended_rate: f64,
        tradexyz_rate: f64,
        recommended_short: ExchangeName,
        position_value: f64,
    ) -> f64 {
        if position_value <= 0.0 {
            return 0.0;
        }

        let (short_rate, long_rate) = if recommended_short == ExchangeName::Extended {
            (extended_rate, tradexyz_rate)
        } else {
            (tradexyz_rate, extended_rate)
        };

        position_value * (short_rate - long_rate)
    }

    /// 比较两种分配方案的资金收益
    pub fn compare_assignment_outcomes(
        &self,
        extended_rate: f64,
        tradexyz_rate: f64,
        position_value: f64,
    ) -> (f64, f64) {
        let income_short_extended = position_value * (extended_rate - tradexyz_rate);
        let income_short_tradexyz = position_value * (tradexyz_rate - extended_rate);
        (income_short_extended, income_short_tradexyz)
    }

    /// 费率显示格式（如 "+0.0100%"）
    pub fn format_rate(rate: f64) -> String {
        let percentage = rate * 100.0;
        if percentage >= 0.0 {
            format!("+{:.4}%", percentage)
        } else {
            format!("{:.4}%", percentage)
        }
    }
}

impl Default for FundingAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bias_strength_classification() {
        let analyzer = FundingAnalyzer::new();

        let result = analyzer.analyze(0.0001, 0.0001, "BTC", 0, 0, 0.0);
        assert_eq!(result.bias_strength, FundingBias::None);

        let result = analyzer.analyze(0.00006, 0.0, "BTC", 0, 0, 0.0);
        assert_eq!(result.bias_strength, FundingBias::Small);

        let result = analyzer.analyze(0.0003, 0.0, "BTC", 0, 0, 0.0);
        assert_eq!(result.bias_strength, FundingBias::Moderate);

        let result = analyzer.analyze(0.001, -0.001, "BTC", 0, 0, 0.0);
        assert_eq!(result.bias_strength, FundingBias::Large);
    }

    #[test]
    fn test_recommendation_favors_short_on_higher_rate() {
        let analyzer = FundingAnalyzer::new();

        let result = analyzer.analyze(0.001, 0.0001, "BTC", 0, 0, 0.0);
        assert_eq!(result.recommended_short_exchange, ExchangeName::Extended);
        assert_eq!(result.recommended_long_exchange, ExchangeName::TradeXyz);

        // 更负的一侧做多
        let result = analyzer.analyze(-0.001, 0.0001, "BTC", 0, 0, 0.0);
        assert_eq!(result.recommended_long_exchange, ExchangeName::Extended);
        assert_eq!(result.recommended_short_exchange, ExchangeName::TradeXyz);
    }

    #[test]
    fn test_expected_income_sign() {
        let analyzer = FundingAnalyzer::new();

        // 按建议方向持仓，收益应为非负
        let result = analyzer.analyze(0.0005, -0.0002, "ETH", 0, 0, 10_000.0);
        assert!(result.expected_hourly_funding_income > 0.0);
        // 0.0007 × 10000 = 7
        assert!((result.expected_hourly_funding_income - 7.0).abs() < 1e-9);

        // 仓位为零时无收益
        let result = analyzer.analyze(0.0005, -0.0002, "ETH", 0, 0, 0.0);
        assert_eq!(result.expected_hourly_funding_income, 0.0);
    }

    #[test]
    fn test_compare_assignment_outcomes_symmetric() {
        let analyzer = FundingAnalyzer::new();
        let (a, b) = analyzer.compare_assignment_outcomes(0.0004, 0.0001, 10_000.0);
        assert!((a + b).abs() < 1e-12);
        assert!(a > 0.0);
    }

    #[test]
    fn test_format_rate() {
        assert_eq!(FundingAnalyzer::format_rate(0.0001), "+0.0100%");
        assert_eq!(FundingAnalyzer::format_rate(-0.00005), "-0.0050%");
    }
}
