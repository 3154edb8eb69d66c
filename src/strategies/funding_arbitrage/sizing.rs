//! 仓位计算模块
//!
//! 核心原则：
//! 1. 以双边可用余额的较小者为约束
//! 2. 两条腿必须都能用可用资金开出来
//! 3. 杠杆和仓位联合校验，防止保证金耗尽
//! 4. 保守取整，留安全余量

use crate::core::constants::{defaults, SAFETY_BUFFER};
use crate::core::types::BalanceSnapshot;

/// 仓位计算结果
///
/// 不变量: fits_constraints == true 当且仅当
/// position_size > 0 且 margin_required_per_leg > 0 且双边都付得起该保证金。
/// 下游执行代码依赖该不变量。
#[derive(Debug, Clone)]
pub struct SizingResult {
    pub token: String,
    /// 基础资产数量（如BTC）
    pub position_size: f64,
    /// 名义价值（USD）
    pub position_value_usd: f64,

    /// 单腿保证金
    pub margin_required_per_leg: f64,
    /// 双腿合计保证金
    pub total_margin_required: f64,

    pub equity_usage: f64,
    pub leverage: u32,

    pub effective_leverage: f64,
    pub available_balance_used: f64,

    pub fits_constraints: bool,
    pub constraint_notes: Vec<String>,
}

impl SizingResult {
    /// 构造无效结果（约束失败时的统一出口）
    fn invalid(token: &str, equity_usage: f64, leverage: u32, notes: Vec<String>) -> Self {
        Self {
            token: token.to_string(),
            position_size: 0.0,
            position_value_usd: 0.0,
            margin_required_per_leg: 0.0,
            total_margin_required: 0.0,
            equity_usage,
            leverage,
            effective_leverage: 0.0,
            available_balance_used: 0.0,
            fits_constraints: false,
            constraint_notes: notes,
        }
    }
}

/// 仓位计算器
pub struct PositionSizer {
    safety_buffer: f64,
    min_position_usd: f64,
    max_position_usd: f64,
}

impl PositionSizer {
    pub fn new(min_position_usd: f64, max_position_usd: f64) -> Self {
        Self {
            safety_buffer: SAFETY_BUFFER,
            min_position_usd,
            max_position_usd,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(
            defaults::MIN_POSITION_VALUE_USD,
            defaults::MAX_POSITION_VALUE_USD,
        )
    }

    /// 计算对冲仓位大小
    #[allow(clippy::too_many_arguments)]
    pub fn calculate_size(
        &self,
        token: &str,
        token_price: f64,
        extended_balance: &BalanceSnapshot,
        tradexyz_balance: &BalanceSnapshot,
        equity_usage: f64,
        leverage: u32,
        min_order_size: f64,
        size_precision: u32,
    ) -> SizingResult {
        let mut notes: Vec<String> = Vec::new();

        // 第一步：确定约束性余额，绝不以默认值代替
        let min_available = extended_balance.available.min(tradexyz_balance.available);

        if min_available <= 0.0 {
            return SizingResult::invalid(
                token,
                equity_usage,
                leverage,
                vec!["一侧或双侧交易所可用余额不足".to_string()],
            );
        }

        if token_price <= 0.0 {
            return SizingResult::invalid(
                token,
                equity_usage,
                leverage,
                vec!["无效的币种价格".to_string()],
            );
        }

        // 第二步：单腿资金分配
        let capital_per_leg = min_available * equity_usage;

        // 第三步：按杠杆计算名义价值
        let mut position_value = capital_per_leg * leverage as f64;

        // 第四步：名义价值限幅。低于下限时直接归零跳过本周期，
        // 绝不向上凑到下限强行开仓
        if position_value < self.min_position_usd {
            notes.push(format!(
                "仓位价值 ${:.2} 低于下限 ${:.2}",
                position_value, self.min_position_usd
            ));
            position_value = 0.0;
        }

        if position_value > self.max_position_usd {
            notes.push(format!(
                "仓位价值 ${:.2} 截断到上限 ${:.2}",
                position_value, self.max_position_usd
            ));
            position_value = self.max_position_usd;
        }

        // 第五步：换算基础资产数量，应用安全系数后向下取整。
        // 向上取整会低估所需保证金，因此只允许向下
        let raw_size = position_value / token_price;
        let buffered_size = raw_size * self.safety_buffer;
        let position_size = Self::round_down(buffered_size, size_precision);

        // 低于最小下单量时拒绝，不自动凑到最小值
        if position_size < min_order_size || position_size <= 0.0 {
            if position_size > 0.0 {
                notes.push(format!(
                    "仓位数量 {} 低于最小下单量 {}",
                    position_size, min_order_size
                ));
            }
            notes.push("无效的仓位数量".to_string());
            return SizingResult::invalid(token, equity_usage, leverage, notes);
        }

        if leverage == 0 {
            notes.push("无效的杠杆".to_string());
            return SizingResult::invalid(token, equity_usage, leverage, notes);
        }

        // 第六步：按取整后的数量重算实际价值和保证金
        let actual_value = position_size * token_price;
        let actual_margin_per_leg = actual_value / leverage as f64;
        let total_margin = actual_margin_per_leg * 2.0;

        // 第七步：复核双边都付得起
        let mut fits = true;
        if actual_margin_per_leg > extended_balance.available {
            fits = false;
            notes.push("取整后Extended保证金不足".to_string());
        }
        if actual_margin_per_leg > tradexyz_balance.available {
            fits = false;
            notes.push("取整后TradeXYZ保证金不足".to_string());
        }

        SizingResult {
            token: token.to_string(),
            position_size,
            position_value_usd: actual_value,
            margin_required_per_leg: actual_margin_per_leg,
            total_margin_required: total_margin,
            equity_usage,
            leverage,
            effective_leverage: if actual_margin_per_leg > 0.0 {
                leverage as f64
            } else {
                0.0
            },
            available_balance_used: actual_margin_per_leg,
            fits_constraints: fits,
            constraint_notes: notes,
        }
    }

    /// 用最新余额复核既有的仓位计算
    pub fn validate_sizing(
        &self,
        sizing: &SizingResult,
        extended_balance: &BalanceSnapshot,
        tradexyz_balance: &BalanceSnapshot,
    ) -> (bool, Vec<String>) {
        let mut issues: Vec<String> = Vec::new();

        if sizing.position_size <= 0.0 {
            issues.push("仓位数量必须为正".to_string());
        }

        let margin = sizing.margin_required_per_leg;

        if margin > extended_balance.available {
            issues.push(format!(
                "Extended: 需要 ${:.2}, 可用 ${:.2} (缺口 ${:.2})",
                margin,
                extended_balance.available,
                margin - extended_balance.available
            ));
        }

        if margin > tradexyz_balance.available {
            issues.push(format!(
                "TradeXYZ: 需要 ${:.2}, 可用 ${:.2} (缺口 ${:.2})",
                margin,
                tradexyz_balance.available,
                margin - tradexyz_balance.available
            ));
        }

        let total_available = extended_balance.available + tradexyz_balance.available;
        if sizing.total_margin_required > total_available {
            issues.push(format!(
                "合计保证金 ${:.2} 超过双边可用合计 ${:.2}",
                sizing.total_margin_required, total_available
            ));
        }

        if sizing.position_value_usd < self.min_position_usd {
            issues.push(format!(
                "仓位价值 ${:.2} 低于下限 ${:.2}",
                sizing.position_value_usd, self.min_position_usd
            ));
        }

        if sizing.position_value_usd > self.max_position_usd {
            issues.push(format!(
                "仓位价值 ${:.2} 超过上限 ${:.2}",
                sizing.position_value_usd, self.max_position_usd
            ));
        }

        (issues.is_empty(), issues)
    }

    /// 按指定小数位向下取整
    ///
    /// 先抵消二进制表示误差（相对1e-12，远小于任何真实步长），
    /// 避免 0.95 这类十进制精确值被错误地多砍一位。
    fn round_down(value: f64, decimals: u32) -> f64 {
        let factor = 10f64.powi(decimals as i32);
        let scaled = value * factor;
        (scaled + scaled.abs() * 1e-12).floor() / factor
    }
}

impl Default for PositionSizer {
    fn default() -> Self {
        Self::with_defaults()
    }
}
