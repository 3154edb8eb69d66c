//! 加密安全随机化模块
//!
//! 所有交易参数（币种、权益比例、杠杆、持仓/冷却时长、选边）均来自
//! OS熵源（OsRng），绝不使用可播种的伪随机序列。目的：
//! - 防止外部观察者识别机器人的时序/行为模式
//! - 防止可预测行为被利用
//!
//! 选边的费率偏置是概率性的而非确定性的：单一信号不值得压满，
//! 确定性选边本身也会成为可识别的模式。

use crate::core::constants::{
    FUNDING_BIAS_LARGE_MIN, FUNDING_BIAS_SMALL_MAX, FUNDING_BIAS_WEIGHT_LARGE,
    FUNDING_BIAS_WEIGHT_MODERATE, FUNDING_BIAS_WEIGHT_SMALL, RANDOMIZATION_STEPS,
    SUPPORTED_TOKENS,
};
use crate::core::error::ExchangeError;
use crate::core::types::{ExchangeName, PositionSide, Result};
use rand::{rngs::OsRng, Rng};

/// 单个周期的随机参数
///
/// 周期开始时一次性生成，周期内保持不变。
#[derive(Debug, Clone, PartialEq)]
pub struct CycleParams {
    pub token: String,
    pub equity_usage: f64,
    pub leverage: u32,
    pub hold_duration_secs: u64,
    pub cooldown_secs: u64,
}

/// 双边选边结果
pub type SideAssignment = ((ExchangeName, PositionSide), (ExchangeName, PositionSide));

/// 加密安全随机化器
pub struct CryptoRandomizer {
    min_equity: f64,
    max_equity: f64,
    min_leverage: u32,
    max_leverage: u32,
    min_hold: u64,
    max_hold: u64,
    min_cooldown: u64,
    max_cooldown: u64,
}

impl CryptoRandomizer {
    pub fn new(
        min_equity: f64,
        max_equity: f64,
        min_leverage: u32,
        max_leverage: u32,
        min_hold: u64,
        max_hold: u64,
        min_cooldown: u64,
        max_cooldown: u64,
    ) -> Self {
        Self {
            min_equity,
            max_equity,
            min_leverage,
            max_leverage,
            min_hold,
            max_hold,
            min_cooldown,
            max_cooldown,
        }
    }

    /// 使用默认参数范围创建
    pub fn with_defaults() -> Self {
        use crate::core::constants::defaults::*;
        Self::new(
            MIN_EQUITY_USAGE,
            MAX_EQUITY_USAGE,
            MIN_LEVERAGE,
            MAX_LEVERAGE,
            MIN_HOLD_DURATION_SECS,
            MAX_HOLD_DURATION_SECS,
            MIN_COOLDOWN_SECS,
            MAX_COOLDOWN_SECS,
        )
    }

    /// 从支持列表中随机选择一个币种
    pub fn select_token(&self, tokens: Option<&[&str]>) -> Result<String> {
        let available: Vec<&str> = match tokens {
            Some(list) => list.to_vec(),
            None => SUPPORTED_TOKENS.to_vec(),
        };

        if available.is_empty() {
            return Err(ExchangeError::ValidationError {
                field: "tokens".to_string(),
                reason: "没有可选的币种".to_string(),
            });
        }

        let index = OsRng.gen_range(0..available.len());
        Ok(available[index].to_string())
    }

    /// 生成随机权益使用率
    ///
    /// 在目标区间上取1000个离散步长，保证千分之一级分辨率。
    pub fn generate_equity_usage(&self) -> f64 {
        let range_size = self.max_equity - self.min_equity;
        let step = OsRng.gen_range(0..=RANDOMIZATION_STEPS);
        self.min_equity + range_size * step as f64 / RANDOMIZATION_STEPS as f64
    }

    /// 生成随机杠杆倍数（整数，含边界）
    pub fn generate_leverage(&self) -> u32 {
        OsRng.gen_range(self.min_leverage..=self.max_leverage)
    }

    /// 生成随机持仓时长（秒，含边界）
    pub fn generate_hold_duration(&self) -> u64 {
        OsRng.gen_range(self.min_hold..=self.max_hold)
    }

    /// 生成随机冷却时长（秒，含边界）
    pub fn generate_cooldown(&self) -> u64 {
        OsRng.gen_range(self.min_cooldown..=self.max_cooldown)
    }

    /// 生成一个完整周期的全部随机参数
    pub fn generate_cycle_params(&self, tokens: Option<&[&str]>) -> Result<CycleParams> {
        Ok(CycleParams {
            token: self.select_token(tokens)?,
            equity_usage: self.generate_equity_usage(),
            leverage: self.generate_leverage(),
            hold_duration_secs: self.generate_hold_duration(),
            cooldown_secs: self.generate_cooldown(),
        })
    }

    /// 无偏置选边：公平硬币
    pub fn assign_sides_random(&self) -> SideAssignment {
        let extended_is_long = OsRng.gen_range(0..2u8) == 0;

        if extended_is_long {
            (
                (ExchangeName::Extended, PositionSide::Long),
                (ExchangeName::TradeXyz, PositionSide::Short),
            )
        } else {
            (
                (ExchangeName::Extended, PositionSide::Short),
                (ExchangeName::TradeXyz, PositionSide::Long),
            )
        }
    }

    /// 带资金费率偏置的概率性选边
    ///
    /// 费率为正 = 多头付空头 → 偏好做空高费率一侧。
    /// 偏置按费率差分档：
    /// - 差异小: ~50/50（接近随机）
    /// - 差异中: ~60/40
    /// - 差异大: ~75/25
    pub fn assign_sides_with_bias(
        &self,
        extended_funding: f64,
        tradexyz_funding: f64,
    ) -> SideAssignment {
        let funding_diff = (extended_funding - tradexyz_funding).abs();

        let favorable_weight = if funding_diff >= FUNDING_BIAS_LARGE_MIN {
            FUNDING_BIAS_WEIGHT_LARGE
        } else if funding_diff >= FUNDING_BIAS_SMALL_MAX {
            FUNDING_BIAS_WEIGHT_MODERATE
        } else {
            FUNDING_BIAS_WEIGHT_SMALL
        };

        // 费率更高（或更不负）的一侧对做空更有利
        let extended_favorable_for_short = extended_funding > tradexyz_funding;

        // 离散化的加权抽样
        let threshold = (favorable_weight * RANDOMIZATION_STEPS as f64) as u64;
        let draw = OsRng.gen_range(0..RANDOMIZATION_STEPS);
        let choose_favorable = draw < threshold;

        let extended_short = extended_favorable_for_short == choose_favorable;

        if extended_short {
            (
                (ExchangeName::Extended, PositionSide::Short),
                (ExchangeName::TradeXyz, PositionSide::Long),
            )
        } else {
            (
                (ExchangeName::Extended, PositionSide::Long),
                (ExchangeName::TradeXyz, PositionSide::Short),
            )
        }
    }

    /// 生成64位随机nonce（订单签名用）
    pub fn generate_nonce() -> u64 {
        OsRng.gen::<u64>()
    }

    /// 生成128位十六进制外部订单ID（幂等标记用）
    pub fn generate_external_id() -> String {
        let bytes: [u8; 16] = OsRng.gen();
        hex::encode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_randomizer() -> CryptoRandomizer {
        CryptoRandomizer::with_defaults()
    }

    #[test]
    fn test_cycle_params_within_bounds() {
        let randomizer = default_randomizer();

        for _ in 0..1000 {
            let params = randomizer.generate_cycle_params(None).unwrap();
            assert!(SUPPORTED_TOKENS.contains(&params.token.as_str()));
            assert!(params.equity_usage >= 0.40 && params.equity_usage <= 0.80);
            assert!(params.leverage >= 10 && params.leverage <= 20);
            assert!(params.hold_duration_secs >= 1200 && params.hold_duration_secs <= 7200);
            assert!(params.cooldown_secs >= 600 && params.cooldown_secs <= 3600);
        }
    }

    #[test]
    fn test_empty_token_list_rejected() {
        let randomizer = default_randomizer();
        assert!(randomizer.select_token(Some(&[])).is_err());
    }

    #[test]
    fn test_random_assignment_roughly_balanced() {
        let randomizer = default_randomizer();
        let total = 1000;

        let extended_long_count = (0..total)
            .filter(|_| {
                let ((_, side), _) = randomizer.assign_sides_random();
                side == PositionSide::Long
            })
            .count();

        // 约50/50（允许45-55%）
        let ratio = extended_long_count as f64 / total as f64;
        assert!(ratio >= 0.45 && ratio <= 0.55, "ratio = {}", ratio);
    }

    #[test]
    fn test_large_funding_gap_biases_assignment() {
        let randomizer = default_randomizer();
        let total = 1000;

        // Extended高正费率（做空方收钱），应偏向在Extended做空
        let extended_short_count = (0..total)
            .filter(|_| {
                let ((_, side), _) = randomizer.assign_sides_with_bias(0.001, -0.0001);
                side == PositionSide::Short
            })
            .count();

        let ratio = extended_short_count as f64 / total as f64;
        assert!(ratio > 0.60, "ratio = {}", ratio);
    }

    #[test]
    fn test_bias_is_never_deterministic() {
        let randomizer = default_randomizer();

        // 即使费率差极大，另一侧也应偶尔被选中
        let total = 1000;
        let extended_long_count = (0..total)
            .filter(|_| {
                let ((_, side), _) = randomizer.assign_sides_with_bias(0.01, -0.01);
                side == PositionSide::Long
            })
            .count();

        assert!(extended_long_count > 0, "强偏置不应退化为确定性选边");
    }

    #[test]
    fn test_external_id_format() {
        let id1 = CryptoRandomizer::generate_external_id();
        let id2 = CryptoRandomizer::generate_external_id();

        assert_eq!(id1.len(), 32); // 128位的hex编码
        assert!(id1.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_nonce_distribution() {
        let a = CryptoRandomizer::generate_nonce();
        let b = CryptoRandomizer::generate_nonce();
        assert_ne!(a, b);
    }
}
