//! 策略常量定义
//! 支持的币种、资金费率偏置阈值与内部算法参数

/// 支持交易的币种
pub const SUPPORTED_TOKENS: [&str; 4] = ["BTC", "ETH", "SOL", "HYPE"];

// ============= 资金费率偏置 =============

/// 费率差分档阈值
///
/// SMALL:    [0, 0.0001)   差异 < 0.01%，接近随机
/// MODERATE: [0.0001, 0.0005)  温和偏置
/// LARGE:    [0.0005, ∞)   强偏置
pub const FUNDING_BIAS_SMALL_MAX: f64 = 0.0001;
pub const FUNDING_BIAS_LARGE_MIN: f64 = 0.0005;

/// 低于该值的费率差视为无意义（分析器返回 NONE）
pub const MIN_MEANINGFUL_FUNDING_DIFF: f64 = 0.00001;

/// 各分档对应的选边概率权重（有利方 : 另一方）
pub const FUNDING_BIAS_WEIGHT_SMALL: f64 = 0.50;
pub const FUNDING_BIAS_WEIGHT_MODERATE: f64 = 0.60;
pub const FUNDING_BIAS_WEIGHT_LARGE: f64 = 0.75;

// ============= 内部算法参数（非用户可配置） =============

/// 仓位计算的安全系数，为滑点和手续费预留余量
pub const SAFETY_BUFFER: f64 = 0.95;

/// 随机化离散步数，提供千分之一级分辨率
pub const RANDOMIZATION_STEPS: u64 = 1000;

/// 双边仓位大小允许的不平衡容差（1%）
pub const SIZE_IMBALANCE_TOLERANCE: f64 = 0.01;

/// 持仓期间安全检查轮询间隔（秒）
pub const SAFETY_CHECK_INTERVAL_SECONDS: u64 = 30;

/// 安全监控独立循环的检查间隔（秒）
pub const SAFETY_LOOP_INTERVAL_SECONDS: u64 = 5;

/// 资金费率结算周期（8小时），用于收益估算
pub const FUNDING_INTERVAL_SECONDS: u64 = 28800;

// ============= 默认交易参数（可被配置覆盖） =============

pub mod defaults {
    pub const MIN_EQUITY_USAGE: f64 = 0.40;
    pub const MAX_EQUITY_USAGE: f64 = 0.80;

    pub const MIN_LEVERAGE: u32 = 10;
    pub const MAX_LEVERAGE: u32 = 20;

    pub const MIN_HOLD_DURATION_SECS: u64 = 1200; // 20分钟
    pub const MAX_HOLD_DURATION_SECS: u64 = 7200; // 2小时
    pub const MIN_COOLDOWN_SECS: u64 = 600; // 10分钟
    pub const MAX_COOLDOWN_SECS: u64 = 3600; // 60分钟

    pub const MAX_POSITION_VALUE_USD: f64 = 100_000.0;
    pub const MIN_POSITION_VALUE_USD: f64 = 10.0;
    pub const MIN_BALANCE_USD: f64 = 100.0;
    pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;
    pub const MAX_SLIPPAGE_PERCENT: f64 = 0.5;

    pub const API_TIMEOUT_SECS: u64 = 30;
    pub const ORDER_TIMEOUT_SECS: u64 = 60;
    pub const REQUESTS_PER_MINUTE: u32 = 600;
}
