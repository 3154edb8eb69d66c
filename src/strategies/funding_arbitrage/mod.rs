//! # 资金费率套利策略 (Delta-Neutral Funding Rate Arbitrage)
//!
//! 在两家独立的永续合约交易所持有等量反向的杠杆仓位，
//! 在保持方向中性的同时赚取资金费率差。
//!
//! ## 模块组成
//! - randomizer  加密安全的参数随机化与选边
//! - funding     资金费率分析（纯函数）
//! - sizing      双边匹配的仓位计算（纯函数）
//! - risk        交易前风险校验（纯函数）
//! - executor    双腿原子执行与回滚
//! - safety      进程级安全看门狗
//! - manager     周期状态机与连续运行编排

pub mod executor;
pub mod funding;
pub mod manager;
pub mod randomizer;
pub mod result;
pub mod risk;
pub mod safety;
pub mod sizing;

pub use executor::{AtomicExecutor, ExecutionResult, ExecutionState, LegErrorKind, LegResult};
pub use funding::{FundingAnalysisResult, FundingAnalyzer, FundingBias, FundingRateInfo};
pub use manager::TradeManager;
pub use randomizer::{CryptoRandomizer, CycleParams};
pub use result::{CycleResult, CycleResultBuilder};
pub use risk::{RiskAssessment, RiskCheckResult, RiskLevel, RiskValidator};
pub use safety::{EmergencyAction, EmergencyReason, SafetyMonitor};
pub use sizing::{PositionSizer, SizingResult};
