pub mod core;
pub mod exchanges;
pub mod strategies;
pub mod utils;

// 选择性导出，避免命名冲突
pub use self::core::{config::*, error::*, exchange::Exchange, types::*};
pub use self::exchanges::{ExtendedExchange, MockExchange, TradeXyzExchange};
pub use self::strategies::funding_arbitrage::{
    AtomicExecutor, CryptoRandomizer, CycleResult, FundingAnalyzer, PositionSizer, RiskValidator,
    SafetyMonitor, TradeManager,
};
