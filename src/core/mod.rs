// 核心模块 - 只包含核心业务逻辑
pub mod config;
pub mod constants;
pub mod error;
pub mod exchange;
pub mod rate_limiter;
pub mod retry_policy;
pub mod types;

pub use config::*;
pub use error::*;
pub use exchange::Exchange;
pub use rate_limiter::RateLimiter;
pub use retry_policy::{retry_async, ExponentialBackoffRetry, RetryConfig};
pub use types::{
    BalanceSnapshot, CycleState, ExchangeName, MarketInfo, OrderInfo, OrderRequest, OrderStatus,
    OrderType, PositionInfo, PositionSide, Result, TimeInForce, TradeResult,
};
