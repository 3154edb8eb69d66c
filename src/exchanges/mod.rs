// 交易所适配器实现
pub mod extended;
pub mod mock;
pub mod tradexyz;

// 导出交易所实现
pub use extended::ExtendedExchange;
pub use mock::MockExchange;
pub use tradexyz::TradeXyzExchange;
