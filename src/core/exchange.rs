use crate::core::types::{
    BalanceSnapshot, MarketInfo, OrderInfo, OrderRequest, PositionInfo, Result, TradeResult,
};
use async_trait::async_trait;

/// 交易所通用接口trait
///
/// 核心策略层只依赖该接口，对冲的两条腿各由一个具体实现承载。
/// 任何方法都可能以瞬时网络错误（可重试）或交易所拒绝（不重试）失败。
#[async_trait]
pub trait Exchange: Send + Sync {
    /// 获取交易所名称
    fn name(&self) -> &str;

    // === 连接管理 ===

    /// 建立连接（校验凭证、预热市场元数据）
    async fn connect(&self) -> Result<bool>;

    /// 断开连接
    async fn disconnect(&self) -> Result<()>;

    /// 连接状态
    fn is_connected(&self) -> bool;

    // === 市场数据 ===

    /// 获取市场信息（标记/指数/最新/买卖价、资金费率、交易规则）
    async fn get_market_info(&self, symbol: &str) -> Result<MarketInfo>;

    /// 获取当前资金费率
    async fn get_funding_rate(&self, symbol: &str) -> Result<f64> {
        Ok(self.get_market_info(symbol).await?.funding_rate)
    }

    /// 获取标记价格
    async fn get_mark_price(&self, symbol: &str) -> Result<f64> {
        Ok(self.get_market_info(symbol).await?.mark_price)
    }

    // === 账户数据 ===

    /// 获取账户余额
    async fn get_balance(&self) -> Result<BalanceSnapshot>;

    /// 获取持仓（symbol为None时返回全部）
    async fn get_positions(&self, symbol: Option<&str>) -> Result<Vec<PositionInfo>>;

    /// 获取活跃订单
    async fn get_open_orders(&self, symbol: Option<&str>) -> Result<Vec<OrderInfo>>;

    // === 订单管理 ===

    /// 下单
    ///
    /// 下单请求绝不在本层自动重试，重复成交风险由调用方的
    /// external_id幂等标记控制。
    async fn place_order(&self, request: OrderRequest) -> Result<TradeResult>;

    /// 取消订单
    async fn cancel_order(&self, order_id: &str) -> Result<bool>;

    /// 取消全部订单，返回取消数量
    async fn cancel_all_orders(&self, symbol: Option<&str>) -> Result<u32>;

    // === 持仓管理 ===

    /// 平仓（quantity为None时全部平掉）
    async fn close_position(&self, symbol: &str, quantity: Option<f64>) -> Result<TradeResult>;

    /// 设置杠杆
    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<bool>;

    /// 查询当前杠杆
    async fn get_leverage(&self, symbol: &str) -> Result<u32>;

    // === 工具方法 ===

    /// 币种到交易所市场符号的转换（如 BTC -> BTC-USD）
    fn market_symbol(&self, token: &str) -> String;
}
