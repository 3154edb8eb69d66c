use chrono::{DateTime, Utc};
/// 统一的类型定义模块
/// 整合了双交易所对冲交易相关的数据结构
use serde::{Deserialize, Serialize};

// ============= 基础类型定义 =============

/// 结果类型别名
pub type Result<T> = std::result::Result<T, crate::core::error::ExchangeError>;

/// 交易所标识
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExchangeName {
    Extended,
    TradeXyz,
}

impl std::fmt::Display for ExchangeName {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ExchangeName::Extended => write!(f, "Extended"),
            ExchangeName::TradeXyz => write!(f, "TradeXYZ"),
        }
    }
}

/// 持仓方向
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// 对侧方向（平仓时使用）
    pub fn opposite(&self) -> Self {
        match self {
            PositionSide::Long => PositionSide::Short,
            PositionSide::Short => PositionSide::Long,
        }
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            PositionSide::Long => write!(f, "LONG"),
            PositionSide::Short => write!(f, "SHORT"),
        }
    }
}

/// 订单类型
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
}

/// 订单状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Expired,
}

/// 时间有效性
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum TimeInForce {
    GTC, // Good Till Cancel
    GTT, // Good Till Time
    IOC, // Immediate Or Cancel
    FOK, // Fill Or Kill
}

/// 交易周期状态机
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleState {
    Idle,
    Opening,
    Holding,
    Closing,
    Cooldown,
    Error,
    Emergency,
}

// ============= 市场数据 =============

/// 市场信息（下单所需的全部市场参数）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketInfo {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,

    // 价格信息
    pub mark_price: f64,
    pub index_price: f64,
    pub last_price: f64,
    pub bid_price: f64,
    pub ask_price: f64,

    // 资金费率
    pub funding_rate: f64,
    pub next_funding_time: i64,

    // 交易规则
    pub min_order_size: f64,
    pub min_order_size_change: f64,
    pub min_price_change: f64,
    pub max_leverage: u32,

    // 状态
    pub is_active: bool,
}

// ============= 账户数据 =============

/// 账户余额快照
///
/// 每个周期开始时从双边交易所各取一次，绝不跨周期缓存。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub available: f64,
    pub equity: f64,
    pub margin_used: f64,
    pub currency: String,
}

impl BalanceSnapshot {
    pub fn new(available: f64, equity: f64, margin_used: f64) -> Self {
        Self {
            available,
            equity,
            margin_used,
            currency: "USD".to_string(),
        }
    }
}

/// 持仓信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionInfo {
    pub exchange: ExchangeName,
    pub symbol: String,
    pub side: PositionSide,
    pub size: f64,
    pub value: f64,
    pub entry_price: f64,
    pub mark_price: f64,
    pub liquidation_price: Option<f64>,
    pub unrealized_pnl: f64,
    pub leverage: u32,
    pub margin: f64,
}

/// 订单信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderInfo {
    pub order_id: String,
    pub external_id: Option<String>,
    pub exchange: ExchangeName,
    pub symbol: String,
    pub side: PositionSide,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub quantity: f64,
    pub filled_quantity: f64,
    pub price: Option<f64>,
    pub created_time: DateTime<Utc>,
}

// ============= 执行结果 =============

/// 下单执行结果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeResult {
    pub success: bool,
    pub order_id: Option<String>,
    pub external_id: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,

    // 成交信息（异步API可能为部分或零）
    pub filled_quantity: f64,
    pub average_price: f64,
    pub fee_paid: f64,
}

impl TradeResult {
    /// 构造成功结果
    pub fn ok(order_id: String, filled_quantity: f64, average_price: f64) -> Self {
        Self {
            success: true,
            order_id: Some(order_id),
            filled_quantity,
            average_price,
            ..Default::default()
        }
    }

    /// 构造失败结果
    pub fn rejected(code: &str, message: &str) -> Self {
        Self {
            success: false,
            error_code: Some(code.to_string()),
            error_message: Some(message.to_string()),
            ..Default::default()
        }
    }
}

/// 下单请求参数
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: f64,
    pub order_type: OrderType,
    pub price: Option<f64>,
    pub leverage: Option<u32>,
    pub reduce_only: bool,
    pub time_in_force: TimeInForce,
    pub external_id: Option<String>,
}

impl OrderRequest {
    /// 市价单（本策略的默认下单方式）
    pub fn market(symbol: &str, side: PositionSide, quantity: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            quantity,
            order_type: OrderType::Market,
            price: None,
            leverage: None,
            reduce_only: false,
            time_in_force: TimeInForce::IOC,
            external_id: None,
        }
    }

    pub fn with_external_id(mut self, external_id: String) -> Self {
        self.external_id = Some(external_id);
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn reduce_only(mut self) -> Self {
        self.reduce_only = true;
        self
    }
}
