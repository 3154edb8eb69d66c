//! 脚本化的模拟交易所
//!
//! 确定性的Exchange实现，供编排器/执行器/安全层在零网络依赖下
//! 测试。行为可按脚本配置：指定失败点、预置仓位、调整行情。

use crate::core::exchange::Exchange;
use crate::core::types::{
    BalanceSnapshot, ExchangeName, MarketInfo, OrderInfo, OrderRequest, PositionInfo, PositionSide,
    Result, TradeResult,
};
use crate::core::ExchangeError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// 可脚本化的失败开关
#[derive(Default)]
struct FailureScript {
    place_order: Option<String>,
    close_position: Option<String>,
    set_leverage: bool,
    get_positions: bool,
    get_balance: bool,
}

/// 模拟交易所
pub struct MockExchange {
    name: ExchangeName,
    connected: AtomicBool,

    mark_price: Mutex<f64>,
    funding_rate: Mutex<f64>,
    balance: Mutex<BalanceSnapshot>,

    positions: Mutex<HashMap<String, PositionInfo>>,
    open_orders: Mutex<Vec<OrderInfo>>,

    failures: Mutex<FailureScript>,
    last_leverage: Mutex<Option<u32>>,

    place_order_calls: AtomicU32,
    close_position_calls: AtomicU32,
    cancel_all_calls: AtomicU32,

    next_order_seq: AtomicU32,
}

impl MockExchange {
    pub fn new(name: ExchangeName) -> Arc<Self> {
        Arc::new(Self {
            name,
            connected: AtomicBool::new(true),
            mark_price: Mutex::new(50_000.0),
            funding_rate: Mutex::new(0.0001),
            balance: Mutex::new(BalanceSnapshot::new(10_000.0, 10_000.0, 0.0)),
            positions: Mutex::new(HashMap::new()),
            open_orders: Mutex::new(Vec::new()),
            failures: Mutex::new(FailureScript::default()),
            last_leverage: Mutex::new(None),
            place_order_calls: AtomicU32::new(0),
            close_position_calls: AtomicU32::new(0),
            cancel_all_calls: AtomicU32::new(0),
            next_order_seq: AtomicU32::new(1),
        })
    }

    /// Extended风格的模拟实例（符号形如 BTC-USD）
    pub fn extended() -> Arc<Self> {
        Self::new(ExchangeName::Extended)
    }

    /// TradeXYZ风格的模拟实例（符号即币种）
    pub fn tradexyz() -> Arc<Self> {
        Self::new(ExchangeName::TradeXyz)
    }

    // === 脚本配置 ===

    pub fn with_mark_price(self: Arc<Self>, price: f64) -> Arc<Self> {
        *self.mark_price.lock().expect("Lock poisoned") = price;
        self
    }

    pub fn set_mark_price(&self, price: f64) {
        *self.mark_price.lock().expect("Lock poisoned") = price;
    }

    pub fn set_funding_rate(&self, rate: f64) {
        *self.funding_rate.lock().expect("Lock poisoned") = rate;
    }

    pub fn set_balance(&self, available: f64, equity: f64, margin_used: f64) {
        *self.balance.lock().expect("Lock poisoned") =
            BalanceSnapshot::new(available, equity, margin_used);
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn fail_place_order(&self, message: &str) {
        self.failures.lock().expect("Lock poisoned").place_order = Some(message.to_string());
    }

    pub fn fail_close_position(&self, message: &str) {
        self.failures.lock().expect("Lock poisoned").close_position = Some(message.to_string());
    }

    pub fn fail_set_leverage(&self) {
        self.failures.lock().expect("Lock poisoned").set_leverage = true;
    }

    pub fn fail_get_positions(&self) {
        self.failures.lock().expect("Lock poisoned").get_positions = true;
    }

    pub fn fail_get_balance(&self) {
        self.failures.lock().expect("Lock poisoned").get_balance = true;
    }

    /// 预置一个已存在的仓位
    pub fn seed_position(&self, symbol: &str, side: PositionSide, size: f64, price: f64, leverage: u32) {
        let position = PositionInfo {
            exchange: self.name,
            symbol: symbol.to_string(),
            side,
            size,
            value: size * price,
            entry_price: price,
            mark_price: price,
            liquidation_price: None,
            unrealized_pnl: 0.0,
            leverage,
            margin: size * price / leverage as f64,
        };
        self.positions
            .lock()
            .expect("Lock poisoned")
            .insert(symbol.to_string(), position);
    }

    // === 调用观测 ===

    pub fn place_order_calls(&self) -> u32 {
        self.place_order_calls.load(Ordering::SeqCst)
    }

    pub fn close_position_calls(&self) -> u32 {
        self.close_position_calls.load(Ordering::SeqCst)
    }

    pub fn cancel_all_calls(&self) -> u32 {
        self.cancel_all_calls.load(Ordering::SeqCst)
    }

    pub fn last_leverage(&self) -> Option<u32> {
        *self.last_leverage.lock().expect("Lock poisoned")
    }

    pub fn position_count(&self) -> usize {
        self.positions.lock().expect("Lock poisoned").len()
    }

    fn next_order_id(&self) -> String {
        let seq = self.next_order_seq.fetch_add(1, Ordering::SeqCst);
        format!("mock-{}-{}", self.name, seq)
    }
}

#[async_trait]
impl Exchange for MockExchange {
    fn name(&self) -> &str {
        match self.name {
            ExchangeName::Extended => "Extended",
            ExchangeName::TradeXyz => "TradeXYZ",
        }
    }

    async fn connect(&self) -> Result<bool> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(true)
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn get_market_info(&self, symbol: &str) -> Result<MarketInfo> {
        let price = *self.mark_price.lock().expect("Lock poisoned");
        let funding = *self.funding_rate.lock().expect("Lock poisoned");

        let base = symbol.split('-').next().unwrap_or(symbol).to_string();

        Ok(MarketInfo {
            symbol: symbol.to_string(),
            base_asset: base,
            quote_asset: "USD".to_string(),
            mark_price: price,
            index_price: price,
            last_price: price,
            bid_price: price * 0.9999,
            ask_price: price * 1.0001,
            funding_rate: funding,
            next_funding_time: chrono::Utc::now().timestamp_millis() + 3_600_000,
            min_order_size: 0.0001,
            min_order_size_change: 0.0001,
            min_price_change: 0.1,
            max_leverage: 50,
            is_active: true,
        })
    }

    async fn get_balance(&self) -> Result<BalanceSnapshot> {
        if self.failures.lock().expect("Lock poisoned").get_balance {
            return Err(ExchangeError::ApiError {
                code: 503,
                message: "scripted balance failure".to_string(),
            });
        }
        Ok(self.balance.lock().expect("Lock poisoned").clone())
    }

    async fn get_positions(&self, symbol: Option<&str>) -> Result<Vec<PositionInfo>> {
        if self.failures.lock().expect("Lock poisoned").get_positions {
            return Err(ExchangeError::ApiError {
                code: 503,
                message: "scripted positions failure".to_string(),
            });
        }

        let positions = self.positions.lock().expect("Lock poisoned");
        Ok(positions
            .values()
            .filter(|p| symbol.map_or(true, |s| p.symbol == s))
            .cloned()
            .collect())
    }

    async fn get_open_orders(&self, symbol: Option<&str>) -> Result<Vec<OrderInfo>> {
        let orders = self.open_orders.lock().expect("Lock poisoned");
        Ok(orders
            .iter()
            .filter(|o| symbol.map_or(true, |s| o.symbol == s))
            .cloned()
            .collect())
    }

    async fn place_order(&self, request: OrderRequest) -> Result<TradeResult> {
        self.place_order_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = &self.failures.lock().expect("Lock poisoned").place_order {
            return Ok(TradeResult::rejected("MOCK_REJECT", message));
        }

        let price = *self.mark_price.lock().expect("Lock poisoned");
        let order_id = self.next_order_id();

        // 市价单立即全量成交并登记仓位
        if !request.reduce_only {
            let leverage = request.leverage.unwrap_or(
                self.last_leverage
                    .lock()
                    .expect("Lock poisoned")
                    .unwrap_or(1),
            );
            self.seed_position(&request.symbol, request.side, request.quantity, price, leverage);
        }

        let mut result = TradeResult::ok(order_id, request.quantity, price);
        result.external_id = request.external_id;
        Ok(result)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<bool> {
        let mut orders = self.open_orders.lock().expect("Lock poisoned");
        let before = orders.len();
        orders.retain(|o| o.order_id != order_id);
        Ok(orders.len() < before)
    }

    async fn cancel_all_orders(&self, symbol: Option<&str>) -> Result<u32> {
        self.cancel_all_calls.fetch_add(1, Ordering::SeqCst);
        let mut orders = self.open_orders.lock().expect("Lock poisoned");
        let before = orders.len();
        orders.retain(|o| symbol.map_or(false, |s| o.symbol != s));
        Ok((before - orders.len()) as u32)
    }

    async fn close_position(&self, symbol: &str, quantity: Option<f64>) -> Result<TradeResult> {
        self.close_position_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = &self.failures.lock().expect("Lock poisoned").close_position {
            return Ok(TradeResult::rejected("MOCK_REJECT", message));
        }

        let mut positions = self.positions.lock().expect("Lock poisoned");
        let Some(position) = positions.get(symbol).cloned() else {
            return Err(ExchangeError::PositionNotFound {
                symbol: symbol.to_string(),
                exchange: self.name.to_string(),
            });
        };

        let close_qty = quantity.unwrap_or(position.size).min(position.size);

        if close_qty >= position.size {
            positions.remove(symbol);
        } else if let Some(p) = positions.get_mut(symbol) {
            p.size -= close_qty;
            p.value = p.size * p.mark_price;
        }

        Ok(TradeResult::ok(self.next_order_id(), close_qty, position.mark_price))
    }

    async fn set_leverage(&self, _symbol: &str, leverage: u32) -> Result<bool> {
        if self.failures.lock().expect("Lock poisoned").set_leverage {
            return Err(ExchangeError::ApiError {
                code: 400,
                message: "scripted leverage failure".to_string(),
            });
        }
        *self.last_leverage.lock().expect("Lock poisoned") = Some(leverage);
        Ok(true)
    }

    async fn get_leverage(&self, _symbol: &str) -> Result<u32> {
        Ok(self
            .last_leverage
            .lock()
            .expect("Lock poisoned")
            .unwrap_or(1))
    }

    fn market_symbol(&self, token: &str) -> String {
        match self.name {
            ExchangeName::Extended => format!("{}-USD", token),
            ExchangeName::TradeXyz => token.to_string(),
        }
    }
}
