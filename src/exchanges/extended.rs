//! Extended交易所适配器
//!
//! REST实现：公开行情直接GET，私有接口用API Key + HMAC签名。
//! 模拟模式下私有操作全部短路为模拟结果，不触碰真实资金。

use crate::core::config::{ExchangeSettings, ExtendedCredentials};
use crate::core::exchange::Exchange;
use crate::core::rate_limiter::RateLimiter;
use crate::core::types::{
    BalanceSnapshot, ExchangeName, MarketInfo, OrderInfo, OrderRequest, OrderStatus, OrderType,
    PositionInfo, PositionSide, Result, TimeInForce, TradeResult,
};
use crate::core::ExchangeError;
use crate::strategies::funding_arbitrage::randomizer::CryptoRandomizer;
use crate::utils::signature::SignatureHelper;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const MAINNET_BASE: &str = "https://api.starknet.extended.exchange";
const TESTNET_BASE: &str = "https://api.starknet.sepolia.extended.exchange";

/// 行情缓存TTL
const MARKET_CACHE_TTL: Duration = Duration::from_secs(5);

/// Extended交易所实现
pub struct ExtendedExchange {
    client: reqwest::Client,
    base_url: String,
    credentials: ExtendedCredentials,
    simulation: bool,
    connected: AtomicBool,
    rate_limiter: RateLimiter,
    market_cache: Mutex<HashMap<String, (MarketInfo, Instant)>>,
}

impl ExtendedExchange {
    pub fn new(
        settings: &ExchangeSettings,
        credentials: ExtendedCredentials,
        simulation: bool,
        requests_per_minute: u32,
    ) -> Result<Self> {
        let base_url = if settings.network == "testnet" {
            TESTNET_BASE.to_string()
        } else {
            MAINNET_BASE.to_string()
        };

        let client = reqwest::Client::builder()
            .user_agent("rustfra/0.1.0")
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ExchangeError::ConfigError(format!("创建HTTP客户端失败: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            credentials,
            simulation,
            connected: AtomicBool::new(false),
            rate_limiter: RateLimiter::new(requests_per_minute, None),
            market_cache: Mutex::new(HashMap::new()),
        })
    }

    /// 发送GET请求（带限流与签名头）
    async fn get_request(&self, path: &str) -> Result<Value> {
        self.rate_limiter.acquire().await;

        let timestamp = SignatureHelper::timestamp().to_string();
        let signature = SignatureHelper::extended_signature(
            &self.credentials.api_secret,
            &timestamp,
            "GET",
            path,
            "",
        );

        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .header("X-Api-Key", &self.credentials.api_key)
            .header("X-Timestamp", &timestamp)
            .header("X-Signature", &signature)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// 发送POST请求（带限流与签名头）
    async fn post_request(&self, path: &str, body: &Value) -> Result<Value> {
        self.rate_limiter.acquire().await;

        let body_str = serde_json::to_string(body)?;
        let timestamp = SignatureHelper::timestamp().to_string();
        let signature = SignatureHelper::extended_signature(
            &self.credentials.api_secret,
            &timestamp,
            "POST",
            path,
            &body_str,
        );

        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .header("X-Api-Key", &self.credentials.api_key)
            .header("X-Timestamp", &timestamp)
            .header("X-Signature", &signature)
            .json(body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn parse_response(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ExchangeError::ApiError {
                code: status.as_u16() as i32,
                message: text,
            });
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| ExchangeError::ParseError(e.to_string()))?;
        Ok(value)
    }

    /// API返回的数值多为字符串，统一转换
    fn as_f64(value: &Value) -> f64 {
        match value {
            Value::Number(n) => n.as_f64().unwrap_or(0.0),
            Value::String(s) => s.parse().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    fn as_i64(value: &Value) -> i64 {
        match value {
            Value::Number(n) => n.as_i64().unwrap_or(0),
            Value::String(s) => s.parse().unwrap_or(0),
            _ => 0,
        }
    }

    fn parse_side(value: &Value) -> PositionSide {
        match value.as_str().unwrap_or("LONG") {
            "SHORT" => PositionSide::Short,
            _ => PositionSide::Long,
        }
    }

    fn parse_position(&self, pos: &Value) -> PositionInfo {
        PositionInfo {
            exchange: ExchangeName::Extended,
            symbol: pos["market"].as_str().unwrap_or("").to_string(),
            side: Self::parse_side(&pos["side"]),
            size: Self::as_f64(&pos["size"]),
            value: Self::as_f64(&pos["value"]),
            entry_price: Self::as_f64(&pos["openPrice"]),
            mark_price: Self::as_f64(&pos["markPrice"]),
            liquidation_price: pos
                .get("liquidationPrice")
                .filter(|v| !v.is_null())
                .map(Self::as_f64),
            unrealized_pnl: Self::as_f64(&pos["unrealisedPnl"]),
            leverage: Self::as_f64(&pos["leverage"]) as u32,
            margin: Self::as_f64(&pos["margin"]),
        }
    }

    fn parse_order(&self, order: &Value) -> OrderInfo {
        let status = match order["status"].as_str().unwrap_or("NEW") {
            "FILLED" => OrderStatus::Filled,
            "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
            "CANCELLED" => OrderStatus::Cancelled,
            "REJECTED" => OrderStatus::Rejected,
            "EXPIRED" => OrderStatus::Expired,
            _ => OrderStatus::New,
        };

        OrderInfo {
            order_id: Self::as_i64(&order["id"]).to_string(),
            external_id: order["externalId"].as_str().map(String::from),
            exchange: ExchangeName::Extended,
            symbol: order["market"].as_str().unwrap_or("").to_string(),
            side: Self::parse_side(&order["side"]),
            order_type: OrderType::Market,
            status,
            quantity: Self::as_f64(&order["qty"]),
            filled_quantity: Self::as_f64(&order["filledQty"]),
            price: order.get("price").filter(|v| !v.is_null()).map(Self::as_f64),
            created_time: chrono::Utc::now(),
        }
    }

    /// 数量/价格按市场步长向下/就近对齐
    fn quantize(value: f64, step: f64) -> f64 {
        if step <= 0.0 {
            return value;
        }
        (value / step).floor() * step
    }
}

#[async_trait]
impl Exchange for ExtendedExchange {
    fn name(&self) -> &str {
        "Extended"
    }

    async fn connect(&self) -> Result<bool> {
        if self.simulation {
            // 模拟模式跳过凭证校验
            log::info!("✅ Extended已连接 (模拟模式)");
            self.connected.store(true, Ordering::SeqCst);
            return Ok(true);
        }

        let response = self.get_request("/api/v1/user/account/info").await?;
        let ok = response["status"].as_str() == Some("OK");

        if ok {
            log::info!("✅ 已连接Extended (vault={})", self.credentials.vault);
            self.connected.store(true, Ordering::SeqCst);
        } else {
            log::error!("❌ Extended连接失败: {}", response);
        }

        Ok(ok)
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        log::info!("Extended已断开");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn get_market_info(&self, symbol: &str) -> Result<MarketInfo> {
        // 5秒内的缓存直接复用
        {
            let cache = self.market_cache.lock().expect("Lock poisoned");
            if let Some((info, fetched)) = cache.get(symbol) {
                if fetched.elapsed() < MARKET_CACHE_TTL {
                    return Ok(info.clone());
                }
            }
        }

        let response = self
            .get_request(&format!("/api/v1/info/markets?market={}", symbol))
            .await?;

        if response["status"].as_str() != Some("OK") {
            return Err(ExchangeError::SymbolError(format!(
                "获取{}行情失败",
                symbol
            )));
        }

        let market = response["data"]
            .get(0)
            .ok_or_else(|| ExchangeError::SymbolError(symbol.to_string()))?;

        let stats = &market["marketStats"];
        let config = &market["tradingConfig"];

        let info = MarketInfo {
            symbol: market["name"].as_str().unwrap_or(symbol).to_string(),
            base_asset: market["assetName"].as_str().unwrap_or("").to_string(),
            quote_asset: market["collateralAssetName"]
                .as_str()
                .unwrap_or("USD")
                .to_string(),
            mark_price: Self::as_f64(&stats["markPrice"]),
            index_price: Self::as_f64(&stats["indexPrice"]),
            last_price: Self::as_f64(&stats["lastPrice"]),
            bid_price: Self::as_f64(&stats["bidPrice"]),
            ask_price: Self::as_f64(&stats["askPrice"]),
            funding_rate: Self::as_f64(&stats["fundingRate"]),
            next_funding_time: Self::as_i64(&stats["nextFundingRate"]),
            min_order_size: Self::as_f64(&config["minOrderSize"]),
            min_order_size_change: Self::as_f64(&config["minOrderSizeChange"]),
            min_price_change: Self::as_f64(&config["minPriceChange"]),
            max_leverage: Self::as_f64(&config["maxLeverage"]) as u32,
            is_active: market["active"].as_bool().unwrap_or(false),
        };

        self.market_cache
            .lock()
            .expect("Lock poisoned")
            .insert(symbol.to_string(), (info.clone(), Instant::now()));

        Ok(info)
    }

    async fn get_balance(&self) -> Result<BalanceSnapshot> {
        let response = self.get_request("/api/v1/user/balance").await?;

        if response["status"].as_str() != Some("OK") {
            return Err(ExchangeError::ApiError {
                code: -1,
                message: "获取Extended余额失败".to_string(),
            });
        }

        let data = &response["data"];
        Ok(BalanceSnapshot {
            available: Self::as_f64(&data["availableForTrade"]),
            equity: Self::as_f64(&data["equity"]),
            margin_used: Self::as_f64(&data["initialMargin"]),
            currency: data["collateralName"].as_str().unwrap_or("USD").to_string(),
        })
    }

    async fn get_positions(&self, symbol: Option<&str>) -> Result<Vec<PositionInfo>> {
        if self.simulation {
            return Ok(Vec::new());
        }

        let path = match symbol {
            Some(s) => format!("/api/v1/user/positions?market={}", s),
            None => "/api/v1/user/positions".to_string(),
        };

        let response = self.get_request(&path).await?;
        if response["status"].as_str() != Some("OK") {
            return Ok(Vec::new());
        }

        let positions = response["data"]
            .as_array()
            .map(|arr| arr.iter().map(|p| self.parse_position(p)).collect())
            .unwrap_or_default();

        Ok(positions)
    }

    async fn get_open_orders(&self, symbol: Option<&str>) -> Result<Vec<OrderInfo>> {
        if self.simulation {
            return Ok(Vec::new());
        }

        let path = match symbol {
            Some(s) => format!("/api/v1/user/orders?market={}", s),
            None => "/api/v1/user/orders".to_string(),
        };

        let response = self.get_request(&path).await?;
        if response["status"].as_str() != Some("OK") {
            return Ok(Vec::new());
        }

        let orders = response["data"]
            .as_array()
            .map(|arr| arr.iter().map(|o| self.parse_order(o)).collect())
            .unwrap_or_default();

        Ok(orders)
    }

    async fn place_order(&self, request: OrderRequest) -> Result<TradeResult> {
        if self.simulation {
            log::info!(
                "🧪 模拟下单 Extended: {} {} {}",
                request.symbol,
                request.side,
                request.quantity
            );
            let mut result = TradeResult::ok(
                format!("sim_{}", CryptoRandomizer::generate_external_id()),
                request.quantity,
                request.price.unwrap_or(0.0),
            );
            result.external_id = request.external_id;
            return Ok(result);
        }

        let market = self.get_market_info(&request.symbol).await?;

        // 数量对齐步长后仍需满足最小下单量
        let qty = Self::quantize(request.quantity, market.min_order_size_change);
        if qty < market.min_order_size {
            return Ok(TradeResult::rejected(
                "SIZE_TOO_SMALL",
                &format!("数量 {} 低于最小下单量 {}", qty, market.min_order_size),
            ));
        }

        // 市价单按最新价偏移1%下限价，保证吃单成交
        let raw_price = request.price.unwrap_or(match request.side {
            PositionSide::Long => market.last_price * 1.01,
            PositionSide::Short => market.last_price * 0.99,
        });
        let price = Self::quantize(raw_price, market.min_price_change);

        let tif = match request.time_in_force {
            TimeInForce::GTC => "GTC",
            TimeInForce::GTT => "GTT",
            TimeInForce::IOC => "IOC",
            TimeInForce::FOK => "FOK",
        };

        let body = serde_json::json!({
            "market": request.symbol,
            "side": match request.side {
                PositionSide::Long => "BUY",
                PositionSide::Short => "SELL",
            },
            "qty": qty.to_string(),
            "price": price.to_string(),
            "type": match request.order_type {
                OrderType::Market => "MARKET",
                OrderType::Limit => "LIMIT",
            },
            "timeInForce": tif,
            "reduceOnly": request.reduce_only,
            "externalId": request.external_id.clone(),
            "nonce": CryptoRandomizer::generate_nonce(),
        });

        let response = self.post_request("/api/v1/user/order", &body).await?;

        if response["status"].as_str() == Some("OK") {
            let data = &response["data"];
            let mut result = TradeResult::ok(
                Self::as_i64(&data["id"]).to_string(),
                Self::as_f64(&data["filledQty"]),
                Self::as_f64(&data["averagePrice"]),
            );
            result.external_id = request.external_id;
            Ok(result)
        } else {
            let message = response["error"]["message"]
                .as_str()
                .unwrap_or("下单失败")
                .to_string();
            Ok(TradeResult::rejected("ORDER_FAILED", &message))
        }
    }

    async fn cancel_order(&self, order_id: &str) -> Result<bool> {
        if self.simulation {
            log::info!("🧪 模拟撤单 Extended: {}", order_id);
            return Ok(true);
        }

        let body = serde_json::json!({ "orderId": order_id });
        let response = self.post_request("/api/v1/user/order/cancel", &body).await?;
        Ok(response["status"].as_str() == Some("OK"))
    }

    async fn cancel_all_orders(&self, symbol: Option<&str>) -> Result<u32> {
        if self.simulation {
            log::info!("🧪 模拟全部撤单 Extended: {:?}", symbol);
            return Ok(0);
        }

        let body = serde_json::json!({ "market": symbol });
        let response = self
            .post_request("/api/v1/user/order/massCancel", &body)
            .await?;

        if response["status"].as_str() == Some("OK") {
            Ok(Self::as_i64(&response["data"]["cancelledCount"]) as u32)
        } else {
            Ok(0)
        }
    }

    async fn close_position(&self, symbol: &str, quantity: Option<f64>) -> Result<TradeResult> {
        if self.simulation {
            log::info!("🧪 模拟平仓 Extended: {}", symbol);
            return Ok(TradeResult::ok(
                format!("sim_{}", CryptoRandomizer::generate_external_id()),
                quantity.unwrap_or(0.0),
                0.0,
            ));
        }

        let positions = self.get_positions(Some(symbol)).await?;
        let Some(position) = positions.first() else {
            return Err(ExchangeError::PositionNotFound {
                symbol: symbol.to_string(),
                exchange: "Extended".to_string(),
            });
        };

        let close_qty = quantity.unwrap_or(position.size);

        // 反向reduce-only市价单平仓
        let request = OrderRequest::market(symbol, position.side.opposite(), close_qty)
            .reduce_only()
            .with_external_id(CryptoRandomizer::generate_external_id());

        self.place_order(request).await
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<bool> {
        if self.simulation {
            log::info!("🧪 模拟设置杠杆 Extended: {} {}x", symbol, leverage);
            return Ok(true);
        }

        let body = serde_json::json!({ "market": symbol, "leverage": leverage.to_string() });
        let response = self.post_request("/api/v1/user/leverage", &body).await?;
        Ok(response["status"].as_str() == Some("OK"))
    }

    async fn get_leverage(&self, symbol: &str) -> Result<u32> {
        let response = self
            .get_request(&format!("/api/v1/user/leverage?market={}", symbol))
            .await?;

        if response["status"].as_str() == Some("OK") {
            if let Some(entry) = response["data"].get(0) {
                return Ok(Self::as_f64(&entry["leverage"]) as u32);
            }
        }
        Ok(1)
    }

    fn market_symbol(&self, token: &str) -> String {
        if token.contains('-') {
            token.to_string()
        } else {
            format!("{}-USD", token)
        }
    }
}
