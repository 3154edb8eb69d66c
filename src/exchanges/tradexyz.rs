//! TradeXYZ交易所适配器（Hyperliquid风格接口）
//!
//! 行情走 POST /info（按type分发），交易走 POST /exchange
//! （action + 递增nonce + 签名）。模拟模式下私有操作全部短路。

use crate::core::config::{ExchangeSettings, TradeXyzCredentials};
use crate::core::exchange::Exchange;
use crate::core::rate_limiter::RateLimiter;
use crate::core::types::{
    BalanceSnapshot, ExchangeName, MarketInfo, OrderInfo, OrderRequest, OrderStatus, OrderType,
    PositionInfo, PositionSide, Result, TradeResult,
};
use crate::core::ExchangeError;
use crate::strategies::funding_arbitrage::randomizer::CryptoRandomizer;
use crate::utils::signature::SignatureHelper;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

const MAINNET_BASE: &str = "https://api.hyperliquid.xyz";
const TESTNET_BASE: &str = "https://api.hyperliquid-testnet.xyz";

/// TradeXYZ交易所实现
pub struct TradeXyzExchange {
    client: reqwest::Client,
    base_url: String,
    credentials: TradeXyzCredentials,
    simulation: bool,
    connected: AtomicBool,
    rate_limiter: RateLimiter,
    /// 交易请求要求nonce单调递增
    nonce: AtomicU64,
}

impl TradeXyzExchange {
    pub fn new(
        settings: &ExchangeSettings,
        credentials: TradeXyzCredentials,
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
            nonce: AtomicU64::new(chrono::Utc::now().timestamp_millis() as u64),
        })
    }

    fn next_nonce(&self) -> u64 {
        self.nonce.fetch_add(1, Ordering::SeqCst)
    }

    /// 公开信息请求
    async fn info_request(&self, body: &Value) -> Result<Value> {
        self.rate_limiter.acquire().await;

        let url = format!("{}/info", self.base_url);
        let response = self.client.post(&url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ExchangeError::ApiError {
                code: status.as_u16() as i32,
                message: text,
            });
        }

        response
            .json()
            .await
            .map_err(|e| ExchangeError::ParseError(e.to_string()))
    }

    /// 签名交易请求
    async fn exchange_request(&self, action: Value) -> Result<Value> {
        self.rate_limiter.acquire().await;

        let nonce = self.next_nonce();
        let action_str = serde_json::to_string(&action)?;
        let signature =
            SignatureHelper::tradexyz_signature(&self.credentials.api_secret, &action_str, nonce);

        let body = json!({
            "action": action,
            "nonce": nonce,
            "signature": signature,
            "walletAddress": self.credentials.wallet_address,
        });

        let url = format!("{}/exchange", self.base_url);
        let response = self.client.post(&url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ExchangeError::ApiError {
                code: status.as_u16() as i32,
                message: text,
            });
        }

        response
            .json()
            .await
            .map_err(|e| ExchangeError::ParseError(e.to_string()))
    }

    fn as_f64(value: &Value) -> f64 {
        match value {
            Value::Number(n) => n.as_f64().unwrap_or(0.0),
            Value::String(s) => s.parse().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    /// 在metaAndAssetCtxs响应中定位某个币种的上下文
    ///
    /// 响应形如 [meta, assetCtxs]：meta.universe给出币种顺序，
    /// 第二个元素是同序的资产上下文数组。
    fn find_asset_ctx<'a>(response: &'a Value, coin: &str) -> Option<(&'a Value, &'a Value)> {
        let meta = response.get(0)?;
        let ctxs = response.get(1)?.as_array()?;

        let universe = meta["universe"].as_array()?;
        let index = universe
            .iter()
            .position(|asset| asset["name"].as_str() == Some(coin))?;

        Some((&universe[index], ctxs.get(index)?))
    }

    fn parse_position(&self, pos: &Value) -> Option<PositionInfo> {
        let position = &pos["position"];
        let coin = position["coin"].as_str()?;
        let signed_size = Self::as_f64(&position["szi"]);
        if signed_size == 0.0 {
            return None;
        }

        // 正数=多头，负数=空头
        let side = if signed_size > 0.0 {
            PositionSide::Long
        } else {
            PositionSide::Short
        };

        let entry = Self::as_f64(&position["entryPx"]);
        let size = signed_size.abs();

        Some(PositionInfo {
            exchange: ExchangeName::TradeXyz,
            symbol: coin.to_string(),
            side,
            size,
            value: Self::as_f64(&position["positionValue"]),
            entry_price: entry,
            mark_price: entry,
            liquidation_price: position
                .get("liquidationPx")
                .filter(|v| !v.is_null())
                .map(Self::as_f64),
            unrealized_pnl: Self::as_f64(&position["unrealizedPnl"]),
            leverage: Self::as_f64(&position["leverage"]["value"]) as u32,
            margin: Self::as_f64(&position["marginUsed"]),
        })
    }
}

#[async_trait]
impl Exchange for TradeXyzExchange {
    fn name(&self) -> &str {
        "TradeXYZ"
    }

    async fn connect(&self) -> Result<bool> {
        // meta请求同时验证连通性并确认市场存在
        let response = self.info_request(&json!({ "type": "meta" })).await?;

        let ok = response["universe"].as_array().map_or(false, |u| !u.is_empty());
        if ok {
            log::info!(
                "✅ 已连接TradeXYZ (wallet={}...)",
                &self.credentials.wallet_address.chars().take(8).collect::<String>()
            );
            self.connected.store(true, Ordering::SeqCst);
        } else {
            log::error!("❌ TradeXYZ连接失败: meta响应为空");
        }

        Ok(ok)
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        log::info!("TradeXYZ已断开");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn get_market_info(&self, symbol: &str) -> Result<MarketInfo> {
        let response = self
            .info_request(&json!({ "type": "metaAndAssetCtxs" }))
            .await?;

        let (asset, ctx) = Self::find_asset_ctx(&response, symbol).ok_or_else(|| {
            ExchangeError::SymbolError(format!("TradeXYZ不支持市场: {}", symbol))
        })?;

        let mark_price = Self::as_f64(&ctx["markPx"]);
        let mid_price = Self::as_f64(&ctx["midPx"]);

        // szDecimals决定最小数量步长
        let sz_decimals = asset["szDecimals"].as_u64().unwrap_or(4) as i32;
        let min_size_change = 10f64.powi(-sz_decimals);

        Ok(MarketInfo {
            symbol: symbol.to_string(),
            base_asset: symbol.to_string(),
            quote_asset: "USDC".to_string(),
            mark_price,
            index_price: Self::as_f64(&ctx["oraclePx"]),
            last_price: if mid_price > 0.0 { mid_price } else { mark_price },
            bid_price: mid_price * 0.9999,
            ask_price: mid_price * 1.0001,
            funding_rate: Self::as_f64(&ctx["funding"]),
            next_funding_time: (chrono::Utc::now().timestamp_millis() / 3_600_000 + 1) * 3_600_000,
            min_order_size: min_size_change,
            min_order_size_change: min_size_change,
            min_price_change: 0.0001,
            max_leverage: asset["maxLeverage"].as_u64().unwrap_or(50) as u32,
            is_active: !asset["isDelisted"].as_bool().unwrap_or(false),
        })
    }

    async fn get_balance(&self) -> Result<BalanceSnapshot> {
        let response = self
            .info_request(&json!({
                "type": "clearinghouseState",
                "user": self.credentials.wallet_address,
            }))
            .await?;

        let summary = &response["marginSummary"];
        let account_value = Self::as_f64(&summary["accountValue"]);
        let margin_used = Self::as_f64(&summary["totalMarginUsed"]);
        let withdrawable = Self::as_f64(&response["withdrawable"]);

        Ok(BalanceSnapshot {
            available: if withdrawable > 0.0 {
                withdrawable
            } else {
                (account_value - margin_used).max(0.0)
            },
            equity: account_value,
            margin_used,
            currency: "USDC".to_string(),
        })
    }

    async fn get_positions(&self, symbol: Option<&str>) -> Result<Vec<PositionInfo>> {
        if self.simulation {
            return Ok(Vec::new());
        }

        let response = self
            .info_request(&json!({
                "type": "clearinghouseState",
                "user": self.credentials.wallet_address,
            }))
            .await?;

        let positions = response["assetPositions"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|p| self.parse_position(p))
                    .filter(|p| symbol.map_or(true, |s| p.symbol == s))
                    .collect()
            })
            .unwrap_or_default();

        Ok(positions)
    }

    async fn get_open_orders(&self, symbol: Option<&str>) -> Result<Vec<OrderInfo>> {
        if self.simulation {
            return Ok(Vec::new());
        }

        let response = self
            .info_request(&json!({
                "type": "openOrders",
                "user": self.credentials.wallet_address,
            }))
            .await?;

        let orders = response
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter(|o| symbol.map_or(true, |s| o["coin"].as_str() == Some(s)))
                    .map(|o| OrderInfo {
                        order_id: Self::as_f64(&o["oid"]).to_string(),
                        external_id: o["cloid"].as_str().map(String::from),
                        exchange: ExchangeName::TradeXyz,
                        symbol: o["coin"].as_str().unwrap_or("").to_string(),
                        side: if o["side"].as_str() == Some("B") {
                            PositionSide::Long
                        } else {
                            PositionSide::Short
                        },
                        order_type: OrderType::Limit,
                        status: OrderStatus::New,
                        quantity: Self::as_f64(&o["sz"]),
                        filled_quantity: 0.0,
                        price: Some(Self::as_f64(&o["limitPx"])),
                        created_time: chrono::Utc::now(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(orders)
    }

    async fn place_order(&self, request: OrderRequest) -> Result<TradeResult> {
        if self.simulation {
            log::info!(
                "🧪 模拟下单 TradeXYZ: {} {} {}",
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

        // 市价单用激进限价IOC模拟（接口只有限价单）
        let raw_price = request.price.unwrap_or(market.mark_price);
        let aggressive_price = match request.side {
            PositionSide::Long => raw_price * 1.01,
            PositionSide::Short => raw_price * 0.99,
        };

        let action = json!({
            "type": "order",
            "orders": [{
                "coin": request.symbol,
                "isBuy": request.side == PositionSide::Long,
                "sz": request.quantity.to_string(),
                "limitPx": format!("{:.4}", aggressive_price),
                "reduceOnly": request.reduce_only,
                "orderType": { "limit": { "tif": "Ioc" } },
                "cloid": request.external_id.clone(),
            }],
        });

        let response = self.exchange_request(action).await?;

        let status = &response["response"]["data"]["statuses"][0];
        if let Some(filled) = status.get("filled") {
            let mut result = TradeResult::ok(
                Self::as_f64(&filled["oid"]).to_string(),
                Self::as_f64(&filled["totalSz"]),
                Self::as_f64(&filled["avgPx"]),
            );
            result.external_id = request.external_id;
            Ok(result)
        } else if let Some(error) = status.get("error") {
            Ok(TradeResult::rejected(
                "ORDER_FAILED",
                error.as_str().unwrap_or("下单失败"),
            ))
        } else {
            Ok(TradeResult::rejected("ORDER_FAILED", "未知下单响应"))
        }
    }

    async fn cancel_order(&self, order_id: &str) -> Result<bool> {
        if self.simulation {
            log::info!("🧪 模拟撤单 TradeXYZ: {}", order_id);
            return Ok(true);
        }

        let oid: u64 = order_id
            .parse()
            .map_err(|_| ExchangeError::OrderError(format!("无效的订单ID: {}", order_id)))?;

        let action = json!({
            "type": "cancel",
            "cancels": [{ "oid": oid }],
        });

        let response = self.exchange_request(action).await?;
        Ok(response["status"].as_str() == Some("ok"))
    }

    async fn cancel_all_orders(&self, symbol: Option<&str>) -> Result<u32> {
        if self.simulation {
            log::info!("🧪 模拟全部撤单 TradeXYZ: {:?}", symbol);
            return Ok(0);
        }

        let orders = self.get_open_orders(symbol).await?;
        if orders.is_empty() {
            return Ok(0);
        }

        let cancels: Vec<Value> = orders
            .iter()
            .filter_map(|o| o.order_id.parse::<f64>().ok())
            .map(|oid| json!({ "oid": oid as u64 }))
            .collect();

        let count = cancels.len() as u32;
        let action = json!({ "type": "cancel", "cancels": cancels });
        let response = self.exchange_request(action).await?;

        if response["status"].as_str() == Some("ok") {
            Ok(count)
        } else {
            Ok(0)
        }
    }

    async fn close_position(&self, symbol: &str, quantity: Option<f64>) -> Result<TradeResult> {
        if self.simulation {
            log::info!("🧪 模拟平仓 TradeXYZ: {}", symbol);
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
                exchange: "TradeXYZ".to_string(),
            });
        };

        let close_qty = quantity.unwrap_or(position.size);

        let request = crate::core::types::OrderRequest::market(
            symbol,
            position.side.opposite(),
            close_qty,
        )
        .reduce_only()
        .with_external_id(CryptoRandomizer::generate_external_id());

        self.place_order(request).await
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<bool> {
        if self.simulation {
            log::info!("🧪 模拟设置杠杆 TradeXYZ: {} {}x", symbol, leverage);
            return Ok(true);
        }

        let action = json!({
            "type": "updateLeverage",
            "coin": symbol,
            "isCross": true,
            "leverage": leverage,
        });

        let response = self.exchange_request(action).await?;
        Ok(response["status"].as_str() == Some("ok"))
    }

    async fn get_leverage(&self, symbol: &str) -> Result<u32> {
        let positions = self.get_positions(Some(symbol)).await?;
        Ok(positions.first().map(|p| p.leverage).unwrap_or(1))
    }

    /// TradeXYZ直接用币种作为市场符号
    fn market_symbol(&self, token: &str) -> String {
        token.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_exchange(simulation: bool) -> TradeXyzExchange {
        let credentials = TradeXyzCredentials {
            wallet_address: "0x0".to_string(),
            api_secret: "0x0".to_string(),
        };
        TradeXyzExchange::new(&ExchangeSettings::default(), credentials, simulation, 600).unwrap()
    }

    #[test]
    fn test_symbol_is_bare_token() {
        let exchange = test_exchange(true);
        assert_eq!(exchange.market_symbol("BTC"), "BTC");
    }

    #[test]
    fn test_nonce_monotonic() {
        let exchange = test_exchange(true);
        let a = exchange.next_nonce();
        let b = exchange.next_nonce();
        assert!(b > a);
    }

    #[test]
    fn test_find_asset_ctx() {
        let response = serde_json::json!([
            { "universe": [
                { "name": "BTC", "szDecimals": 5, "maxLeverage": 50 },
                { "name": "ETH", "szDecimals": 4, "maxLeverage": 50 }
            ]},
            [
                { "funding": "0.0000125", "markPx": "50000.0", "oraclePx": "50001.0", "midPx": "50000.5" },
                { "funding": "-0.0000037", "markPx": "3000.0", "oraclePx": "3000.1", "midPx": "3000.05" }
            ]
        ]);

        let (asset, ctx) = TradeXyzExchange::find_asset_ctx(&response, "ETH").unwrap();
        assert_eq!(asset["szDecimals"].as_u64(), Some(4));
        assert_eq!(TradeXyzExchange::as_f64(&ctx["markPx"]), 3000.0);

        assert!(TradeXyzExchange::find_asset_ctx(&response, "DOGE").is_none());
    }

    #[test]
    fn test_parse_position_signed_size() {
        let exchange = test_exchange(true);

        let long_pos = serde_json::json!({
            "position": {
                "coin": "BTC", "szi": "0.5", "entryPx": "50000",
                "positionValue": "25000", "unrealizedPnl": "12.5",
                "leverage": { "value": 10 }, "marginUsed": "2500"
            }
        });
        let parsed = exchange.parse_position(&long_pos).unwrap();
        assert_eq!(parsed.side, PositionSide::Long);
        assert_eq!(parsed.size, 0.5);

        let short_pos = serde_json::json!({
            "position": {
                "coin": "ETH", "szi": "-2.0", "entryPx": "3000",
                "positionValue": "6000", "unrealizedPnl": "0",
                "leverage": { "value": 5 }, "marginUsed": "1200"
            }
        });
        let parsed = exchange.parse_position(&short_pos).unwrap();
        assert_eq!(parsed.side, PositionSide::Short);
        assert_eq!(parsed.size, 2.0);

        // 零仓位被过滤
        let flat = serde_json::json!({
            "position": { "coin": "SOL", "szi": "0", "entryPx": "0",
                "positionValue": "0", "unrealizedPnl": "0",
                "leverage": { "value": 1 }, "marginUsed": "0" }
        });
        assert!(exchange.parse_position(&flat).is_none());
    }

    #[tokio::test]
    async fn test_simulation_short_circuits() {
        let exchange = test_exchange(true);

        let order = exchange
            .place_order(OrderRequest::market("BTC", PositionSide::Short, 0.1))
            .await
            .unwrap();
        assert!(order.success);

        assert!(exchange.set_leverage("BTC", 10).await.unwrap());
        assert_eq!(exchange.cancel_all_orders(None).await.unwrap(), 0);
        assert!(exchange.get_positions(None).await.unwrap().is_empty());
    }
}
