use crate::core::constants::defaults;
use crate::core::error::ExchangeError;
use serde::{Deserialize, Serialize};
use std::fs;

/// 风险参数配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskSettings {
    pub min_equity_usage: f64,
    pub max_equity_usage: f64,
    pub min_leverage: u32,
    pub max_leverage: u32,
    pub min_hold_duration_secs: u64,
    pub max_hold_duration_secs: u64,
    pub min_cooldown_secs: u64,
    pub max_cooldown_secs: u64,
    pub max_position_value_usd: f64,
    pub min_balance_usd: f64,
    pub max_consecutive_failures: u32,
    pub max_slippage_percent: f64,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            min_equity_usage: defaults::MIN_EQUITY_USAGE,
            max_equity_usage: defaults::MAX_EQUITY_USAGE,
            min_leverage: defaults::MIN_LEVERAGE,
            max_leverage: defaults::MAX_LEVERAGE,
            min_hold_duration_secs: defaults::MIN_HOLD_DURATION_SECS,
            max_hold_duration_secs: defaults::MAX_HOLD_DURATION_SECS,
            min_cooldown_secs: defaults::MIN_COOLDOWN_SECS,
            max_cooldown_secs: defaults::MAX_COOLDOWN_SECS,
            max_position_value_usd: defaults::MAX_POSITION_VALUE_USD,
            min_balance_usd: defaults::MIN_BALANCE_USD,
            max_consecutive_failures: defaults::MAX_CONSECUTIVE_FAILURES,
            max_slippage_percent: defaults::MAX_SLIPPAGE_PERCENT,
        }
    }
}

/// 执行层配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSettings {
    /// true = 双腿并行开仓（最小化成交时间差）
    /// false = 顺序开仓（第一腿失败立即短路）
    pub parallel_open: bool,
    pub api_timeout_secs: u64,
    pub order_timeout_secs: u64,
    pub requests_per_minute: u32,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            parallel_open: true,
            api_timeout_secs: defaults::API_TIMEOUT_SECS,
            order_timeout_secs: defaults::ORDER_TIMEOUT_SECS,
            requests_per_minute: defaults::REQUESTS_PER_MINUTE,
        }
    }
}

/// 模拟模式配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    pub enabled: bool,
    pub balance_usd: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            balance_usd: 10_000.0,
        }
    }
}

/// 交易所网络配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeSettings {
    pub network: String, // mainnet / testnet
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            network: "mainnet".to_string(),
        }
    }
}

/// Webhook通知配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookSettings {
    pub enabled: bool,
    pub url: String,
    pub min_level: String,
    pub rate_limit_seconds: u64,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            min_level: "warning".to_string(),
            rate_limit_seconds: 60,
        }
    }
}

/// 应用主配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub simulation: SimulationSettings,
    pub risk: RiskSettings,
    pub execution: ExecutionSettings,
    pub extended: ExchangeSettings,
    pub tradexyz: ExchangeSettings,
    pub webhook: WebhookSettings,
    pub log_level: Option<String>,
}

impl Settings {
    /// 从YAML文件加载配置
    pub fn from_file(path: &str) -> Result<Self, ExchangeError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ExchangeError::ConfigError(format!("读取配置文件失败: {}", e)))?;

        let settings: Settings = serde_yaml::from_str(&contents)?;
        settings.validate()?;
        Ok(settings)
    }

    /// 基础范围校验
    pub fn validate(&self) -> Result<(), ExchangeError> {
        if self.risk.min_equity_usage <= 0.0 || self.risk.max_equity_usage > 1.0 {
            return Err(ExchangeError::ValidationError {
                field: "risk.equity_usage".to_string(),
                reason: "权益使用率必须在(0, 1]区间".to_string(),
            });
        }
        if self.risk.min_equity_usage > self.risk.max_equity_usage {
            return Err(ExchangeError::ValidationError {
                field: "risk.equity_usage".to_string(),
                reason: "最小值大于最大值".to_string(),
            });
        }
        if self.risk.min_leverage == 0 || self.risk.min_leverage > self.risk.max_leverage {
            return Err(ExchangeError::ValidationError {
                field: "risk.leverage".to_string(),
                reason: "杠杆范围无效".to_string(),
            });
        }
        if self.risk.min_hold_duration_secs > self.risk.max_hold_duration_secs {
            return Err(ExchangeError::ValidationError {
                field: "risk.hold_duration".to_string(),
                reason: "持仓时长范围无效".to_string(),
            });
        }
        if self.risk.min_cooldown_secs > self.risk.max_cooldown_secs {
            return Err(ExchangeError::ValidationError {
                field: "risk.cooldown".to_string(),
                reason: "冷却时长范围无效".to_string(),
            });
        }
        Ok(())
    }
}

/// Extended交易所凭证
#[derive(Debug, Clone)]
pub struct ExtendedCredentials {
    pub api_key: String,
    pub api_secret: String,
    pub vault: u64,
}

/// TradeXYZ交易所凭证
#[derive(Debug, Clone)]
pub struct TradeXyzCredentials {
    pub wallet_address: String,
    pub api_secret: String,
}

/// 占位凭证检测（live模式拒绝启动）
fn is_placeholder(value: &str) -> bool {
    let lowered = value.to_lowercase();
    lowered.is_empty()
        || ["dummy", "0x0", "placeholder", "test", "example"]
            .iter()
            .any(|ind| lowered == *ind)
}

impl ExtendedCredentials {
    /// 从环境变量加载凭证
    pub fn from_env() -> Result<Self, ExchangeError> {
        dotenv::dotenv().ok(); // 加载.env文件，忽略错误

        let api_key = std::env::var("EXTENDED_API_KEY").unwrap_or_else(|_| "dummy".to_string());
        let api_secret =
            std::env::var("EXTENDED_API_SECRET").unwrap_or_else(|_| "dummy".to_string());
        let vault = std::env::var("EXTENDED_VAULT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        Ok(Self {
            api_key,
            api_secret,
            vault,
        })
    }

    /// live模式凭证校验
    pub fn validate_for_live(&self) -> Result<(), ExchangeError> {
        if is_placeholder(&self.api_key) || is_placeholder(&self.api_secret) {
            return Err(ExchangeError::ConfigError(
                "live模式需要有效的Extended凭证，检测到占位值".to_string(),
            ));
        }
        Ok(())
    }
}

impl TradeXyzCredentials {
    /// 从环境变量加载凭证
    pub fn from_env() -> Result<Self, ExchangeError> {
        dotenv::dotenv().ok();

        let wallet_address =
            std::env::var("TRADEXYZ_WALLET_ADDRESS").unwrap_or_else(|_| "0x0".to_string());
        let api_secret =
            std::env::var("TRADEXYZ_API_SECRET").unwrap_or_else(|_| "0x0".to_string());

        Ok(Self {
            wallet_address,
            api_secret,
        })
    }

    /// live模式凭证校验
    pub fn validate_for_live(&self) -> Result<(), ExchangeError> {
        if is_placeholder(&self.wallet_address) || is_placeholder(&self.api_secret) {
            return Err(ExchangeError::ConfigError(
                "live模式需要有效的TradeXYZ凭证，检测到占位值".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert!(settings.simulation.enabled);
        assert_eq!(settings.risk.max_consecutive_failures, 3);
    }

    #[test]
    fn test_invalid_equity_range_rejected() {
        let mut settings = Settings::default();
        settings.risk.min_equity_usage = 0.9;
        settings.risk.max_equity_usage = 0.5;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_placeholder_detection() {
        assert!(is_placeholder("dummy"));
        assert!(is_placeholder("0x0"));
        assert!(is_placeholder(""));
        assert!(!is_placeholder("ak_live_9f8e7d6c"));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "risk:\n  max_leverage: 15\n";
        let settings: Settings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(settings.risk.max_leverage, 15);
        assert_eq!(settings.risk.min_leverage, defaults::MIN_LEVERAGE);
        assert!(settings.execution.parallel_open);
    }
}
