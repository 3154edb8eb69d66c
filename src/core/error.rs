use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("网络请求错误: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON序列化错误: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("YAML配置错误: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("API错误: {code} - {message}")]
    ApiError { code: i32, message: String },

    #[error("认证错误: {0}")]
    AuthError(String),

    #[error("交易对格式错误: {0}")]
    SymbolError(String),

    #[error("订单错误: {0}")]
    OrderError(String),

    #[error("订单被拒绝: {0}")]
    OrderRejected(String),

    #[error("余额不足: 需要 {required}, 可用 {available}")]
    InsufficientBalance { required: f64, available: f64 },

    #[error("速率限制: {0}")]
    RateLimitError(String, Option<u64>),

    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("参数验证错误: {field} - {reason}")]
    ValidationError { field: String, reason: String },

    #[error("数据解析错误: {0}")]
    ParseError(String),

    #[error("超时错误: 操作 '{operation}' 超时 ({timeout_seconds}秒)")]
    TimeoutError {
        operation: String,
        timeout_seconds: u64,
    },

    #[error("未连接到交易所: {0}")]
    NotConnected(String),

    #[error("持仓未找到: {symbol} (交易所: {exchange})")]
    PositionNotFound { symbol: String, exchange: String },

    #[error("不支持的功能: {0}")]
    NotSupported(String),

    #[error("紧急状态已触发: {0}")]
    EmergencyActive(String),

    #[error("其他错误: {0}")]
    Other(String),
}

impl ExchangeError {
    /// 判断错误是否可以重试
    ///
    /// 只有幂等的只读请求才允许按此标志重试，下单请求永远不盲目重试。
    pub fn is_retryable(&self) -> bool {
        match self {
            ExchangeError::NetworkError(_) => true,
            ExchangeError::TimeoutError { .. } => true,
            ExchangeError::RateLimitError(_, _) => true,
            ExchangeError::ApiError { code, .. } => {
                // HTTP 5xx 错误通常可以重试
                *code >= 500 && *code < 600
            }
            _ => false,
        }
    }

    /// 获取建议的重试等待时间(秒)
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            ExchangeError::RateLimitError(_, retry_after) => *retry_after,
            ExchangeError::NetworkError(_) => Some(1),
            ExchangeError::TimeoutError { .. } => Some(2),
            ExchangeError::ApiError { code, .. } if *code >= 500 => Some(5),
            _ => None,
        }
    }

    /// 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ExchangeError::NetworkError(_) => ErrorSeverity::Warning,
            ExchangeError::TimeoutError { .. } => ErrorSeverity::Warning,
            ExchangeError::RateLimitError(_, _) => ErrorSeverity::Warning,
            ExchangeError::ValidationError { .. } => ErrorSeverity::Error,
            ExchangeError::AuthError(_) => ErrorSeverity::Critical,
            ExchangeError::ConfigError(_) => ErrorSeverity::Critical,
            ExchangeError::EmergencyActive(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }
}

/// 错误严重程度
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorSeverity {
    Info,     // 信息性错误，通常不影响操作
    Warning,  // 警告性错误，可以重试
    Error,    // 一般错误，需要处理
    Critical, // 严重错误，需要立即处理
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let timeout = ExchangeError::TimeoutError {
            operation: "get_balance".to_string(),
            timeout_seconds: 30,
        };
        assert!(timeout.is_retryable());

        let server_error = ExchangeError::ApiError {
            code: 503,
            message: "service unavailable".to_string(),
        };
        assert!(server_error.is_retryable());

        let rejected = ExchangeError::OrderRejected("insufficient margin".to_string());
        assert!(!rejected.is_retryable());

        let auth = ExchangeError::AuthError("bad key".to_string());
        assert!(!auth.is_retryable());
        assert_eq!(auth.severity(), ErrorSeverity::Critical);
    }

    #[test]
    fn test_retry_after_hint() {
        let rate_limited = ExchangeError::RateLimitError("too many requests".to_string(), Some(7));
        assert_eq!(rate_limited.retry_after(), Some(7));

        let rejected = ExchangeError::OrderRejected("bad size".to_string());
        assert_eq!(rejected.retry_after(), None);
    }
}
