//! Webhook通知模块
//! 用于把紧急事件和告警推送到外部收集端

use crate::core::config::WebhookSettings;
use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info};
use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// 消息级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MessageLevel {
    Debug = 0,
    Info = 1,
    Warning = 2,
    Error = 3,
    Critical = 4,
}

impl MessageLevel {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "debug" => Self::Debug,
            "info" => Self::Info,
            "warning" | "warn" => Self::Warning,
            "error" => Self::Error,
            "critical" => Self::Critical,
            _ => Self::Info,
        }
    }

    pub fn emoji(&self) -> &str {
        match self {
            Self::Debug => "🔍",
            Self::Info => "ℹ️",
            Self::Warning => "⚠️",
            Self::Error => "❌",
            Self::Critical => "🚨",
        }
    }
}

/// 推送消息格式
#[derive(Debug, Serialize)]
struct WebhookMessage {
    msgtype: String,
    markdown: MarkdownContent,
}

#[derive(Debug, Serialize)]
struct MarkdownContent {
    content: String,
}

/// Webhook通知器
pub struct WebhookNotifier {
    config: WebhookSettings,
    client: Client,
    /// 上次发送时间记录（用于限流）
    last_send_times: Arc<RwLock<HashMap<String, DateTime<Utc>>>>,
}

impl WebhookNotifier {
    /// 创建新的通知器
    pub fn new(config: WebhookSettings) -> Self {
        Self {
            config,
            client: Client::new(),
            last_send_times: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 发送通用事件通知
    pub async fn send_event(&self, title: &str, body: &str, level: MessageLevel) {
        if !self.config.enabled || self.config.url.is_empty() {
            return;
        }

        let min_level = MessageLevel::from_str(&self.config.min_level);
        if level < min_level {
            return;
        }

        if !self.check_rate_limit(title).await {
            debug!("跳过推送，限流中: {}", title);
            return;
        }

        let content = format!(
            "{} **{}**\n> {}\n> 时间: {}",
            level.emoji(),
            title,
            body,
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        );

        let message = WebhookMessage {
            msgtype: "markdown".to_string(),
            markdown: MarkdownContent { content },
        };

        match self.client.post(&self.config.url).json(&message).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!("📨 已推送通知: {}", title);
            }
            Ok(resp) => {
                error!("❌ 推送通知失败: HTTP {}", resp.status());
            }
            Err(e) => {
                error!("❌ 推送通知失败: {}", e);
            }
        }
    }

    /// 限流检查：同一标题在窗口期内只推一次
    async fn check_rate_limit(&self, key: &str) -> bool {
        let window = Duration::seconds(self.config.rate_limit_seconds as i64);
        let mut times = self.last_send_times.write().await;

        let now = Utc::now();
        if let Some(last) = times.get(key) {
            if now - *last < window {
                return false;
            }
        }

        times.insert(key.to_string(), now);
        true
    }
}

// 全局通知器（紧急事件回调从同步上下文触发时使用）
lazy_static::lazy_static! {
    static ref GLOBAL_NOTIFIER: std::sync::RwLock<Option<Arc<WebhookNotifier>>> =
        std::sync::RwLock::new(None);
}

/// 初始化全局通知器
pub fn init_global_notifier(config: WebhookSettings) {
    let mut guard = GLOBAL_NOTIFIER.write().expect("Lock poisoned");
    *guard = Some(Arc::new(WebhookNotifier::new(config)));
}

/// 获取全局通知器
pub fn get_global_notifier() -> Option<Arc<WebhookNotifier>> {
    GLOBAL_NOTIFIER.read().expect("Lock poisoned").clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(MessageLevel::Critical > MessageLevel::Error);
        assert!(MessageLevel::Warning > MessageLevel::Info);
        assert_eq!(MessageLevel::from_str("warn"), MessageLevel::Warning);
        assert_eq!(MessageLevel::from_str("unknown"), MessageLevel::Info);
    }

    #[tokio::test]
    async fn test_rate_limit_window() {
        let notifier = WebhookNotifier::new(WebhookSettings {
            enabled: true,
            url: "http://localhost/hook".to_string(),
            min_level: "info".to_string(),
            rate_limit_seconds: 60,
        });

        assert!(notifier.check_rate_limit("emergency").await);
        assert!(!notifier.check_rate_limit("emergency").await);
        assert!(notifier.check_rate_limit("other-title").await);
    }
}
