// 工具模块 - 通用工具函数
pub mod logger;
pub mod signature;
pub mod timing;
pub mod webhook;

pub use logger::init_logger;
pub use signature::SignatureHelper;
pub use timing::{current_timestamp_ms, sleep_random, sleep_with_jitter, CycleTimer};
pub use webhook::{get_global_notifier, init_global_notifier, MessageLevel, WebhookNotifier};
