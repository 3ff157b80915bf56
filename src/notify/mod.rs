//! Operator notifications.
//!
//! Best effort: a failed notification is logged locally and never
//! reaches the caller.

pub mod telegram;

use async_trait::async_trait;
use tracing::info;

pub use crate::types::Level;

/// Fire-and-forget message sink.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, level: Level, text: &str);
}

/// Prefix `text` with the icon for `level`.
pub fn format_message(level: Level, text: &str) -> String {
    format!("{} {}", level.icon(), text)
}

/// Notifier used when no messaging credentials are configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, level: Level, text: &str) {
        info!(level = ?level, "[NOTIFY] {text}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_message() {
        assert_eq!(format_message(Level::Info, "bought"), "✅ bought");
        assert_eq!(format_message(Level::Error, "failed"), "❌ failed");
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        LogNotifier.notify(Level::Warning, "hello").await;
    }
}
