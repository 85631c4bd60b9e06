//! Telegram access for the ingestion pipeline: a `ChannelClient` trait the
//! ingestor is written against, an implementation that reads public-channel
//! preview pages, and the admin notification bot.

pub mod bot;
pub mod error;
pub mod preview;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use bot::{BotNotifier, NoopNotifier, Notifier};
pub use error::TelegramError;
pub use preview::PreviewClient;

/// One message fetched from a channel.
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    /// Channel handle (e.g. "coindesk" for https://t.me/coindesk).
    pub channel_id: String,
    /// Telegram's per-channel message number.
    pub message_id: i64,
    pub date: DateTime<Utc>,
    pub text: String,
}

/// Fetches a channel's messages inside a time window, oldest first.
#[async_trait]
pub trait ChannelClient: Send + Sync {
    async fn fetch_channel_messages(
        &self,
        url: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ChannelMessage>, TelegramError>;
}

/// Extract the channel handle from a t.me URL, or pass a bare handle through.
pub fn channel_handle(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some((_, handle)) if !handle.is_empty() => handle.trim_start_matches("s/").to_string(),
        _ => trimmed.trim_start_matches('@').to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_from_url_forms() {
        assert_eq!(channel_handle("https://t.me/coindesk"), "coindesk");
        assert_eq!(channel_handle("https://t.me/coindesk/"), "coindesk");
        assert_eq!(channel_handle("https://t.me/s/coindesk"), "coindesk");
        assert_eq!(channel_handle("coindesk"), "coindesk");
        assert_eq!(channel_handle("@coindesk"), "coindesk");
    }
}
