//! Admin notifications over the Telegram Bot API.
//!
//! Best-effort only: a failed notification is logged and dropped, it must
//! never fail the request that triggered it.

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

/// Pluggable notification backend for admin alerts.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> anyhow::Result<()>;

    async fn notify_new_subscriber(&self, email: &str, source: &str) {
        let text = format!("New subscriber\nEmail: {email}\nSource: {source}");
        if let Err(e) = self.send(&text).await {
            warn!(error = %e, "Failed to send subscriber notification");
        }
    }

    async fn notify_new_feedback(&self, email: &str, kind: &str, message: &str) {
        let text = format!("New feedback\nEmail: {email}\nType: {kind}\n\n{message}");
        if let Err(e) = self.send(&text).await {
            warn!(error = %e, "Failed to send feedback notification");
        }
    }

    async fn notify_summaries_request(&self, request_id: &str, period: &str, sources: usize) {
        let text = format!(
            "Summaries requested\nRequest: {request_id}\nPeriod: {period}\nSources: {sources}"
        );
        if let Err(e) = self.send(&text).await {
            warn!(error = %e, "Failed to send summaries notification");
        }
    }
}

/// Bot API backend: `sendMessage` to a fixed admin chat.
pub struct BotNotifier {
    http: reqwest::Client,
    token: String,
    chat_id: i64,
    base_url: String,
}

impl BotNotifier {
    pub fn new(token: &str, chat_id: i64) -> Self {
        Self {
            http: reqwest::Client::new(),
            token: token.to_string(),
            chat_id,
            base_url: "https://api.telegram.org".to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Notifier for BotNotifier {
    async fn send(&self, text: &str) -> anyhow::Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.token);
        let response = self
            .http
            .post(&url)
            .json(&json!({ "chat_id": self.chat_id, "text": text }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Bot API returned {status}: {body}");
        }
        Ok(())
    }
}

/// Backend used when the bot is disabled.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, _text: &str) -> anyhow::Result<()> {
        Ok(())
    }
}
