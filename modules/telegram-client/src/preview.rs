//! Public-channel message fetcher built on t.me preview pages.
//!
//! Telegram serves the recent history of any public channel at
//! `https://t.me/s/<handle>` as plain HTML, paginated backwards with
//! `?before=<message id>`. That covers everything the ingestor needs for
//! public channels without MTProto credentials.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use tracing::{debug, info, warn};

use crate::error::TelegramError;
use crate::{channel_handle, ChannelClient, ChannelMessage};

const PAGE_TIMEOUT: Duration = Duration::from_secs(20);
const USER_AGENT: &str = "channelpulse/0.1 (+https://t.me)";

/// Pagination cap. At ~20 messages per page this bounds a single fetch to
/// a few thousand messages, far beyond any supported time window.
const MAX_PAGES: usize = 50;

pub struct PreviewClient {
    http: reqwest::Client,
    base_url: String,
}

impl PreviewClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(PAGE_TIMEOUT)
                .build()
                .expect("failed to build preview HTTP client"),
            base_url: "https://t.me".to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    async fn fetch_page(
        &self,
        handle: &str,
        before: Option<i64>,
    ) -> Result<String, TelegramError> {
        let mut url = format!("{}/s/{}", self.base_url, handle);
        if let Some(id) = before {
            url = format!("{url}?before={id}");
        }

        let response = self
            .http
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(TelegramError::ChannelNotFound(handle.to_string()));
        }
        let response = response.error_for_status()?;
        Ok(response.text().await?)
    }
}

impl Default for PreviewClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelClient for PreviewClient {
    async fn fetch_channel_messages(
        &self,
        url: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ChannelMessage>, TelegramError> {
        let handle = channel_handle(url);
        info!(channel = %handle, since = %since, until = %until, "Fetching channel messages");

        let mut collected: Vec<ChannelMessage> = Vec::new();
        let mut before: Option<i64> = None;

        for page in 0..MAX_PAGES {
            let html = self.fetch_page(&handle, before).await?;
            let messages = parse_preview_page(&html, &handle);
            if messages.is_empty() {
                debug!(channel = %handle, page, "No more messages on preview page");
                break;
            }

            let oldest_id = messages.iter().map(|m| m.message_id).min();
            let oldest_date = messages.iter().map(|m| m.date).min();

            for message in messages {
                if message.date >= since && message.date <= until {
                    collected.push(message);
                }
            }

            // Reached history older than the window, or the start of history.
            match (oldest_date, oldest_id) {
                (Some(date), _) if date < since => break,
                (_, Some(id)) if Some(id) == before || id <= 1 => break,
                (_, Some(id)) => before = Some(id),
                _ => break,
            }
        }

        collected.sort_by_key(|m| (m.date, m.message_id));
        collected.dedup_by_key(|m| m.message_id);
        info!(channel = %handle, count = collected.len(), "Channel fetch complete");
        Ok(collected)
    }
}

/// Parse one preview page into messages. Media-only posts (no text block)
/// are kept with empty text so the message tuple is still recorded.
fn parse_preview_page(html: &str, handle: &str) -> Vec<ChannelMessage> {
    let document = Html::parse_document(html);
    let message_selector =
        Selector::parse("div.tgme_widget_message").expect("valid message selector");
    let text_selector =
        Selector::parse("div.tgme_widget_message_text").expect("valid text selector");
    let time_selector = Selector::parse("time[datetime]").expect("valid time selector");

    let mut messages = Vec::new();
    for element in document.select(&message_selector) {
        let Some(post) = element.value().attr("data-post") else {
            continue;
        };
        let Some(message_id) = post.rsplit_once('/').and_then(|(_, id)| id.parse().ok()) else {
            warn!(post, "Skipping message with unparseable data-post");
            continue;
        };

        let Some(date) = element
            .select(&time_selector)
            .next()
            .and_then(|t| t.value().attr("datetime"))
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc))
        else {
            warn!(post, "Skipping message without a timestamp");
            continue;
        };

        let text = element
            .select(&text_selector)
            .next()
            .map(|node| node.text().collect::<Vec<_>>().join(" ").trim().to_string())
            .unwrap_or_default();

        messages.push(ChannelMessage {
            channel_id: handle.to_string(),
            message_id,
            date,
            text,
        });
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(messages: &[(i64, &str, &str)]) -> String {
        let mut html = String::from("<html><body><section>");
        for (id, datetime, text) in messages {
            html.push_str(&format!(
                r#"<div class="tgme_widget_message" data-post="chan/{id}">
                     <div class="tgme_widget_message_text">{text}</div>
                     <a class="tgme_widget_message_date"><time datetime="{datetime}"></time></a>
                   </div>"#
            ));
        }
        html.push_str("</section></body></html>");
        html
    }

    #[test]
    fn parses_messages_with_ids_dates_and_text() {
        let html = page(&[
            (100, "2026-08-01T10:00:00+00:00", "hello"),
            (101, "2026-08-01T11:00:00+00:00", "world"),
        ]);
        let messages = parse_preview_page(&html, "chan");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].message_id, 100);
        assert_eq!(messages[0].channel_id, "chan");
        assert_eq!(messages[1].text, "world");
    }

    #[test]
    fn skips_messages_without_timestamps() {
        let html = r#"<div class="tgme_widget_message" data-post="chan/1">
                        <div class="tgme_widget_message_text">no time</div>
                      </div>"#;
        assert!(parse_preview_page(html, "chan").is_empty());
    }

    #[test]
    fn media_only_posts_keep_empty_text() {
        let html = r#"<div class="tgme_widget_message" data-post="chan/7">
                        <a><time datetime="2026-08-01T09:00:00+00:00"></time></a>
                      </div>"#;
        let messages = parse_preview_page(html, "chan");
        assert_eq!(messages.len(), 1);
        assert!(messages[0].text.is_empty());
    }
}
