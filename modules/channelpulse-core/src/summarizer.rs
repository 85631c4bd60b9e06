//! Topic summarization: turn a window of messages into a ranked list of
//! topics via one structured model call.

use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{info, warn};

use channelpulse_common::{PulseError, StoredMessage, TopicSummary};
use llm_client::{structured, StructuredModel};

use crate::links::canonicalize_source_url;
use crate::store::Store;

/// Characters of message text included in the prompt.
const MAX_MESSAGE_CHARS: usize = 2000;

/// Upper bound on returned topics.
const MAX_TOPICS: usize = 20;

/// Wall-clock cap for one summarization request.
const OVERALL_TIMEOUT: Duration = Duration::from_secs(300);

const RETRY_BACKOFF: Duration = Duration::from_secs(2);

const SYSTEM_PROMPT: &str = "You analyze news messages from Telegram channels. \
Group the messages into at most 20 salient topics. For each topic give a short \
label, a broad metatopic category, an importance rating from 1 (minor) to 10 \
(critical), a few-sentence summary, and the ids of the messages that support it. \
Every message id you cite must come from the input. Skip filler and duplicates.";

/// Reporting window for a summarization request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    OneDay,
    TwoDays,
    OneWeek,
}

impl Period {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "1d" => Some(Period::OneDay),
            "2d" => Some(Period::TwoDays),
            "1w" => Some(Period::OneWeek),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::OneDay => "1d",
            Period::TwoDays => "2d",
            Period::OneWeek => "1w",
        }
    }

    pub fn duration(&self) -> chrono::Duration {
        match self {
            Period::OneDay => chrono::Duration::days(1),
            Period::TwoDays => chrono::Duration::days(2),
            Period::OneWeek => chrono::Duration::weeks(1),
        }
    }
}

#[derive(Debug)]
pub struct SummaryOutcome {
    pub topics: Vec<TopicSummary>,
    pub no_messages_found: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct TopicBatch {
    topics: Vec<RawTopic>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct RawTopic {
    /// Short topic label.
    topic: String,
    /// Broad category, e.g. "Markets" or "Regulation".
    metatopic: String,
    /// Importance from 1 to 10.
    importance: i64,
    /// A few sentences summarizing the topic.
    summary: String,
    /// Ids of the supporting messages, drawn from the input.
    message_ids: Vec<i64>,
}

pub struct Summarizer {
    store: Store,
    model: std::sync::Arc<dyn StructuredModel>,
}

impl Summarizer {
    pub fn new(store: Store, model: std::sync::Arc<dyn StructuredModel>) -> Self {
        Self { store, model }
    }

    /// Summarize the period's messages for the given sources (empty list =
    /// all sources). Topics are persisted before being returned.
    pub async fn summarize(
        &self,
        period: Period,
        sources: &[String],
    ) -> Result<SummaryOutcome, PulseError> {
        tokio::time::timeout(OVERALL_TIMEOUT, self.summarize_inner(period, sources))
            .await
            .map_err(|_| PulseError::Upstream("summarization timed out".to_string()))?
    }

    async fn summarize_inner(
        &self,
        period: Period,
        sources: &[String],
    ) -> Result<SummaryOutcome, PulseError> {
        let until = Utc::now();
        let since = until - period.duration();
        let urls: Vec<String> = sources.iter().map(|u| canonicalize_source_url(u)).collect();

        let messages = self.store.get_messages_in_window(&urls, since, until).await?;
        if messages.is_empty() {
            info!(period = period.as_str(), "No messages in window");
            return Ok(SummaryOutcome {
                topics: Vec::new(),
                no_messages_found: true,
            });
        }

        let valid_ids: HashSet<i64> = messages.iter().map(|m| m.id).collect();
        let prompt = build_prompt(&messages);

        let batch = self.call_with_retry(&prompt).await?;
        let mut topics = validate_topics(batch, &valid_ids);

        let mut referenced: Vec<i64> = Vec::new();
        for topic in &mut topics {
            let id = self.store.save_topic_summary(topic).await?;
            topic.id = Some(id);
            referenced.extend(&topic.message_ids);
        }
        referenced.sort_unstable();
        referenced.dedup();
        self.store.mark_messages_processed(&referenced).await?;

        info!(
            period = period.as_str(),
            messages = messages.len(),
            topics = topics.len(),
            "Summarization complete"
        );
        Ok(SummaryOutcome {
            topics,
            no_messages_found: false,
        })
    }

    async fn call_with_retry(&self, prompt: &str) -> Result<TopicBatch, PulseError> {
        let mut attempt = 0;
        loop {
            match structured::<TopicBatch>(&*self.model, SYSTEM_PROMPT, prompt).await {
                Ok(batch) => return Ok(batch),
                Err(e) if attempt == 0 => {
                    warn!(error = %e, "Summarization attempt failed, retrying");
                    if e.is_transient() {
                        let jitter = Duration::from_millis(rand::rng().random_range(0..500));
                        tokio::time::sleep(RETRY_BACKOFF + jitter).await;
                    }
                    attempt += 1;
                }
                Err(e) if e.is_transient() => {
                    return Err(PulseError::Upstream(e.to_string()));
                }
                Err(e) => return Err(PulseError::SchemaViolation(e.to_string())),
            }
        }
    }
}

fn build_prompt(messages: &[StoredMessage]) -> String {
    let mut prompt = String::from("Messages:\n\n");
    for message in messages {
        prompt.push_str(&format!(
            "[id={}] ({} at {})\n{}\n",
            message.id,
            message.source_url,
            message.date.to_rfc3339(),
            truncate_chars(&message.text, MAX_MESSAGE_CHARS),
        ));
        for (url, summary) in parse_resolved_links(message) {
            if !summary.is_empty() {
                prompt.push_str(&format!("  link {url}: {summary}\n"));
            }
        }
        prompt.push('\n');
    }
    prompt
}

/// Decode the stored url → summary map; malformed or absent JSON yields
/// nothing rather than failing the batch.
fn parse_resolved_links(message: &StoredMessage) -> Vec<(String, String)> {
    let Some(raw) = message.resolved_links.as_deref() else {
        return Vec::new();
    };
    match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(raw) {
        Ok(map) => map
            .into_iter()
            .filter_map(|(url, v)| v.as_str().map(|s| (url, s.to_string())))
            .collect(),
        Err(e) => {
            warn!(message_id = message.id, error = %e, "Unparseable resolved_links");
            Vec::new()
        }
    }
}

fn validate_topics(batch: TopicBatch, valid_ids: &HashSet<i64>) -> Vec<TopicSummary> {
    batch
        .topics
        .into_iter()
        .filter_map(|raw| {
            let message_ids: Vec<i64> = raw
                .message_ids
                .into_iter()
                .filter(|id| valid_ids.contains(id))
                .collect();
            if message_ids.is_empty() {
                return None;
            }
            Some(TopicSummary {
                id: None,
                topic: raw.topic,
                metatopic: raw.metatopic,
                importance: raw.importance.clamp(1, 10) as u8,
                summary: raw.summary,
                message_ids,
            })
        })
        .take(MAX_TOPICS)
        .collect()
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_parsing() {
        assert_eq!(Period::parse("1d"), Some(Period::OneDay));
        assert_eq!(Period::parse("2d"), Some(Period::TwoDays));
        assert_eq!(Period::parse("1w"), Some(Period::OneWeek));
        assert_eq!(Period::parse("3d"), None);
        assert_eq!(Period::parse(""), None);
    }

    #[test]
    fn validation_filters_unknown_ids_and_drops_empty_topics() {
        let valid: HashSet<i64> = [1, 2, 3].into_iter().collect();
        let batch = TopicBatch {
            topics: vec![
                RawTopic {
                    topic: "A".to_string(),
                    metatopic: "M".to_string(),
                    importance: 7,
                    summary: "s".to_string(),
                    message_ids: vec![1, 99, 2],
                },
                RawTopic {
                    topic: "B".to_string(),
                    metatopic: "M".to_string(),
                    importance: 4,
                    summary: "s".to_string(),
                    message_ids: vec![98, 97],
                },
            ],
        };
        let topics = validate_topics(batch, &valid);
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].message_ids, vec![1, 2]);
    }

    #[test]
    fn validation_clamps_importance() {
        let valid: HashSet<i64> = [1].into_iter().collect();
        let batch = TopicBatch {
            topics: vec![
                RawTopic {
                    topic: "hot".to_string(),
                    metatopic: "M".to_string(),
                    importance: 42,
                    summary: "s".to_string(),
                    message_ids: vec![1],
                },
                RawTopic {
                    topic: "cold".to_string(),
                    metatopic: "M".to_string(),
                    importance: 0,
                    summary: "s".to_string(),
                    message_ids: vec![1],
                },
            ],
        };
        let topics = validate_topics(batch, &valid);
        assert_eq!(topics[0].importance, 10);
        assert_eq!(topics[1].importance, 1);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("short", 100), "short");
    }
}
