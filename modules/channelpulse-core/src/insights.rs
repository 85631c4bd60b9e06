//! Insight generation: one structured model call per topic, producing the
//! analytical record the UI renders.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{info, warn};

use channelpulse_common::{Insight, PulseError, TopicSummary};
use llm_client::{structured, StructuredModel};

use crate::store::Store;

const RETRY_BACKOFF: Duration = Duration::from_secs(2);

const SYSTEM_PROMPT: &str = "You are an analyst producing a structured read on a \
news topic. Given the topic and its summary, return: a short analysis summary; a \
stance, one of long, short, long-neutral, short-neutral, neutral, or \
no-actionable-insight; rationales for the long, short, and neutral cases where \
applicable; risks and watchouts; key questions the reader should answer; \
suggested instruments for the long and short cases; and useful resources as \
url/description pairs. Omit any list that does not apply. This is advisory \
analysis, not financial advice.";

pub struct InsightsGenerator {
    store: Store,
    model: Arc<dyn StructuredModel>,
}

impl InsightsGenerator {
    pub fn new(store: Store, model: Arc<dyn StructuredModel>) -> Self {
        Self { store, model }
    }

    /// Generate (and persist) the insight for one topic. Repeated calls
    /// for the same topic overwrite the stored record.
    pub async fn generate(&self, topic: &TopicSummary) -> Result<Insight, PulseError> {
        let prompt = format!(
            "Topic: {}\nMetatopic: {}\nImportance: {}\nSummary: {}\n",
            topic.topic, topic.metatopic, topic.importance, topic.summary,
        );

        let insight = self.call_with_retry(&prompt).await?.normalize();
        self.store.save_insight(&topic.topic, &insight).await?;
        info!(topic = %topic.topic, stance = ?insight.stance, "Insight generated");
        Ok(insight)
    }

    async fn call_with_retry(&self, prompt: &str) -> Result<Insight, PulseError> {
        let mut attempt = 0;
        loop {
            match structured::<Insight>(&*self.model, SYSTEM_PROMPT, prompt).await {
                Ok(insight) => return Ok(insight),
                Err(e) if attempt == 0 => {
                    warn!(error = %e, "Insight attempt failed, retrying");
                    if e.is_transient() {
                        let jitter = Duration::from_millis(rand::rng().random_range(0..500));
                        tokio::time::sleep(RETRY_BACKOFF + jitter).await;
                    }
                    attempt += 1;
                }
                Err(e) if e.is_transient() => return Err(PulseError::Upstream(e.to_string())),
                Err(e) => return Err(PulseError::SchemaViolation(e.to_string())),
            }
        }
    }
}
