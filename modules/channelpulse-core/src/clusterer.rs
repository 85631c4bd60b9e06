//! Channel clustering: partition an imported channel list into named
//! topic groups with one structured model call.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{info, warn};

use channelpulse_common::{Channel, ClusteredTopic, ProgressBus, ProgressEvent, PulseError};
use llm_client::{structured, StructuredModel};

const RETRY_BACKOFF: Duration = Duration::from_secs(2);

const SYSTEM_PROMPT: &str = "You organize Telegram channels into topical groups. \
Given a list of channels (id, name, optional url), partition them into a small \
number of topic groups. Every input channel must appear in exactly one group. \
For each group give a concise topic label and the dominant language of its \
channels as a two-letter ISO 639-1 code.";

#[derive(Debug, Deserialize, JsonSchema)]
struct ClusterBatch {
    topics: Vec<ClusteredTopic>,
}

pub struct Clusterer {
    model: Arc<dyn StructuredModel>,
    progress: Arc<ProgressBus>,
}

impl Clusterer {
    pub fn new(model: Arc<dyn StructuredModel>, progress: Arc<ProgressBus>) -> Self {
        Self { model, progress }
    }

    /// Cluster the channels into topics. The result is a partition: every
    /// input channel appears in exactly one group, carrying the input's
    /// metadata (the model only decides membership and labels).
    pub async fn cluster(
        &self,
        channels: &[Channel],
        request_id: &str,
    ) -> Result<Vec<ClusteredTopic>, PulseError> {
        let total = channels.len();
        self.progress
            .emit(request_id, ProgressEvent::new(0, total, "Analyzing channels"));

        let result = self.cluster_inner(channels, total, request_id).await;
        match &result {
            Ok(topics) => {
                info!(channels = total, groups = topics.len(), "Clustering complete");
                self.progress.complete(request_id, total);
            }
            Err(e) => self.progress.fail(request_id, &e.to_string()),
        }
        result
    }

    async fn cluster_inner(
        &self,
        channels: &[Channel],
        total: usize,
        request_id: &str,
    ) -> Result<Vec<ClusteredTopic>, PulseError> {
        let by_id: HashMap<&str, &Channel> =
            channels.iter().map(|c| (c.id.as_str(), c)).collect();
        let prompt = build_prompt(channels);

        let mut attempt = 0;
        loop {
            let outcome = structured::<ClusterBatch>(&*self.model, SYSTEM_PROMPT, &prompt).await;
            match outcome {
                Ok(batch) => {
                    self.progress.emit(
                        request_id,
                        ProgressEvent::new(total, total, "Processing AI response"),
                    );
                    match validate_partition(batch, &by_id) {
                        Ok(topics) => return Ok(topics),
                        Err(reason) if attempt == 0 => {
                            warn!(reason = %reason, "Clustering response invalid, retrying");
                            attempt += 1;
                        }
                        Err(reason) => return Err(PulseError::SchemaViolation(reason)),
                    }
                }
                Err(e) if attempt == 0 => {
                    warn!(error = %e, "Clustering attempt failed, retrying");
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

fn build_prompt(channels: &[Channel]) -> String {
    let mut prompt = String::from("Channels:\n");
    for channel in channels {
        prompt.push_str(&format!("- id: {}, name: {}", channel.id, channel.name));
        if let Some(url) = &channel.url {
            prompt.push_str(&format!(", url: {url}"));
        }
        prompt.push('\n');
    }
    prompt
}

/// Check the model's grouping covers every channel exactly once, and
/// rebuild the groups from the authoritative input records.
fn validate_partition(
    batch: ClusterBatch,
    by_id: &HashMap<&str, &Channel>,
) -> Result<Vec<ClusteredTopic>, String> {
    let mut assigned: HashSet<String> = HashSet::new();
    let mut topics = Vec::with_capacity(batch.topics.len());

    for group in batch.topics {
        let mut members = Vec::with_capacity(group.channels.len());
        for member in group.channels {
            let Some(original) = by_id.get(member.id.as_str()) else {
                return Err(format!("unknown channel id {:?} in group {:?}", member.id, group.topic));
            };
            if !assigned.insert(member.id.clone()) {
                return Err(format!("channel id {:?} assigned to multiple groups", member.id));
            }
            members.push((*original).clone());
        }
        if members.is_empty() {
            continue;
        }
        topics.push(ClusteredTopic {
            topic: group.topic,
            language: group.language,
            channels: members,
        });
    }

    if assigned.len() != by_id.len() {
        let missing: Vec<&str> = by_id
            .keys()
            .filter(|id| !assigned.contains(**id))
            .copied()
            .collect();
        return Err(format!("channels missing from partition: {missing:?}"));
    }
    Ok(topics)
}
