//! Channel ingestion: fan out over sources, persist messages, resolve the
//! links they cite, and report progress along the way.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::time::Instant;
use tracing::{info, warn};

use channelpulse_common::{ProgressBus, ProgressEvent, PulseError, SourceKind};
use telegram_client::{channel_handle, ChannelClient};

use crate::links::{canonicalize_source_url, extract_urls};
use crate::resolver::LinkResolver;
use crate::store::Store;

/// Max channel fetches in flight.
const MAX_CONCURRENT_FETCHES: usize = 4;

/// Wall-clock cap for one channel's full history fetch.
const CHANNEL_FETCH_TIMEOUT: Duration = Duration::from_secs(120);

/// Minimum spacing between progress emits for one source.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub source_urls: Vec<String>,
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
    pub request_id: String,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IngestOutcome {
    pub sources: usize,
    pub messages_recorded: usize,
    pub failed_sources: usize,
}

pub struct ChannelIngestor {
    store: Store,
    resolver: Arc<LinkResolver>,
    channels: Arc<dyn ChannelClient>,
    progress: Arc<ProgressBus>,
}

impl ChannelIngestor {
    pub fn new(
        store: Store,
        resolver: Arc<LinkResolver>,
        channels: Arc<dyn ChannelClient>,
        progress: Arc<ProgressBus>,
    ) -> Self {
        Self {
            store,
            resolver,
            channels,
            progress,
        }
    }

    /// Ingest all requested sources. Per-source failures are reported on
    /// the progress stream and counted, never fatal to the batch.
    pub async fn run(&self, request: IngestRequest) -> Result<IngestOutcome, PulseError> {
        let mut seen = std::collections::HashSet::new();
        let urls: Vec<String> = request
            .source_urls
            .iter()
            .map(|u| canonicalize_source_url(u))
            .filter(|u| seen.insert(u.clone()))
            .collect();
        let total = urls.len();

        for url in &urls {
            let name = channel_handle(url);
            self.store
                .upsert_source(url, &name, SourceKind::Telegram, "Uncategorized")
                .await?;
        }

        self.progress
            .emit(&request.request_id, ProgressEvent::new(0, total, "Initializing"));

        let processed = AtomicUsize::new(0);
        let recorded = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);

        futures::stream::iter(urls.iter().enumerate())
            .for_each_concurrent(MAX_CONCURRENT_FETCHES, |(index, url)| {
                let request = &request;
                let processed = &processed;
                let recorded = &recorded;
                let failed = &failed;
                async move {
                    let label = format!("Processing {}/{}: {}", index + 1, total, url);
                    match self.ingest_source(url, &label, request, processed, total).await {
                        Ok(count) => {
                            recorded.fetch_add(count, Ordering::SeqCst);
                            let done = processed.fetch_add(1, Ordering::SeqCst) + 1;
                            self.progress
                                .emit(&request.request_id, ProgressEvent::new(done, total, &label));
                        }
                        Err(e) => {
                            warn!(url = %url, error = %e, "Source ingestion failed");
                            failed.fetch_add(1, Ordering::SeqCst);
                            let done = processed.fetch_add(1, Ordering::SeqCst) + 1;
                            self.progress.emit(
                                &request.request_id,
                                ProgressEvent::new(done, total, &label).with_error(e.to_string()),
                            );
                        }
                    }
                }
            })
            .await;

        self.progress.complete(&request.request_id, total);

        let outcome = IngestOutcome {
            sources: total,
            messages_recorded: recorded.load(Ordering::SeqCst),
            failed_sources: failed.load(Ordering::SeqCst),
        };
        info!(
            sources = outcome.sources,
            messages = outcome.messages_recorded,
            failed = outcome.failed_sources,
            "Ingestion batch complete"
        );
        Ok(outcome)
    }

    /// Fetch one source and persist its messages in timestamp order.
    /// Returns how many messages were newly recorded.
    async fn ingest_source(
        &self,
        url: &str,
        label: &str,
        request: &IngestRequest,
        processed: &AtomicUsize,
        total: usize,
    ) -> anyhow::Result<usize> {
        let fetched = tokio::time::timeout(
            CHANNEL_FETCH_TIMEOUT,
            self.channels
                .fetch_channel_messages(url, request.since, request.until),
        )
        .await
        .map_err(|_| anyhow::anyhow!("channel fetch timed out"))??;

        let mut messages = fetched;
        messages.sort_by_key(|m| (m.date, m.message_id));

        let mut recorded = 0usize;
        let mut last_emit = Instant::now();

        for message in messages {
            let record = self
                .store
                .record_message(
                    SourceKind::Telegram.as_str(),
                    &message.channel_id,
                    message.message_id,
                    url,
                    message.date,
                    &message.text,
                )
                .await?;

            if record.inserted {
                recorded += 1;
                let links = extract_urls(&message.text);
                if !links.is_empty() {
                    let summaries = futures::future::join_all(links.iter().map(|link| async move {
                        (link.clone(), self.resolver.resolve(link).await)
                    }))
                    .await;

                    let map: serde_json::Map<String, serde_json::Value> = summaries
                        .into_iter()
                        .map(|(link, summary)| (link, serde_json::Value::String(summary)))
                        .collect();
                    let json = serde_json::Value::Object(map).to_string();
                    self.store.attach_resolved_links(record.id, &json).await?;
                }
            }

            if last_emit.elapsed() >= PROGRESS_INTERVAL {
                last_emit = Instant::now();
                self.progress.emit(
                    &request.request_id,
                    ProgressEvent::new(processed.load(Ordering::SeqCst), total, label),
                );
            }
        }

        Ok(recorded)
    }
}
