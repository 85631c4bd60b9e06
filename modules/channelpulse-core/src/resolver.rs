//! Link resolution: URL → short text summary, memoized in the store, with
//! per-URL single-flight so a burst of messages citing the same link costs
//! one outbound call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{OnceCell, Semaphore};
use tracing::{debug, warn};

use llm_client::LinkSummarizer;

use crate::store::Store;

/// Max outbound resolutions in flight across all requests.
const MAX_CONCURRENT_RESOLUTIONS: usize = 8;

/// Per-call timeout for the external resolver.
const RESOLVE_TIMEOUT: Duration = Duration::from_secs(30);

/// After this many consecutive failures for one URL, stop trying.
const MAX_ATTEMPTS_PER_URL: u32 = 3;

pub struct LinkResolver {
    store: Store,
    summarizer: Arc<dyn LinkSummarizer>,
    /// URL → shared in-flight resolution. Entries exist only while a
    /// resolution is running; joiners await the same cell.
    in_flight: Mutex<HashMap<String, Arc<OnceCell<String>>>>,
    permits: Semaphore,
    failures: Mutex<HashMap<String, u32>>,
}

impl LinkResolver {
    pub fn new(store: Store, summarizer: Arc<dyn LinkSummarizer>) -> Self {
        Self {
            store,
            summarizer,
            in_flight: Mutex::new(HashMap::new()),
            permits: Semaphore::new(MAX_CONCURRENT_RESOLUTIONS),
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a URL to a summary. Cache hits return immediately; misses
    /// either start a resolution or join one already in flight. Failures
    /// come back as an empty string and are not cached, so a later call
    /// may retry — up to the per-URL attempt cap.
    pub async fn resolve(&self, url: &str) -> String {
        match self.store.get_link_summary(url).await {
            Ok(Some(summary)) => return summary,
            Ok(None) => {}
            Err(e) => {
                warn!(url, error = %e, "Link summary lookup failed");
                return String::new();
            }
        }

        let cell = {
            let mut in_flight = self.in_flight.lock().expect("resolver lock");
            in_flight
                .entry(url.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let summary = cell
            .get_or_init(|| self.resolve_uncached(url))
            .await
            .clone();

        // Only the cell we actually awaited may be retired; a later
        // resolution round may have installed a fresh one already.
        let mut in_flight = self.in_flight.lock().expect("resolver lock");
        if in_flight.get(url).is_some_and(|current| Arc::ptr_eq(current, &cell)) {
            in_flight.remove(url);
        }
        summary
    }

    async fn resolve_uncached(&self, url: &str) -> String {
        {
            let failures = self.failures.lock().expect("resolver failure lock");
            if failures.get(url).copied().unwrap_or(0) >= MAX_ATTEMPTS_PER_URL {
                debug!(url, "Attempt cap reached, skipping resolution");
                return String::new();
            }
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .expect("resolver semaphore closed");

        let result = tokio::time::timeout(RESOLVE_TIMEOUT, self.summarizer.summarize_url(url)).await;

        let summary = match result {
            Ok(Ok(text)) if !text.is_empty() => text,
            Ok(Ok(_)) => {
                warn!(url, "Resolver returned empty summary");
                self.note_failure(url);
                return String::new();
            }
            Ok(Err(e)) => {
                warn!(url, error = %e, "Link resolution failed");
                self.note_failure(url);
                return String::new();
            }
            Err(_) => {
                warn!(url, "Link resolution timed out");
                self.note_failure(url);
                return String::new();
            }
        };

        if let Err(e) = self.store.put_link_summary(url, &summary).await {
            warn!(url, error = %e, "Failed to persist link summary");
        }
        self.failures.lock().expect("resolver failure lock").remove(url);
        summary
    }

    fn note_failure(&self, url: &str) {
        let mut failures = self.failures.lock().expect("resolver failure lock");
        *failures.entry(url.to_string()).or_insert(0) += 1;
    }
}
