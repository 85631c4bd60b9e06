//! In-process progress registry for long-running jobs.
//!
//! Producers (the ingestor, the clusterer) emit events keyed by a
//! caller-supplied request id; the HTTP layer subscribes and bridges the
//! stream to SSE. Queues are bounded, drop-oldest, and survive for a grace
//! period after the terminal event so late subscribers still see it.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Maximum buffered events per request id. When full, the oldest event is
/// dropped; the newest is always retained.
pub const QUEUE_CAPACITY: usize = 256;

/// How long a finished queue stays subscribable after its terminal event.
const EVICTION_GRACE: Duration = Duration::from_secs(30);

/// Terminal event text clients match on.
pub const COMPLETE_MESSAGE: &str = "Clustering complete!";

/// One progress update for a long-running job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub processed_channels: usize,
    pub total_channels: usize,
    pub current_channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressEvent {
    pub fn new(processed: usize, total: usize, current: impl Into<String>) -> Self {
        Self {
            processed_channels: processed,
            total_channels: total,
            current_channel: current.into(),
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

struct ChannelState {
    /// Absolute sequence number of the first event still in `events`.
    base_seq: u64,
    events: VecDeque<ProgressEvent>,
    done: bool,
    /// Bumped on every change; subscribers wait on the receiver side.
    version: watch::Sender<u64>,
}

impl ChannelState {
    fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            base_seq: 0,
            events: VecDeque::new(),
            done: false,
            version,
        }
    }

    fn push(&mut self, event: ProgressEvent) {
        if self.events.len() >= QUEUE_CAPACITY {
            self.events.pop_front();
            self.base_seq += 1;
        }
        self.events.push_back(event);
        self.version.send_modify(|v| *v += 1);
    }
}

type ChannelMap = Arc<Mutex<HashMap<String, ChannelState>>>;

/// Registry of per-request progress queues. Cheap to clone; all clones
/// share the same registry.
#[derive(Clone)]
pub struct ProgressBus {
    channels: ChannelMap,
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressBus {
    pub fn new() -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record an event. Non-blocking; creates the queue on first use.
    pub fn emit(&self, request_id: &str, event: ProgressEvent) {
        let mut channels = self.channels.lock().expect("progress bus lock");
        channels
            .entry(request_id.to_string())
            .or_insert_with(ChannelState::new)
            .push(event);
    }

    /// Emit the terminal success event and schedule eviction.
    pub fn complete(&self, request_id: &str, total: usize) {
        self.finish(
            request_id,
            ProgressEvent::new(total, total, COMPLETE_MESSAGE),
        );
    }

    /// Emit a terminal failure event and schedule eviction.
    pub fn fail(&self, request_id: &str, reason: &str) {
        let event = {
            let channels = self.channels.lock().expect("progress bus lock");
            let total = channels
                .get(request_id)
                .and_then(|s| s.events.back())
                .map(|e| e.total_channels)
                .unwrap_or(0);
            ProgressEvent::new(0, total, "Error").with_error(reason)
        };
        self.finish(request_id, event);
    }

    fn finish(&self, request_id: &str, event: ProgressEvent) {
        {
            let mut channels = self.channels.lock().expect("progress bus lock");
            let state = channels
                .entry(request_id.to_string())
                .or_insert_with(ChannelState::new);
            state.push(event);
            state.done = true;
        }
        let channels = Arc::clone(&self.channels);
        let request_id = request_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(EVICTION_GRACE).await;
            channels.lock().expect("progress bus lock").remove(&request_id);
        });
    }

    /// Drop the queue for a request id. Subscribers mid-stream observe EOF.
    pub fn evict(&self, request_id: &str) {
        let mut channels = self.channels.lock().expect("progress bus lock");
        channels.remove(request_id);
    }

    /// Subscribe to a request's progress. Returns `None` for an unknown
    /// request id (never emitted, or already evicted). The subscription
    /// replays all buffered events, then follows live emissions.
    pub fn subscribe(&self, request_id: &str) -> Option<ProgressSubscription> {
        let channels = self.channels.lock().expect("progress bus lock");
        let state = channels.get(request_id)?;
        Some(ProgressSubscription {
            channels: Arc::clone(&self.channels),
            request_id: request_id.to_string(),
            next_seq: 0,
            version: state.version.subscribe(),
        })
    }
}

/// A cursor over one request's event stream. Each subscription sees every
/// buffered event exactly once, in emission order.
pub struct ProgressSubscription {
    channels: ChannelMap,
    request_id: String,
    next_seq: u64,
    version: watch::Receiver<u64>,
}

impl ProgressSubscription {
    /// Wait for the next event. Returns `None` once the terminal event has
    /// been delivered, or if the queue was evicted.
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        loop {
            {
                let channels = self.channels.lock().expect("progress bus lock");
                let state = channels.get(&self.request_id)?;
                // Events dropped by overflow are skipped, never re-delivered.
                if self.next_seq < state.base_seq {
                    self.next_seq = state.base_seq;
                }
                let index = (self.next_seq - state.base_seq) as usize;
                if index < state.events.len() {
                    self.next_seq += 1;
                    return Some(state.events[index].clone());
                }
                if state.done {
                    return None;
                }
            }
            // Queue drained and job still running: wait for the next emit.
            if self.version.changed().await.is_err() {
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_events_in_emission_order() {
        let bus = Arc::new(ProgressBus::new());
        bus.emit("r1", ProgressEvent::new(0, 2, "Initializing"));
        bus.emit("r1", ProgressEvent::new(1, 2, "Processing 1/2: a"));
        bus.complete("r1", 2);

        let mut sub = bus.subscribe("r1").unwrap();
        assert_eq!(sub.next_event().await.unwrap().current_channel, "Initializing");
        assert_eq!(
            sub.next_event().await.unwrap().current_channel,
            "Processing 1/2: a"
        );
        assert_eq!(sub.next_event().await.unwrap().current_channel, COMPLETE_MESSAGE);
        assert!(sub.next_event().await.is_none());
    }

    #[tokio::test]
    async fn unknown_request_id_is_none() {
        let bus = Arc::new(ProgressBus::new());
        assert!(bus.subscribe("nope").is_none());
    }

    #[tokio::test]
    async fn overflow_drops_oldest_keeps_newest() {
        let bus = Arc::new(ProgressBus::new());
        for i in 0..QUEUE_CAPACITY + 10 {
            bus.emit("r1", ProgressEvent::new(i, QUEUE_CAPACITY + 10, format!("step {i}")));
        }
        let mut sub = bus.subscribe("r1").unwrap();
        let first = sub.next_event().await.unwrap();
        assert_eq!(first.current_channel, "step 10");

        // Drain; the newest event must be the last one emitted.
        let mut last = first;
        for _ in 0..QUEUE_CAPACITY - 1 {
            last = sub.next_event().await.unwrap();
        }
        assert_eq!(last.current_channel, format!("step {}", QUEUE_CAPACITY + 9));
    }

    #[tokio::test]
    async fn late_subscriber_sees_full_stream_and_terminal() {
        let bus = Arc::new(ProgressBus::new());
        bus.emit("r1", ProgressEvent::new(0, 3, "Initializing"));
        bus.emit("r1", ProgressEvent::new(1, 3, "Processing 1/3: a"));
        bus.emit("r1", ProgressEvent::new(2, 3, "Processing 2/3: b"));
        bus.complete("r1", 3);

        // Subscribe after completion, within the grace period.
        let mut sub = bus.subscribe("r1").unwrap();
        let mut seen = Vec::new();
        while let Some(event) = sub.next_event().await {
            seen.push(event);
        }
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[3].current_channel, COMPLETE_MESSAGE);
    }

    #[tokio::test]
    async fn two_subscribers_see_the_stream_independently() {
        let bus = Arc::new(ProgressBus::new());
        bus.emit("r1", ProgressEvent::new(0, 1, "Initializing"));

        let mut a = bus.subscribe("r1").unwrap();
        let mut b = bus.subscribe("r1").unwrap();
        assert_eq!(a.next_event().await.unwrap().current_channel, "Initializing");
        assert_eq!(b.next_event().await.unwrap().current_channel, "Initializing");

        bus.complete("r1", 1);
        assert_eq!(a.next_event().await.unwrap().current_channel, COMPLETE_MESSAGE);
        assert_eq!(b.next_event().await.unwrap().current_channel, COMPLETE_MESSAGE);
        assert!(a.next_event().await.is_none());
        assert!(b.next_event().await.is_none());
    }

    #[tokio::test]
    async fn subscriber_waiting_on_live_emit_wakes_up() {
        let bus = Arc::new(ProgressBus::new());
        bus.emit("r1", ProgressEvent::new(0, 1, "Initializing"));

        let mut sub = bus.subscribe("r1").unwrap();
        assert!(sub.next_event().await.is_some());

        let emitter = Arc::clone(&bus);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            emitter.emit("r1", ProgressEvent::new(1, 1, "Processing 1/1: a"));
        });

        let event = sub.next_event().await.unwrap();
        assert_eq!(event.current_channel, "Processing 1/1: a");
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn eviction_ends_open_subscriptions() {
        let bus = Arc::new(ProgressBus::new());
        bus.emit("r1", ProgressEvent::new(0, 1, "Initializing"));
        let mut sub = bus.subscribe("r1").unwrap();
        assert!(sub.next_event().await.is_some());

        bus.evict("r1");
        assert!(sub.next_event().await.is_none());
        assert!(bus.subscribe("r1").is_none());
    }

    #[tokio::test]
    async fn fail_carries_error_field() {
        let bus = Arc::new(ProgressBus::new());
        bus.emit("r1", ProgressEvent::new(0, 2, "Initializing"));
        bus.fail("r1", "channel fetch failed");

        let mut sub = bus.subscribe("r1").unwrap();
        sub.next_event().await.unwrap();
        let terminal = sub.next_event().await.unwrap();
        assert_eq!(terminal.error.as_deref(), Some("channel fetch failed"));
        assert!(sub.next_event().await.is_none());
    }

    #[test]
    fn event_serializes_with_camel_case_keys() {
        let event = ProgressEvent::new(1, 3, "Processing 1/3: x");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["processedChannels"], 1);
        assert_eq!(json["totalChannels"], 3);
        assert_eq!(json["currentChannel"], "Processing 1/3: x");
        assert!(json.get("error").is_none());
    }
}
