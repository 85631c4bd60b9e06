pub mod config;
pub mod error;
pub mod progress;
pub mod types;

pub use config::Config;
pub use error::PulseError;
pub use progress::{ProgressBus, ProgressEvent, ProgressSubscription};
pub use types::{
    Channel, ClusteredTopic, Insight, Resource, Source, SourceKind, Stance, StoredMessage,
    TopicSummary,
};
