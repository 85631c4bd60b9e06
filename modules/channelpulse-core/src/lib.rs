pub mod clusterer;
pub mod export;
pub mod ingestor;
pub mod insights;
pub mod links;
pub mod resolver;
pub mod store;
pub mod summarizer;

pub use clusterer::Clusterer;
pub use export::parse_telegram_export;
pub use ingestor::{ChannelIngestor, IngestOutcome, IngestRequest};
pub use insights::InsightsGenerator;
pub use links::{canonicalize_source_url, extract_urls};
pub use resolver::LinkResolver;
pub use store::{RecordedMessage, Store};
pub use summarizer::{Period, Summarizer, SummaryOutcome};
