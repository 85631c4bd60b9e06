use std::sync::Arc;

use anyhow::Result;
use axum::http::{header, HeaderValue};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use channelpulse_common::{Config, ProgressBus};
use channelpulse_core::{
    ChannelIngestor, Clusterer, InsightsGenerator, LinkResolver, Store, Summarizer,
};
use llm_client::{GeminiClient, PerplexityClient};
use telegram_client::{BotNotifier, ChannelClient, NoopNotifier, Notifier, PreviewClient};

mod error;
mod rest;

pub struct AppState {
    pub store: Store,
    pub progress: Arc<ProgressBus>,
    pub summarizer: Summarizer,
    pub clusterer: Clusterer,
    pub insights: InsightsGenerator,
    pub ingestor: ChannelIngestor,
    pub notifier: Arc<dyn Notifier>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("channelpulse=info".parse()?),
        )
        .init();

    let config = Config::from_env();
    config.log_redacted();
    info!(env = %config.env, db = config.db_file(), "Starting channelpulse");

    let store = Store::open(config.db_file()).await?;

    let gemini = Arc::new(GeminiClient::new(&config.gemini_api_key));
    let perplexity = Arc::new(PerplexityClient::new(&config.perplexity_api_key));
    let progress = Arc::new(ProgressBus::new());
    let resolver = Arc::new(LinkResolver::new(store.clone(), perplexity));
    let channels: Arc<dyn ChannelClient> = Arc::new(PreviewClient::new());

    let notifier: Arc<dyn Notifier> = match (
        config.enable_telegram_bot,
        config.telegram_bot_token.as_deref(),
        config.telegram_admin_chat_id,
    ) {
        (true, Some(token), Some(chat_id)) => {
            info!("Admin notification bot enabled");
            Arc::new(BotNotifier::new(token, chat_id))
        }
        (true, _, _) => {
            warn!("ENABLE_TELEGRAM_BOT is set but token or admin chat id is missing");
            Arc::new(NoopNotifier)
        }
        _ => Arc::new(NoopNotifier),
    };

    let state = Arc::new(AppState {
        summarizer: Summarizer::new(store.clone(), gemini.clone()),
        clusterer: Clusterer::new(gemini.clone(), Arc::clone(&progress)),
        insights: InsightsGenerator::new(store.clone(), gemini),
        ingestor: ChannelIngestor::new(
            store.clone(),
            resolver,
            channels,
            Arc::clone(&progress),
        ),
        store,
        progress,
        notifier,
    });

    let app = rest::router()
        .with_state(state)
        // The browser UI is served elsewhere; the API takes cross-origin calls.
        .layer(tower_http::cors::CorsLayer::permissive())
        // No caching for API responses
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        // Logging layer
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        );

    let addr = format!("{}:{}", config.web_host, config.web_port);
    info!("channelpulse API starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
