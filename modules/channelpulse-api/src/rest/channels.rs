//! Channel import, clustering, ingestion, and the SSE progress stream.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use axum::extract::{Multipart, Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use futures::Stream;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use channelpulse_common::Channel;
use channelpulse_core::{IngestRequest, Period};

use crate::error::ApiError;
use crate::rest::request_id;
use crate::AppState;

/// Most channels one cluster/save call may carry.
const MAX_CHANNELS: usize = 200;

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

pub async fn upload_telegram_export(
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut file: Option<Vec<u8>> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("bad multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::validation(format!("failed to read upload: {e}")))?;
            file = Some(bytes.to_vec());
        }
    }
    let file = file.ok_or_else(|| ApiError::validation("missing file field"))?;

    let channels = channelpulse_core::parse_telegram_export(&file)?;
    info!(channels = channels.len(), "Parsed Telegram export");
    Ok(Json(json!({ "success": true, "channels": channels })))
}

#[derive(Deserialize)]
pub struct ClusterRequest {
    channels: Vec<Channel>,
    #[serde(default)]
    simplified_fetching: Option<bool>,
}

pub async fn cluster_channels(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ClusterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_channels(&request.channels)?;
    // Clustering is metadata-only; ingestion happens on save.
    if request.simplified_fetching.is_some() {
        debug!("simplified_fetching flag ignored for clustering");
    }

    let rid = request_id(&headers);
    let topics = state.clusterer.cluster(&request.channels, &rid).await?;
    Ok((
        [("x-request-id", rid)],
        Json(json!({ "success": true, "topics": topics })),
    ))
}

#[derive(Deserialize)]
pub struct SaveChannelsRequest {
    channels: Vec<Channel>,
    #[serde(default)]
    period: Option<String>,
}

pub async fn save_telegram_channels(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<SaveChannelsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_channels(&request.channels)?;
    let period = match request.period.as_deref() {
        None => Period::OneDay,
        Some(raw) => Period::parse(raw)
            .ok_or_else(|| ApiError::validation(format!("invalid period {raw:?}")))?,
    };

    let source_urls: Vec<String> = request.channels.iter().map(channel_url).collect();
    let count = source_urls.len();

    let until = Utc::now();
    let rid = request_id(&headers);
    state
        .ingestor
        .run(IngestRequest {
            source_urls,
            since: until - period.duration(),
            until,
            request_id: rid.clone(),
        })
        .await?;

    Ok((
        [("x-request-id", rid)],
        Json(json!({ "success": true, "count": count })),
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressQuery {
    request_id: String,
}

pub async fn channel_progress(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProgressQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let mut subscription = state
        .progress
        .subscribe(&query.request_id)
        .ok_or_else(|| ApiError::not_found(format!("request {}", query.request_id)))?;

    let stream = stream! {
        while let Some(event) = subscription.next_event().await {
            let payload = serde_json::to_string(&event)
                .expect("progress event serialization should never fail");
            yield Ok(Event::default().data(payload));
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEPALIVE_INTERVAL)
            .text("ping"),
    ))
}

fn validate_channels(channels: &[Channel]) -> Result<(), ApiError> {
    if channels.is_empty() {
        return Err(ApiError::validation("channels must not be empty"));
    }
    if channels.len() > MAX_CHANNELS {
        return Err(ApiError::validation(format!(
            "at most {MAX_CHANNELS} channels per request"
        )));
    }
    Ok(())
}

/// Source URL for a channel: its export URL when present, otherwise the
/// public t.me address derived from its id.
fn channel_url(channel: &Channel) -> String {
    match &channel.url {
        Some(url) if !url.is_empty() => url.clone(),
        _ => format!("https://t.me/{}", channel.id),
    }
}
