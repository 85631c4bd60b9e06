//! REST surface: route table and shared request helpers.

pub mod analysis;
pub mod channels;
pub mod community;

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Router;

use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sources", get(community::list_sources))
        .route("/summaries", get(analysis::summaries))
        .route("/insights", post(analysis::insights))
        .route("/message/{id}", get(analysis::message_detail))
        .route("/upload-telegram-export", post(channels::upload_telegram_export))
        .route("/cluster-channels", post(channels::cluster_channels))
        .route("/save-telegram-channels", post(channels::save_telegram_channels))
        .route("/channel-progress", get(channels::channel_progress))
        .route("/feedback", post(community::feedback))
        .route("/subscribe", post(community::subscribe))
}

/// The caller's X-Request-ID, or a fresh one when absent. Long-running
/// endpoints echo it so the client can open a progress stream.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}
