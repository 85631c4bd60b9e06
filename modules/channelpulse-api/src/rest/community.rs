//! Source listing and the community endpoints (feedback, subscribe).

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use channelpulse_common::Source;

use crate::error::ApiError;
use crate::AppState;

const FEEDBACK_KINDS: &[&str] = &["feedback", "question", "bug"];

#[derive(Serialize)]
struct SourceView {
    id: i64,
    url: String,
    name: String,
    source_type: &'static str,
}

impl From<&Source> for SourceView {
    fn from(source: &Source) -> Self {
        SourceView {
            id: source.id,
            url: source.url.clone(),
            name: source.name.clone(),
            source_type: source.source_type.as_str(),
        }
    }
}

pub async fn list_sources(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let grouped = state.store.list_sources_by_category().await?;
    let sources: serde_json::Map<String, serde_json::Value> = grouped
        .iter()
        .map(|(category, sources)| {
            let views: Vec<SourceView> = sources.iter().map(SourceView::from).collect();
            (category.clone(), json!(views))
        })
        .collect();
    Ok(Json(json!({ "sources": sources })))
}

#[derive(Deserialize)]
pub struct FeedbackRequest {
    email: String,
    message: String,
    #[serde(rename = "type")]
    kind: String,
}

pub async fn feedback(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FeedbackRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !FEEDBACK_KINDS.contains(&request.kind.as_str()) {
        return Err(ApiError::validation(format!(
            "type must be one of {FEEDBACK_KINDS:?}"
        )));
    }
    if request.message.trim().is_empty() {
        return Err(ApiError::validation("message must not be empty"));
    }

    state
        .store
        .add_feedback(&request.email, &request.message, &request.kind)
        .await?;
    state
        .notifier
        .notify_new_feedback(&request.email, &request.kind, &request.message)
        .await;
    Ok(Json(json!({ "success": true })))
}

#[derive(Deserialize)]
pub struct SubscribeRequest {
    email: String,
    #[serde(default)]
    source: Option<String>,
}

pub async fn subscribe(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SubscribeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = request.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::validation("a valid email is required"));
    }

    let inserted = state
        .store
        .add_subscriber(email, request.source.as_deref())
        .await?;
    if inserted {
        info!(email, "New subscriber");
        state
            .notifier
            .notify_new_subscriber(email, request.source.as_deref().unwrap_or("main"))
            .await;
    }
    // Duplicate subscriptions are not an error.
    Ok(Json(json!({ "success": true })))
}
