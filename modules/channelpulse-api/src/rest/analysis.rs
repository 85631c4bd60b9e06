//! Summaries, insights, and message lookup.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use channelpulse_common::{Insight, TopicSummary};
use channelpulse_core::Period;

use crate::error::ApiError;
use crate::rest::request_id;
use crate::AppState;

/// Most sources one summaries call may name.
const MAX_SUMMARY_SOURCES: usize = 20;

/// Most topics one insights call may carry.
const MAX_INSIGHT_TOPICS: usize = 10;

#[derive(Deserialize)]
pub struct SummariesQuery {
    period: String,
    #[serde(default)]
    sources: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SummariesResponse {
    topics: Vec<TopicSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    no_messages_found: Option<bool>,
}

pub async fn summaries(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<SummariesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let period = Period::parse(&query.period)
        .ok_or_else(|| ApiError::validation(format!("invalid period {:?}", query.period)))?;

    let sources: Vec<String> = query
        .sources
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if sources.len() > MAX_SUMMARY_SOURCES {
        return Err(ApiError::validation(format!(
            "at most {MAX_SUMMARY_SOURCES} sources per request"
        )));
    }

    let rid = request_id(&headers);
    info!(request_id = %rid, period = period.as_str(), sources = sources.len(), "Summaries requested");
    state
        .notifier
        .notify_summaries_request(&rid, period.as_str(), sources.len())
        .await;

    let outcome = state.summarizer.summarize(period, &sources).await?;
    let body = SummariesResponse {
        topics: outcome.topics,
        no_messages_found: outcome.no_messages_found.then_some(true),
    };
    Ok(([("x-request-id", rid)], Json(body)))
}

#[derive(Deserialize)]
pub struct InsightsRequest {
    topics: Vec<TopicSummary>,
}

#[derive(Serialize)]
struct TopicWithInsights {
    #[serde(flatten)]
    topic: TopicSummary,
    insights: Insight,
}

pub async fn insights(
    State(state): State<Arc<AppState>>,
    Json(request): Json<InsightsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.topics.is_empty() {
        return Err(ApiError::validation("topics must not be empty"));
    }
    if request.topics.len() > MAX_INSIGHT_TOPICS {
        return Err(ApiError::validation(format!(
            "at most {MAX_INSIGHT_TOPICS} topics per request"
        )));
    }

    let mut enriched = Vec::with_capacity(request.topics.len());
    for topic in request.topics {
        let insight = state.insights.generate(&topic).await?;
        enriched.push(TopicWithInsights {
            topic,
            insights: insight,
        });
    }
    Ok(Json(json!({ "topics": enriched })))
}

pub async fn message_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let message = state
        .store
        .get_message(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("message {id}")))?;

    Ok(Json(json!({
        "source": message.source_url,
        "date": message.date.to_rfc3339(),
        "content": message.text,
    })))
}
