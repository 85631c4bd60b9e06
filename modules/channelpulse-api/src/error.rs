//! HTTP mapping for core errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, warn};

use channelpulse_common::PulseError;

pub struct ApiError(pub PulseError);

impl From<PulseError> for ApiError {
    fn from(e: PulseError) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError(PulseError::Validation(message.into()))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError(PulseError::NotFound(message.into()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PulseError::Validation(_) => StatusCode::BAD_REQUEST,
            PulseError::NotFound(_) => StatusCode::NOT_FOUND,
            PulseError::Upstream(_) => StatusCode::SERVICE_UNAVAILABLE,
            PulseError::SchemaViolation(_) => StatusCode::BAD_GATEWAY,
            PulseError::Database(_) | PulseError::Anyhow(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(status = %status, error = %self.0, "Request failed");
        } else {
            warn!(status = %status, error = %self.0, "Request rejected");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
