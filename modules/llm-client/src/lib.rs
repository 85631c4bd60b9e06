//! Thin clients for the two external AI endpoints: structured JSON
//! generation (Gemini) and URL-to-summary extraction (Perplexity).
//! The traits here are the seams the core orchestration is written
//! against; tests substitute in-memory implementations.

pub mod error;
mod gemini;
mod perplexity;
pub mod schema;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;

pub use error::LlmError;
pub use gemini::GeminiClient;
pub use perplexity::PerplexityClient;
pub use schema::response_schema;

/// A model that can answer a prompt with JSON conforming to a schema.
#[async_trait]
pub trait StructuredModel: Send + Sync {
    async fn generate_json(
        &self,
        system: &str,
        user: &str,
        schema: serde_json::Value,
    ) -> Result<serde_json::Value, LlmError>;
}

/// A service that turns a URL into a short text summary of its content.
#[async_trait]
pub trait LinkSummarizer: Send + Sync {
    async fn summarize_url(&self, url: &str) -> Result<String, LlmError>;
}

/// Ask a structured model for a typed response. Decoding failure is a
/// schema violation; callers decide whether to retry.
pub async fn structured<T>(
    model: &dyn StructuredModel,
    system: &str,
    user: &str,
) -> Result<T, LlmError>
where
    T: JsonSchema + DeserializeOwned,
{
    let schema = response_schema::<T>();
    let value = model.generate_json(system, user, schema).await?;
    serde_json::from_value(value).map_err(|e| LlmError::Schema(e.to_string()))
}
