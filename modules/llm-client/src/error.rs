use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API returned {status}: {body}")]
    Api { status: u16, body: String },

    /// The model's output could not be decoded against the requested schema.
    #[error("response did not match schema: {0}")]
    Schema(String),
}

impl LlmError {
    /// Whether a retry has any chance of succeeding: network errors,
    /// timeouts, rate limits, and server-side failures.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Request(_) => true,
            LlmError::Api { status, .. } => *status == 429 || *status >= 500,
            LlmError::Schema(_) => false,
        }
    }
}
