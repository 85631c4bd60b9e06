use thiserror::Error;

#[derive(Error, Debug)]
pub enum PulseError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Transient upstream failure (model 5xx, timeout, channel fetch failure)
    /// after retries were exhausted.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// The model returned output that does not conform to the requested
    /// schema, even after a retry.
    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
