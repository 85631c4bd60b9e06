use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelegramError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    #[error("failed to parse channel page: {0}")]
    Parse(String),
}
