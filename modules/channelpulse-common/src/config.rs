use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Deployment environment: "production" selects the production database
    /// file, anything else the development one.
    pub env: String,

    // AI providers
    pub gemini_api_key: String,
    pub perplexity_api_key: String,

    // Telegram (MTProto credentials are kept for operators that front the
    // ingestor with an authenticated gateway; the preview fetcher needs none)
    pub telegram_api_id: Option<i64>,
    pub telegram_api_hash: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub telegram_admin_chat_id: Option<i64>,
    pub enable_telegram_bot: bool,

    // Web server
    pub web_host: String,
    pub web_port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            env: env::var("ENV").unwrap_or_else(|_| "development".to_string()),
            gemini_api_key: required_env("GEMINI_API_KEY"),
            perplexity_api_key: required_env("PERPLEXITY_API_KEY"),
            telegram_api_id: env::var("TELEGRAM_API_ID").ok().and_then(|v| v.parse().ok()),
            telegram_api_hash: env::var("TELEGRAM_API_HASH").ok(),
            telegram_bot_token: env::var("TELEGRAM_BOT_TOKEN").ok(),
            telegram_admin_chat_id: env::var("TELEGRAM_ADMIN_CHAT_ID")
                .ok()
                .and_then(|v| v.parse().ok()),
            enable_telegram_bot: env::var("ENABLE_TELEGRAM_BOT")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            web_host: env::var("WEB_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            web_port: env::var("WEB_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .expect("WEB_PORT must be a number"),
        }
    }

    /// Database file for the current environment.
    pub fn db_file(&self) -> &'static str {
        if self.env == "production" {
            "sources.db"
        } else {
            "sources_dev.db"
        }
    }

    /// Log the presence and length of each secret for debugging, never the value.
    pub fn log_redacted(&self) {
        let vars = [
            ("GEMINI_API_KEY", Some(self.gemini_api_key.as_str())),
            ("PERPLEXITY_API_KEY", Some(self.perplexity_api_key.as_str())),
            ("TELEGRAM_API_HASH", self.telegram_api_hash.as_deref()),
            ("TELEGRAM_BOT_TOKEN", self.telegram_bot_token.as_deref()),
        ];
        for (name, value) in vars {
            match value {
                None | Some("") => tracing::info!("{name} = (empty)"),
                Some(v) => tracing::info!("{name} = ({} chars)", v.len()),
            }
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_file_follows_environment() {
        let mut config = Config {
            env: "production".to_string(),
            gemini_api_key: String::new(),
            perplexity_api_key: String::new(),
            telegram_api_id: None,
            telegram_api_hash: None,
            telegram_bot_token: None,
            telegram_admin_chat_id: None,
            enable_telegram_bot: false,
            web_host: String::new(),
            web_port: 0,
        };
        assert_eq!(config.db_file(), "sources.db");

        config.env = "development".to_string();
        assert_eq!(config.db_file(), "sources_dev.db");

        config.env = "staging".to_string();
        assert_eq!(config.db_file(), "sources_dev.db");
    }
}
