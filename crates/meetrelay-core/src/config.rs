//! Configuration module
//!
//! All runtime configuration is read from the environment once at startup.
//! Required values are validated up front so a missing secret is a fatal
//! startup error rather than a runtime surprise.

use std::env;

// Common constants
const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const SIGNATURE_TOLERANCE_SECS: i64 = 300;
const STATE_TOKEN_TTL_SECS: i64 = 600;
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;
const JOB_MAX_ATTEMPTS: i32 = 5;
const BACKOFF_BASE_SECS: u64 = 5;
const BACKOFF_CAP_SECS: u64 = 300;
const QUEUE_MAX_WORKERS: usize = 4;
const QUEUE_POLL_INTERVAL_MS: u64 = 1000;
const AUDIO_LIMIT_MB: u64 = 2048;
const DOCUMENT_CEILING_MB: u64 = 2048;
const MEETING_NOT_FOUND_GRACE_HOURS: i64 = 24;

/// Application configuration, loaded from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    pub server_port: u16,
    pub environment: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,

    // Zoom OAuth app
    pub zoom_client_id: String,
    pub zoom_client_secret: String,
    pub zoom_redirect_uri: String,
    pub zoom_webhook_secret: String,
    pub zoom_api_base: String,
    pub zoom_oauth_base: String,

    // Connect-flow state token
    pub state_secret: String,
    pub state_token_ttl_seconds: i64,

    // Telegram delivery
    pub telegram_bot_token: String,
    pub telegram_api_base: String,
    /// Chat that receives dead-letter reports. None disables operator reports.
    pub operator_chat_id: Option<i64>,

    // Webhook authentication
    pub signature_tolerance_seconds: i64,

    // OAuth lifecycle
    pub token_refresh_margin_seconds: i64,

    // Recording fetch
    pub meeting_not_found_grace_hours: i64,

    // Delivery size policy
    pub audio_limit_bytes: u64,
    pub document_ceiling_bytes: u64,

    // Retry scheduler
    pub job_max_attempts: i32,
    pub backoff_base_seconds: u64,
    pub backoff_cap_seconds: u64,
    pub queue_max_workers: usize,
    pub queue_poll_interval_ms: u64,
}

fn required(name: &str) -> Result<String, anyhow::Error> {
    env::var(name).map_err(|_| anyhow::anyhow!("{} must be set", name))
}

fn parsed_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let config = Config {
            server_port: env::var("PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            environment: env::var("ENVIRONMENT")
                .or_else(|_| env::var("APP_ENV"))
                .unwrap_or_else(|_| "development".to_string()),
            database_url: required("DATABASE_URL")?,
            db_max_connections: parsed_or("DB_MAX_CONNECTIONS", MAX_CONNECTIONS),
            db_timeout_seconds: parsed_or("DB_TIMEOUT_SECONDS", CONNECTION_TIMEOUT_SECS),

            zoom_client_id: required("ZOOM_CLIENT_ID")?,
            zoom_client_secret: required("ZOOM_CLIENT_SECRET")?,
            zoom_redirect_uri: required("ZOOM_REDIRECT_URI")?,
            zoom_webhook_secret: required("ZOOM_WEBHOOK_SECRET")?,
            zoom_api_base: env::var("ZOOM_API_BASE")
                .unwrap_or_else(|_| "https://api.zoom.us/v2".to_string()),
            zoom_oauth_base: env::var("ZOOM_OAUTH_BASE")
                .unwrap_or_else(|_| "https://zoom.us/oauth".to_string()),

            state_secret: required("STATE_SECRET")?,
            state_token_ttl_seconds: parsed_or("STATE_TOKEN_TTL_SECONDS", STATE_TOKEN_TTL_SECS),

            telegram_bot_token: required("TELEGRAM_BOT_TOKEN")?,
            telegram_api_base: env::var("TELEGRAM_API_BASE")
                .unwrap_or_else(|_| "https://api.telegram.org".to_string()),
            operator_chat_id: env::var("OPERATOR_CHAT_ID").ok().and_then(|s| s.parse().ok()),

            signature_tolerance_seconds: parsed_or(
                "SIGNATURE_TOLERANCE_SECONDS",
                SIGNATURE_TOLERANCE_SECS,
            ),
            token_refresh_margin_seconds: parsed_or(
                "TOKEN_REFRESH_MARGIN_SECONDS",
                TOKEN_REFRESH_MARGIN_SECS,
            ),
            meeting_not_found_grace_hours: parsed_or(
                "MEETING_NOT_FOUND_GRACE_HOURS",
                MEETING_NOT_FOUND_GRACE_HOURS,
            ),

            audio_limit_bytes: parsed_or("AUDIO_LIMIT_MB", AUDIO_LIMIT_MB) * 1024 * 1024,
            document_ceiling_bytes: parsed_or("DOCUMENT_CEILING_MB", DOCUMENT_CEILING_MB)
                * 1024
                * 1024,

            job_max_attempts: parsed_or("JOB_MAX_ATTEMPTS", JOB_MAX_ATTEMPTS),
            backoff_base_seconds: parsed_or("BACKOFF_BASE_SECONDS", BACKOFF_BASE_SECS),
            backoff_cap_seconds: parsed_or("BACKOFF_CAP_SECONDS", BACKOFF_CAP_SECS),
            queue_max_workers: parsed_or("QUEUE_MAX_WORKERS", QUEUE_MAX_WORKERS),
            queue_poll_interval_ms: parsed_or("QUEUE_POLL_INTERVAL_MS", QUEUE_POLL_INTERVAL_MS),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.database_url.starts_with("postgresql://")
            && !self.database_url.starts_with("postgres://")
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        if self.state_secret.len() < 32 {
            return Err(anyhow::anyhow!(
                "STATE_SECRET must be at least 32 characters long"
            ));
        }

        if self.zoom_webhook_secret.is_empty() {
            return Err(anyhow::anyhow!("ZOOM_WEBHOOK_SECRET must not be empty"));
        }

        if self.job_max_attempts < 1 {
            return Err(anyhow::anyhow!("JOB_MAX_ATTEMPTS must be at least 1"));
        }

        if self.backoff_cap_seconds < self.backoff_base_seconds {
            return Err(anyhow::anyhow!(
                "BACKOFF_CAP_SECONDS must not be smaller than BACKOFF_BASE_SECONDS"
            ));
        }

        if self.document_ceiling_bytes < self.audio_limit_bytes {
            return Err(anyhow::anyhow!(
                "DOCUMENT_CEILING_MB must not be smaller than AUDIO_LIMIT_MB"
            ));
        }

        Ok(())
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            server_port: 8000,
            environment: "test".to_string(),
            database_url: "postgresql://localhost/meetrelay".to_string(),
            db_max_connections: 20,
            db_timeout_seconds: 30,
            zoom_client_id: "cid".to_string(),
            zoom_client_secret: "csecret".to_string(),
            zoom_redirect_uri: "https://example.com/callback".to_string(),
            zoom_webhook_secret: "whsecret".to_string(),
            zoom_api_base: "https://api.zoom.us/v2".to_string(),
            zoom_oauth_base: "https://zoom.us/oauth".to_string(),
            state_secret: "0123456789abcdef0123456789abcdef".to_string(),
            state_token_ttl_seconds: 600,
            telegram_bot_token: "bot-token".to_string(),
            telegram_api_base: "https://api.telegram.org".to_string(),
            operator_chat_id: None,
            signature_tolerance_seconds: 300,
            token_refresh_margin_seconds: 60,
            meeting_not_found_grace_hours: 24,
            audio_limit_bytes: 2048 * 1024 * 1024,
            document_ceiling_bytes: 2048 * 1024 * 1024,
            job_max_attempts: 5,
            backoff_base_seconds: 5,
            backoff_cap_seconds: 300,
            queue_max_workers: 4,
            queue_poll_interval_ms: 1000,
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_rejects_non_postgres_url() {
        let mut config = valid_config();
        config.database_url = "sqlite://db.sqlite".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_short_state_secret() {
        let mut config = valid_config();
        config.state_secret = "short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_backoff_cap_below_base() {
        let mut config = valid_config();
        config.backoff_base_seconds = 60;
        config.backoff_cap_seconds = 30;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let mut config = valid_config();
        config.job_max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_is_production() {
        let mut config = valid_config();
        assert!(!config.is_production());
        config.environment = "Production".to_string();
        assert!(config.is_production());
    }
}
