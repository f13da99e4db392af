//! Application configuration loaded from environment variables.
//!
//! Secrets are injected as environment variables by the deployment; a `.env`
//! file is honoured for local development.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Which `ContributionStore` backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(StoreBackend::Firestore),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(ConfigError::Invalid("STORE_BACKEND", s.to_string())),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Strava credentials ---
    /// Strava OAuth client ID (public)
    pub strava_client_id: String,
    /// Strava OAuth client secret
    pub strava_client_secret: String,
    /// Token Strava echoes back during the subscription handshake
    pub webhook_verify_token: String,
    /// Public URL of our webhook; push subscriptions are managed only when set
    pub callback_url: Option<String>,

    // --- Strava endpoints ---
    pub strava_api_url: String,
    pub strava_oauth_url: String,
    pub strava_subscription_url: String,
    /// Timeout applied to every outbound HTTP call
    pub http_timeout: Duration,

    // --- Server & storage ---
    pub port: u16,
    pub store_backend: StoreBackend,
    pub gcp_project_id: String,
    /// Directory holding rate-limited webhook events
    pub spool_dir: PathBuf,

    // --- Background loops ---
    pub retry_interval: Duration,
    pub token_refresh_interval: Duration,
    /// Refresh tokens expiring within this window
    pub token_refresh_lookahead: Duration,
    pub backfill_interval: Duration,
    pub backfill_page_size: u32,
    pub backfill_max_pages: u32,

    // --- Classification ---
    pub ride_activity_type: String,
    /// Strava `workout_type` value that marks a countable trip
    pub commute_workout_type: i64,
}

impl Config {
    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            strava_client_id: "test_client_id".to_string(),
            strava_client_secret: "test_secret".to_string(),
            webhook_verify_token: "test_verify_token".to_string(),
            callback_url: None,
            strava_api_url: "http://127.0.0.1:9/api/v3".to_string(),
            strava_oauth_url: "http://127.0.0.1:9/oauth".to_string(),
            strava_subscription_url: "http://127.0.0.1:9/api/v3/push_subscriptions".to_string(),
            http_timeout: Duration::from_secs(5),
            port: 8080,
            store_backend: StoreBackend::Memory,
            gcp_project_id: "test-project".to_string(),
            spool_dir: PathBuf::from("spool"),
            retry_interval: Duration::from_secs(3600),
            token_refresh_interval: Duration::from_secs(600),
            token_refresh_lookahead: Duration::from_secs(1800),
            backfill_interval: Duration::from_secs(600),
            backfill_page_size: 50,
            backfill_max_pages: 20,
            ride_activity_type: "Ride".to_string(),
            commute_workout_type: 10,
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            strava_client_id: required("STRAVA_CLIENT_ID")?,
            strava_client_secret: required("STRAVA_CLIENT_SECRET")?,
            webhook_verify_token: required("WEBHOOK_VERIFY_TOKEN")?,
            callback_url: env::var("STRAVA_CALLBACK_URL")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),

            strava_api_url: env::var("STRAVA_API_URL")
                .unwrap_or_else(|_| "https://www.strava.com/api/v3".to_string()),
            strava_oauth_url: env::var("STRAVA_OAUTH_URL")
                .unwrap_or_else(|_| "https://www.strava.com/oauth".to_string()),
            strava_subscription_url: env::var("STRAVA_SUBSCRIPTION_URL").unwrap_or_else(|_| {
                "https://www.strava.com/api/v3/push_subscriptions".to_string()
            }),
            http_timeout: seconds("HTTP_TIMEOUT_SECS", 30)?,

            port: parsed("PORT", 8080)?,
            store_backend: parsed("STORE_BACKEND", StoreBackend::Firestore)?,
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            spool_dir: env::var("SPOOL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("spool")),

            retry_interval: seconds("RETRY_INTERVAL_SECS", 3600)?,
            token_refresh_interval: seconds("TOKEN_REFRESH_INTERVAL_SECS", 600)?,
            token_refresh_lookahead: seconds("TOKEN_REFRESH_LOOKAHEAD_SECS", 1800)?,
            backfill_interval: seconds("BACKFILL_INTERVAL_SECS", 600)?,
            backfill_page_size: positive("BACKFILL_PAGE_SIZE", 50)?,
            backfill_max_pages: positive("BACKFILL_MAX_PAGES", 20)?,

            ride_activity_type: env::var("RIDE_ACTIVITY_TYPE")
                .unwrap_or_else(|_| "Ride".to_string()),
            commute_workout_type: parsed("COMMUTE_WORKOUT_TYPE", 10)?,
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .map_err(|_| ConfigError::Missing(name))
}

fn parsed<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

fn seconds(name: &'static str, default: u64) -> Result<Duration, ConfigError> {
    let secs: u64 = parsed(name, default)?;
    if secs == 0 {
        return Err(ConfigError::Invalid(name, "0".to_string()));
    }
    Ok(Duration::from_secs(secs))
}

fn positive(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    let value: u32 = parsed(name, default)?;
    if value == 0 {
        return Err(ConfigError::Invalid(name, "0".to_string()));
    }
    Ok(value)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}
