use anyhow::{Context, Result};
use std::time::Duration;

/// Application configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // ── Server ──────────────────────────────────────────────────────────
    pub host: String,
    pub port: u16,

    // ── Database ────────────────────────────────────────────────────────
    /// PostgreSQL connection string. When unset the service runs on the
    /// in-memory store and loses all state on restart.
    pub database_url: Option<String>,

    // ── Crypto ──────────────────────────────────────────────────────────
    /// 32-byte base64-encoded master key for AES-256-GCM token encryption.
    pub master_key: Option<String>,

    // ── Service-to-service auth ─────────────────────────────────────────
    /// Shared secret the front service sends as `x-internal-secret`.
    pub internal_api_secret: String,

    // ── LinkedIn ────────────────────────────────────────────────────────
    pub linkedin_client_id: Option<String>,
    pub linkedin_client_secret: Option<String>,
    pub linkedin_api_version: String,
    pub linkedin_oauth_base_url: String,
    pub linkedin_api_base_url: String,

    // ── Workers ─────────────────────────────────────────────────────────
    pub http_timeout: Duration,
    pub scheduler_interval: Duration,
    pub scheduler_batch_size: i64,
    pub max_concurrent_publishes: usize,
    pub publish_timeout: Duration,
    pub refresh_sweep_interval: Duration,
    pub refresh_sweep_window_mins: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL").ok();
        let master_key = std::env::var("MASTER_KEY").ok();
        if database_url.is_some() && master_key.is_none() {
            anyhow::bail!("MASTER_KEY is required when DATABASE_URL is set (32 bytes, base64)");
        }

        Ok(Config {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8430".into())
                .parse()
                .context("Invalid PORT")?,

            database_url,
            master_key,

            internal_api_secret: std::env::var("INTERNAL_API_SECRET")
                .context("INTERNAL_API_SECRET is required for service-to-service auth")?,

            linkedin_client_id: std::env::var("LINKEDIN_CLIENT_ID").ok(),
            linkedin_client_secret: std::env::var("LINKEDIN_CLIENT_SECRET").ok(),
            linkedin_api_version: std::env::var("LINKEDIN_API_VERSION")
                .unwrap_or_else(|_| "202305".into()),
            linkedin_oauth_base_url: std::env::var("LINKEDIN_OAUTH_BASE_URL")
                .unwrap_or_else(|_| "https://www.linkedin.com/oauth/v2".into()),
            linkedin_api_base_url: std::env::var("LINKEDIN_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.linkedin.com/v2".into()),

            http_timeout: secs_var("HTTP_TIMEOUT_SECS", 30)?,
            scheduler_interval: secs_var("SCHEDULER_INTERVAL_SECS", 30)?,
            scheduler_batch_size: parse_var("SCHEDULER_BATCH_SIZE", 50)?,
            max_concurrent_publishes: parse_var("MAX_CONCURRENT_PUBLISHES", 8)?,
            publish_timeout: secs_var("PUBLISH_TIMEOUT_SECS", 120)?,
            refresh_sweep_interval: secs_var("REFRESH_SWEEP_INTERVAL_SECS", 300)?,
            refresh_sweep_window_mins: parse_var("REFRESH_SWEEP_WINDOW_MINS", 10)?,
        })
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw.parse().with_context(|| format!("Invalid {name}")),
        Err(_) => Ok(default),
    }
}

fn secs_var(name: &str, default: u64) -> Result<Duration> {
    parse_var(name, default).map(Duration::from_secs)
}
