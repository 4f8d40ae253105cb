//! Application configuration loaded from environment.

use std::time::Duration;

/// Seconds a connection token stays redeemable.
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 10;
/// Seconds a registered connection survives without a ping.
pub const DEFAULT_LIVENESS_TTL_SECS: u64 = 30;
/// Seconds between reaper sweeps for silently dropped connections.
pub const DEFAULT_REAP_INTERVAL_SECS: u64 = 10;

/// Application configuration loaded from `.env` and environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Redis connection URL (e.g. `redis://127.0.0.1/`).
    pub redis_url: String,
    /// How long a freshly minted connection token stays redeemable.
    pub token_ttl: Duration,
    /// How long a connection stays online without a liveness refresh.
    pub liveness_ttl: Duration,
    /// How often the reaper sweeps rooms for expired connections.
    pub reap_interval: Duration,
    /// Log level: `error`, `warn`, `info`, `debug`, `trace`.
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment. Call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string());

        let token_ttl = parse_secs("TOKEN_TTL_SECS", DEFAULT_TOKEN_TTL_SECS)?;
        let liveness_ttl = parse_secs("LIVENESS_TTL_SECS", DEFAULT_LIVENESS_TTL_SECS)?;
        let reap_interval = parse_secs("REAP_INTERVAL_SECS", DEFAULT_REAP_INTERVAL_SECS)?;

        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            redis_url,
            token_ttl,
            liveness_ttl,
            reap_interval,
            log_level,
        })
    }
}

/// Read a duration in whole seconds from `var`, falling back to `default`.
/// Zero is rejected: a zero TTL would expire keys the moment they are set.
fn parse_secs(var: &'static str, default: u64) -> Result<Duration, ConfigLoadError> {
    let secs = match std::env::var(var) {
        Ok(raw) => raw
            .parse::<u64>()
            .ok()
            .filter(|&s| s > 0)
            .ok_or(ConfigLoadError::InvalidSeconds(var))?,
        Err(_) => default,
    };
    Ok(Duration::from_secs(secs))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Invalid {0}: expected a positive whole number of seconds")]
    InvalidSeconds(&'static str),
}
