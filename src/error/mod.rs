//! Application error types for robust error handling.

use thiserror::Error;

/// Application-level errors.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid or expired connection token")]
    InvalidToken,

    #[error("Ping timeout: connection is no longer registered")]
    PingTimeout,

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Whether retrying the operation against the store could succeed.
    ///
    /// Connection-level Redis faults (refused, dropped, timed out) are
    /// transient; everything else, including `InvalidToken` and
    /// `PingTimeout`, reflects state and retrying will not change it.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Redis(e) => {
                e.is_connection_refusal() || e.is_connection_dropped() || e.is_timeout()
            }
            _ => false,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
