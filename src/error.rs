//! Modelmux error types

use std::time::Duration;

use crate::types::LimitKind;

/// Modelmux error types
#[derive(Debug, thiserror::Error)]
pub enum ModelmuxError {
    // Input errors — rejected before quota or provider logic runs
    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Policy errors — rejected before any upstream spend
    #[error("quota exceeded: {reason}")]
    QuotaExceeded {
        reason: String,
        limit_kind: LimitKind,
        retry_after: Option<Duration>,
    },

    #[error("abusive request: {0}")]
    AbuseDetected(String),

    #[error("account suspended: {0}")]
    AccountSuspended(String),

    #[error("unknown account: {0}")]
    UnknownAccount(String),

    // Provider/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited by provider, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("provider request timed out")]
    Timeout,

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// Every substitute in the failover chain was attempted and failed.
    ///
    /// Distinct from a single-provider failure so operators can tell
    /// "one model is down" from "the whole chain is down".
    #[error("failover exhausted for {model} after {attempts} attempts")]
    FailoverExhausted { model: String, attempts: u32 },

    // Streaming errors
    #[error("stream error: {0}")]
    Stream(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    // External store errors
    #[error("usage store error: {0}")]
    Store(String),
}

impl ModelmuxError {
    /// Whether this error should trigger failover to a substitute model.
    ///
    /// Retryable: provider rate-limiting, unavailability, timeout, and
    /// credential failures (a different provider uses different keys).
    /// Everything else is treated as a genuine content/validation error
    /// that a substitute would not fix.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ModelmuxError::RateLimited { .. }
                | ModelmuxError::Unavailable(_)
                | ModelmuxError::Timeout
                | ModelmuxError::AuthenticationFailed
        )
    }

    /// Provider-supplied retry hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ModelmuxError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Whether this is a policy rejection (quota, abuse, suspension)
    /// that must be signalled before any stream event is emitted.
    pub fn is_policy(&self) -> bool {
        matches!(
            self,
            ModelmuxError::QuotaExceeded { .. }
                | ModelmuxError::AbuseDetected(_)
                | ModelmuxError::AccountSuspended(_)
        )
    }
}

impl From<reqwest::Error> for ModelmuxError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ModelmuxError::Timeout
        } else if err.is_connect() {
            ModelmuxError::Unavailable(err.to_string())
        } else {
            ModelmuxError::Http(err.to_string())
        }
    }
}

/// Result type alias for modelmux operations
pub type Result<T> = std::result::Result<T, ModelmuxError>;
