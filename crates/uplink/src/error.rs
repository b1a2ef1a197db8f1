//! Upload and configuration errors.

use reqwest::StatusCode;
use std::time::Duration;

/// Outcome of a failed upload attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    /// Transient network or server problem. The batch is kept for a later attempt.
    #[error("upload failed, will retry: {reason}")]
    Retryable { reason: String },

    /// The collector rejected the payload itself. Retrying cannot succeed.
    #[error("upload rejected: {reason}")]
    Permanent { reason: String },
}

impl UploadError {
    pub fn retryable(reason: impl Into<String>) -> Self {
        Self::Retryable {
            reason: reason.into(),
        }
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        Self::Permanent {
            reason: reason.into(),
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::retryable(format!("no response within {after:?}"))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }

    /// Classify a non-success HTTP status.
    ///
    /// Server errors, 408 and 429 are transient; any other status means the
    /// collector will never accept this payload.
    pub fn from_status(status: StatusCode) -> Self {
        let reason = format!("collector responded with HTTP {status}");
        if status.is_server_error()
            || status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
        {
            Self::retryable(reason)
        } else {
            Self::permanent(reason)
        }
    }

    /// Classify a transport error from `reqwest`.
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() || e.is_request() || e.is_body() || e.is_decode() {
            Self::retryable(e.to_string())
        } else {
            Self::permanent(e.to_string())
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid upload delay configuration: {0}")]
    InvalidDelay(String),

    #[error("invalid uploader configuration: {0}")]
    InvalidUploader(String),
}
