//! Error types for the gradewatch-obs crate.
//!
//! Messages never contain the session cookie or any other credential.

/// Errors that can occur while fetching a grade table.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The request could not be sent or the connection broke.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The request did not complete within the configured timeout.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The OBS answered with a non-success status code.
    #[error("OBS returned HTTP {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// The response body was not the expected grade document.
    #[error("decode error: {0}")]
    Decode(String),

    /// Too many consecutive upstream failures; requests are paused.
    #[error("OBS circuit open; retry after {retry_after_secs}s")]
    CircuitOpen {
        /// Seconds until a probe request will be allowed.
        retry_after_secs: u64,
    },

    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl FetchError {
    /// Whether retrying the same request may succeed.
    ///
    /// Transport failures, timeouts, `429` and `5xx` are transient. Other
    /// statuses (expired cookie, unknown term), malformed bodies, an open
    /// circuit and configuration errors are terminal for the current attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout(_) => true,
            Self::Status { status } => *status == 429 || (500..600).contains(status),
            Self::Decode(_) | Self::CircuitOpen { .. } | Self::Config(_) => false,
        }
    }

    pub(crate) fn from_reqwest(err: &reqwest::Error) -> Self {
        // reqwest errors may embed the full URL; the query only carries the
        // term id, never the cookie, so that is safe to surface.
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Status {
                status: status.as_u16(),
            }
        } else {
            Self::Http(err.to_string())
        }
    }
}

/// Convenience type alias for gradewatch-obs results.
pub type Result<T> = std::result::Result<T, FetchError>;
