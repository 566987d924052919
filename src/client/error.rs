//! Error type shared by the Bessa client and the poll coordinator.

use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

/// Failures talking to the Bessa API.
///
/// Owned strings only: the coordinator stores the last failure and clones it to
/// every caller that joined the same refresh.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Bad credentials, or a second 401 after re-authenticating.
    /// Fatal until the credentials are reconfigured.
    #[error("Authentication failed: {0}")]
    AuthenticationFailure(String),

    /// Timeout, connection reset, or a 5xx from the server.
    #[error("Network error: {0}")]
    TransientNetwork(String),

    #[error("Rate limited by Bessa API")]
    RateLimited,

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Unexpected status {status}: {message}")]
    UnexpectedStatus { status: u16, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ApiError {
    /// Whether the next scheduled tick may succeed without operator action.
    pub fn is_transient(&self) -> bool {
        !matches!(self, ApiError::AuthenticationFailure(_) | ApiError::Config(_))
    }

    /// Short machine-readable kind, used in sensor and status attributes.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::AuthenticationFailure(_) => "authentication_failure",
            ApiError::TransientNetwork(_) => "transient_network",
            ApiError::RateLimited => "rate_limited",
            ApiError::MalformedResponse(_) => "malformed_response",
            ApiError::UnexpectedStatus { .. } => "unexpected_status",
            ApiError::Config(_) => "config",
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::MalformedResponse(err.to_string())
        } else {
            ApiError::TransientNetwork(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::MalformedResponse(err.to_string())
    }
}
