use reqwest::StatusCode;
use shared::error::DecodeError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("network request failed: {0}")]
    TransientNetworkFailure(String),
    #[error("user not found")]
    NotFound,
    #[error("query must not be empty")]
    EmptyQuery,
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl SyncError {
    /// Transient failures leave state untouched and may be retried by the
    /// next user action or poll tick.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TransientNetworkFailure(_) | Self::MalformedResponse(_)
        )
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.status() == Some(StatusCode::NOT_FOUND) {
            Self::NotFound
        } else if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else if err.is_timeout() {
            Self::TransientNetworkFailure("request timed out".to_string())
        } else if let Some(status) = err.status() {
            Self::TransientNetworkFailure(format!("server returned {status}"))
        } else {
            Self::TransientNetworkFailure(err.to_string())
        }
    }
}

impl From<DecodeError> for SyncError {
    fn from(err: DecodeError) -> Self {
        Self::MalformedResponse(err.to_string())
    }
}
