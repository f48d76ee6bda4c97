//! Error types for the REST client.

use rollcall_core::offline::MutationError;
use thiserror::Error;

/// Result type alias for REST client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The server answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ClientError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the request never reached the server (connect failure or timeout).
    pub fn is_network_unreachable(&self) -> bool {
        match self {
            Self::Http(err) => err.is_connect() || err.is_timeout(),
            _ => false,
        }
    }
}

impl From<ClientError> for MutationError {
    fn from(err: ClientError) -> Self {
        if err.is_network_unreachable() {
            return MutationError::network(err.to_string());
        }
        match err {
            ClientError::Api { status, message } => MutationError::rejected(Some(status), message),
            other => MutationError::rejected(None, other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_errors_become_rejections() {
        let err = MutationError::from(ClientError::api(409, "already checked in"));
        assert_eq!(
            err,
            MutationError::rejected(Some(409), "already checked in")
        );
        assert!(!err.is_network_unreachable());

        let err = MutationError::from(ClientError::invalid_request("bad name"));
        assert!(matches!(err, MutationError::Rejected { status: None, .. }));
    }
}
