//! Session acquisition errors

use thiserror::Error;

/// Why a chat session could not be opened
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// No identity session, or the backend rejected the credential. Redirect to login.
    #[error("Unauthorized")]
    Unauthorized,
    /// The identity provider or backend is not ready yet (503-class)
    #[error("Failed to get auth token after retries")]
    TokenUnavailable,
    /// Any other non-success answer from the backend, passed through verbatim
    #[error("{message}")]
    Backend {
        status: u16,
        message: String,
        code: Option<String>,
    },
    /// The request never got an HTTP answer
    #[error("Network error: {0}")]
    Network(String),
}

impl SessionError {
    /// Classify a non-success status from the session endpoint.
    pub fn from_status(status: u16, message: impl Into<String>, code: Option<String>) -> Self {
        match status {
            401 => Self::Unauthorized,
            503 => Self::TokenUnavailable,
            _ => Self::Backend {
                status,
                message: message.into(),
                code,
            },
        }
    }

    /// Whether opening the session again may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TokenUnavailable | Self::Network(_))
    }

    /// HTTP-analog status for callers that surface session failures as responses
    pub fn status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::TokenUnavailable => 503,
            Self::Backend { status, .. } => *status,
            Self::Network(_) => 500,
        }
    }
}
