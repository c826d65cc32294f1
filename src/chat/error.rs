//! Chat error types

use crate::stream::StreamError;
use thiserror::Error;

/// Why a turn failed after it started
#[derive(Debug, Error)]
pub enum TurnError {
    /// Chat endpoint answered with a non-success status
    #[error("Chat request failed: {status}")]
    Http { status: u16 },
    #[error("Chat request failed: {0}")]
    Network(String),
    /// Success status but nothing to read
    #[error("No response stream")]
    MissingBody,
    /// Body broke off mid-stream
    #[error(transparent)]
    Read(#[from] StreamError),
    /// The backend sent an explicit `error` record
    #[error("{0}")]
    Remote(String),
    /// The chat view was closed while the turn was running
    #[error("Chat view closed")]
    Abandoned,
}

impl TurnError {
    /// The chat secret no longer holds; only a fresh session will help
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::Http { status: 401 })
    }
}

/// Failure of the auxiliary history and listing calls
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("No chat session")]
    NotConnected,
    #[error("A turn is in progress")]
    Busy,
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Invalid response: {0}")]
    Decode(String),
}
