//! Store layer error types.

use thiserror::Error;

/// Errors returned by a [`DocumentStore`](crate::DocumentStore).
///
/// Application-level rejections of individual writes (version conflicts,
/// mapping errors) are not errors at this layer; they come back as failed
/// [`ItemOutcome`](crate::ItemOutcome)s.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Network or connection failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// The cluster answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response could not be understood
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Scroll cursor unknown, exhausted or past its lease
    #[error("Cursor expired: {0}")]
    CursorExpired(String),

    /// Index does not exist
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    /// Request refused before execution
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// Client could not be configured
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Whether retrying the same idempotent request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Transport(_) => true,
            StoreError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            StoreError::InvalidResponse(err.to_string())
        } else {
            StoreError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::InvalidResponse(err.to_string())
    }
}
