//! Relay error types.

use thiserror::Error;

use crate::slack::SlackError;

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

/// Errors that can occur while relaying one turn.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Could not open or maintain the backend stream.
    #[error("Failed to connect to answer backend at {url}: {message}")]
    Connect { url: String, message: String },

    /// Malformed or out-of-sequence frame.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// History read/write failure.
    #[error("History store error: {0}")]
    Store(#[source] anyhow::Error),

    /// Post/edit call to the chat platform failed.
    #[error("Outbound call failed: {0}")]
    Outbound(#[from] SlackError),
}
