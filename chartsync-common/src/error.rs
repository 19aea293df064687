//! Common error types for ChartSync

use thiserror::Error;

/// Common result type for ChartSync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by the RPC transport, the chart repository and the
/// synchronization service
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP-level failure: connection refused, timeout, non-success status
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed response envelope, or an envelope carrying a server error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Success envelope without a result payload
    #[error("Empty result for method '{0}'")]
    EmptyResult(String),

    /// Well-formed but semantically unusable chart data
    #[error("{0}")]
    Domain(String),

    /// Caller passed an argument the operation cannot accept
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid user input (project records)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error outside the RPC envelope
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True for failures caused by the remote chart server or the link to it
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::Protocol(_) | Error::EmptyResult(_)
        )
    }
}
