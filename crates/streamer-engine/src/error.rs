//! Errors returned by coordinator operations.

use streamer_ipc::ErrorKind;
use streamer_transport::TransportError;
use thiserror::Error;

/// Result type for coordinator operations.
pub type StreamResult<T> = Result<T, StreamError>;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Stream is already active")]
    AlreadyActive,

    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A start or stop is still in flight.
    #[error("Busy: {state} in progress")]
    Busy { state: &'static str },

    /// The coordinator was destroyed and cannot be used again.
    #[error("Coordinator destroyed")]
    Destroyed,
}

impl StreamError {
    /// Maps this error onto the caller-visible taxonomy. A destroyed
    /// coordinator has no stream, so it reads as `NoActiveStream`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyActive => ErrorKind::AlreadyActive,
            Self::NotConfigured(_) => ErrorKind::NotConfigured,
            Self::ConnectionFailed(_) => ErrorKind::ConnectionFailed,
            Self::Destroyed => ErrorKind::NoActiveStream,
            Self::Busy { .. } => ErrorKind::Busy,
        }
    }
}

impl From<TransportError> for StreamError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::AlreadyActive => Self::AlreadyActive,
            TransportError::NotConfigured(message) => Self::NotConfigured(message),
            TransportError::ConnectionFailed(message) => Self::ConnectionFailed(message),
            other => Self::ConnectionFailed(other.to_string()),
        }
    }
}
