//! Error types for the transport module.

use streamer_ipc::{ConfigError, ErrorKind};
use thiserror::Error;

/// Errors that can occur during transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Start called while a session is running on this adapter.
    #[error("Stream is already active")]
    AlreadyActive,

    /// Destination or settings unusable.
    #[error("Not configured: {0}")]
    NotConfigured(String),

    /// Connection could not be established.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection dropped after it was established.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Signaling exchange failed.
    #[error("Signaling failed: {0}")]
    Signaling(String),

    /// A protocol step did not finish in time.
    #[error("Timed out {0}")]
    Timeout(&'static str),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// RTMP protocol error.
    #[error("RTMP protocol error: {0}")]
    Protocol(String),

    /// WebRTC stack error.
    #[error("WebRTC error: {0}")]
    WebRtc(#[from] webrtc::Error),

    /// HTTP error talking to the signaling server.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl TransportError {
    /// Maps this error onto the caller-visible taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyActive => ErrorKind::AlreadyActive,
            Self::NotConfigured(_) => ErrorKind::NotConfigured,
            _ => ErrorKind::ConnectionFailed,
        }
    }
}

impl From<ConfigError> for TransportError {
    fn from(err: ConfigError) -> Self {
        Self::NotConfigured(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(TransportError::AlreadyActive.kind(), ErrorKind::AlreadyActive);
        assert_eq!(
            TransportError::from(ConfigError::Missing("stream key")).kind(),
            ErrorKind::NotConfigured
        );
        assert_eq!(
            TransportError::Timeout("waiting for publish").kind(),
            ErrorKind::ConnectionFailed
        );
        assert_eq!(
            TransportError::Signaling("403".into()).kind(),
            ErrorKind::ConnectionFailed
        );
    }
}
