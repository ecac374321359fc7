//! Events sent from the coordinator to subscribers.

use serde::{Deserialize, Serialize};

use crate::types::StreamMetrics;

/// Lifecycle transitions reported through `StreamEvent::StatusChange`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    /// Transport established.
    Connected,

    /// Transport torn down or lost.
    Disconnected,

    Paused,
    Resumed,

    /// The coordinator released its adapter.
    Stopped,
}

/// Error taxonomy visible to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Start called on an adapter that is already running.
    AlreadyActive,

    /// Required platform or destination config missing or invalid.
    NotConfigured,

    /// Transport-level failure: network, auth, signaling timeout.
    ConnectionFailed,

    /// Operation needs a stream and none is active.
    NoActiveStream,

    /// Another lifecycle transition is still in flight.
    Busy,
}

/// Events that the coordinator publishes to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StreamEvent {
    /// Periodic metrics snapshot from the active adapter.
    MetricsUpdate(StreamMetrics),

    /// A failure, either from a command or from the live transport.
    Error {
        /// Failure category.
        kind: ErrorKind,

        /// Human readable message.
        message: String,
    },

    /// Lifecycle transition.
    StatusChange(StreamStatus),
}

impl StreamEvent {
    /// Returns the status if this is a status change.
    pub fn status(&self) -> Option<StreamStatus> {
        match self {
            Self::StatusChange(status) => Some(*status),
            _ => None,
        }
    }
}
