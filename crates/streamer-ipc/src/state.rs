//! Session state machine types.

use serde::{Deserialize, Serialize};

use crate::settings::TransportKind;

/// Lifecycle of the one stream a coordinator owns.
///
/// `Idle → Starting → Live ⇄ Paused → Stopping → Idle`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No adapter.
    #[default]
    Idle,

    /// Adapter constructing its transport.
    Starting { kind: TransportKind },

    /// Transport established, media flowing.
    Live { kind: TransportKind },

    /// Transport established, media suspended.
    Paused { kind: TransportKind },

    /// Transport lost mid-stream. The adapter is held until `stop`.
    Interrupted { kind: TransportKind },

    /// Teardown in progress.
    Stopping,
}

impl SessionState {
    /// Returns true if the session is in the Idle state.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Returns true while a start or stop is in flight.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Starting { .. } | Self::Stopping)
    }

    /// Returns true if a transport is established (live or paused).
    pub fn is_established(&self) -> bool {
        matches!(self, Self::Live { .. } | Self::Paused { .. })
    }

    /// Returns the transport in use, if any.
    pub fn transport(&self) -> Option<TransportKind> {
        match self {
            Self::Starting { kind }
            | Self::Live { kind }
            | Self::Paused { kind }
            | Self::Interrupted { kind } => Some(*kind),
            Self::Idle | Self::Stopping => None,
        }
    }

    /// Returns a simple string representation of the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Starting { .. } => "Starting",
            Self::Live { .. } => "Live",
            Self::Paused { .. } => "Paused",
            Self::Interrupted { .. } => "Interrupted",
            Self::Stopping => "Stopping",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_predicates() {
        let live = SessionState::Live {
            kind: TransportKind::Rtmp,
        };
        assert!(live.is_established());
        assert!(!live.is_transient());
        assert_eq!(live.transport(), Some(TransportKind::Rtmp));

        assert!(SessionState::Stopping.is_transient());
        assert!(SessionState::Starting {
            kind: TransportKind::WebRtc
        }
        .is_transient());
        assert!(SessionState::default().is_idle());
        assert_eq!(SessionState::Stopping.transport(), None);
    }

    #[test]
    fn test_interrupted_is_not_established() {
        let lost = SessionState::Interrupted {
            kind: TransportKind::WebRtc,
        };
        assert!(!lost.is_established());
        assert!(!lost.is_transient());
        assert_eq!(lost.transport(), Some(TransportKind::WebRtc));
        assert_eq!(lost.name(), "Interrupted");
    }
}
