//! Connection state management.

/// Connection state of a transport adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected.
    #[default]
    Disconnected,

    /// Connecting to the destination.
    Connecting,

    /// Connected and sending media.
    Connected,

    /// Connected, outbound media suspended.
    Paused,

    /// Connection was lost after being established.
    Failed { reason: String },
}

impl ConnectionState {
    /// Check if a session is running (connected or paused).
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connected | Self::Paused)
    }

    /// Check if connecting.
    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting)
    }

    /// Check if paused.
    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Paused)
    }

    /// Check if failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}
