//! Commands the UI can send to a running session.

use serde::{Deserialize, Serialize};

/// Commands that act on the current stream.
///
/// Starting a stream is not a command: it needs a destination config and
/// goes through the coordinator's `start_*` calls directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamCommand {
    /// Suspend outbound media, keeping the transport.
    Pause,

    /// Resume outbound media.
    Resume,

    /// Stop the current stream.
    Stop,

    /// Publish a metrics snapshot now.
    GetMetrics,
}

impl std::str::FromStr for StreamCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pause" => Ok(Self::Pause),
            "resume" => Ok(Self::Resume),
            "stop" => Ok(Self::Stop),
            "metrics" | "stats" => Ok(Self::GetMetrics),
            other => Err(format!("unknown command: {other}")),
        }
    }
}
