//! Shared types for the streamer.
//!
//! This crate defines the plain data exchanged between the UI layer, the
//! stream coordinator and the transport adapters: session settings,
//! destination configs, metrics and lifecycle events.

mod commands;
mod config;
mod events;
mod settings;
mod state;
mod types;

pub use commands::StreamCommand;
pub use config::{ConfigError, RtmpConfig, TransportConfig, TurnServer, WebRtcConfig};
pub use events::{ErrorKind, StreamEvent, StreamStatus};
pub use settings::{
    find_platform, Resolution, StreamSettings, StreamingPlatform, TransportKind,
    DEFAULT_STREAM_SETTINGS, STREAMING_PLATFORMS,
};
pub use state::SessionState;
pub use types::{ConnectionQuality, StreamMetrics};

use crossbeam_channel::{Receiver, Sender};

/// Channel capacity for events (coordinator → subscriber).
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Creates a bounded event channel.
pub fn event_channel() -> (Sender<StreamEvent>, Receiver<StreamEvent>) {
    crossbeam_channel::bounded(EVENT_CHANNEL_CAPACITY)
}
