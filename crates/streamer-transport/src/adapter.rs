//! The transport adapter contract and the state shared by both adapters.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use streamer_ipc::{ErrorKind, StreamMetrics, StreamSettings, TransportConfig, TransportKind};

use crate::connection::ConnectionState;
use crate::error::TransportError;
use crate::metrics::MetricsCollector;
use crate::TransportResult;

/// Events raised by an adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
    /// Transport established.
    Connected,

    /// Transport torn down, by `stop` or by a connection loss.
    Disconnected,

    /// Start failure or mid-stream failure.
    Error { kind: ErrorKind, message: String },
}

/// Callback receiving adapter events, invoked synchronously.
pub type AdapterEventHandler = Arc<dyn Fn(AdapterEvent) + Send + Sync>;

/// Kind of media payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
}

/// One encoded media unit handed from the encoder pipeline to a transport.
#[derive(Debug, Clone)]
pub struct MediaPacket {
    pub kind: MediaKind,

    /// Video: H.264 Annex B access unit. Audio: one encoded frame.
    pub data: Bytes,

    /// Presentation timestamp in milliseconds from session start.
    pub timestamp_ms: u32,

    /// Whether this video access unit is independently decodable.
    pub is_keyframe: bool,

    /// Audio codec configuration (AAC AudioSpecificConfig).
    pub is_sequence_header: bool,
}

impl MediaPacket {
    pub fn video(data: impl Into<Bytes>, timestamp_ms: u32, is_keyframe: bool) -> Self {
        Self {
            kind: MediaKind::Video,
            data: data.into(),
            timestamp_ms,
            is_keyframe,
            is_sequence_header: false,
        }
    }

    pub fn audio(data: impl Into<Bytes>, timestamp_ms: u32) -> Self {
        Self {
            kind: MediaKind::Audio,
            data: data.into(),
            timestamp_ms,
            is_keyframe: false,
            is_sequence_header: false,
        }
    }

    /// AAC AudioSpecificConfig, sent before any raw AAC frame.
    pub fn audio_config(data: impl Into<Bytes>) -> Self {
        Self {
            is_sequence_header: true,
            ..Self::audio(data, 0)
        }
    }
}

/// Errors returned by [`MediaSink::send`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MediaSendError {
    /// Transport is behind; the packet was dropped.
    #[error("Media channel full, packet dropped")]
    Full,

    /// The session this sink belonged to has ended.
    #[error("Session closed")]
    Closed,
}

/// Non-blocking entry point for encoded media into an active adapter.
#[derive(Clone)]
pub struct MediaSink {
    tx: mpsc::Sender<MediaPacket>,
    metrics: Arc<MetricsCollector>,
}

impl MediaSink {
    pub(crate) fn new(tx: mpsc::Sender<MediaPacket>, metrics: Arc<MetricsCollector>) -> Self {
        Self { tx, metrics }
    }

    /// Queue a packet. A full queue drops it and counts a dropped frame
    /// for video.
    pub fn send(&self, packet: MediaPacket) -> Result<(), MediaSendError> {
        match self.tx.try_send(packet) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(packet)) => {
                if packet.kind == MediaKind::Video {
                    self.metrics.record_dropped_frame();
                }
                Err(MediaSendError::Full)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(MediaSendError::Closed),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A transport-specific implementation of the stream lifecycle.
///
/// All methods take `&self`; adapters synchronize internally so the
/// coordinator can share one behind an `Arc` with its metrics sampler.
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    /// Which backend this adapter drives.
    fn kind(&self) -> TransportKind;

    /// Establish the transport. Fails with `AlreadyActive` if a session is
    /// running; any other failure is also raised as an `Error` event and
    /// leaves the adapter inactive.
    async fn start(&self, config: &TransportConfig, settings: &StreamSettings)
        -> TransportResult<()>;

    /// Tear the transport down. No-op if not active.
    async fn stop(&self) -> TransportResult<()>;

    /// Suspend outbound media. No-op if not active or already paused.
    async fn pause(&self) -> TransportResult<()>;

    /// Resume outbound media. No-op if not active or not paused.
    async fn resume(&self) -> TransportResult<()>;

    /// Snapshot of the current metrics with uptime recomputed.
    fn metrics(&self) -> StreamMetrics;

    /// Measure the window since the last sample and return the snapshot.
    fn sample_metrics(&self) -> StreamMetrics;

    fn is_active(&self) -> bool;

    fn is_paused(&self) -> bool;

    /// Media entry point while active.
    fn media_sink(&self) -> Option<MediaSink>;
}

/// State and plumbing common to both adapters.
pub(crate) struct AdapterCore {
    kind: TransportKind,
    state: RwLock<ConnectionState>,
    metrics: Arc<MetricsCollector>,
    events: AdapterEventHandler,
    media: Mutex<Option<MediaSink>>,
}

impl AdapterCore {
    pub(crate) fn new(kind: TransportKind, events: AdapterEventHandler) -> Self {
        Self {
            kind,
            state: RwLock::new(ConnectionState::Disconnected),
            metrics: Arc::new(MetricsCollector::new()),
            events,
            media: Mutex::new(None),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.state.read().clone()
    }

    pub(crate) fn is_active(&self) -> bool {
        self.state.read().is_active()
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.state.read().is_paused()
    }

    pub(crate) fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub(crate) fn media_sink(&self) -> Option<MediaSink> {
        self.media.lock().clone()
    }

    /// Claim the adapter for a new session.
    pub(crate) fn begin_start(&self) -> TransportResult<()> {
        let mut state = self.state.write();
        if state.is_active() || state.is_connecting() {
            return Err(TransportError::AlreadyActive);
        }
        *state = ConnectionState::Connecting;
        Ok(())
    }

    /// Mark the session live, start uptime tracking and announce it.
    pub(crate) fn connected(&self, settings: &StreamSettings, sink: MediaSink) {
        self.metrics.start(settings.frame_rate as f32);
        *self.media.lock() = Some(sink);
        *self.state.write() = ConnectionState::Connected;
        self.emit(AdapterEvent::Connected);
    }

    /// Reset after a failed start and announce the failure. Transport
    /// failures are reported as `ConnectionFailed`.
    pub(crate) fn start_failed(&self, err: TransportError) -> TransportError {
        *self.state.write() = ConnectionState::Disconnected;

        let err = match err {
            TransportError::NotConfigured(_) | TransportError::AlreadyActive => err,
            TransportError::ConnectionFailed(_) => err,
            other => TransportError::ConnectionFailed(other.to_string()),
        };

        warn!(transport = %self.kind, error = %err, "Start failed");
        self.emit(AdapterEvent::Error {
            kind: err.kind(),
            message: err.to_string(),
        });
        err
    }

    /// Leave the active state. Returns whether a session was active.
    pub(crate) fn deactivate(&self) -> bool {
        let was_active = {
            let mut state = self.state.write();
            let was_active = state.is_active();
            *state = ConnectionState::Disconnected;
            was_active
        };
        self.media.lock().take();
        self.metrics.stop();
        was_active
    }

    /// Record a connection lost mid-stream. Ignored unless active.
    pub(crate) fn connection_lost(&self, reason: String) {
        {
            let mut state = self.state.write();
            if !state.is_active() {
                return;
            }
            *state = ConnectionState::Failed {
                reason: reason.clone(),
            };
        }
        self.media.lock().take();
        self.metrics.stop();

        warn!(transport = %self.kind, %reason, "Connection lost");
        self.emit(AdapterEvent::Error {
            kind: ErrorKind::ConnectionFailed,
            message: format!("Connection lost: {reason}"),
        });
        self.emit(AdapterEvent::Disconnected);
    }

    /// Flip between Connected and Paused. Returns whether the state changed.
    pub(crate) fn set_paused(&self, paused: bool) -> bool {
        let mut state = self.state.write();
        match (&*state, paused) {
            (ConnectionState::Connected, true) => {
                *state = ConnectionState::Paused;
                true
            }
            (ConnectionState::Paused, false) => {
                *state = ConnectionState::Connected;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn emit(&self, event: AdapterEvent) {
        debug!(transport = %self.kind, ?event, "Adapter event");
        (self.events)(event);
    }
}
