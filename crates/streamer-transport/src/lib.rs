//! RTMP and WebRTC transport adapters.
//!
//! Each adapter owns a single outbound connection to a streaming
//! destination and exposes the same start/stop/pause/resume/metrics
//! contract through [`TransportAdapter`].

mod adapter;
mod connection;
mod error;
mod flv;
mod metrics;
mod rtmp;
mod rtc;
mod whip;

pub use adapter::{
    AdapterEvent, AdapterEventHandler, MediaKind, MediaPacket, MediaSendError, MediaSink,
    TransportAdapter,
};
pub use connection::ConnectionState;
pub use error::TransportError;
pub use flv::{
    build_aac_tag, build_avc_decoder_config, build_flv_video_tag, extract_sps_pps,
    filter_parameter_sets, nals_to_avcc, parse_annex_b, NalUnit, NalUnitType,
};
pub use metrics::MetricsCollector;
pub use rtmp::RtmpAdapter;
pub use rtc::WebRtcAdapter;
pub use whip::{WhipClient, WhipSession};

use std::time::Duration;

/// Channel capacity for outgoing media packets.
pub const MEDIA_CHANNEL_CAPACITY: usize = 30;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Upper bound on the whole RTMP connect/publish sequence.
pub const RTMP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on ICE gathering plus the WHIP offer/answer exchange.
pub const SIGNALING_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on ICE/DTLS reaching the connected state.
pub const ICE_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
