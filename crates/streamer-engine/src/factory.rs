//! Construction of transport adapters.

use std::sync::Arc;

use streamer_ipc::TransportKind;
use streamer_transport::{AdapterEventHandler, RtmpAdapter, TransportAdapter, WebRtcAdapter};

/// Builds a fresh adapter for each start.
pub trait AdapterFactory: Send + Sync {
    fn create(&self, kind: TransportKind, events: AdapterEventHandler) -> Arc<dyn TransportAdapter>;
}

/// Builds the RTMP and WebRTC adapters.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAdapterFactory;

impl AdapterFactory for DefaultAdapterFactory {
    fn create(&self, kind: TransportKind, events: AdapterEventHandler) -> Arc<dyn TransportAdapter> {
        match kind {
            TransportKind::Rtmp => Arc::new(RtmpAdapter::new(events)),
            TransportKind::WebRtc => Arc::new(WebRtcAdapter::new(events)),
        }
    }
}
