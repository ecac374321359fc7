//! RTMP adapter.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rml_rtmp::handshake::{Handshake, HandshakeProcessResult, PeerType};
use rml_rtmp::sessions::{
    ClientSession, ClientSessionConfig, ClientSessionEvent, ClientSessionResult,
    PublishRequestType, StreamMetadata,
};
use rml_rtmp::time::RtmpTimestamp;
use secrecy::ExposeSecret;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};
use url::Url;

use streamer_ipc::{RtmpConfig, StreamMetrics, StreamSettings, TransportConfig, TransportKind};

use crate::adapter::{
    AdapterCore, AdapterEvent, AdapterEventHandler, MediaKind, MediaPacket, MediaSink,
    TransportAdapter,
};
use crate::connection::ConnectionState;
use crate::error::TransportError;
use crate::flv;
use crate::{TransportResult, MEDIA_CHANNEL_CAPACITY, RTMP_CONNECT_TIMEOUT};

const DEFAULT_RTMP_PORT: u16 = 1935;
const READ_BUFFER_SIZE: usize = 4096;

/// Publishes to an RTMP ingest server.
pub struct RtmpAdapter {
    core: Arc<AdapterCore>,
    publisher: Mutex<Option<Publisher>>,
}

struct Publisher {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl RtmpAdapter {
    pub fn new(events: AdapterEventHandler) -> Self {
        Self {
            core: Arc::new(AdapterCore::new(TransportKind::Rtmp, events)),
            publisher: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.core.state()
    }

    async fn open(&self, config: &RtmpConfig, settings: &StreamSettings) -> TransportResult<()> {
        config.validate()?;
        settings.validate()?;

        info!(
            url = %config.url,
            platform = %config.platform,
            stream_key = %config.redacted_key(),
            "Connecting to RTMP server"
        );

        let connection = tokio::time::timeout(
            RTMP_CONNECT_TIMEOUT,
            RtmpConnection::open(&config.url, config.stream_key.expose_secret(), settings),
        )
        .await
        .map_err(|_| TransportError::Timeout("waiting for the RTMP server to accept the stream"))??;

        let (tx, rx) = mpsc::channel(MEDIA_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        self.core
            .connected(settings, MediaSink::new(tx, Arc::clone(self.core.metrics())));

        let task = tokio::spawn(run_publisher(
            connection,
            rx,
            shutdown_rx,
            Arc::clone(&self.core),
        ));
        *self.publisher.lock() = Some(Publisher {
            shutdown: shutdown_tx,
            task,
        });

        info!("RTMP connection established and publishing started");
        Ok(())
    }
}

#[async_trait]
impl TransportAdapter for RtmpAdapter {
    fn kind(&self) -> TransportKind {
        TransportKind::Rtmp
    }

    #[instrument(name = "rtmp_start", skip_all)]
    async fn start(&self, config: &TransportConfig, settings: &StreamSettings) -> TransportResult<()> {
        self.core.begin_start()?;

        let result = match config {
            TransportConfig::Rtmp(config) => self.open(config, settings).await,
            other => Err(TransportError::NotConfigured(format!(
                "RTMP adapter cannot publish to a {} destination",
                other.kind()
            ))),
        };

        result.map_err(|e| self.core.start_failed(e))
    }

    #[instrument(name = "rtmp_stop", skip_all)]
    async fn stop(&self) -> TransportResult<()> {
        let was_active = self.core.deactivate();

        let publisher = self.publisher.lock().take();
        if let Some(publisher) = publisher {
            let _ = publisher.shutdown.send(());
            if let Err(e) = publisher.task.await {
                warn!("RTMP publisher task ended abnormally: {}", e);
            }
        }

        if was_active {
            info!("Disconnected from RTMP server");
            self.core.emit(AdapterEvent::Disconnected);
        }
        Ok(())
    }

    async fn pause(&self) -> TransportResult<()> {
        if self.core.set_paused(true) {
            info!("RTMP output paused, connection held open");
        }
        Ok(())
    }

    async fn resume(&self) -> TransportResult<()> {
        if self.core.set_paused(false) {
            info!("RTMP output resumed, waiting for next keyframe");
        }
        Ok(())
    }

    fn metrics(&self) -> StreamMetrics {
        self.core.metrics().snapshot()
    }

    fn sample_metrics(&self) -> StreamMetrics {
        self.core.metrics().sample()
    }

    fn is_active(&self) -> bool {
        self.core.is_active()
    }

    fn is_paused(&self) -> bool {
        self.core.is_paused()
    }

    fn media_sink(&self) -> Option<MediaSink> {
        self.core.media_sink()
    }
}

/// An established, publishing RTMP session.
struct RtmpConnection {
    stream: TcpStream,
    session: ClientSession,
}

impl RtmpConnection {
    async fn open(url: &str, stream_key: &str, settings: &StreamSettings) -> TransportResult<Self> {
        let parsed = Url::parse(url).map_err(|e| TransportError::NotConfigured(e.to_string()))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| TransportError::NotConfigured("Missing host".to_string()))?;
        let port = parsed.port().unwrap_or(DEFAULT_RTMP_PORT);
        let app_name = parsed.path().trim_matches('/').to_string();

        debug!(host = %host, port, app = %app_name, "Opening TCP connection");
        let mut stream = TcpStream::connect((host, port))
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("TCP connect failed: {}", e)))?;
        stream.set_nodelay(true)?;

        let leftover = handshake(&mut stream).await?;

        debug!("Handshake complete, creating RTMP session");
        let (session, initial_results) = ClientSession::new(ClientSessionConfig::new())
            .map_err(|e| TransportError::Protocol(format!("Session creation failed: {:?}", e)))?;

        let mut connection = Self { stream, session };
        connection.write_results(initial_results).await?;
        if !leftover.is_empty() {
            connection.handle_server_input(&leftover).await?;
        }

        debug!(app = %app_name, "Requesting RTMP connection");
        let request = connection
            .session
            .request_connection(app_name)
            .map_err(|e| TransportError::Protocol(format!("Connection request failed: {:?}", e)))?;
        connection.write_results(vec![request]).await?;
        connection
            .await_event(|event| match event {
                ClientSessionEvent::ConnectionRequestAccepted => Some(Ok(())),
                ClientSessionEvent::ConnectionRequestRejected { description } => Some(Err(
                    TransportError::ConnectionFailed(format!("Connection rejected: {}", description)),
                )),
                _ => None,
            })
            .await?;

        debug!("Requesting publish");
        let request = connection
            .session
            .request_publishing(stream_key.to_string(), PublishRequestType::Live)
            .map_err(|e| TransportError::Protocol(format!("Publish request failed: {:?}", e)))?;
        connection.write_results(vec![request]).await?;
        connection
            .await_event(|event| match event {
                ClientSessionEvent::PublishRequestAccepted => Some(Ok(())),
                _ => None,
            })
            .await?;

        let metadata = stream_metadata(settings);
        let result = connection
            .session
            .publish_metadata(&metadata)
            .map_err(|e| TransportError::Protocol(format!("Metadata publish failed: {:?}", e)))?;
        connection.write_results(vec![result]).await?;

        Ok(connection)
    }

    /// Read server traffic until `matcher` resolves one of the raised events.
    async fn await_event<F>(&mut self, mut matcher: F) -> TransportResult<()>
    where
        F: FnMut(&ClientSessionEvent) -> Option<TransportResult<()>>,
    {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        loop {
            let n = self.stream.read(&mut buf).await?;
            if n == 0 {
                return Err(TransportError::ConnectionFailed(
                    "Connection closed by server".to_string(),
                ));
            }

            let results = self
                .session
                .handle_input(&buf[..n])
                .map_err(|e| TransportError::Protocol(format!("Session input error: {:?}", e)))?;

            let mut outcome = None;
            for result in results {
                match result {
                    ClientSessionResult::OutboundResponse(packet) => {
                        self.stream.write_all(&packet.bytes).await?;
                    }
                    ClientSessionResult::RaisedEvent(event) => {
                        trace!("Received event: {:?}", event);
                        if outcome.is_none() {
                            outcome = matcher(&event);
                        }
                    }
                    _ => {}
                }
            }

            if let Some(outcome) = outcome {
                return outcome;
            }
        }
    }

    async fn handle_server_input(&mut self, bytes: &[u8]) -> TransportResult<()> {
        let results = self
            .session
            .handle_input(bytes)
            .map_err(|e| TransportError::Protocol(format!("Session input error: {:?}", e)))?;
        self.write_results(results).await
    }

    async fn write_results(&mut self, results: Vec<ClientSessionResult>) -> TransportResult<()> {
        for result in results {
            match result {
                ClientSessionResult::OutboundResponse(packet) => {
                    self.stream.write_all(&packet.bytes).await?;
                }
                ClientSessionResult::RaisedEvent(event) => {
                    trace!("Received event: {:?}", event);
                }
                _ => {}
            }
        }
        Ok(())
    }

    async fn send_tag(&mut self, tag: &OutboundTag) -> TransportResult<()> {
        let timestamp = RtmpTimestamp::new(tag.timestamp_ms);
        let result = match tag.kind {
            MediaKind::Video => {
                self.session
                    .publish_video_data(tag.data.clone(), timestamp, tag.can_be_dropped)
            }
            MediaKind::Audio => {
                self.session
                    .publish_audio_data(tag.data.clone(), timestamp, tag.can_be_dropped)
            }
        }
        .map_err(|e| TransportError::Protocol(format!("Failed to publish data: {:?}", e)))?;

        self.write_results(vec![result]).await
    }

    async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!("TCP shutdown failed: {}", e);
        }
    }
}

async fn handshake(stream: &mut TcpStream) -> TransportResult<Vec<u8>> {
    let mut handshake = Handshake::new(PeerType::Client);

    let p0_p1 = handshake
        .generate_outbound_p0_and_p1()
        .map_err(|e| TransportError::Protocol(format!("Handshake generation failed: {:?}", e)))?;
    stream.write_all(&p0_p1).await?;

    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Err(TransportError::ConnectionFailed(
                "Connection closed during handshake".to_string(),
            ));
        }

        match handshake.process_bytes(&buf[..n]) {
            Ok(HandshakeProcessResult::InProgress { response_bytes }) => {
                if !response_bytes.is_empty() {
                    stream.write_all(&response_bytes).await?;
                }
            }
            Ok(HandshakeProcessResult::Completed {
                response_bytes,
                remaining_bytes,
            }) => {
                if !response_bytes.is_empty() {
                    stream.write_all(&response_bytes).await?;
                }
                return Ok(remaining_bytes);
            }
            Err(e) => {
                return Err(TransportError::Protocol(format!("Handshake failed: {:?}", e)));
            }
        }
    }
}

fn stream_metadata(settings: &StreamSettings) -> StreamMetadata {
    let mut metadata = StreamMetadata::new();
    metadata.video_width = Some(settings.resolution.width);
    metadata.video_height = Some(settings.resolution.height);
    metadata.video_frame_rate = Some(settings.frame_rate as f32);
    metadata.video_bitrate_kbps = Some(settings.video_bitrate_kbps);
    metadata.audio_bitrate_kbps = Some(settings.audio_bitrate_kbps);
    metadata.audio_sample_rate = Some(settings.audio_sample_rate);
    metadata
}

/// A packaged FLV tag body ready for the RTMP session.
#[derive(Debug)]
struct OutboundTag {
    kind: MediaKind,
    data: Bytes,
    timestamp_ms: u32,
    can_be_dropped: bool,
    /// Counts towards the frames-sent metric.
    is_frame: bool,
}

/// Turns [`MediaPacket`]s into FLV tag bodies.
///
/// Video is held until both a decoder configuration and a keyframe have
/// been seen; [`suspend`](Self::suspend) re-arms the keyframe wait.
struct FlvPackager {
    avc_config: Option<Bytes>,
    awaiting_keyframe: bool,
}

impl Default for FlvPackager {
    fn default() -> Self {
        Self {
            avc_config: None,
            awaiting_keyframe: true,
        }
    }
}

impl FlvPackager {
    fn suspend(&mut self) {
        self.awaiting_keyframe = true;
    }

    fn package(&mut self, packet: &MediaPacket) -> Vec<OutboundTag> {
        match packet.kind {
            MediaKind::Video => self.package_video(packet),
            MediaKind::Audio => vec![OutboundTag {
                kind: MediaKind::Audio,
                data: flv::build_aac_tag(&packet.data, packet.is_sequence_header),
                timestamp_ms: packet.timestamp_ms,
                can_be_dropped: false,
                is_frame: false,
            }],
        }
    }

    fn package_video(&mut self, packet: &MediaPacket) -> Vec<OutboundTag> {
        let mut tags = Vec::new();
        let nals = flv::parse_annex_b(&packet.data);

        if let Some((sps, pps)) = flv::extract_sps_pps(&nals) {
            if let Some(config) = flv::build_avc_decoder_config(&sps, &pps) {
                if self.avc_config.as_ref() != Some(&config) {
                    debug!(len = config.len(), "Sending AVC sequence header");
                    tags.push(OutboundTag {
                        kind: MediaKind::Video,
                        data: flv::build_flv_video_tag(&config, true, true, 0),
                        timestamp_ms: packet.timestamp_ms,
                        can_be_dropped: false,
                        is_frame: false,
                    });
                    self.avc_config = Some(config);
                }
            }
        }

        if self.avc_config.is_none() {
            trace!("Holding video until SPS/PPS arrive");
            return tags;
        }

        let is_keyframe = packet.is_keyframe
            || nals
                .iter()
                .any(|nal| nal.nal_type == flv::NalUnitType::IdrSlice);
        if self.awaiting_keyframe {
            if !is_keyframe {
                trace!("Holding video until next keyframe");
                return tags;
            }
            self.awaiting_keyframe = false;
        }

        let slices = flv::filter_parameter_sets(nals);
        if slices.is_empty() {
            return tags;
        }

        tags.push(OutboundTag {
            kind: MediaKind::Video,
            data: flv::build_flv_video_tag(&flv::nals_to_avcc(&slices), is_keyframe, false, 0),
            timestamp_ms: packet.timestamp_ms,
            can_be_dropped: !is_keyframe,
            is_frame: true,
        });
        tags
    }
}

async fn run_publisher(
    mut connection: RtmpConnection,
    mut media_rx: mpsc::Receiver<MediaPacket>,
    mut shutdown: oneshot::Receiver<()>,
    core: Arc<AdapterCore>,
) {
    let mut packager = FlvPackager::default();
    let mut read_buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                debug!("RTMP publisher shutting down");
                break;
            }
            packet = media_rx.recv() => {
                let Some(packet) = packet else {
                    debug!("Media channel closed");
                    break;
                };
                if core.is_paused() {
                    packager.suspend();
                    continue;
                }
                for tag in packager.package(&packet) {
                    if let Err(e) = connection.send_tag(&tag).await {
                        core.connection_lost(e.to_string());
                        return;
                    }
                    if tag.is_frame {
                        core.metrics().record_video_frame(tag.data.len());
                    } else {
                        core.metrics().record_bytes(tag.data.len());
                    }
                }
            }
            read = connection.stream.read(&mut read_buf) => {
                let outcome = match read {
                    Ok(0) => Err(TransportError::ConnectionLost(
                        "server closed the connection".to_string(),
                    )),
                    Ok(n) => connection.handle_server_input(&read_buf[..n]).await,
                    Err(e) => Err(e.into()),
                };
                if let Err(e) = outcome {
                    core.connection_lost(e.to_string());
                    return;
                }
            }
        }
    }

    connection.close().await;
}
