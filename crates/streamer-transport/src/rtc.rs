//! WebRTC adapter: one outbound peer connection negotiated over WHIP.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use secrecy::ExposeSecret;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};
use url::Url;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_H264, MIME_TYPE_OPUS};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use streamer_ipc::{
    StreamMetrics, StreamSettings, TransportConfig, TransportKind, WebRtcConfig,
};

use crate::adapter::{
    AdapterCore, AdapterEvent, AdapterEventHandler, MediaKind, MediaPacket, MediaSink,
    TransportAdapter,
};
use crate::connection::ConnectionState;
use crate::error::TransportError;
use crate::whip::WhipClient;
use crate::{TransportResult, ICE_CONNECT_TIMEOUT, MEDIA_CHANNEL_CAPACITY, SIGNALING_TIMEOUT};

const STREAM_ID: &str = "streamer";
const OPUS_FRAME_DURATION: Duration = Duration::from_millis(20);

/// Publishes to a WHIP endpoint over a single peer connection.
pub struct WebRtcAdapter {
    core: Arc<AdapterCore>,
    session: Mutex<Option<PeerSession>>,
}

struct PeerSession {
    peer: Arc<RTCPeerConnection>,
    whip: WhipClient,
    resource: Option<Url>,
    bindings: Vec<TrackBinding>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// An outbound sender and the track it carries while not paused.
#[derive(Clone)]
struct TrackBinding {
    sender: Arc<RTCRtpSender>,
    track: Arc<TrackLocalStaticSample>,
}

impl TrackBinding {
    async fn set_attached(&self, attached: bool) -> TransportResult<()> {
        let track: Option<Arc<dyn TrackLocal + Send + Sync>> = if attached {
            Some(Arc::clone(&self.track) as _)
        } else {
            None
        };
        self.sender.replace_track(track).await?;
        Ok(())
    }
}

/// Attach or detach every binding. On failure the bindings already swapped
/// are put back, so the tracks stay consistent with the adapter state.
async fn swap_tracks(bindings: &[TrackBinding], attach: bool) -> TransportResult<()> {
    for (done, binding) in bindings.iter().enumerate() {
        if let Err(e) = binding.set_attached(attach).await {
            warn!(error = %e, attach, "Track swap failed, rolling back");
            for swapped in &bindings[..done] {
                if let Err(e) = swapped.set_attached(!attach).await {
                    warn!(error = %e, "Track rollback failed");
                }
            }
            return Err(e);
        }
    }
    Ok(())
}

struct LocalTracks {
    video: Arc<TrackLocalStaticSample>,
    audio: Arc<TrackLocalStaticSample>,
    bindings: Vec<TrackBinding>,
}

impl WebRtcAdapter {
    pub fn new(events: AdapterEventHandler) -> Self {
        Self {
            core: Arc::new(AdapterCore::new(TransportKind::WebRtc, events)),
            session: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.core.state()
    }

    async fn open(&self, config: &WebRtcConfig, settings: &StreamSettings) -> TransportResult<()> {
        config.validate()?;
        settings.validate()?;

        info!(
            signaling = %config.signaling_server,
            stun = config.stun_servers.len(),
            turn = config.turn_servers.len(),
            "Opening WebRTC session"
        );

        let whip = WhipClient::new(&config.signaling_server, config.auth_token.clone())?;
        let peer = build_peer_connection(config).await?;

        let mut resource = None;
        let (tracks, state_rx) = match establish(&peer, &whip, &mut resource).await {
            Ok(established) => established,
            Err(e) => {
                close_peer(&peer, &whip, resource.as_ref()).await;
                return Err(e);
            }
        };

        let (tx, rx) = mpsc::channel(MEDIA_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        self.core
            .connected(settings, MediaSink::new(tx, Arc::clone(self.core.metrics())));

        let task = tokio::spawn(run_sender(
            SenderTracks {
                video: Arc::clone(&tracks.video),
                audio: Arc::clone(&tracks.audio),
                video_frame: settings.frame_interval(),
            },
            rx,
            state_rx,
            shutdown_rx,
            Arc::clone(&self.core),
        ));

        *self.session.lock() = Some(PeerSession {
            peer,
            whip,
            resource,
            bindings: tracks.bindings,
            shutdown: shutdown_tx,
            task,
        });

        info!("WebRTC peer connected");
        Ok(())
    }

    fn bindings(&self) -> Vec<TrackBinding> {
        self.session
            .lock()
            .as_ref()
            .map(|session| session.bindings.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TransportAdapter for WebRtcAdapter {
    fn kind(&self) -> TransportKind {
        TransportKind::WebRtc
    }

    #[instrument(name = "webrtc_start", skip_all)]
    async fn start(&self, config: &TransportConfig, settings: &StreamSettings) -> TransportResult<()> {
        self.core.begin_start()?;

        let result = match config {
            TransportConfig::WebRtc(config) => self.open(config, settings).await,
            other => Err(TransportError::NotConfigured(format!(
                "WebRTC adapter cannot publish to a {} destination",
                other.kind()
            ))),
        };

        result.map_err(|e| self.core.start_failed(e))
    }

    #[instrument(name = "webrtc_stop", skip_all)]
    async fn stop(&self) -> TransportResult<()> {
        let was_active = self.core.deactivate();

        let session = self.session.lock().take();
        if let Some(session) = session {
            let _ = session.shutdown.send(());
            if let Err(e) = session.task.await {
                warn!("WebRTC sender task ended abnormally: {}", e);
            }
            close_peer(&session.peer, &session.whip, session.resource.as_ref()).await;
        }

        if was_active {
            info!("WebRTC session closed");
            self.core.emit(AdapterEvent::Disconnected);
        }
        Ok(())
    }

    async fn pause(&self) -> TransportResult<()> {
        if self.core.state() != ConnectionState::Connected {
            return Ok(());
        }
        swap_tracks(&self.bindings(), false).await?;
        if self.core.set_paused(true) {
            info!("WebRTC tracks detached");
        }
        Ok(())
    }

    async fn resume(&self) -> TransportResult<()> {
        if !self.core.is_paused() {
            return Ok(());
        }
        swap_tracks(&self.bindings(), true).await?;
        if self.core.set_paused(false) {
            info!("WebRTC tracks restored");
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

fn ice_servers(config: &WebRtcConfig) -> Vec<RTCIceServer> {
    let mut servers = Vec::new();
    if !config.stun_servers.is_empty() {
        servers.push(RTCIceServer {
            urls: config.stun_servers.clone(),
            ..Default::default()
        });
    }
    for turn in &config.turn_servers {
        servers.push(RTCIceServer {
            urls: vec![turn.urls.clone()],
            username: turn.username.clone(),
            credential: turn.credential.expose_secret().to_string(),
            ..Default::default()
        });
    }
    servers
}

async fn build_peer_connection(config: &WebRtcConfig) -> TransportResult<Arc<RTCPeerConnection>> {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs()?;

    let mut registry = Registry::new();
    registry = register_default_interceptors(registry, &mut media_engine)?;

    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build();

    let rtc_config = RTCConfiguration {
        ice_servers: ice_servers(config),
        ..Default::default()
    };

    Ok(Arc::new(api.new_peer_connection(rtc_config).await?))
}

/// Add tracks, run the offer/answer exchange and wait for the peer to
/// connect. `resource` is set as soon as the server created one.
async fn establish(
    peer: &Arc<RTCPeerConnection>,
    whip: &WhipClient,
    resource: &mut Option<Url>,
) -> TransportResult<(LocalTracks, watch::Receiver<RTCPeerConnectionState>)> {
    let tracks = add_tracks(peer).await?;

    let (state_tx, state_rx) = watch::channel(RTCPeerConnectionState::New);
    peer.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
        debug!(%state, "Peer connection state changed");
        let _ = state_tx.send(state);
        Box::pin(async {})
    }));

    let answer = tokio::time::timeout(SIGNALING_TIMEOUT, async {
        let offer = peer.create_offer(None).await?;
        let mut gathering = peer.gathering_complete_promise().await;
        peer.set_local_description(offer).await?;
        let _ = gathering.recv().await;

        let local = peer
            .local_description()
            .await
            .ok_or_else(|| TransportError::Signaling("no local description".to_string()))?;

        debug!(endpoint = %whip.endpoint(), "Sending SDP offer");
        let answer = whip.offer(&local.sdp).await?;
        Ok::<_, TransportError>(answer)
    })
    .await
    .map_err(|_| TransportError::Timeout("waiting for the SDP answer"))??;

    *resource = answer.resource_url.clone();
    peer.set_remote_description(RTCSessionDescription::answer(answer.answer_sdp)?)
        .await?;

    tokio::time::timeout(ICE_CONNECT_TIMEOUT, wait_connected(state_rx.clone()))
        .await
        .map_err(|_| TransportError::Timeout("waiting for ICE to connect"))??;

    Ok((tracks, state_rx))
}

async fn add_tracks(peer: &Arc<RTCPeerConnection>) -> TransportResult<LocalTracks> {
    let video = Arc::new(TrackLocalStaticSample::new(
        RTCRtpCodecCapability {
            mime_type: MIME_TYPE_H264.to_owned(),
            clock_rate: 90000,
            ..Default::default()
        },
        "video".to_owned(),
        STREAM_ID.to_owned(),
    ));
    let audio = Arc::new(TrackLocalStaticSample::new(
        RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_owned(),
            clock_rate: 48000,
            channels: 2,
            ..Default::default()
        },
        "audio".to_owned(),
        STREAM_ID.to_owned(),
    ));

    let mut bindings = Vec::with_capacity(2);
    for track in [&video, &audio] {
        let local: Arc<dyn TrackLocal + Send + Sync> = Arc::clone(track) as _;
        let sender = peer.add_track(local).await?;
        drain_rtcp(Arc::clone(&sender));
        bindings.push(TrackBinding {
            sender,
            track: Arc::clone(track),
        });
    }

    Ok(LocalTracks {
        video,
        audio,
        bindings,
    })
}

/// Interceptors only see RTCP that someone reads.
fn drain_rtcp(sender: Arc<RTCRtpSender>) {
    tokio::spawn(async move {
        let mut buf = vec![0u8; 1500];
        while sender.read(&mut buf).await.is_ok() {}
    });
}

async fn wait_connected(
    mut state_rx: watch::Receiver<RTCPeerConnectionState>,
) -> TransportResult<()> {
    loop {
        let state = *state_rx.borrow_and_update();
        match state {
            RTCPeerConnectionState::Connected => return Ok(()),
            RTCPeerConnectionState::Failed | RTCPeerConnectionState::Closed => {
                return Err(TransportError::ConnectionFailed(format!(
                    "peer connection {}",
                    state
                )));
            }
            _ => {}
        }
        state_rx.changed().await.map_err(|_| {
            TransportError::ConnectionFailed("peer connection dropped".to_string())
        })?;
    }
}

async fn close_peer(peer: &RTCPeerConnection, whip: &WhipClient, resource: Option<&Url>) {
    if let Err(e) = peer.close().await {
        debug!("Peer connection close failed: {}", e);
    }
    if let Some(resource) = resource {
        if let Err(e) = whip.terminate(resource).await {
            warn!("Failed to delete WHIP resource: {}", e);
        }
    }
}

struct SenderTracks {
    video: Arc<TrackLocalStaticSample>,
    audio: Arc<TrackLocalStaticSample>,
    video_frame: Duration,
}

async fn run_sender(
    tracks: SenderTracks,
    mut media_rx: mpsc::Receiver<MediaPacket>,
    mut state_rx: watch::Receiver<RTCPeerConnectionState>,
    mut shutdown: oneshot::Receiver<()>,
    core: Arc<AdapterCore>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                debug!("WebRTC sender shutting down");
                return;
            }
            changed = state_rx.changed() => {
                let state = *state_rx.borrow_and_update();
                let lost = changed.is_err()
                    || matches!(
                        state,
                        RTCPeerConnectionState::Failed
                            | RTCPeerConnectionState::Disconnected
                            | RTCPeerConnectionState::Closed
                    );
                if lost {
                    core.connection_lost(format!("peer connection {}", state));
                    return;
                }
            }
            packet = media_rx.recv() => {
                let Some(packet) = packet else {
                    debug!("Media channel closed");
                    return;
                };
                if core.is_paused() || packet.is_sequence_header {
                    continue;
                }
                write_packet(&tracks, packet, &core).await;
            }
        }
    }
}

async fn write_packet(tracks: &SenderTracks, packet: MediaPacket, core: &AdapterCore) {
    let len = packet.data.len();
    let (track, duration) = match packet.kind {
        MediaKind::Video => (&tracks.video, tracks.video_frame),
        MediaKind::Audio => (&tracks.audio, OPUS_FRAME_DURATION),
    };

    let sample = Sample {
        data: packet.data,
        duration,
        ..Default::default()
    };

    match track.write_sample(&sample).await {
        Ok(()) => match packet.kind {
            MediaKind::Video => core.metrics().record_video_frame(len),
            MediaKind::Audio => core.metrics().record_bytes(len),
        },
        Err(e) => {
            trace!("Sample write failed: {}", e);
            if packet.kind == MediaKind::Video {
                core.metrics().record_dropped_frame();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use streamer_ipc::{ErrorKind, TurnServer};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::time::Instant;

    #[test]
    fn test_ice_servers_from_config() {
        let mut config = WebRtcConfig::new(
            "https://whip.example.com/live",
            vec!["stun:stun.l.google.com:19302".to_string()],
        );
        config.turn_servers.push(TurnServer {
            urls: "turn:turn.example.com:3478".to_string(),
            username: "user".to_string(),
            credential: SecretString::from("pass".to_string()),
        });

        let servers = ice_servers(&config);
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].urls, vec!["stun:stun.l.google.com:19302"]);
        assert!(servers[0].username.is_empty());
        assert_eq!(servers[1].username, "user");
        assert_eq!(servers[1].credential, "pass");
    }

    #[test]
    fn test_no_ice_servers() {
        let config = WebRtcConfig::new("https://whip.example.com/live", Vec::new());
        assert!(ice_servers(&config).is_empty());
    }

    const LOOPBACK_TIMEOUT: Duration = Duration::from_secs(30);

    fn recording_handler() -> (AdapterEventHandler, Arc<Mutex<Vec<AdapterEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        (Arc::new(move |event| sink.lock().push(event)), events)
    }

    fn local_config(endpoint: &str) -> WebRtcConfig {
        WebRtcConfig::new(endpoint, Vec::new())
    }

    async fn attached_tracks(adapter: &WebRtcAdapter) -> usize {
        let mut attached = 0;
        for binding in adapter.bindings() {
            if binding.sender.track().await.is_some() {
                attached += 1;
            }
        }
        attached
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + LOOPBACK_TIMEOUT;
        while !condition() {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        true
    }

    /// A connected adapter whose session carries the given bindings.
    fn adapter_with_bindings(
        peer: Arc<RTCPeerConnection>,
        bindings: Vec<TrackBinding>,
    ) -> WebRtcAdapter {
        let adapter = WebRtcAdapter::new(Arc::new(|_| {}));
        adapter.core.begin_start().unwrap();
        let (tx, _rx) = mpsc::channel(1);
        adapter.core.connected(
            &StreamSettings::default(),
            MediaSink::new(tx, Arc::clone(adapter.core.metrics())),
        );

        let (shutdown, _) = oneshot::channel();
        *adapter.session.lock() = Some(PeerSession {
            peer,
            whip: WhipClient::new("http://127.0.0.1:9/whip", None).unwrap(),
            resource: None,
            bindings,
            shutdown,
            task: tokio::spawn(async {}),
        });
        adapter
    }

    #[tokio::test]
    async fn test_failed_resume_rolls_tracks_back() {
        let peer = build_peer_connection(&local_config("http://127.0.0.1:9/whip"))
            .await
            .unwrap();
        let tracks = add_tracks(&peer).await.unwrap();
        let video = tracks.bindings[0].clone();
        let audio = tracks.bindings[1].clone();
        // A video sender refuses an audio track.
        let mismatched = TrackBinding {
            sender: Arc::clone(&video.sender),
            track: Arc::clone(&audio.track),
        };

        let adapter = adapter_with_bindings(Arc::clone(&peer), vec![audio.clone(), mismatched]);

        adapter.pause().await.unwrap();
        assert!(adapter.is_paused());
        assert_eq!(attached_tracks(&adapter).await, 0);

        assert!(adapter.resume().await.is_err());
        assert!(adapter.is_paused());
        assert!(audio.sender.track().await.is_none());
        assert!(video.sender.track().await.is_none());

        adapter.stop().await.unwrap();
        assert!(!adapter.is_active());
    }

    #[tokio::test]
    async fn test_pause_and_resume_swap_tracks() {
        let peer = build_peer_connection(&local_config("http://127.0.0.1:9/whip"))
            .await
            .unwrap();
        let tracks = add_tracks(&peer).await.unwrap();
        let adapter = adapter_with_bindings(Arc::clone(&peer), tracks.bindings);
        assert_eq!(attached_tracks(&adapter).await, 2);

        adapter.pause().await.unwrap();
        assert!(adapter.is_paused());
        assert_eq!(attached_tracks(&adapter).await, 0);

        adapter.resume().await.unwrap();
        assert!(!adapter.is_paused());
        assert_eq!(attached_tracks(&adapter).await, 2);

        adapter.stop().await.unwrap();
    }

    /// Answers WHIP offers with a local peer connection and counts session
    /// deletes.
    struct LoopbackWhip {
        endpoint: String,
        deletes: Arc<AtomicUsize>,
        answerer: Arc<Mutex<Option<Arc<RTCPeerConnection>>>>,
    }

    async fn spawn_loopback_whip() -> LoopbackWhip {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}/whip/live", listener.local_addr().unwrap());
        let deletes = Arc::new(AtomicUsize::new(0));
        let answerer = Arc::new(Mutex::new(None));

        let server_deletes = Arc::clone(&deletes);
        let server_answerer = Arc::clone(&answerer);
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let (request_line, body) = read_request(&mut socket).await;
                let response = if request_line.starts_with("POST /whip/live ") {
                    let (peer, answer) = answer_offer(body).await;
                    *server_answerer.lock() = Some(peer);
                    http_response(
                        "201 Created",
                        "Content-Type: application/sdp\r\nLocation: /whip/resource/1\r\n",
                        &answer,
                    )
                } else if request_line.starts_with("DELETE /whip/resource/1 ") {
                    server_deletes.fetch_add(1, Ordering::SeqCst);
                    http_response("200 OK", "", "")
                } else {
                    http_response("404 Not Found", "", "")
                };
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        LoopbackWhip {
            endpoint,
            deletes,
            answerer,
        }
    }

    async fn answer_offer(offer: String) -> (Arc<RTCPeerConnection>, String) {
        let peer = build_peer_connection(&local_config("http://127.0.0.1:9/whip"))
            .await
            .unwrap();
        peer.set_remote_description(RTCSessionDescription::offer(offer).unwrap())
            .await
            .unwrap();
        let answer = peer.create_answer(None).await.unwrap();
        let mut gathering = peer.gathering_complete_promise().await;
        peer.set_local_description(answer).await.unwrap();
        let _ = gathering.recv().await;
        let sdp = peer.local_description().await.unwrap().sdp;
        (peer, sdp)
    }

    /// Request line and body of one HTTP/1.1 request.
    async fn read_request(socket: &mut TcpStream) -> (String, String) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let header_end = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before the request headers");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
        let length = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while buf.len() < header_end + length {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        let request_line = head.lines().next().unwrap_or_default().to_string();
        let body = String::from_utf8_lossy(&buf[header_end..]).into_owned();
        (request_line, body)
    }

    fn http_response(status: &str, headers: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\n{headers}Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_loopback_session_lifecycle() {
        let whip = spawn_loopback_whip().await;
        let (handler, events) = recording_handler();
        let adapter = WebRtcAdapter::new(handler);
        let config: TransportConfig = local_config(&whip.endpoint).into();

        adapter
            .start(&config, &StreamSettings::default())
            .await
            .unwrap();
        assert!(adapter.is_active());
        assert_eq!(adapter.state(), ConnectionState::Connected);
        assert_eq!(*events.lock(), vec![AdapterEvent::Connected]);
        assert_eq!(attached_tracks(&adapter).await, 2);

        let sink = adapter.media_sink().unwrap();
        sink.send(MediaPacket::video(vec![0x00, 0x00, 0x00, 0x01, 0x65, 0x88], 0, true))
            .unwrap();
        sink.send(MediaPacket::audio(vec![0xFC, 0x00], 0)).unwrap();

        adapter.pause().await.unwrap();
        assert!(adapter.is_paused());
        assert_eq!(attached_tracks(&adapter).await, 0);

        adapter.resume().await.unwrap();
        assert!(!adapter.is_paused());
        assert_eq!(attached_tracks(&adapter).await, 2);

        adapter.stop().await.unwrap();
        assert!(!adapter.is_active());
        assert!(sink.is_closed());
        assert_eq!(
            *events.lock(),
            vec![AdapterEvent::Connected, AdapterEvent::Disconnected]
        );
        assert_eq!(whip.deletes.load(Ordering::SeqCst), 1);

        adapter.stop().await.unwrap();
        assert_eq!(events.lock().len(), 2);
        assert_eq!(whip.deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_remote_close_is_connection_loss() {
        let whip = spawn_loopback_whip().await;
        let (handler, events) = recording_handler();
        let adapter = WebRtcAdapter::new(handler);
        let config: TransportConfig = local_config(&whip.endpoint).into();

        adapter
            .start(&config, &StreamSettings::default())
            .await
            .unwrap();
        let answerer = whip.answerer.lock().clone().unwrap();
        answerer.close().await.unwrap();

        assert!(wait_until(|| !adapter.is_active()).await);
        assert!(adapter.state().is_failed());
        assert!(adapter.media_sink().is_none());
        {
            let events = events.lock();
            assert_eq!(events.len(), 3, "events: {:?}", *events);
            assert!(matches!(
                events[1],
                AdapterEvent::Error {
                    kind: ErrorKind::ConnectionFailed,
                    ..
                }
            ));
            assert_eq!(events[2], AdapterEvent::Disconnected);
        }

        // The lost session is still torn down on stop, without a second
        // disconnect.
        adapter.stop().await.unwrap();
        assert_eq!(events.lock().len(), 3);
        assert_eq!(whip.deletes.load(Ordering::SeqCst), 1);
    }
}
