//! The stream coordinator.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use tracing::{debug, error, info, instrument, warn};

use streamer_ipc::{
    RtmpConfig, SessionState, StreamCommand, StreamEvent, StreamMetrics, StreamSettings,
    StreamStatus, TransportConfig, TransportKind, WebRtcConfig,
};
use streamer_transport::{AdapterEvent, AdapterEventHandler, MediaSink, TransportAdapter};

use crate::error::{StreamError, StreamResult};
use crate::events::EventBus;
use crate::factory::{AdapterFactory, DefaultAdapterFactory};
use crate::sampler::MetricsSampler;

/// Default metrics tick.
pub const METRICS_INTERVAL: Duration = Duration::from_secs(1);

/// Single point of control for the one active stream.
///
/// Lifecycle calls are async and may be issued from any task. Overlapping
/// `start_*`/`stop` calls are rejected with [`StreamError::Busy`] rather
/// than queued.
pub struct StreamCoordinator {
    factory: Arc<dyn AdapterFactory>,
    bus: Arc<EventBus>,
    metrics_interval: Duration,
    inner: Mutex<Inner>,
}

struct Inner {
    state: SessionState,
    session: Option<ActiveSession>,
    destroyed: bool,
}

/// An adapter that completed `start`, with the sampler watching it.
struct ActiveSession {
    adapter: Arc<dyn TransportAdapter>,
    sampler: MetricsSampler,
}

impl Inner {
    fn ensure_usable(&self) -> StreamResult<()> {
        if self.destroyed {
            return Err(StreamError::Destroyed);
        }
        if self.state.is_transient() {
            return Err(StreamError::Busy {
                state: self.state.name(),
            });
        }
        Ok(())
    }
}

impl StreamCoordinator {
    /// Create a coordinator backed by the real RTMP and WebRTC adapters.
    pub fn new() -> Self {
        Self::with_factory(Arc::new(DefaultAdapterFactory), METRICS_INTERVAL)
    }

    pub fn with_factory(factory: Arc<dyn AdapterFactory>, metrics_interval: Duration) -> Self {
        Self {
            factory,
            bus: Arc::new(EventBus::new()),
            metrics_interval,
            inner: Mutex::new(Inner {
                state: SessionState::Idle,
                session: None,
                destroyed: false,
            }),
        }
    }

    /// Subscribe to status, error and metrics events.
    pub fn subscribe(&self) -> Receiver<StreamEvent> {
        self.bus.subscribe()
    }

    pub async fn start_rtmp(&self, config: RtmpConfig, settings: StreamSettings) -> StreamResult<()> {
        self.start(config.into(), settings).await
    }

    pub async fn start_webrtc(
        &self,
        config: WebRtcConfig,
        settings: StreamSettings,
    ) -> StreamResult<()> {
        self.start(config.into(), settings).await
    }

    /// Start a stream on `config`, replacing any running one.
    #[instrument(name = "stream_start", skip_all, fields(transport = %config.kind()))]
    pub async fn start(&self, config: TransportConfig, settings: StreamSettings) -> StreamResult<()> {
        let kind = config.kind();

        let previous = {
            let mut inner = self.inner.lock();
            inner.ensure_usable()?;
            inner.state = SessionState::Starting { kind };
            inner.session.take()
        };

        if let Some(previous) = previous {
            info!(
                from = %previous.adapter.kind(),
                to = %kind,
                "Stopping active stream before starting a new one"
            );
            self.teardown(previous).await;

            if self.inner.lock().destroyed {
                warn!("Coordinator destroyed while replacing the stream, start abandoned");
                return Err(StreamError::Destroyed);
            }
        }

        let adapter = self.factory.create(kind, self.adapter_events());
        let result = adapter.start(&config, &settings).await;

        let orphan = {
            let mut inner = self.inner.lock();
            match result {
                Ok(()) if inner.destroyed => Some(adapter),
                Ok(()) => {
                    let sampler = MetricsSampler::start(
                        Arc::downgrade(&adapter),
                        Arc::clone(&self.bus),
                        self.metrics_interval,
                    );
                    inner.session = Some(ActiveSession { adapter, sampler });
                    inner.state = SessionState::Live { kind };
                    None
                }
                Err(e) => {
                    inner.state = SessionState::Idle;
                    error!(error = %e, "Stream start failed");
                    return Err(e.into());
                }
            }
        };

        if let Some(adapter) = orphan {
            warn!("Coordinator destroyed while starting, tearing the new stream down");
            if let Err(e) = adapter.stop().await {
                warn!(error = %e, "Adapter stop failed");
            }
            return Err(StreamError::Destroyed);
        }

        info!(transport = %kind, "Stream live");
        Ok(())
    }

    /// Stop the active stream. No-op when idle.
    #[instrument(name = "stream_stop", skip_all)]
    pub async fn stop(&self) -> StreamResult<()> {
        let session = {
            let mut inner = self.inner.lock();
            inner.ensure_usable()?;
            let Some(session) = inner.session.take() else {
                debug!("No active stream, stop ignored");
                return Ok(());
            };
            inner.state = SessionState::Stopping;
            session
        };

        self.teardown(session).await;
        self.inner.lock().state = SessionState::Idle;
        Ok(())
    }

    /// Suspend outbound media. No-op unless live.
    #[instrument(name = "stream_pause", skip_all)]
    pub async fn pause(&self) -> StreamResult<()> {
        let Some((adapter, kind)) =
            self.adapter_in(|state| matches!(state, SessionState::Live { .. }))?
        else {
            debug!("Stream not live, pause ignored");
            return Ok(());
        };

        adapter.pause().await?;
        if !adapter.is_paused() {
            return Ok(());
        }

        let changed = {
            let mut inner = self.inner.lock();
            let changed = inner.state == SessionState::Live { kind };
            if changed {
                inner.state = SessionState::Paused { kind };
            }
            changed
        };
        if changed {
            info!("Stream paused");
            self.bus.publish(StreamEvent::StatusChange(StreamStatus::Paused));
        }
        Ok(())
    }

    /// Resume outbound media. No-op unless paused.
    #[instrument(name = "stream_resume", skip_all)]
    pub async fn resume(&self) -> StreamResult<()> {
        let Some((adapter, kind)) =
            self.adapter_in(|state| matches!(state, SessionState::Paused { .. }))?
        else {
            debug!("Stream not paused, resume ignored");
            return Ok(());
        };

        adapter.resume().await?;
        if adapter.is_paused() || !adapter.is_active() {
            return Ok(());
        }

        let changed = {
            let mut inner = self.inner.lock();
            let changed = inner.state == SessionState::Paused { kind };
            if changed {
                inner.state = SessionState::Live { kind };
            }
            changed
        };
        if changed {
            info!("Stream resumed");
            self.bus.publish(StreamEvent::StatusChange(StreamStatus::Resumed));
        }
        Ok(())
    }

    /// Snapshot of the active adapter's metrics, or the idle sentinel.
    pub fn get_metrics(&self) -> StreamMetrics {
        let inner = self.inner.lock();
        match &inner.session {
            Some(session) => session.adapter.metrics(),
            None => StreamMetrics::idle(),
        }
    }

    /// True iff an adapter is present and reports active.
    pub fn is_streaming(&self) -> bool {
        self.inner
            .lock()
            .session
            .as_ref()
            .is_some_and(|session| session.adapter.is_active())
    }

    /// Current lifecycle state. A held adapter that lost its transport
    /// reads as `Interrupted`.
    pub fn state(&self) -> SessionState {
        let inner = self.inner.lock();
        match (inner.state, &inner.session) {
            (SessionState::Live { kind } | SessionState::Paused { kind }, Some(session))
                if !session.adapter.is_active() =>
            {
                SessionState::Interrupted { kind }
            }
            (state, _) => state,
        }
    }

    /// Transport of the adapter currently held, if any.
    pub fn active_transport(&self) -> Option<TransportKind> {
        self.inner
            .lock()
            .session
            .as_ref()
            .map(|session| session.adapter.kind())
    }

    /// Entry point for encoded media while a stream is active.
    pub fn media_sink(&self) -> Option<MediaSink> {
        self.inner
            .lock()
            .session
            .as_ref()
            .and_then(|session| session.adapter.media_sink())
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.lock().destroyed
    }

    /// Apply a UI command.
    pub async fn handle_command(&self, command: StreamCommand) -> StreamResult<()> {
        debug!(?command, "Handling command");

        match command {
            StreamCommand::Pause => self.pause().await,
            StreamCommand::Resume => self.resume().await,
            StreamCommand::Stop => self.stop().await,
            StreamCommand::GetMetrics => {
                if self.is_destroyed() {
                    return Err(StreamError::Destroyed);
                }
                self.bus
                    .publish(StreamEvent::MetricsUpdate(self.get_metrics()));
                Ok(())
            }
        }
    }

    /// Tear down any active stream and disconnect every subscriber. The
    /// coordinator rejects all lifecycle calls afterwards.
    #[instrument(name = "stream_destroy", skip_all)]
    pub async fn destroy(&self) {
        let session = {
            let mut inner = self.inner.lock();
            if inner.destroyed {
                return;
            }
            inner.destroyed = true;
            inner.session.take()
        };

        if let Some(session) = session {
            self.teardown(session).await;
        }

        self.inner.lock().state = SessionState::Idle;
        self.bus.close();
        info!("Coordinator destroyed");
    }

    /// The adapter and its transport, if the state satisfies `accept`.
    fn adapter_in(
        &self,
        accept: impl FnOnce(&SessionState) -> bool,
    ) -> StreamResult<Option<(Arc<dyn TransportAdapter>, TransportKind)>> {
        let inner = self.inner.lock();
        inner.ensure_usable()?;

        if !accept(&inner.state) {
            return Ok(None);
        }
        Ok(inner.session.as_ref().map(|session| {
            let adapter = Arc::clone(&session.adapter);
            let kind = adapter.kind();
            (adapter, kind)
        }))
    }

    /// Sampler first, then the adapter, then `stopped`.
    async fn teardown(&self, session: ActiveSession) {
        session.sampler.stop().await;

        if let Err(e) = session.adapter.stop().await {
            warn!(error = %e, "Adapter stop failed");
        }

        info!(transport = %session.adapter.kind(), "Stream stopped");
        self.bus
            .publish(StreamEvent::StatusChange(StreamStatus::Stopped));
    }

    /// Maps adapter events onto the subscriber bus.
    fn adapter_events(&self) -> AdapterEventHandler {
        let bus = Arc::clone(&self.bus);
        Arc::new(move |event| {
            let event = match event {
                AdapterEvent::Connected => StreamEvent::StatusChange(StreamStatus::Connected),
                AdapterEvent::Disconnected => {
                    StreamEvent::StatusChange(StreamStatus::Disconnected)
                }
                AdapterEvent::Error { kind, message } => StreamEvent::Error { kind, message },
            };
            bus.publish(event);
        })
    }
}

impl Default for StreamCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
