//! Stream metrics derived from what an adapter actually transmits.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::debug;

use streamer_ipc::{ConnectionQuality, StreamMetrics};

/// Collects per-session counters and turns them into [`StreamMetrics`].
///
/// Counters are bumped from the media path; [`sample`](Self::sample) is
/// called once per metrics tick and measures fps and bitrate over the
/// window since the previous tick.
pub struct MetricsCollector {
    frames_sent: AtomicU64,
    bytes_sent: AtomicU64,
    dropped_frames: AtomicU64,
    clock: RwLock<UptimeClock>,
    window: RwLock<Window>,
    measured: RwLock<Measured>,
    target_fps: RwLock<f32>,
}

#[derive(Default)]
struct UptimeClock {
    started: Option<Instant>,
    frozen: Duration,
}

struct Window {
    at: Instant,
    frames: u64,
    bytes: u64,
}

struct Measured {
    fps: f32,
    bitrate_kbps: u32,
    quality: ConnectionQuality,
}

impl Default for Measured {
    fn default() -> Self {
        Self {
            fps: 0.0,
            bitrate_kbps: 0,
            quality: ConnectionQuality::Excellent,
        }
    }
}

impl MetricsCollector {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self {
            frames_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            dropped_frames: AtomicU64::new(0),
            clock: RwLock::new(UptimeClock::default()),
            window: RwLock::new(Window {
                at: Instant::now(),
                frames: 0,
                bytes: 0,
            }),
            measured: RwLock::new(Measured::default()),
            target_fps: RwLock::new(0.0),
        }
    }

    /// Reset all counters and start the uptime clock.
    pub fn start(&self, target_fps: f32) {
        let now = Instant::now();

        self.frames_sent.store(0, Ordering::Relaxed);
        self.bytes_sent.store(0, Ordering::Relaxed);
        self.dropped_frames.store(0, Ordering::Relaxed);

        *self.clock.write() = UptimeClock {
            started: Some(now),
            frozen: Duration::ZERO,
        };
        *self.window.write() = Window {
            at: now,
            frames: 0,
            bytes: 0,
        };
        *self.measured.write() = Measured::default();
        *self.target_fps.write() = target_fps;
    }

    /// Freeze the uptime clock.
    pub fn stop(&self) {
        let mut clock = self.clock.write();
        if let Some(started) = clock.started.take() {
            clock.frozen = started.elapsed();
        }
    }

    /// Returns true between `start` and `stop`.
    pub fn is_running(&self) -> bool {
        self.clock.read().started.is_some()
    }

    /// Record a video frame handed to the transport.
    pub fn record_video_frame(&self, bytes: usize) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record non-video payload handed to the transport.
    pub fn record_bytes(&self, bytes: usize) {
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record a video frame that never reached the transport.
    pub fn record_dropped_frame(&self) {
        self.dropped_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Time since `start`, frozen after `stop`.
    pub fn uptime(&self) -> Duration {
        let clock = self.clock.read();
        match clock.started {
            Some(started) => started.elapsed(),
            None => clock.frozen,
        }
    }

    /// Measure the window since the previous sample, re-derive quality and
    /// return the resulting snapshot.
    pub fn sample(&self) -> StreamMetrics {
        if self.is_running() {
            let now = Instant::now();
            let frames = self.frames_sent.load(Ordering::Relaxed);
            let bytes = self.bytes_sent.load(Ordering::Relaxed);
            let dropped = self.dropped_frames.load(Ordering::Relaxed);

            let mut window = self.window.write();
            let elapsed = now.duration_since(window.at).as_secs_f32();

            if elapsed > 0.0 {
                let fps = frames.saturating_sub(window.frames) as f32 / elapsed;
                let bits = bytes.saturating_sub(window.bytes) * 8;
                let bitrate_kbps = bits as f32 / elapsed / 1000.0;
                let quality = ConnectionQuality::derive(fps, *self.target_fps.read(), dropped);

                debug!(
                    fps,
                    bitrate_kbps,
                    dropped,
                    quality = quality.as_str(),
                    "Metrics sampled"
                );

                *self.measured.write() = Measured {
                    fps,
                    bitrate_kbps: bitrate_kbps as u32,
                    quality,
                };
                *window = Window {
                    at: now,
                    frames,
                    bytes,
                };
            }
        }

        self.snapshot()
    }

    /// Copy of the latest measurement with uptime recomputed.
    pub fn snapshot(&self) -> StreamMetrics {
        let measured = self.measured.read();

        StreamMetrics {
            bitrate_kbps: measured.bitrate_kbps,
            fps: measured.fps,
            dropped_frames: self.dropped_frames.load(Ordering::Relaxed),
            connection_quality: measured.quality,
            uptime_seconds: self.uptime().as_secs(),
            viewer_count: None,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
