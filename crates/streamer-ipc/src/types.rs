//! Stream health metrics.

use serde::{Deserialize, Serialize};

/// Coarse connection health, derived from measured fps and dropped frames.
///
/// This is a best-effort signal for the UI, not a guarantee about what
/// viewers actually receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionQuality {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl ConnectionQuality {
    /// Cumulative drops above which the connection is `Poor`.
    pub const POOR_DROPPED_FRAMES: u64 = 100;

    /// Cumulative drops above which the connection is at best `Fair`.
    pub const FAIR_DROPPED_FRAMES: u64 = 50;

    /// Derive quality from measured fps, target fps and cumulative drops.
    ///
    /// A non-positive target yields a ratio of zero.
    pub fn derive(fps: f32, target_fps: f32, dropped_frames: u64) -> Self {
        let ratio = if target_fps > 0.0 { fps / target_fps } else { 0.0 };

        if dropped_frames > Self::POOR_DROPPED_FRAMES {
            Self::Poor
        } else if dropped_frames > Self::FAIR_DROPPED_FRAMES || ratio < 0.8 {
            Self::Fair
        } else if ratio < 0.95 {
            Self::Good
        } else {
            Self::Excellent
        }
    }

    /// Returns the lowercase name used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
        }
    }
}

/// Snapshot of stream health.
///
/// Always handed out by value; holders never see later updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamMetrics {
    /// Measured outbound bitrate in kbps.
    pub bitrate_kbps: u32,

    /// Measured video frames per second.
    pub fps: f32,

    /// Dropped video frames since the session started.
    pub dropped_frames: u64,

    /// Derived connection quality.
    pub connection_quality: ConnectionQuality,

    /// Seconds since the session started.
    pub uptime_seconds: u64,

    /// Viewer count, for platforms that report one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer_count: Option<u64>,
}

impl StreamMetrics {
    /// Metrics reported when nothing is streaming.
    ///
    /// `Poor` here means "not streaming", not a measurement.
    pub fn idle() -> Self {
        Self {
            bitrate_kbps: 0,
            fps: 0.0,
            dropped_frames: 0,
            connection_quality: ConnectionQuality::Poor,
            uptime_seconds: 0,
            viewer_count: None,
        }
    }
}

impl Default for StreamMetrics {
    fn default() -> Self {
        Self::idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_at_target_is_excellent() {
        assert_eq!(
            ConnectionQuality::derive(30.0, 30.0, 0),
            ConnectionQuality::Excellent
        );
    }

    #[test]
    fn test_quality_drop_thresholds() {
        assert_eq!(ConnectionQuality::derive(30.0, 30.0, 50), ConnectionQuality::Excellent);
        assert_eq!(ConnectionQuality::derive(30.0, 30.0, 60), ConnectionQuality::Fair);
        assert_eq!(ConnectionQuality::derive(30.0, 30.0, 100), ConnectionQuality::Fair);
        assert_eq!(ConnectionQuality::derive(30.0, 30.0, 150), ConnectionQuality::Poor);
    }

    #[test]
    fn test_quality_fps_ratio_thresholds() {
        // 27/30 = 0.9
        assert_eq!(ConnectionQuality::derive(27.0, 30.0, 0), ConnectionQuality::Good);
        // 21/30 = 0.7
        assert_eq!(ConnectionQuality::derive(21.0, 30.0, 0), ConnectionQuality::Fair);
        // 29/30 ~ 0.967
        assert_eq!(ConnectionQuality::derive(29.0, 30.0, 0), ConnectionQuality::Excellent);
    }

    #[test]
    fn test_quality_drops_dominate_fps() {
        assert_eq!(ConnectionQuality::derive(60.0, 30.0, 101), ConnectionQuality::Poor);
    }

    #[test]
    fn test_quality_zero_target() {
        assert_eq!(ConnectionQuality::derive(30.0, 0.0, 0), ConnectionQuality::Fair);
    }

    #[test]
    fn test_idle_metrics() {
        let metrics = StreamMetrics::idle();
        assert_eq!(metrics.bitrate_kbps, 0);
        assert_eq!(metrics.fps, 0.0);
        assert_eq!(metrics.dropped_frames, 0);
        assert_eq!(metrics.connection_quality, ConnectionQuality::Poor);
        assert_eq!(metrics.uptime_seconds, 0);
        assert_eq!(metrics.viewer_count, None);
    }

    #[test]
    fn test_metrics_serialization_omits_missing_viewers() {
        let json = serde_json::to_value(StreamMetrics::idle()).unwrap();
        assert_eq!(json["connection_quality"], "poor");
        assert!(json.get("viewer_count").is_none());
    }
}
