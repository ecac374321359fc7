//! Session settings and the streaming platform presets.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Output resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Immutable configuration for one streaming session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSettings {
    /// Target output resolution.
    pub resolution: Resolution,

    /// Target frames per second.
    pub frame_rate: u32,

    /// Video bitrate in kbps.
    pub video_bitrate_kbps: u32,

    /// Audio bitrate in kbps.
    pub audio_bitrate_kbps: u32,

    /// Audio sample rate in Hz.
    pub audio_sample_rate: u32,

    /// Key-frame interval in seconds.
    pub keyframe_interval_secs: u32,
}

/// Settings used when neither the caller nor a platform preset supplies any.
pub const DEFAULT_STREAM_SETTINGS: StreamSettings = StreamSettings {
    resolution: Resolution {
        width: 1920,
        height: 1080,
    },
    frame_rate: 30,
    video_bitrate_kbps: 4500,
    audio_bitrate_kbps: 128,
    audio_sample_rate: 44100,
    keyframe_interval_secs: 2,
};

impl Default for StreamSettings {
    fn default() -> Self {
        DEFAULT_STREAM_SETTINGS
    }
}

impl StreamSettings {
    /// Reject settings no encoder or transport could honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let zero = [
            ("resolution.width", self.resolution.width),
            ("resolution.height", self.resolution.height),
            ("frame_rate", self.frame_rate),
            ("video_bitrate_kbps", self.video_bitrate_kbps),
            ("audio_bitrate_kbps", self.audio_bitrate_kbps),
            ("audio_sample_rate", self.audio_sample_rate),
            ("keyframe_interval_secs", self.keyframe_interval_secs),
        ]
        .into_iter()
        .find(|(_, value)| *value == 0);

        match zero {
            Some((field, _)) => Err(ConfigError::InvalidSettings(format!(
                "{field} must be greater than zero"
            ))),
            None => Ok(()),
        }
    }

    /// Duration of one video frame at the target frame rate.
    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(1) / self.frame_rate.max(1)
    }
}

/// The two streaming backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    Rtmp,
    WebRtc,
}

impl TransportKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Rtmp => "RTMP",
            Self::WebRtc => "WebRTC",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A known streaming destination with its recommended settings.
#[derive(Debug, Clone, Serialize)]
pub struct StreamingPlatform {
    pub id: &'static str,
    pub name: &'static str,
    pub kind: TransportKind,
    pub requires_auth: bool,
    pub supports_chat: bool,
    pub default_settings: StreamSettings,
}

/// Platform presets offered to the UI.
pub const STREAMING_PLATFORMS: &[StreamingPlatform] = &[
    StreamingPlatform {
        id: "youtube",
        name: "YouTube Live",
        kind: TransportKind::Rtmp,
        requires_auth: true,
        supports_chat: true,
        default_settings: StreamSettings {
            resolution: Resolution {
                width: 1920,
                height: 1080,
            },
            frame_rate: 30,
            video_bitrate_kbps: 4500,
            audio_bitrate_kbps: 128,
            audio_sample_rate: 44100,
            keyframe_interval_secs: 2,
        },
    },
    StreamingPlatform {
        id: "twitch",
        name: "Twitch",
        kind: TransportKind::Rtmp,
        requires_auth: true,
        supports_chat: true,
        default_settings: StreamSettings {
            resolution: Resolution {
                width: 1920,
                height: 1080,
            },
            frame_rate: 30,
            video_bitrate_kbps: 6000,
            audio_bitrate_kbps: 160,
            audio_sample_rate: 48000,
            keyframe_interval_secs: 2,
        },
    },
    StreamingPlatform {
        id: "facebook",
        name: "Facebook Live",
        kind: TransportKind::Rtmp,
        requires_auth: true,
        supports_chat: true,
        default_settings: StreamSettings {
            resolution: Resolution {
                width: 1280,
                height: 720,
            },
            frame_rate: 30,
            video_bitrate_kbps: 4000,
            audio_bitrate_kbps: 128,
            audio_sample_rate: 44100,
            keyframe_interval_secs: 2,
        },
    },
    StreamingPlatform {
        id: "custom-rtmp",
        name: "Custom RTMP",
        kind: TransportKind::Rtmp,
        requires_auth: false,
        supports_chat: false,
        default_settings: StreamSettings {
            resolution: Resolution {
                width: 1920,
                height: 1080,
            },
            frame_rate: 30,
            video_bitrate_kbps: 5000,
            audio_bitrate_kbps: 128,
            audio_sample_rate: 44100,
            keyframe_interval_secs: 2,
        },
    },
    StreamingPlatform {
        id: "webrtc-direct",
        name: "Direct WebRTC",
        kind: TransportKind::WebRtc,
        requires_auth: false,
        supports_chat: false,
        default_settings: StreamSettings {
            resolution: Resolution {
                width: 1280,
                height: 720,
            },
            frame_rate: 30,
            video_bitrate_kbps: 2500,
            audio_bitrate_kbps: 128,
            audio_sample_rate: 44100,
            keyframe_interval_secs: 2,
        },
    },
];

/// Look up a platform preset by id.
pub fn find_platform(id: &str) -> Option<&'static StreamingPlatform> {
    STREAMING_PLATFORMS.iter().find(|p| p.id == id)
}
