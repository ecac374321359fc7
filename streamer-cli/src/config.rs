//! Stream profile loading.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use streamer_ipc::{find_platform, StreamSettings, TransportConfig};

/// Platform preset used for WebRTC profiles without explicit settings.
const WEBRTC_PRESET: &str = "webrtc-direct";

/// A destination plus optional settings, read from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamProfile {
    pub transport: TransportConfig,

    #[serde(default)]
    pub settings: Option<StreamSettings>,
}

impl StreamProfile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read profile {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Invalid profile {}", path.display()))
    }

    pub fn parse(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Explicit settings, else the platform preset, else the defaults.
    pub fn resolved_settings(&self) -> StreamSettings {
        if let Some(settings) = &self.settings {
            return settings.clone();
        }

        let preset = match &self.transport {
            TransportConfig::Rtmp(config) => find_platform(&config.platform),
            TransportConfig::WebRtc(_) => find_platform(WEBRTC_PRESET),
        };
        preset
            .map(|platform| platform.default_settings.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamer_ipc::{TransportKind, DEFAULT_STREAM_SETTINGS};

    #[test]
    fn test_rtmp_profile_uses_platform_preset() {
        let profile = StreamProfile::parse(
            r#"{
                "transport": {
                    "kind": "rtmp",
                    "url": "rtmp://a.rtmp.youtube.com/live2",
                    "stream_key": "abcd-efgh",
                    "platform": "facebook"
                }
            }"#,
        )
        .unwrap();

        assert_eq!(profile.transport.kind(), TransportKind::Rtmp);
        let expected = find_platform("facebook").unwrap().default_settings.clone();
        assert_eq!(profile.resolved_settings(), expected);
        assert_eq!(profile.resolved_settings().resolution.width, 1280);
    }

    #[test]
    fn test_unknown_platform_falls_back_to_defaults() {
        let profile = StreamProfile::parse(
            r#"{"transport": {"kind": "rtmp", "url": "rtmp://host/app", "stream_key": "k", "platform": "my-server"}}"#,
        )
        .unwrap();

        assert_eq!(profile.resolved_settings(), DEFAULT_STREAM_SETTINGS);
    }

    #[test]
    fn test_explicit_settings_win() {
        let profile = StreamProfile::parse(
            r#"{
                "transport": {
                    "kind": "webrtc",
                    "signaling_server": "https://whip.example.com/live",
                    "stun_servers": ["stun:stun.l.google.com:19302"],
                    "auth_token": "token"
                },
                "settings": {
                    "resolution": {"width": 640, "height": 360},
                    "frame_rate": 24,
                    "video_bitrate_kbps": 800,
                    "audio_bitrate_kbps": 64,
                    "audio_sample_rate": 48000,
                    "keyframe_interval_secs": 1
                }
            }"#,
        )
        .unwrap();

        assert_eq!(profile.transport.kind(), TransportKind::WebRtc);
        let settings = profile.resolved_settings();
        assert_eq!(settings.frame_rate, 24);
        assert_eq!(settings.resolution.height, 360);
    }

    #[test]
    fn test_webrtc_profile_uses_webrtc_preset() {
        let profile = StreamProfile::parse(
            r#"{"transport": {"kind": "webrtc", "signaling_server": "https://whip.example.com/live"}}"#,
        )
        .unwrap();

        let expected = find_platform(WEBRTC_PRESET).unwrap().default_settings.clone();
        assert_eq!(profile.resolved_settings(), expected);
    }

    #[test]
    fn test_unknown_transport_kind_rejected() {
        let err = StreamProfile::parse(r#"{"transport": {"kind": "srt", "url": "srt://host"}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("srt"));
    }

    #[test]
    fn test_missing_file() {
        let err = StreamProfile::load(Path::new("/nonexistent/profile.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read profile"));
    }
}
