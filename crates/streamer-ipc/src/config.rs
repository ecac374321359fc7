//! Destination configs for the two transports.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::settings::{find_platform, TransportKind};

/// Errors raised while validating settings or destination configs.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required field is empty.
    #[error("Missing {0}")]
    Missing(&'static str),

    /// A URL could not be used for this transport.
    #[error("Invalid {field}: {reason}")]
    InvalidUrl { field: &'static str, reason: String },

    /// The chosen platform belongs to the other transport.
    #[error("Platform '{platform}' does not stream over {kind}")]
    PlatformMismatch {
        platform: String,
        kind: TransportKind,
    },

    /// Session settings out of range.
    #[error("Invalid stream settings: {0}")]
    InvalidSettings(String),
}

/// RTMP publish destination.
#[derive(Debug, Clone, Deserialize)]
pub struct RtmpConfig {
    /// Ingest URL, e.g. `rtmp://live.twitch.tv/app`.
    pub url: String,

    /// Stream key. Never logged in full.
    pub stream_key: SecretString,

    /// Platform identifier (see `STREAMING_PLATFORMS`).
    pub platform: String,
}

impl RtmpConfig {
    pub fn new(
        url: impl Into<String>,
        stream_key: impl Into<String>,
        platform: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            stream_key: SecretString::from(stream_key.into()),
            platform: platform.into(),
        }
    }

    /// The stream key shortened to at most four characters, for log lines.
    pub fn redacted_key(&self) -> String {
        let key = self.stream_key.expose_secret();
        if key.chars().count() <= 4 {
            return "****".to_string();
        }
        let prefix: String = key.chars().take(4).collect();
        format!("{prefix}****")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::Missing("RTMP URL"));
        }
        let parsed = Url::parse(&self.url).map_err(|e| ConfigError::InvalidUrl {
            field: "RTMP URL",
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "rtmp") {
            return Err(ConfigError::InvalidUrl {
                field: "RTMP URL",
                reason: "URL must start with rtmp:// (TLS ingest is not supported)".to_string(),
            });
        }
        if parsed.host_str().map_or(true, str::is_empty) {
            return Err(ConfigError::InvalidUrl {
                field: "RTMP URL",
                reason: "missing host".to_string(),
            });
        }
        if parsed.path().trim_matches('/').is_empty() {
            return Err(ConfigError::InvalidUrl {
                field: "RTMP URL",
                reason: "missing application name in URL path".to_string(),
            });
        }
        if self.stream_key.expose_secret().trim().is_empty() {
            return Err(ConfigError::Missing("stream key"));
        }
        if self.platform.trim().is_empty() {
            return Err(ConfigError::Missing("platform"));
        }
        if let Some(platform) = find_platform(&self.platform) {
            if platform.kind != TransportKind::Rtmp {
                return Err(ConfigError::PlatformMismatch {
                    platform: self.platform.clone(),
                    kind: TransportKind::Rtmp,
                });
            }
        }
        Ok(())
    }
}

/// A TURN relay.
#[derive(Debug, Clone, Deserialize)]
pub struct TurnServer {
    /// TURN URL, e.g. `turn:turn.example.com:3478`.
    pub urls: String,
    pub username: String,
    pub credential: SecretString,
}

/// WebRTC destination, reached through WHIP signaling.
#[derive(Debug, Clone, Deserialize)]
pub struct WebRtcConfig {
    /// WHIP endpoint that accepts the SDP offer.
    pub signaling_server: String,

    /// STUN URIs, e.g. `stun:stun.l.google.com:19302`.
    #[serde(default)]
    pub stun_servers: Vec<String>,

    #[serde(default)]
    pub turn_servers: Vec<TurnServer>,

    /// Bearer token for WHIP endpoints that require one.
    #[serde(default)]
    pub auth_token: Option<SecretString>,
}

impl WebRtcConfig {
    pub fn new(signaling_server: impl Into<String>, stun_servers: Vec<String>) -> Self {
        Self {
            signaling_server: signaling_server.into(),
            stun_servers,
            turn_servers: Vec::new(),
            auth_token: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.signaling_server.trim().is_empty() {
            return Err(ConfigError::Missing("signaling server"));
        }
        let parsed = Url::parse(&self.signaling_server).map_err(|e| ConfigError::InvalidUrl {
            field: "signaling server",
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                field: "signaling server",
                reason: "URL must start with http:// or https://".to_string(),
            });
        }
        for stun in &self.stun_servers {
            if !(stun.starts_with("stun:") || stun.starts_with("stuns:")) {
                return Err(ConfigError::InvalidUrl {
                    field: "STUN server",
                    reason: format!("'{stun}' must start with stun: or stuns:"),
                });
            }
        }
        for turn in &self.turn_servers {
            if !(turn.urls.starts_with("turn:") || turn.urls.starts_with("turns:")) {
                return Err(ConfigError::InvalidUrl {
                    field: "TURN server",
                    reason: format!("'{}' must start with turn: or turns:", turn.urls),
                });
            }
            if turn.username.is_empty() {
                return Err(ConfigError::Missing("TURN username"));
            }
        }
        Ok(())
    }
}

/// Destination config, discriminated by transport.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportConfig {
    Rtmp(RtmpConfig),
    #[serde(rename = "webrtc")]
    WebRtc(WebRtcConfig),
}

impl TransportConfig {
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Rtmp(_) => TransportKind::Rtmp,
            Self::WebRtc(_) => TransportKind::WebRtc,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Rtmp(config) => config.validate(),
            Self::WebRtc(config) => config.validate(),
        }
    }
}

impl From<RtmpConfig> for TransportConfig {
    fn from(config: RtmpConfig) -> Self {
        Self::Rtmp(config)
    }
}

impl From<WebRtcConfig> for TransportConfig {
    fn from(config: WebRtcConfig) -> Self {
        Self::WebRtc(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_rtmp_config() {
        let config = RtmpConfig::new("rtmp://live.example.com/app", "abcd1234", "custom-rtmp");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rtmp_rejects_http_scheme() {
        let config = RtmpConfig::new("http://live.example.com/app", "key", "custom-rtmp");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_rtmp_requires_app_name() {
        let config = RtmpConfig::new("rtmp://live.example.com", "key", "custom-rtmp");
        assert!(config.validate().is_err());

        let config = RtmpConfig::new("rtmp://x", "key", "custom-rtmp");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidUrl { field: "RTMP URL", .. })
        ));
    }

    #[test]
    fn test_rtmp_requires_stream_key_and_platform() {
        let config = RtmpConfig::new("rtmp://x/app", "", "custom-rtmp");
        assert!(matches!(config.validate(), Err(ConfigError::Missing("stream key"))));

        let config = RtmpConfig::new("rtmp://x/app", "key", " ");
        assert!(matches!(config.validate(), Err(ConfigError::Missing("platform"))));
    }

    #[test]
    fn test_rtmp_rejects_webrtc_platform() {
        let config = RtmpConfig::new("rtmp://x/app", "key", "webrtc-direct");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::PlatformMismatch { .. })
        ));
    }

    #[test]
    fn test_rtmp_accepts_unknown_platform() {
        let config = RtmpConfig::new("rtmp://x/app", "key", "my-own-server");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_stream_key_is_redacted() {
        let config = RtmpConfig::new("rtmp://x/app", "live_123456789", "twitch");
        assert_eq!(config.redacted_key(), "live****");

        let debug = format!("{config:?}");
        assert!(!debug.contains("live_123456789"));

        let short = RtmpConfig::new("rtmp://x/app", "abc", "twitch");
        assert_eq!(short.redacted_key(), "****");
    }

    #[test]
    fn test_webrtc_validation() {
        let mut config = WebRtcConfig::new(
            "https://whip.example.com/endpoint",
            vec!["stun:stun.l.google.com:19302".to_string()],
        );
        assert!(config.validate().is_ok());

        config.stun_servers.push("turn:wrong.example.com".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_webrtc_rejects_websocket_signaling() {
        let config = WebRtcConfig::new("ws://signal.example.com", Vec::new());
        assert!(config.validate().is_err());

        let config = WebRtcConfig::new("wss://signal.example.com/whip", Vec::new());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidUrl { field: "signaling server", .. })
        ));
    }

    #[test]
    fn test_transport_config_deserialize() {
        let json = r#"{
            "kind": "webrtc",
            "signaling_server": "https://whip.example.com/endpoint",
            "stun_servers": ["stun:stun.example.com:3478"],
            "turn_servers": [
                {"urls": "turn:turn.example.com:3478", "username": "u", "credential": "secret-pass"}
            ]
        }"#;
        let config: TransportConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.kind(), TransportKind::WebRtc);
        assert!(config.validate().is_ok());
        assert!(!format!("{config:?}").contains("secret-pass"));

        let json = r#"{"kind": "rtmp", "url": "rtmp://x/app", "stream_key": "k", "platform": "custom-rtmp"}"#;
        let config: TransportConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.kind(), TransportKind::Rtmp);
    }
}
