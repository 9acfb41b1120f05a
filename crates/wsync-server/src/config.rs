//! Server configuration

use crate::error::ServerError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use wsync_envelope::PROTOCOL_VERSION;
use wsync_repository::{DEFAULT_RETAINED_EVENTS, MIN_RETAINED_EVENTS};

/// Smallest accepted rate-limit window
pub const MIN_RATE_WINDOW_MS: u64 = 250;

/// Command rate limit per session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Burst size; the bucket refills evenly over the window
    pub max_commands: u32,
    /// Window length in milliseconds
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_commands: 12,
            window_ms: 5000,
        }
    }
}

impl RateLimitConfig {
    /// Clamp to the supported floor
    #[must_use]
    pub fn bounded(self) -> Self {
        Self {
            max_commands: self.max_commands.max(1),
            window_ms: self.window_ms.max(MIN_RATE_WINDOW_MS),
        }
    }
}

/// World server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Protocol version announced in `hello_ack`
    pub protocol_version: u32,
    /// Most events a resumed client may be behind
    pub replay_limit: usize,
    /// Events retained in the timeline
    pub max_events: usize,
    /// Scene used when a snapshot is built before any subscribe
    pub scene_id: String,
    /// Per-session command rate limit
    pub rate_limit: RateLimitConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            replay_limit: 200,
            max_events: DEFAULT_RETAINED_EVENTS,
            scene_id: "cozy_office_v0".to_string(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With replay limit
    #[inline]
    #[must_use]
    pub fn with_replay_limit(mut self, limit: usize) -> Self {
        self.replay_limit = limit.max(1);
        self
    }

    /// With retained timeline size
    #[inline]
    #[must_use]
    pub fn with_max_events(mut self, max_events: usize) -> Self {
        self.max_events = max_events.max(MIN_RETAINED_EVENTS);
        self
    }

    /// With command rate limit
    #[inline]
    #[must_use]
    pub fn with_rate_limit(mut self, max_commands: u32, window_ms: u64) -> Self {
        self.rate_limit = RateLimitConfig {
            max_commands,
            window_ms,
        }
        .bounded();
        self
    }

    /// With default scene
    #[inline]
    #[must_use]
    pub fn with_scene_id(mut self, scene_id: impl Into<String>) -> Self {
        self.scene_id = scene_id.into();
        self
    }

    /// Parse from TOML; missing keys take defaults
    pub fn from_toml_str(text: &str) -> Result<Self, ServerError> {
        let config: Self =
            toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))?;
        config.validated()
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    fn validated(mut self) -> Result<Self, ServerError> {
        if self.protocol_version == 0 || self.protocol_version > PROTOCOL_VERSION {
            return Err(ServerError::Config(format!(
                "protocol_version must be between 1 and {PROTOCOL_VERSION}"
            )));
        }
        self.replay_limit = self.replay_limit.max(1);
        self.max_events = self.max_events.max(MIN_RETAINED_EVENTS);
        self.rate_limit = self.rate_limit.bounded();
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_limits() {
        let config = ServerConfig::default();
        assert_eq!(config.replay_limit, 200);
        assert_eq!(config.max_events, 2000);
        assert_eq!(config.rate_limit.max_commands, 12);
        assert_eq!(config.rate_limit.window_ms, 5000);
    }

    #[test]
    fn toml_overrides_and_clamps() {
        let config = ServerConfig::from_toml_str(
            r#"
            replay_limit = 50
            max_events = 3

            [rate_limit]
            max_commands = 0
            window_ms = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.replay_limit, 50);
        assert_eq!(config.max_events, MIN_RETAINED_EVENTS);
        assert_eq!(config.rate_limit.max_commands, 1);
        assert_eq!(config.rate_limit.window_ms, MIN_RATE_WINDOW_MS);
        assert_eq!(config.scene_id, "cozy_office_v0");
    }

    #[test]
    fn future_protocol_version_is_rejected() {
        assert!(ServerConfig::from_toml_str("protocol_version = 2").is_err());
    }
}
