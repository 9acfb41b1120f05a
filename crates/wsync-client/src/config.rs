//! Client configuration

use crate::backoff::BackoffConfig;
use crate::error::ClientError;
use crate::world_view::MidStreamSnapshotPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use wsync_envelope::{Channels, ClientIdentity};

/// wsync client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server address handed to the connector
    pub url: String,
    /// Scene named in `hello` and `subscribe`
    pub scene_id: String,
    /// Identity sent in `hello`
    pub client: ClientIdentity,
    /// Channels requested on subscribe
    pub channels: Channels,
    /// Ping period
    pub heartbeat_interval_ms: u64,
    /// Pong deadline after a ping
    pub heartbeat_timeout_ms: u64,
    /// Reconnect delay schedule
    pub backoff: BackoffConfig,
    /// Handling of snapshots outside a subscribe
    pub mid_stream_snapshot: MidStreamSnapshotPolicy,
    /// Recent events kept by the world view
    pub event_history: usize,
    /// Fixed seed for backoff jitter; entropy when absent
    pub rng_seed: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8787/ws".to_string(),
            scene_id: "cozy_office_v0".to_string(),
            client: ClientIdentity::new("wsync-client", env!("CARGO_PKG_VERSION"), std::env::consts::OS),
            channels: Channels::all(),
            heartbeat_interval_ms: 15_000,
            heartbeat_timeout_ms: 45_000,
            backoff: BackoffConfig::default(),
            mid_stream_snapshot: MidStreamSnapshotPolicy::default(),
            event_history: 500,
            rng_seed: None,
        }
    }
}

impl ClientConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With server address
    #[inline]
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// With scene id
    #[inline]
    #[must_use]
    pub fn with_scene_id(mut self, scene_id: impl Into<String>) -> Self {
        self.scene_id = scene_id.into();
        self
    }

    /// With client identity
    #[inline]
    #[must_use]
    pub fn with_client(mut self, client: ClientIdentity) -> Self {
        self.client = client;
        self
    }

    /// With heartbeat period and pong deadline
    #[inline]
    #[must_use]
    pub fn with_heartbeat(mut self, interval: Duration, timeout: Duration) -> Self {
        self.heartbeat_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self.heartbeat_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With reconnect backoff
    #[inline]
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// With mid-stream snapshot policy
    #[inline]
    #[must_use]
    pub fn with_mid_stream_snapshot(mut self, policy: MidStreamSnapshotPolicy) -> Self {
        self.mid_stream_snapshot = policy;
        self
    }

    /// With deterministic jitter
    #[inline]
    #[must_use]
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Ping period as a duration
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Pong deadline as a duration
    #[must_use]
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// Parse from TOML; missing keys take defaults
    pub fn from_toml_str(text: &str) -> Result<Self, ClientError> {
        let config: Self = toml::from_str(text).map_err(|e| ClientError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Check invariants the state machine relies on
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.scene_id.trim().is_empty() {
            return Err(ClientError::Config("scene_id must not be empty".to_string()));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(ClientError::Config(
                "heartbeat_interval_ms must be positive".to_string(),
            ));
        }
        if self.heartbeat_timeout_ms < self.heartbeat_interval_ms {
            return Err(ClientError::Config(
                "heartbeat_timeout_ms must be at least heartbeat_interval_ms".to_string(),
            ));
        }
        let identity = &self.client;
        if [&identity.name, &identity.build, &identity.platform]
            .iter()
            .any(|field| field.trim().is_empty())
        {
            return Err(ClientError::Config(
                "client name, build and platform are required".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(15));
        assert_eq!(config.heartbeat_timeout(), Duration::from_secs(45));
    }

    #[test]
    fn toml_sets_policy_and_backoff() {
        let config = ClientConfig::from_toml_str(
            r#"
            scene_id = "lab"
            mid_stream_snapshot = "reject"

            [backoff]
            steps_ms = [100, 200]
            cap_ms = 400
            jitter_ms = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.scene_id, "lab");
        assert_eq!(config.mid_stream_snapshot, MidStreamSnapshotPolicy::Reject);
        assert_eq!(config.backoff.steps_ms, vec![100, 200]);
        assert!(config.channels.events);
    }

    #[test]
    fn timeout_shorter_than_interval_is_rejected() {
        let err = ClientConfig::from_toml_str("heartbeat_interval_ms = 10\nheartbeat_timeout_ms = 5")
            .unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }
}
