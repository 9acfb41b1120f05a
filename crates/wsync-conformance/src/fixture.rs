//! Fixture documents
//!
//! One JSON file per fixture. Messages are kept as raw values so a fixture
//! can carry envelopes the codec is expected to reject.

use crate::error::ConformanceError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use wsync_lifecycle::EntityKind;

/// Expected heartbeat cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatPolicy {
    pub ping_interval_ms: u64,
    pub timeout_ms: u64,
}

/// Raw frame and the class its decode must fail with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorClassCase {
    pub name: String,
    /// Envelope as JSON; ignored when `raw` is set
    #[serde(default)]
    pub message: Value,
    /// Frame text sent as-is, for input that is not JSON at all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    pub expected_error_class: String,
}

impl ErrorClassCase {
    /// Frame text under test
    #[must_use]
    pub fn frame(&self) -> String {
        self.raw.clone().unwrap_or_else(|| self.message.to_string())
    }
}

/// Status path and whether it is legal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionCase {
    pub entity: EntityKind,
    pub sequence: Vec<String>,
    pub valid: bool,
}

/// What a fixture asserts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum FixtureBody {
    /// `hello` → `hello_ack`, and an incompatible `hello` → `error`
    Handshake {
        success: Vec<Value>,
        incompatible: Vec<Value>,
    },
    /// `subscribe` answered by a consistent snapshot before any event
    InitialSnapshot { messages: Vec<Value> },
    /// Resumed hello followed by a gap-free replay
    ReconnectResync { messages: Vec<Value> },
    Heartbeat {
        policy: HeartbeatPolicy,
        messages: Vec<Value>,
    },
    /// Exactly one terminal response per command id
    Correlation { messages: Vec<Value> },
    FlowEventOrder {
        messages: Vec<Value>,
        expected_events: Vec<String>,
    },
    EnvelopeErrors { cases: Vec<ErrorClassCase> },
    TransitionSequences { cases: Vec<TransitionCase> },
}

impl FixtureBody {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Handshake { .. } => "handshake",
            Self::InitialSnapshot { .. } => "initial_snapshot",
            Self::ReconnectResync { .. } => "reconnect_resync",
            Self::Heartbeat { .. } => "heartbeat",
            Self::Correlation { .. } => "correlation",
            Self::FlowEventOrder { .. } => "flow_event_order",
            Self::EnvelopeErrors { .. } => "envelope_errors",
            Self::TransitionSequences { .. } => "transition_sequences",
        }
    }
}

/// Named fixture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    pub name: String,
    #[serde(flatten)]
    pub body: FixtureBody,
}

impl Fixture {
    pub fn new(name: impl Into<String>, body: FixtureBody) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }
}

/// Load every `*.json` fixture in `dir`, sorted by file name
pub fn load_fixtures(dir: impl AsRef<Path>) -> Result<Vec<Fixture>, ConformanceError> {
    let dir = dir.as_ref();
    let entries = std::fs::read_dir(dir).map_err(|e| ConformanceError::io(dir, &e))?;
    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| ConformanceError::io(dir, &e))?.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut fixtures = Vec::with_capacity(paths.len());
    for path in paths {
        let text = std::fs::read_to_string(&path).map_err(|e| ConformanceError::io(&path, &e))?;
        let fixture: Fixture =
            serde_json::from_str(&text).map_err(|e| ConformanceError::Fixture {
                path: path.clone(),
                message: e.to_string(),
            })?;
        tracing::debug!(path = %path.display(), name = %fixture.name, "fixture loaded");
        fixtures.push(fixture);
    }
    Ok(fixtures)
}

/// Write fixtures as `{name}.json` into `dir`, creating it if needed
pub fn write_fixtures(dir: impl AsRef<Path>, fixtures: &[Fixture]) -> Result<Vec<PathBuf>, ConformanceError> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir).map_err(|e| ConformanceError::io(dir, &e))?;
    let mut written = Vec::with_capacity(fixtures.len());
    for fixture in fixtures {
        let path = dir.join(format!("{}.json", fixture.name));
        let text = serde_json::to_string_pretty(fixture).map_err(|e| ConformanceError::Fixture {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, text).map_err(|e| ConformanceError::io(&path, &e))?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn check_tag_selects_the_body() {
        let fixture: Fixture = serde_json::from_value(json!({
            "name": "task_paths",
            "check": "transition_sequences",
            "cases": [{"entity": "task", "sequence": ["planned", "in_progress"], "valid": true}]
        }))
        .unwrap();
        assert_eq!(fixture.body.kind(), "transition_sequences");
    }

    #[test]
    fn raw_frame_wins_over_message() {
        let case = ErrorClassCase {
            name: "garbage".to_string(),
            message: json!({"type": "ping"}),
            raw: Some("{oops".to_string()),
            expected_error_class: "ERR_INVALID_JSON".to_string(),
        };
        assert_eq!(case.frame(), "{oops");
    }
}
