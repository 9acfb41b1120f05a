//! Stored rows that are not lifecycle entities, plus read models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use wsync_envelope::{ErrorCode, EventPayload};
use wsync_lifecycle::{Artifact, ArtifactStatus, ContentRef};

/// Immutable world event with a per-project sequence number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldEvent {
    /// `{project_id}:{seq}` unless supplied
    pub id: String,
    pub project_id: String,
    pub seq: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
    pub ts: DateTime<Utc>,
}

impl WorldEvent {
    /// Wire form carrying `wire_seq` instead of the per-project seq
    #[must_use]
    pub fn to_payload(&self, wire_seq: u64) -> EventPayload {
        EventPayload {
            seq: wire_seq,
            name: self.name.clone(),
            project_id: self.project_id.clone(),
            task_id: self.task_id.clone(),
            decision_id: self.decision_id.clone(),
            artifact_id: self.artifact_id.clone(),
            agent_id: self.agent_id.clone(),
            participants: self.participants.clone(),
            meta: self.meta.clone(),
        }
    }
}

/// Event to append; `seq` and `id` are assigned unless given
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewEvent {
    pub project_id: String,
    pub name: String,
    pub seq: Option<u64>,
    pub id: Option<String>,
    pub task_id: Option<String>,
    pub decision_id: Option<String>,
    pub artifact_id: Option<String>,
    pub agent_id: Option<String>,
    pub participants: Vec<String>,
    pub meta: Map<String, Value>,
}

impl NewEvent {
    /// Event named `name` in `project_id`
    #[must_use]
    pub fn new(project_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    #[must_use]
    pub fn decision(mut self, decision_id: impl Into<String>) -> Self {
        self.decision_id = Some(decision_id.into());
        self
    }

    #[must_use]
    pub fn artifact(mut self, artifact_id: impl Into<String>) -> Self {
        self.artifact_id = Some(artifact_id.into());
        self
    }

    /// Attach an agent; it also becomes a participant
    #[must_use]
    pub fn agent(mut self, agent_id: Option<String>) -> Self {
        if let Some(agent_id) = agent_id {
            if !self.participants.contains(&agent_id) {
                self.participants.push(agent_id.clone());
            }
            self.agent_id = Some(agent_id);
        }
        self
    }

    #[must_use]
    pub fn meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.meta.insert(key.to_string(), value.into());
        self
    }
}

/// Outcome stored with a command receipt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReceiptOutcome {
    Ack,
    Error { code: ErrorCode, message: String },
}

/// Record of a processed command, keyed by `(project_id, idempotency_key)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandReceipt {
    pub project_id: String,
    pub idempotency_key: String,
    pub command_id: String,
    pub command_name: String,
    pub outcome: ReceiptOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_ts: Option<DateTime<Utc>>,
}

impl CommandReceipt {
    /// Table key
    #[must_use]
    pub fn key(&self) -> String {
        receipt_key(&self.project_id, &self.idempotency_key)
    }
}

pub(crate) fn receipt_key(project_id: &str, idempotency_key: &str) -> String {
    format!("{project_id}::{idempotency_key}")
}

/// Result of recording a receipt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedReceipt {
    /// False when a receipt already existed; `row` is then the original
    pub created: bool,
    pub row: CommandReceipt,
}

/// Input for deriving the next version of an artifact
#[derive(Debug, Clone, PartialEq)]
pub struct RevisionRequest {
    pub parent_artifact_id: String,
    pub artifact_id: String,
    pub status: ArtifactStatus,
    pub content_ref: Option<ContentRef>,
    pub metadata: Map<String, Value>,
}

impl RevisionRequest {
    /// New revision in `created` status
    #[must_use]
    pub fn new(parent_artifact_id: impl Into<String>, artifact_id: impl Into<String>) -> Self {
        Self {
            parent_artifact_id: parent_artifact_id.into(),
            artifact_id: artifact_id.into(),
            status: ArtifactStatus::Created,
            content_ref: None,
            metadata: Map::new(),
        }
    }

    #[must_use]
    pub fn with_content(mut self, content_ref: ContentRef) -> Self {
        self.content_ref = Some(content_ref);
        self
    }
}

/// Content pointer for one artifact version
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentReference {
    pub artifact_id: String,
    pub version: u32,
    pub status: ArtifactStatus,
    pub content_ref: Option<ContentRef>,
    pub metadata: Map<String, Value>,
}

/// Everything an artifact viewer needs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewerRecord {
    pub artifact: Artifact,
    pub version_history: Vec<Artifact>,
    pub content_reference: ContentReference,
}

/// Viewer record plus every event touching the chain
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditTrail {
    #[serde(flatten)]
    pub viewer: ViewerRecord,
    pub audit_events: Vec<WorldEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_becomes_participant_once() {
        let event = NewEvent::new("proj_a", "task_started")
            .agent(Some("agent_bd".to_string()))
            .agent(Some("agent_bd".to_string()));
        assert_eq!(event.participants, vec!["agent_bd".to_string()]);
    }

    #[test]
    fn receipt_key_joins_scope_and_key() {
        assert_eq!(receipt_key("proj_a", "k1"), "proj_a::k1");
    }
}
