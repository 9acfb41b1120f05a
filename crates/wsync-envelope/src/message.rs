//! Typed message kinds and their payloads
//!
//! Payload structs ignore unknown fields so peers can extend them; required
//! fields are enforced by the schema step in [`crate::codec`].

use crate::error_code::ErrorCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use wsync_lifecycle::{Vec3, WorldSnapshot};

/// Envelope `type` discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Hello,
    HelloAck,
    Subscribe,
    Snapshot,
    Event,
    AgentGoal,
    Chat,
    Command,
    Ack,
    Error,
    Ping,
    Pong,
}

impl MessageType {
    /// Every message type
    pub const ALL: &'static [Self] = &[
        Self::Hello,
        Self::HelloAck,
        Self::Subscribe,
        Self::Snapshot,
        Self::Event,
        Self::AgentGoal,
        Self::Chat,
        Self::Command,
        Self::Ack,
        Self::Error,
        Self::Ping,
        Self::Pong,
    ];

    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hello => "hello",
            Self::HelloAck => "hello_ack",
            Self::Subscribe => "subscribe",
            Self::Snapshot => "snapshot",
            Self::Event => "event",
            Self::AgentGoal => "agent_goal",
            Self::Chat => "chat",
            Self::Command => "command",
            Self::Ack => "ack",
            Self::Error => "error",
            Self::Ping => "ping",
            Self::Pong => "pong",
        }
    }

    /// Short prefix used for generated envelope ids
    #[must_use]
    pub(crate) const fn id_prefix(self) -> &'static str {
        match self {
            Self::Hello => "hello",
            Self::HelloAck => "helloack",
            Self::Subscribe => "sub",
            Self::Snapshot => "snap",
            Self::Event => "evt",
            Self::AgentGoal => "goal",
            Self::Chat => "chat",
            Self::Command => "cmd",
            Self::Ack => "ack",
            Self::Error => "err",
            Self::Ping => "ping",
            Self::Pong => "pong",
        }
    }

    /// Answers a command (`ack` or `error`)
    #[inline]
    #[must_use]
    pub const fn is_terminal_response(self) -> bool {
        matches!(self, Self::Ack | Self::Error)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown message type: {s}"))
    }
}

/// Client identity sent in `hello`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientIdentity {
    pub name: String,
    pub build: String,
    pub platform: String,
}

impl ClientIdentity {
    /// Create identity
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        build: impl Into<String>,
        platform: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            build: build.into(),
            platform: platform.into(),
        }
    }
}

/// Resume cursor as carried in `hello`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloResume {
    #[serde(default)]
    pub last_seq: Option<i64>,
    #[serde(default)]
    pub last_snapshot_id: Option<String>,
    #[serde(default)]
    pub scene_id: String,
}

/// `hello` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloPayload {
    pub client: ClientIdentity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume: Option<HelloResume>,
}

/// Outcome of resume evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeStatus {
    /// Replay follows from `replay_from_seq`
    Resumed,
    /// Cursor discarded; the snapshot carries full state and no replay follows
    Fresh,
}

/// Why the server could not resume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FallbackReason {
    /// Cursor absent, negative or ahead of the timeline
    CursorUnknown,
    /// Cursor older than the retained window or too far behind
    CursorStale,
    /// Timeline is empty
    ServerRestarted,
}

impl FallbackReason {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CursorUnknown => "CURSOR_UNKNOWN",
            Self::CursorStale => "CURSOR_STALE",
            Self::ServerRestarted => "SERVER_RESTARTED",
        }
    }
}

/// Resume decision carried in `hello_ack`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeDecision {
    pub status: ResumeStatus,
    #[serde(default)]
    pub reason: Option<FallbackReason>,
    #[serde(default)]
    pub replay_from_seq: Option<u64>,
}

impl ResumeDecision {
    /// Replay from `last_seq + 1`
    #[must_use]
    pub fn resumed(replay_from_seq: u64) -> Self {
        Self {
            status: ResumeStatus::Resumed,
            reason: None,
            replay_from_seq: Some(replay_from_seq),
        }
    }

    /// Start over from a full snapshot
    #[must_use]
    pub fn fresh(reason: FallbackReason) -> Self {
        Self {
            status: ResumeStatus::Fresh,
            reason: Some(reason),
            replay_from_seq: None,
        }
    }

    /// Check if a replay follows
    #[inline]
    #[must_use]
    pub fn is_resumed(&self) -> bool {
        self.status == ResumeStatus::Resumed
    }
}

/// `hello_ack` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloAckPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_v: Option<u32>,
    pub resume: ResumeDecision,
}

/// Channel selection in `subscribe`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channels {
    #[serde(default)]
    pub events: bool,
    #[serde(default)]
    pub snapshots: bool,
    #[serde(default)]
    pub goals: bool,
    #[serde(default)]
    pub chat: bool,
}

impl Channels {
    /// Every channel enabled
    #[must_use]
    pub const fn all() -> Self {
        Self {
            events: true,
            snapshots: true,
            goals: true,
            chat: true,
        }
    }
}

/// `subscribe` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribePayload {
    pub scene_id: String,
    pub channels: Channels,
}

/// `event` payload, one world event on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    pub seq: u64,
    pub name: String,
    pub project_id: String,
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
}

/// Movement goal for one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentGoal {
    pub goal_id: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Vec3>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_mps: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrival_radius: Option<f64>,
}

/// `agent_goal` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentGoalPayload {
    pub agent_id: String,
    pub goal: AgentGoal,
}

/// `chat` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPayload {
    pub from: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

/// `command` payload; `data` is checked against the catalog separately
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandPayload {
    pub name: String,
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

/// `ack` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckPayload {
    pub in_reply_to: String,
    pub status: String,
}

impl AckPayload {
    /// Successful ack for a command id
    #[must_use]
    pub fn ok(in_reply_to: impl Into<String>) -> Self {
        Self {
            in_reply_to: in_reply_to.into(),
            status: "ok".to_string(),
        }
    }
}

/// `error` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub in_reply_to: String,
    pub code: ErrorCode,
    pub message: String,
}

/// `ping`/`pong` payload
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NoncePayload {
    pub nonce: String,
}

/// Decoded message, one variant per envelope type
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Hello(HelloPayload),
    HelloAck(HelloAckPayload),
    Subscribe(SubscribePayload),
    Snapshot(WorldSnapshot),
    Event(EventPayload),
    AgentGoal(AgentGoalPayload),
    Chat(ChatPayload),
    Command(CommandPayload),
    Ack(AckPayload),
    Error(ErrorPayload),
    Ping(NoncePayload),
    Pong(NoncePayload),
}

impl Message {
    /// Envelope type for this message
    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        match self {
            Self::Hello(_) => MessageType::Hello,
            Self::HelloAck(_) => MessageType::HelloAck,
            Self::Subscribe(_) => MessageType::Subscribe,
            Self::Snapshot(_) => MessageType::Snapshot,
            Self::Event(_) => MessageType::Event,
            Self::AgentGoal(_) => MessageType::AgentGoal,
            Self::Chat(_) => MessageType::Chat,
            Self::Command(_) => MessageType::Command,
            Self::Ack(_) => MessageType::Ack,
            Self::Error(_) => MessageType::Error,
            Self::Ping(_) => MessageType::Ping,
            Self::Pong(_) => MessageType::Pong,
        }
    }

    /// Build the typed variant for `kind` from a raw payload
    pub fn from_parts(kind: MessageType, payload: Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            MessageType::Hello => Self::Hello(serde_json::from_value(payload)?),
            MessageType::HelloAck => Self::HelloAck(serde_json::from_value(payload)?),
            MessageType::Subscribe => Self::Subscribe(serde_json::from_value(payload)?),
            MessageType::Snapshot => Self::Snapshot(serde_json::from_value(payload)?),
            MessageType::Event => Self::Event(serde_json::from_value(payload)?),
            MessageType::AgentGoal => Self::AgentGoal(serde_json::from_value(payload)?),
            MessageType::Chat => Self::Chat(serde_json::from_value(payload)?),
            MessageType::Command => Self::Command(serde_json::from_value(payload)?),
            MessageType::Ack => Self::Ack(serde_json::from_value(payload)?),
            MessageType::Error => Self::Error(serde_json::from_value(payload)?),
            MessageType::Ping => Self::Ping(serde_json::from_value(payload)?),
            MessageType::Pong => Self::Pong(serde_json::from_value(payload)?),
        })
    }

    /// Serialize the payload alone
    pub fn payload_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::Hello(p) => serde_json::to_value(p),
            Self::HelloAck(p) => serde_json::to_value(p),
            Self::Subscribe(p) => serde_json::to_value(p),
            Self::Snapshot(p) => serde_json::to_value(p),
            Self::Event(p) => serde_json::to_value(p),
            Self::AgentGoal(p) => serde_json::to_value(p),
            Self::Chat(p) => serde_json::to_value(p),
            Self::Command(p) => serde_json::to_value(p),
            Self::Ack(p) => serde_json::to_value(p),
            Self::Error(p) => serde_json::to_value(p),
            Self::Ping(p) | Self::Pong(p) => serde_json::to_value(p),
        }
    }

    /// Command id this message answers, for `ack`/`error`
    #[must_use]
    pub fn in_reply_to(&self) -> Option<&str> {
        match self {
            Self::Ack(p) => Some(&p.in_reply_to),
            Self::Error(p) => Some(&p.in_reply_to),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_wire_names_round_trip() {
        for kind in MessageType::ALL {
            assert_eq!(kind.as_str().parse::<MessageType>().unwrap(), *kind);
            assert_eq!(serde_json::to_value(kind).unwrap(), kind.as_str());
        }
    }

    #[test]
    fn fresh_decision_serializes_reason() {
        let decision = ResumeDecision::fresh(FallbackReason::CursorStale);
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["status"], "fresh");
        assert_eq!(json["reason"], "CURSOR_STALE");
        assert!(json["replay_from_seq"].is_null());
    }

    #[test]
    fn event_payload_ignores_unknown_fields() {
        let payload = serde_json::json!({
            "seq": 4,
            "name": "task_started",
            "project_id": "proj_alpha",
            "participants": ["agent_bd"],
            "extra": true
        });
        let msg = Message::from_parts(MessageType::Event, payload).unwrap();
        match msg {
            Message::Event(event) => assert_eq!(event.seq, 4),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn only_ack_and_error_answer_commands() {
        let ack = Message::Ack(AckPayload::ok("cmd_1"));
        assert_eq!(ack.in_reply_to(), Some("cmd_1"));
        assert!(ack.message_type().is_terminal_response());
        assert!(!MessageType::Pong.is_terminal_response());
    }
}
