//! Envelope record and typed constructors

use crate::error_code::ErrorCode;
use crate::message::{
    AckPayload, ClientIdentity, CommandPayload, ErrorPayload, EventPayload, HelloAckPayload,
    HelloPayload, HelloResume, Message, MessageType, NoncePayload, ResumeDecision,
    SubscribePayload, Channels,
};
use serde_json::{Map, Value};
use uuid::Uuid;
use wsync_lifecycle::WorldSnapshot;

/// Highest protocol version this codec speaks
pub const PROTOCOL_VERSION: u32 = 1;

/// Current time in epoch milliseconds
#[inline]
#[must_use]
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Fresh envelope id for a message type, e.g. `cmd_5f0c...`
#[must_use]
pub fn new_envelope_id(kind: MessageType) -> String {
    format!("{}_{}", kind.id_prefix(), Uuid::new_v4().simple())
}

/// One wire message
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Unique per envelope
    pub id: String,
    /// Emission time, epoch milliseconds
    pub ts: i64,
    /// Protocol version
    pub v: u32,
    /// Typed payload
    pub message: Message,
}

impl Envelope {
    /// Wrap a message with a fresh id and the current time
    #[must_use]
    pub fn new(message: Message) -> Self {
        Self {
            id: new_envelope_id(message.message_type()),
            ts: now_ms(),
            v: PROTOCOL_VERSION,
            message,
        }
    }

    /// With explicit id
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// With explicit timestamp
    #[must_use]
    pub fn with_ts(mut self, ts: i64) -> Self {
        self.ts = ts;
        self
    }

    /// Envelope type
    #[inline]
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        self.message.message_type()
    }

    /// Command id answered by this envelope, for `ack`/`error`
    #[inline]
    #[must_use]
    pub fn in_reply_to(&self) -> Option<&str> {
        self.message.in_reply_to()
    }

    pub fn hello(client: ClientIdentity, resume: HelloResume) -> Self {
        Self::new(Message::Hello(HelloPayload {
            client,
            resume: Some(resume),
        }))
    }

    pub fn hello_ack(session_id: impl Into<String>, resume: ResumeDecision) -> Self {
        Self::new(Message::HelloAck(HelloAckPayload {
            session_id: Some(session_id.into()),
            protocol_v: Some(PROTOCOL_VERSION),
            resume,
        }))
    }

    pub fn subscribe(scene_id: impl Into<String>, channels: Channels) -> Self {
        Self::new(Message::Subscribe(SubscribePayload {
            scene_id: scene_id.into(),
            channels,
        }))
    }

    pub fn snapshot(snapshot: WorldSnapshot) -> Self {
        Self::new(Message::Snapshot(snapshot))
    }

    pub fn event(event: EventPayload) -> Self {
        Self::new(Message::Event(event))
    }

    /// Command envelope; the envelope id is the command id
    pub fn command(name: impl Into<String>, data: Map<String, Value>) -> Self {
        Self::new(Message::Command(CommandPayload {
            name: name.into(),
            data,
            idempotency_key: None,
        }))
    }

    pub fn ack(in_reply_to: impl Into<String>) -> Self {
        Self::new(Message::Ack(AckPayload::ok(in_reply_to)))
    }

    pub fn error(in_reply_to: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(Message::Error(ErrorPayload {
            in_reply_to: in_reply_to.into(),
            code,
            message: message.into(),
        }))
    }

    pub fn ping(nonce: impl Into<String>) -> Self {
        Self::new(Message::Ping(NoncePayload {
            nonce: nonce.into(),
        }))
    }

    pub fn pong(nonce: impl Into<String>) -> Self {
        Self::new(Message::Pong(NoncePayload {
            nonce: nonce.into(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_type_prefix() {
        let env = Envelope::command("approve_artifact", Map::new());
        assert!(env.id.starts_with("cmd_"));
        assert_eq!(env.v, PROTOCOL_VERSION);
    }

    #[test]
    fn ids_are_unique() {
        let a = Envelope::ping("n");
        let b = Envelope::ping("n");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn error_answers_command() {
        let env = Envelope::error("cmd_1", ErrorCode::NotFound, "task missing");
        assert_eq!(env.in_reply_to(), Some("cmd_1"));
    }
}
