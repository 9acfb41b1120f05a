//! Per-connection message handling
//!
//! A session answers each inbound text frame with zero or more envelopes.
//! It holds no socket; `connection::run_connection` pumps frames through it.

use crate::metrics;
use crate::rate_limit::CommandRateLimiter;
use crate::server::WorldServer;
use std::sync::Arc;
use uuid::Uuid;
use wsync_envelope::{
    decode, now_ms, Channels, ClientIdentity, CodecError, CommandPayload, Envelope, ErrorCode,
    HelloAckPayload, HelloPayload, Message, MessageType, ResumeStatus, SubscribePayload,
};
use wsync_repository::{CommandOutcome, CommandRequest, ResumeEvaluation};

/// Reply target when the offending envelope id is unknown
pub const UNKNOWN_MESSAGE_ID: &str = "msg_unknown";

const INVALID_JSON: &str = "Message must be valid JSON.";
const HELLO_REQUIRED: &str = "hello is required before other message types.";
const HELLO_PAYLOAD: &str = "hello payload requires client.name, client.build, and client.platform.";
const SUBSCRIBE_PAYLOAD: &str = "subscribe payload requires scene_id and channels.";

/// State of one client connection
#[derive(Debug)]
pub struct WorldSession {
    server: Arc<WorldServer>,
    session_id: String,
    client: Option<ClientIdentity>,
    resume: Option<ResumeEvaluation>,
    scene_id: String,
    channels: Option<Channels>,
    last_delivered_seq: u64,
    limiter: CommandRateLimiter,
}

impl WorldSession {
    pub(crate) fn new(server: Arc<WorldServer>) -> Self {
        let config = server.config();
        let scene_id = config.scene_id.clone();
        let limiter = CommandRateLimiter::new(config.rate_limit);
        Self {
            server,
            session_id: format!("sess_{}", Uuid::new_v4().simple()),
            client: None,
            resume: None,
            scene_id,
            channels: None,
            last_delivered_seq: 0,
            limiter,
        }
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Client identity from `hello`
    #[must_use]
    pub fn client(&self) -> Option<&ClientIdentity> {
        self.client.as_ref()
    }

    /// Highest timeline seq sent to this client
    #[must_use]
    pub fn last_delivered_seq(&self) -> u64 {
        self.last_delivered_seq
    }

    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.channels.is_some()
    }

    /// Handle one inbound frame
    pub async fn handle_text(&mut self, text: &str) -> Vec<Envelope> {
        self.handle_text_at(text, now_ms()).await
    }

    /// Handle one inbound frame with an explicit clock for rate limiting
    pub async fn handle_text_at(&mut self, text: &str, now_ms: i64) -> Vec<Envelope> {
        match decode(text) {
            Ok(envelope) => self.handle_envelope(envelope, now_ms).await,
            Err(err) => vec![self.rejection(&err)],
        }
    }

    /// Handle one decoded envelope
    pub async fn handle_envelope(&mut self, envelope: Envelope, now_ms: i64) -> Vec<Envelope> {
        let kind = envelope.message_type();
        metrics::record_message(kind.as_str());
        tracing::debug!(
            session_id = %self.session_id,
            envelope_id = %envelope.id,
            r#type = kind.as_str(),
            "inbound"
        );

        if self.client.is_none() && kind != MessageType::Hello {
            return vec![error(&envelope.id, ErrorCode::ValidationFailed, HELLO_REQUIRED)];
        }

        match envelope.message {
            Message::Hello(payload) => vec![self.on_hello(&envelope.id, payload)],
            Message::Subscribe(payload) => self.on_subscribe(&envelope.id, payload),
            Message::Ping(payload) => vec![Envelope::pong(payload.nonce)],
            Message::Pong(_) => Vec::new(),
            Message::Command(payload) => self.on_command(envelope.id, payload, now_ms).await,
            _ => vec![error(
                &envelope.id,
                ErrorCode::NotAllowed,
                format!("Unsupported message type: {kind}"),
            )],
        }
    }

    /// Events appended since the last delivery, when subscribed to events
    pub fn poll_events(&mut self) -> Vec<Envelope> {
        if !self.channels.is_some_and(|c| c.events) {
            return Vec::new();
        }
        let events = self.server.timeline().read_since(self.last_delivered_seq);
        if let Some(last) = events.last() {
            self.last_delivered_seq = last.seq;
        }
        events.into_iter().map(Envelope::event).collect()
    }

    fn on_hello(&mut self, id: &str, payload: HelloPayload) -> Envelope {
        let client = payload.client;
        if [&client.name, &client.build, &client.platform]
            .iter()
            .any(|field| field.trim().is_empty())
        {
            return error(id, ErrorCode::ValidationFailed, HELLO_PAYLOAD);
        }

        let config = self.server.config();
        let last_seq = payload.resume.as_ref().and_then(|r| r.last_seq);
        if let Some(scene) = payload.resume.as_ref().map(|r| r.scene_id.trim()) {
            if !scene.is_empty() {
                self.scene_id = scene.to_string();
            }
        }
        let evaluation = self
            .server
            .timeline()
            .evaluate_resume(last_seq, config.replay_limit);
        let decision = evaluation.decision.clone();

        metrics::record_session_opened();
        metrics::record_resume(
            status_label(decision.status),
            decision.reason.map_or("none", |r| r.as_str()),
        );
        tracing::info!(
            session_id = %self.session_id,
            client = %client.name,
            build = %client.build,
            last_seq = ?last_seq,
            resumed = decision.is_resumed(),
            reason = ?decision.reason,
            "session hello"
        );

        self.client = Some(client);
        self.resume = Some(evaluation);
        Envelope::new(Message::HelloAck(HelloAckPayload {
            session_id: Some(self.session_id.clone()),
            protocol_v: Some(config.protocol_version),
            resume: decision,
        }))
    }

    fn on_subscribe(&mut self, id: &str, payload: SubscribePayload) -> Vec<Envelope> {
        if payload.scene_id.trim().is_empty() {
            return vec![error(id, ErrorCode::ValidationFailed, SUBSCRIBE_PAYLOAD)];
        }
        self.scene_id = payload.scene_id.trim().to_string();
        self.channels = Some(payload.channels);

        let (snapshot, covered_seq) = self.server.snapshot_with_seq(Some(self.scene_id.clone()));
        let mut out = vec![Envelope::snapshot(snapshot)];

        match self.resume.take().and_then(|r| r.cursor) {
            Some(cursor) => {
                self.last_delivered_seq = cursor;
                tracing::debug!(
                    session_id = %self.session_id,
                    replay_from_seq = cursor + 1,
                    "replaying after snapshot"
                );
            }
            None => self.last_delivered_seq = self.last_delivered_seq.max(covered_seq),
        }
        out.extend(self.poll_events());
        out
    }

    async fn on_command(
        &mut self,
        command_id: String,
        payload: CommandPayload,
        now_ms: i64,
    ) -> Vec<Envelope> {
        if let Err(retry_ms) = self.limiter.try_acquire(now_ms) {
            tracing::warn!(
                session_id = %self.session_id,
                command_id = %command_id,
                retry_ms,
                "command rate limited"
            );
            return vec![error(
                &command_id,
                ErrorCode::RateLimited,
                format!("Too many commands; retry in {retry_ms}ms."),
            )];
        }

        let mut request = CommandRequest::new(command_id.clone(), payload.name, payload.data);
        if let Some(key) = payload.idempotency_key.filter(|k| !k.trim().is_empty()) {
            request = request.with_idempotency_key(key);
        }
        let processed = self.server.submit(request).await;

        match processed.outcome {
            CommandOutcome::Ack => {
                let mut out = vec![Envelope::ack(command_id)];
                out.extend(self.poll_events());
                out
            }
            CommandOutcome::Rejected { code, message } => vec![error(&command_id, code, message)],
        }
    }

    fn rejection(&self, err: &CodecError) -> Envelope {
        tracing::warn!(
            session_id = %self.session_id,
            class = %err.class(),
            error = %err,
            "inbound envelope rejected"
        );
        let in_reply_to = err.envelope_id().unwrap_or(UNKNOWN_MESSAGE_ID);
        let message = match err {
            CodecError::InvalidJson(_) => INVALID_JSON.to_string(),
            CodecError::Payload {
                message_type: MessageType::Hello,
                ..
            } => HELLO_PAYLOAD.to_string(),
            CodecError::Payload {
                message_type: MessageType::Subscribe,
                ..
            } => SUBSCRIBE_PAYLOAD.to_string(),
            other => other.to_string(),
        };
        error(in_reply_to, err.error_code(), message)
    }
}

fn error(in_reply_to: &str, code: ErrorCode, message: impl Into<String>) -> Envelope {
    metrics::record_error(code.as_str());
    Envelope::error(in_reply_to, code, message)
}

fn status_label(status: ResumeStatus) -> &'static str {
    match status {
        ResumeStatus::Resumed => "resumed",
        ResumeStatus::Fresh => "fresh",
    }
}
