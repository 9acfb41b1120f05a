//! Sans-IO connection state machine
//!
//! Every input (transport open/close/error, inbound frame, timer, caller
//! request) returns a list of [`Action`]s for the driver to perform. The
//! machine never touches a socket or a clock of its own.

use crate::config::ClientConfig;
use crate::correlation::CommandCorrelator;
use crate::error::ProtocolViolation;
use crate::gateway::CommandResult;
use crate::heartbeat::{HeartbeatAction, HeartbeatMonitor};
use crate::pending::{PendingOperation, PendingOperations};
use crate::world_view::{EventDisposition, ResumeCursor, WorldView};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use wsync_envelope::{
    decode, AgentGoalPayload, ChatPayload, CommandPayload, Envelope, EventPayload, HelloResume,
    Message,
};
use wsync_lifecycle::WorldSnapshot;

/// Message attached to the stale status
pub const CONNECTION_LOST: &str = "Connection lost. Retrying automatically.";

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Not started
    Idle,
    /// Transport opening or handshake in flight
    Connecting,
    /// Handshake done; snapshot and events flow
    Connected,
    /// Connection lost; state kept but unreliable
    Stale,
    /// Waiting on the reconnect timer
    Reconnecting,
    /// Transport reported a failure
    Error,
    /// Stopped by the caller
    Disconnected,
}

impl ConnectionStatus {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Stale => "stale",
            Self::Reconnecting => "reconnecting",
            Self::Error => "error",
            Self::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status change reported to the embedder
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionUpdate {
    /// New status
    pub status: ConnectionStatus,
    /// Reconnects since the last successful connect
    pub reconnect_attempt: u32,
    /// Error text shown with the status
    pub error: Option<String>,
}

/// Everything the embedder observes
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Connection status changed
    Status(ConnectionUpdate),
    /// Full world state replaced
    Snapshot {
        snapshot_id: String,
        snapshot: WorldSnapshot,
    },
    /// Event applied in seq order
    Event(EventPayload),
    /// Terminal response to a sent command
    CommandResult(CommandResult),
    /// Server broke the protocol
    Violation(ProtocolViolation),
    /// Agent goal broadcast
    AgentGoal(AgentGoalPayload),
    /// Chat broadcast
    Chat(ChatPayload),
}

/// Side effect requested from the driver
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Dial the server
    OpenTransport,
    /// Close without reporting back; the machine already moved on
    CloseTransport,
    /// Write one frame
    Send(Envelope),
    /// Call back with `generation` after `delay`
    ScheduleReconnect {
        generation: u64,
        delay: Duration,
    },
    /// Drop any armed reconnect timer
    CancelReconnect,
    /// Report to the embedder
    Emit(ClientEvent),
}

/// Connection state for one session
#[derive(Debug)]
pub struct ConnectionMachine {
    config: ClientConfig,
    status: ConnectionStatus,
    stopped: bool,
    transport_open: bool,
    reconnect_attempt: u32,
    generation: u64,
    timer_pending: bool,
    hello_id: Option<String>,
    heartbeat: HeartbeatMonitor,
    correlator: CommandCorrelator,
    pending: PendingOperations,
    world: WorldView,
    rng: StdRng,
}

impl ConnectionMachine {
    /// Idle machine; the rng is seeded from config when set
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let heartbeat = HeartbeatMonitor::new(config.heartbeat_interval(), config.heartbeat_timeout());
        let world = WorldView::new(config.mid_stream_snapshot, config.event_history);
        Self {
            config,
            status: ConnectionStatus::Idle,
            stopped: true,
            transport_open: false,
            reconnect_attempt: 0,
            generation: 0,
            timer_pending: false,
            hello_id: None,
            heartbeat,
            correlator: CommandCorrelator::new(),
            pending: PendingOperations::new(),
            world,
            rng,
        }
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Reconnects since the last successful connect
    #[must_use]
    pub fn reconnect_attempt(&self) -> u32 {
        self.reconnect_attempt
    }

    /// Generation of the live reconnect timer
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Client-side world state
    #[must_use]
    pub fn world(&self) -> &WorldView {
        &self.world
    }

    /// Resume position sent on the next hello
    #[must_use]
    pub fn cursor(&self) -> &ResumeCursor {
        self.world.cursor()
    }

    /// Outstanding command tracking
    #[must_use]
    pub fn correlator(&self) -> &CommandCorrelator {
        &self.correlator
    }

    /// Optimistic changes awaiting a response
    #[must_use]
    pub fn pending(&self) -> &PendingOperations {
        &self.pending
    }

    /// Assignee including optimistic changes not yet acknowledged
    #[must_use]
    pub fn effective_assignee(&self, task_id: &str) -> Option<String> {
        self.pending
            .assignee_for(task_id)
            .or_else(|| self.world.task_assignee(task_id))
            .map(str::to_string)
    }

    /// When the driver should call [`Self::on_heartbeat`]
    #[must_use]
    pub fn next_heartbeat_deadline(&self) -> Option<Instant> {
        self.heartbeat.next_deadline()
    }

    /// Begin connecting; ignored while already running
    pub fn start(&mut self) -> Vec<Action> {
        if !self.stopped {
            return Vec::new();
        }
        self.stopped = false;
        self.reconnect_attempt = 0;
        vec![self.set_status(ConnectionStatus::Connecting, None), Action::OpenTransport]
    }

    /// Stop for good; repeated calls are no-ops
    pub fn stop(&mut self) -> Vec<Action> {
        if self.stopped {
            return Vec::new();
        }
        self.stopped = true;
        let mut actions = Vec::new();
        if self.timer_pending {
            self.timer_pending = false;
            self.generation += 1;
            actions.push(Action::CancelReconnect);
        }
        if self.transport_open {
            self.transport_open = false;
            actions.push(Action::CloseTransport);
        }
        self.heartbeat.disarm();
        self.hello_id = None;
        self.reconnect_attempt = 0;
        actions.push(self.set_status(ConnectionStatus::Disconnected, None));
        actions
    }

    /// Transport is up: send `hello` with the resume cursor
    pub fn on_transport_open(&mut self) -> Vec<Action> {
        if self.stopped {
            return vec![Action::CloseTransport];
        }
        self.transport_open = true;
        let cursor = self.world.cursor();
        let resume = HelloResume {
            last_seq: cursor.last_seq.and_then(|seq| i64::try_from(seq).ok()),
            last_snapshot_id: cursor.last_snapshot_id.clone(),
            scene_id: self.config.scene_id.clone(),
        };
        let hello = Envelope::hello(self.config.client.clone(), resume);
        tracing::debug!(hello_id = %hello.id, last_seq = ?cursor.last_seq, "transport open, sending hello");
        self.hello_id = Some(hello.id.clone());
        vec![Action::Send(hello)]
    }

    /// Transport failed; the close that follows schedules the reconnect
    pub fn on_transport_error(&mut self, message: impl Into<String>) -> Vec<Action> {
        let message = message.into();
        tracing::error!(error = %message, attempt = self.reconnect_attempt, "transport error");
        if self.stopped {
            return Vec::new();
        }
        vec![self.set_status(ConnectionStatus::Error, Some(message))]
    }

    /// Transport went away without a local stop
    pub fn on_transport_closed(&mut self) -> Vec<Action> {
        self.transport_open = false;
        self.heartbeat.disarm();
        self.hello_id = None;
        if self.stopped {
            return Vec::new();
        }
        self.world.mark_stale();
        let mut actions = vec![self.set_status(ConnectionStatus::Stale, Some(CONNECTION_LOST.to_string()))];

        self.reconnect_attempt += 1;
        self.generation += 1;
        self.timer_pending = true;
        let delay = self.config.backoff.delay(self.reconnect_attempt, &mut self.rng);
        tracing::info!(
            attempt = self.reconnect_attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "reconnect scheduled"
        );
        actions.push(self.set_status(ConnectionStatus::Reconnecting, None));
        actions.push(Action::ScheduleReconnect {
            generation: self.generation,
            delay,
        });
        actions
    }

    /// Reconnect timer fired; stale generations are ignored
    pub fn on_reconnect_timer(&mut self, generation: u64) -> Vec<Action> {
        if self.stopped || !self.timer_pending || generation != self.generation {
            tracing::debug!(generation, current = self.generation, "ignoring stale reconnect timer");
            return Vec::new();
        }
        self.timer_pending = false;
        vec![Action::OpenTransport]
    }

    /// Heartbeat deadline reached
    pub fn on_heartbeat(&mut self, now: Instant) -> Vec<Action> {
        match self.heartbeat.poll(now) {
            HeartbeatAction::Idle => Vec::new(),
            HeartbeatAction::SendPing(nonce) => vec![Action::Send(Envelope::ping(nonce))],
            HeartbeatAction::TimedOut(violation) => {
                tracing::warn!(%violation, "heartbeat timed out, dropping connection");
                let mut actions = vec![Action::Emit(ClientEvent::Violation(violation))];
                if self.transport_open {
                    actions.push(Action::CloseTransport);
                }
                actions.extend(self.on_transport_closed());
                actions
            }
        }
    }

    /// Send a catalog command; `None` unless connected
    pub fn send_command(
        &mut self,
        name: &str,
        data: Map<String, Value>,
        idempotency_key: Option<String>,
    ) -> (Option<String>, Vec<Action>) {
        if self.status != ConnectionStatus::Connected || !self.transport_open {
            tracing::debug!(command = name, status = %self.status, "command not sent");
            return (None, Vec::new());
        }
        let operation = PendingOperation::for_command(name, &data);
        let envelope = Envelope::new(Message::Command(CommandPayload {
            name: name.to_string(),
            data,
            idempotency_key,
        }));
        let command_id = envelope.id.clone();
        self.correlator.register(command_id.clone(), name);
        if let Some(operation) = operation {
            self.pending.track(command_id.clone(), operation);
        }
        tracing::debug!(command_id = %command_id, command = name, "command sent");
        (Some(command_id), vec![Action::Send(envelope)])
    }

    /// Handle one inbound frame
    pub fn on_frame(&mut self, text: &str, now: Instant) -> Vec<Action> {
        let envelope = match decode(text) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::warn!(class = %err.class(), error = %err, "dropping malformed frame");
                return vec![violation(ProtocolViolation::Malformed {
                    class: err.class(),
                    message: err.to_string(),
                })];
            }
        };
        tracing::debug!(envelope_id = %envelope.id, r#type = %envelope.message_type(), "inbound");

        let Envelope { id, message, .. } = envelope;
        match message {
            Message::HelloAck(ack) => {
                self.world.on_resume_decision(&ack.resume);
                self.reconnect_attempt = 0;
                self.heartbeat.arm(now);
                tracing::info!(
                    session_id = ?ack.session_id,
                    resumed = ack.resume.is_resumed(),
                    reason = ?ack.resume.reason,
                    "handshake complete"
                );
                self.world.begin_subscription();
                vec![
                    self.set_status(ConnectionStatus::Connected, None),
                    Action::Send(Envelope::subscribe(
                        self.config.scene_id.clone(),
                        self.config.channels,
                    )),
                ]
            }
            Message::Snapshot(snapshot) => match self.world.apply_snapshot(&id, snapshot.clone()) {
                Ok(()) => vec![Action::Emit(ClientEvent::Snapshot {
                    snapshot_id: id,
                    snapshot,
                })],
                Err(err) => vec![violation(err)],
            },
            Message::Event(event) => match self.world.apply_event(event.clone()) {
                Ok(EventDisposition::Applied) => vec![Action::Emit(ClientEvent::Event(event))],
                Ok(EventDisposition::Duplicate) => {
                    tracing::debug!(seq = event.seq, "duplicate event ignored");
                    Vec::new()
                }
                Ok(EventDisposition::AppliedAfterGap { expected }) => vec![
                    violation(ProtocolViolation::SequenceGap {
                        expected,
                        got: event.seq,
                    }),
                    Action::Emit(ClientEvent::Event(event)),
                ],
                Err(err) => vec![violation(err)],
            },
            Message::Ack(ack) => match self.correlator.on_ack(&ack) {
                Ok(result) => {
                    if let Some(PendingOperation::AssignTask { task_id, agent_id }) =
                        self.pending.confirm(&result.command_id)
                    {
                        self.world.confirm_assignment(&task_id, &agent_id);
                    }
                    vec![Action::Emit(ClientEvent::CommandResult(result))]
                }
                Err(err) => vec![violation(err.into())],
            },
            Message::Error(error) => {
                if self.hello_id.as_deref() == Some(error.in_reply_to.as_str()) {
                    return self.on_handshake_rejected(error.code, error.message);
                }
                match self.correlator.on_error(&error) {
                    Ok(result) => {
                        self.pending.rollback(&result.command_id);
                        vec![Action::Emit(ClientEvent::CommandResult(result))]
                    }
                    Err(err) => vec![violation(err.into())],
                }
            }
            Message::Ping(ping) => vec![Action::Send(Envelope::pong(ping.nonce))],
            Message::Pong(pong) => match self.heartbeat.on_pong(&pong.nonce) {
                Ok(()) => Vec::new(),
                Err(err) => vec![violation(err)],
            },
            Message::AgentGoal(goal) => vec![Action::Emit(ClientEvent::AgentGoal(goal))],
            Message::Chat(chat) => vec![Action::Emit(ClientEvent::Chat(chat))],
            other @ (Message::Hello(_) | Message::Subscribe(_) | Message::Command(_)) => {
                vec![violation(ProtocolViolation::UnexpectedMessage {
                    message_type: other.message_type().as_str().to_string(),
                })]
            }
        }
    }

    fn on_handshake_rejected(
        &mut self,
        code: wsync_envelope::ErrorCode,
        message: String,
    ) -> Vec<Action> {
        let mut actions = vec![
            violation(ProtocolViolation::HandshakeRejected {
                code,
                message: message.clone(),
            }),
            self.set_status(ConnectionStatus::Error, Some(message)),
        ];
        if self.transport_open {
            actions.push(Action::CloseTransport);
        }
        actions.extend(self.on_transport_closed());
        actions
    }

    fn set_status(&mut self, status: ConnectionStatus, error: Option<String>) -> Action {
        if self.status != status {
            tracing::info!(
                from = %self.status,
                to = %status,
                attempt = self.reconnect_attempt,
                "connection status"
            );
        }
        self.status = status;
        Action::Emit(ClientEvent::Status(ConnectionUpdate {
            status,
            reconnect_attempt: self.reconnect_attempt,
            error,
        }))
    }
}

fn violation(violation: ProtocolViolation) -> Action {
    tracing::warn!(%violation, "protocol violation");
    Action::Emit(ClientEvent::Violation(violation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wsync_envelope::{encode, ErrorCode, FallbackReason, ResumeDecision};

    fn machine() -> ConnectionMachine {
        ConnectionMachine::new(ClientConfig::default().with_rng_seed(3))
    }

    fn statuses(actions: &[Action]) -> Vec<ConnectionStatus> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Emit(ClientEvent::Status(u)) => Some(u.status),
                _ => None,
            })
            .collect()
    }

    fn sent(actions: &[Action]) -> Vec<&Envelope> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Send(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    fn frame(envelope: &Envelope) -> String {
        encode(envelope).unwrap()
    }

    fn connected() -> ConnectionMachine {
        let mut m = machine();
        m.start();
        m.on_transport_open();
        m.on_frame(
            &frame(&Envelope::hello_ack("sess_1", ResumeDecision::fresh(FallbackReason::CursorUnknown))),
            Instant::now(),
        );
        m.on_frame(&frame(&Envelope::snapshot(WorldSnapshot::default())), Instant::now());
        m
    }

    #[test]
    fn start_opens_and_hello_ack_subscribes() {
        let mut m = machine();
        let actions = m.start();
        assert_eq!(statuses(&actions), vec![ConnectionStatus::Connecting]);
        assert!(actions.contains(&Action::OpenTransport));

        let hello = m.on_transport_open();
        assert!(matches!(sent(&hello)[0].message, Message::Hello(_)));

        let actions = m.on_frame(
            &frame(&Envelope::hello_ack("sess_1", ResumeDecision::fresh(FallbackReason::CursorUnknown))),
            Instant::now(),
        );
        assert_eq!(statuses(&actions), vec![ConnectionStatus::Connected]);
        assert!(matches!(sent(&actions)[0].message, Message::Subscribe(_)));
    }

    #[test]
    fn commands_need_a_connection() {
        let mut m = machine();
        let (id, actions) = m.send_command("player_pos", Map::new(), None);
        assert!(id.is_none());
        assert!(actions.is_empty());
    }

    #[test]
    fn unexpected_close_goes_stale_then_reconnecting() {
        let mut m = connected();
        let actions = m.on_transport_closed();
        assert_eq!(
            statuses(&actions),
            vec![ConnectionStatus::Stale, ConnectionStatus::Reconnecting]
        );
        let delay = actions.iter().find_map(|a| match a {
            Action::ScheduleReconnect { generation: 1, delay } => Some(*delay),
            _ => None,
        });
        let delay = delay.expect("reconnect scheduled");
        assert!(delay >= Duration::from_millis(1000) && delay < Duration::from_millis(1500));
        assert!(m.world().is_stale());
        assert_eq!(m.reconnect_attempt(), 1);
    }

    #[test]
    fn stop_cancels_timer_and_ignores_late_firing() {
        let mut m = connected();
        m.on_transport_closed();
        let actions = m.stop();
        assert!(actions.contains(&Action::CancelReconnect));
        assert_eq!(statuses(&actions), vec![ConnectionStatus::Disconnected]);
        assert_eq!(m.reconnect_attempt(), 0);

        assert!(m.on_reconnect_timer(1).is_empty());
        assert!(m.stop().is_empty());
    }

    #[test]
    fn old_generation_timer_is_ignored() {
        let mut m = connected();
        m.on_transport_closed();
        m.on_reconnect_timer(1);
        m.on_transport_closed();
        assert!(m.on_reconnect_timer(1).is_empty());
        assert_eq!(m.on_reconnect_timer(2), vec![Action::OpenTransport]);
    }

    #[test]
    fn inbound_ping_is_answered() {
        let mut m = connected();
        let actions = m.on_frame(&frame(&Envelope::ping("abc")), Instant::now());
        match &sent(&actions)[0].message {
            Message::Pong(p) => assert_eq!(p.nonce, "abc"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn error_rolls_back_optimistic_assignment() {
        let mut m = connected();
        let data = serde_json::json!({"task_id": "task_1", "agent_id": "agent_bd"});
        let (id, _) = m.send_command("assign_task", data.as_object().unwrap().clone(), None);
        let id = id.unwrap();
        assert_eq!(m.effective_assignee("task_1").as_deref(), Some("agent_bd"));

        let actions = m.on_frame(
            &frame(&Envelope::error(&id, ErrorCode::Conflict, "no")),
            Instant::now(),
        );
        assert!(matches!(
            &actions[0],
            Action::Emit(ClientEvent::CommandResult(r)) if !r.is_ack()
        ));
        assert_eq!(m.effective_assignee("task_1"), None);
        assert!(m.pending().is_empty());
    }

    #[test]
    fn malformed_frame_keeps_connection() {
        let mut m = connected();
        let actions = m.on_frame("{not json", Instant::now());
        assert!(matches!(
            &actions[0],
            Action::Emit(ClientEvent::Violation(ProtocolViolation::Malformed { .. }))
        ));
        assert_eq!(m.status(), ConnectionStatus::Connected);
    }

    #[test]
    fn hello_rejection_drives_reconnect() {
        let mut m = machine();
        m.start();
        let hello = m.on_transport_open();
        let hello_id = sent(&hello)[0].id.clone();
        let actions = m.on_frame(
            &frame(&Envelope::error(&hello_id, ErrorCode::ValidationFailed, "bad version")),
            Instant::now(),
        );
        assert!(actions.contains(&Action::CloseTransport));
        assert!(statuses(&actions).contains(&ConnectionStatus::Error));
        assert_eq!(m.status(), ConnectionStatus::Reconnecting);
    }
}
