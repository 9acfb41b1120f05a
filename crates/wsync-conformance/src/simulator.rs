//! Seeded protocol simulator
//!
//! Drives a [`ConnectionMachine`] against an in-process [`WorldSession`] on
//! a virtual clock. Every operation is picked from a seeded RNG, so a seed
//! reproduces the same run. A second session acts as a peer whose commands
//! the client must observe as events, including across dropped connections.
//!
//! Invariants checked after every operation:
//! - each command gets exactly one terminal result of the expected kind
//! - delivered event seqs strictly increase across reconnects
//! - the client cursor matches the server timeline once events are drained
//! - injected faults are reported as violations, and nothing else is

use crate::config::SimulatorConfig;
use crate::world::{conformance_client, reference_world, AGENTS, REFERENCE_SCENE};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use wsync_client::{
    Action, ClientConfig, ClientEvent, CommandResult, ConnectionMachine, ConnectionStatus,
    CorrelationViolation, ProtocolViolation,
};
use wsync_envelope::{encode, CommandData, Envelope, HelloResume, Message};
use wsync_lifecycle::Lifecycle;
use wsync_server::config::MIN_RATE_WINDOW_MS;
use wsync_server::{ServerConfig, WorldServer, WorldSession};

const OPERATION_STEP_MS: u64 = 40;
const SIMULATED_RATE_LIMIT: u32 = 100_000;
const MAX_PEER_BURST: u64 = 4;
const MAX_HEARTBEAT_POLLS: usize = 16;

/// Simulated operation types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulatedOperation {
    /// Catalog command the server must ack
    ValidCommand,
    /// Command the server must reject
    InvalidCommand,
    /// Command from the peer session, observed as events
    PeerCommand,
    /// Transport drops while the peer keeps writing
    DropConnection,
    /// Undecodable frame from the server
    MalformedFrame,
    /// Ping answered by pong
    HeartbeatRound,
    /// Ping left unanswered until the timeout
    SilentHeartbeat,
    /// Second ack for a command that already completed
    DuplicateAck,
}

impl SimulatedOperation {
    fn pick(rng: &mut StdRng) -> Self {
        match rng.random_range(0..100u32) {
            0..=29 => Self::ValidCommand,
            30..=44 => Self::InvalidCommand,
            45..=64 => Self::PeerCommand,
            65..=74 => Self::DropConnection,
            75..=79 => Self::MalformedFrame,
            80..=89 => Self::HeartbeatRound,
            90..=94 => Self::SilentHeartbeat,
            _ => Self::DuplicateAck,
        }
    }

    /// Violation the client must report for this operation
    fn expected_violation(self) -> Option<&'static str> {
        match self {
            Self::MalformedFrame => Some("malformed"),
            Self::SilentHeartbeat => Some("heartbeat_timeout"),
            Self::DuplicateAck => Some("duplicate_response"),
            _ => None,
        }
    }
}

impl fmt::Display for SimulatedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ValidCommand => "valid_command",
            Self::InvalidCommand => "invalid_command",
            Self::PeerCommand => "peer_command",
            Self::DropConnection => "drop_connection",
            Self::MalformedFrame => "malformed_frame",
            Self::HeartbeatRound => "heartbeat_round",
            Self::SilentHeartbeat => "silent_heartbeat",
            Self::DuplicateAck => "duplicate_ack",
        };
        f.write_str(name)
    }
}

/// Invariant broken during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// Reference peer could not be brought up
    Setup { detail: String },
    /// Client was not connected when an operation started
    NotConnected {
        operation: u64,
        status: ConnectionStatus,
    },
    /// Command got no terminal result or more than one
    ResultCount {
        operation: u64,
        command: String,
        results: usize,
    },
    /// Command resolved with the wrong kind
    UnexpectedResult {
        operation: u64,
        command: String,
        expected: String,
        actual: String,
    },
    /// Delivered event seq did not increase
    SequenceRegression { operation: u64, previous: u64, got: u64 },
    /// Client cursor disagrees with the server timeline
    CursorDrift { operation: u64, client: u64, server: u64 },
    /// Client reported a violation nothing injected
    UnexpectedViolation { operation: u64, violation: String },
    /// Injected fault went unreported
    UndetectedInjection {
        operation: u64,
        injection: SimulatedOperation,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Setup { detail } => write!(f, "setup failed: {detail}"),
            Self::NotConnected { operation, status } => {
                write!(f, "op {operation}: client {status} instead of connected")
            }
            Self::ResultCount {
                operation,
                command,
                results,
            } => write!(f, "op {operation}: {command} got {results} terminal results"),
            Self::UnexpectedResult {
                operation,
                command,
                expected,
                actual,
            } => write!(f, "op {operation}: {command} expected {expected}, got {actual}"),
            Self::SequenceRegression {
                operation,
                previous,
                got,
            } => write!(f, "op {operation}: event seq {got} after {previous}"),
            Self::CursorDrift {
                operation,
                client,
                server,
            } => write!(f, "op {operation}: client cursor {client}, server at {server}"),
            Self::UnexpectedViolation {
                operation,
                violation,
            } => write!(f, "op {operation}: unexpected violation: {violation}"),
            Self::UndetectedInjection {
                operation,
                injection,
            } => write!(f, "op {operation}: {injection} was not reported"),
        }
    }
}

/// Statistics for simulation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SimulatorStats {
    pub operations: u64,
    pub commands_sent: u64,
    pub acks: u64,
    pub errors: u64,
    pub peer_commands: u64,
    pub events_delivered: u64,
    pub snapshots: u64,
    pub reconnects: u64,
    pub pings: u64,
    pub heartbeat_timeouts: u64,
    pub injected_faults: u64,
    pub violations_reported: u64,
}

/// Final report from simulator
#[derive(Debug, Clone, Serialize)]
pub struct SimulatorReport {
    pub config: SimulatorConfig,
    pub stats: SimulatorStats,
    pub violations: Vec<Violation>,
}

impl SimulatorReport {
    /// Check if simulation passed all criteria
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();
        let stats = &self.stats;
        report.push_str("=== wsync Simulator Report ===\n\n");
        report.push_str(&format!("Seed: {}\n", self.config.seed));
        report.push_str(&format!("Replay Limit: {}\n", self.config.replay_limit));
        report.push_str(&format!("Operations: {}\n", stats.operations));
        report.push_str(&format!("Commands Sent: {}\n", stats.commands_sent));
        report.push_str(&format!("Acks: {}\n", stats.acks));
        report.push_str(&format!("Errors: {}\n", stats.errors));
        report.push_str(&format!("Peer Commands: {}\n", stats.peer_commands));
        report.push_str(&format!("Events Delivered: {}\n", stats.events_delivered));
        report.push_str(&format!("Snapshots: {}\n", stats.snapshots));
        report.push_str(&format!("Reconnects: {}\n", stats.reconnects));
        report.push_str(&format!("Pings: {}\n", stats.pings));
        report.push_str(&format!("Heartbeat Timeouts: {}\n", stats.heartbeat_timeouts));
        report.push_str(&format!("Injected Faults: {}\n", stats.injected_faults));
        report.push_str(&format!("Violations Reported By Client: {}\n", stats.violations_reported));
        report.push_str(&format!("Invariant Violations: {}\n", self.violations.len()));

        if !self.violations.is_empty() {
            report.push_str("\n=== Violations ===\n");
            for (i, v) in self.violations.iter().enumerate() {
                report.push_str(&format!("{}. {v}\n", i + 1));
            }
        }

        report.push_str(&format!(
            "\n=== Result: {} ===\n",
            if self.passed() { "PASS" } else { "FAIL" }
        ));
        report
    }
}

/// What one operation produced on the client side
#[derive(Debug, Default)]
struct Observed {
    results: Vec<CommandResult>,
    violations: Vec<ProtocolViolation>,
}

struct Simulation {
    rng: StdRng,
    server: Arc<WorldServer>,
    machine: ConnectionMachine,
    session: Option<WorldSession>,
    peer: WorldSession,
    epoch: Instant,
    clock_ms: u64,
    mute_pongs: bool,
    last_event_seq: Option<u64>,
    completed: Vec<String>,
    stats: SimulatorStats,
    violations: Vec<Violation>,
    observed: Observed,
    operation: u64,
}

impl Simulation {
    async fn new(config: &SimulatorConfig) -> Result<Self, String> {
        let server_config = ServerConfig::new()
            .with_scene_id(REFERENCE_SCENE)
            .with_replay_limit(config.replay_limit)
            .with_rate_limit(SIMULATED_RATE_LIMIT, MIN_RATE_WINDOW_MS);
        let server =
            WorldServer::seeded(server_config, &reference_world()).map_err(|e| e.to_string())?;

        let client_config = ClientConfig::new()
            .with_scene_id(REFERENCE_SCENE)
            .with_client(conformance_client())
            .with_rng_seed(config.seed);
        let machine = ConnectionMachine::new(client_config);

        let mut peer = server.session();
        let hello = Envelope::hello(
            conformance_client(),
            HelloResume {
                last_seq: None,
                last_snapshot_id: None,
                scene_id: REFERENCE_SCENE.to_string(),
            },
        );
        let frame = encode(&hello).map_err(|e| e.to_string())?;
        let replies = peer.handle_text_at(&frame, 0).await;
        if !replies
            .iter()
            .any(|r| matches!(r.message, Message::HelloAck(_)))
        {
            return Err("peer handshake was rejected".to_string());
        }

        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            server,
            machine,
            session: None,
            peer,
            epoch: Instant::now(),
            clock_ms: 0,
            mute_pongs: false,
            last_event_seq: None,
            completed: Vec::new(),
            stats: SimulatorStats::default(),
            violations: Vec::new(),
            observed: Observed::default(),
            operation: 0,
        })
    }

    fn now(&self) -> Instant {
        self.epoch + Duration::from_millis(self.clock_ms)
    }

    fn advance(&mut self, by: Duration) {
        self.clock_ms = self
            .clock_ms
            .saturating_add(u64::try_from(by.as_millis()).unwrap_or(u64::MAX));
    }

    fn advance_to(&mut self, deadline: Instant) {
        let since = deadline.saturating_duration_since(self.epoch);
        let mut ms = u64::try_from(since.as_millis()).unwrap_or(u64::MAX);
        if since.subsec_nanos() % 1_000_000 != 0 {
            ms += 1;
        }
        self.clock_ms = self.clock_ms.max(ms);
    }

    fn server_now(&self) -> i64 {
        i64::try_from(self.clock_ms).unwrap_or(i64::MAX)
    }

    /// Carry out machine actions until none remain
    async fn perform(&mut self, actions: Vec<Action>) {
        let mut queue: VecDeque<Action> = actions.into();
        while let Some(action) = queue.pop_front() {
            match action {
                Action::OpenTransport => {
                    self.session = Some(self.server.session());
                    queue.extend(self.machine.on_transport_open());
                }
                Action::CloseTransport => self.session = None,
                Action::Send(envelope) => {
                    if matches!(envelope.message, Message::Ping(_)) {
                        self.stats.pings += 1;
                    }
                    let Ok(frame) = encode(&envelope) else {
                        continue;
                    };
                    let now = self.server_now();
                    let Some(session) = self.session.as_mut() else {
                        continue;
                    };
                    let replies = session.handle_text_at(&frame, now).await;
                    for reply in replies {
                        if self.mute_pongs && matches!(reply.message, Message::Pong(_)) {
                            continue;
                        }
                        queue.extend(self.deliver(&reply));
                    }
                }
                Action::ScheduleReconnect { generation, delay } => {
                    self.stats.reconnects += 1;
                    self.advance(delay);
                    queue.extend(self.machine.on_reconnect_timer(generation));
                }
                Action::CancelReconnect => {}
                Action::Emit(event) => self.observe(event),
            }
        }
    }

    fn deliver(&mut self, envelope: &Envelope) -> Vec<Action> {
        match encode(envelope) {
            Ok(frame) => self.machine.on_frame(&frame, self.now()),
            Err(_) => Vec::new(),
        }
    }

    /// Push events the client's session has not yet sent
    async fn drain_events(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let events = session.poll_events();
        let mut actions = Vec::new();
        for event in &events {
            actions.extend(self.deliver(event));
        }
        self.perform(actions).await;
    }

    fn observe(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Snapshot { .. } => self.stats.snapshots += 1,
            ClientEvent::Event(event) => {
                self.stats.events_delivered += 1;
                if let Some(previous) = self.last_event_seq.filter(|p| event.seq <= *p) {
                    self.violations.push(Violation::SequenceRegression {
                        operation: self.operation,
                        previous,
                        got: event.seq,
                    });
                }
                self.last_event_seq = Some(event.seq);
            }
            ClientEvent::CommandResult(result) => {
                if result.is_ack() {
                    self.stats.acks += 1;
                } else {
                    self.stats.errors += 1;
                }
                self.completed.push(result.command_id.clone());
                self.observed.results.push(result);
            }
            ClientEvent::Violation(violation) => {
                self.stats.violations_reported += 1;
                if matches!(violation, ProtocolViolation::HeartbeatTimeout { .. }) {
                    self.stats.heartbeat_timeouts += 1;
                }
                self.observed.violations.push(violation);
            }
            ClientEvent::Status(_) | ClientEvent::AgentGoal(_) | ClientEvent::Chat(_) => {}
        }
    }

    /// Tasks commands may still target, sorted for reproducibility
    fn open_tasks(&self) -> Vec<String> {
        let snapshot = self.server.store().snapshot(None);
        let mut tasks: Vec<String> = snapshot
            .tasks
            .iter()
            .filter(|t| !t.status.is_terminal())
            .map(|t| t.task_id.clone())
            .collect();
        tasks.sort();
        tasks
    }

    fn pick<'a>(&mut self, items: &'a [String]) -> Option<&'a str> {
        if items.is_empty() {
            return None;
        }
        Some(items[self.rng.random_range(0..items.len())].as_str())
    }

    fn position(&mut self) -> Value {
        json!([
            self.rng.random_range(-10.0_f64..10.0),
            0.0,
            self.rng.random_range(-10.0_f64..10.0)
        ])
    }

    fn valid_command(&mut self) -> (String, Map<String, Value>) {
        let tasks = self.open_tasks();
        let task = self.pick(&tasks).map(str::to_string);
        match (self.rng.random_range(0..3u8), task) {
            (0, Some(task_id)) => {
                let agent_id = AGENTS[self.rng.random_range(0..AGENTS.len())].to_string();
                let data = CommandData::AssignTask { task_id, agent_id };
                (data.name().as_str().to_string(), data.to_data())
            }
            (1, _) => {
                let mut data = Map::new();
                data.insert("pos".to_string(), self.position());
                ("move_player_to".to_string(), data)
            }
            _ => {
                let mut data = Map::new();
                data.insert("pos".to_string(), self.position());
                ("player_pos".to_string(), data)
            }
        }
    }

    fn invalid_command(&mut self) -> (String, Map<String, Value>) {
        let data = match self.rng.random_range(0..4u8) {
            0 => CommandData::AssignTask {
                task_id: "task_plan".to_string(),
                agent_id: "agent_ghost".to_string(),
            },
            1 => CommandData::ApproveArtifact {
                artifact_id: "art_missing".to_string(),
            },
            2 => {
                let mut data = Map::new();
                data.insert("task_id".to_string(), json!("task_plan"));
                return ("assign_task".to_string(), data);
            }
            _ => return ("summon_dragon".to_string(), Map::new()),
        };
        (data.name().as_str().to_string(), data.to_data())
    }

    /// One command from the peer session; its replies are not the client's
    async fn peer_command(&mut self) {
        let tasks = self.open_tasks();
        let Some(task_id) = self.pick(&tasks).map(str::to_string) else {
            return;
        };
        let agent_id = AGENTS[self.rng.random_range(0..AGENTS.len())].to_string();
        let data = CommandData::AssignTask { task_id, agent_id };
        let envelope = Envelope::command(data.name().as_str(), data.to_data());
        let Ok(frame) = encode(&envelope) else {
            return;
        };
        let now = self.server_now();
        self.peer.handle_text_at(&frame, now).await;
        self.stats.peer_commands += 1;
    }

    async fn send_command(&mut self, name: &str, data: Map<String, Value>, expect_ack: bool) {
        let (command_id, actions) = self.machine.send_command(name, data, None);
        let Some(command_id) = command_id else {
            self.violations.push(Violation::NotConnected {
                operation: self.operation,
                status: self.machine.status(),
            });
            return;
        };
        self.stats.commands_sent += 1;
        self.perform(actions).await;

        let results: Vec<&CommandResult> = self
            .observed
            .results
            .iter()
            .filter(|r| r.command_id == command_id)
            .collect();
        if results.len() != 1 {
            self.violations.push(Violation::ResultCount {
                operation: self.operation,
                command: name.to_string(),
                results: results.len(),
            });
            return;
        }
        if results[0].is_ack() != expect_ack {
            let describe = |ack: bool| if ack { "ack" } else { "error" }.to_string();
            self.violations.push(Violation::UnexpectedResult {
                operation: self.operation,
                command: name.to_string(),
                expected: describe(expect_ack),
                actual: results[0]
                    .message
                    .clone()
                    .unwrap_or_else(|| describe(results[0].is_ack())),
            });
        }
    }

    /// Poll the heartbeat until it produces work or times out
    async fn heartbeat_until(&mut self, timed_out: bool) {
        for _ in 0..MAX_HEARTBEAT_POLLS {
            let Some(deadline) = self.machine.next_heartbeat_deadline() else {
                return;
            };
            self.advance_to(deadline);
            let actions = self.machine.on_heartbeat(self.now());
            let sent_ping = actions
                .iter()
                .any(|a| matches!(a, Action::Send(e) if matches!(e.message, Message::Ping(_))));
            let expired = actions.iter().any(|a| {
                matches!(
                    a,
                    Action::Emit(ClientEvent::Violation(ProtocolViolation::HeartbeatTimeout { .. }))
                )
            });
            self.perform(actions).await;
            if expired || (sent_ping && !timed_out) {
                return;
            }
        }
    }

    async fn run_operation(&mut self, operation: SimulatedOperation) {
        if self.machine.status() != ConnectionStatus::Connected {
            self.violations.push(Violation::NotConnected {
                operation: self.operation,
                status: self.machine.status(),
            });
            return;
        }
        match operation {
            SimulatedOperation::ValidCommand => {
                let (name, data) = self.valid_command();
                self.send_command(&name, data, true).await;
            }
            SimulatedOperation::InvalidCommand => {
                let (name, data) = self.invalid_command();
                self.send_command(&name, data, false).await;
            }
            SimulatedOperation::PeerCommand => self.peer_command().await,
            SimulatedOperation::DropConnection => {
                self.session = None;
                for _ in 0..self.rng.random_range(0..=MAX_PEER_BURST) {
                    self.peer_command().await;
                }
                let actions = self.machine.on_transport_closed();
                self.perform(actions).await;
            }
            SimulatedOperation::MalformedFrame => {
                self.stats.injected_faults += 1;
                let actions = self.machine.on_frame("{\"type\": \"event\",", self.now());
                self.perform(actions).await;
            }
            SimulatedOperation::HeartbeatRound => self.heartbeat_until(false).await,
            SimulatedOperation::SilentHeartbeat => {
                self.stats.injected_faults += 1;
                self.mute_pongs = true;
                self.heartbeat_until(true).await;
                self.mute_pongs = false;
            }
            SimulatedOperation::DuplicateAck => {
                self.stats.injected_faults += 1;
                let Some(command_id) = self.completed.last().cloned() else {
                    // Nothing completed yet; inject an ack for a command we never sent
                    let actions = self.deliver(&Envelope::ack("cmd_never_sent"));
                    self.perform(actions).await;
                    return;
                };
                let actions = self.deliver(&Envelope::ack(command_id));
                self.perform(actions).await;
            }
        }
    }

    /// Compare what the client reported against what was injected
    fn check_violations(&mut self, operation: SimulatedOperation) {
        let observed = std::mem::take(&mut self.observed.violations);
        let mut expected = operation.expected_violation();
        for violation in observed {
            let label = match &violation {
                ProtocolViolation::Malformed { .. } => "malformed",
                ProtocolViolation::HeartbeatTimeout { .. } => "heartbeat_timeout",
                ProtocolViolation::Correlation(
                    CorrelationViolation::DuplicateResponse { .. }
                    | CorrelationViolation::UnknownCommand { .. },
                ) => "duplicate_response",
                _ => "other",
            };
            if expected == Some(label) {
                expected = None;
                continue;
            }
            self.violations.push(Violation::UnexpectedViolation {
                operation: self.operation,
                violation: violation.to_string(),
            });
        }
        if expected.is_some() {
            self.violations.push(Violation::UndetectedInjection {
                operation: self.operation,
                injection: operation,
            });
        }
    }

    fn check_cursor(&mut self) {
        let server = self.server.timeline().latest_seq();
        if let Some(client) = self.machine.cursor().last_seq {
            if client != server {
                self.violations.push(Violation::CursorDrift {
                    operation: self.operation,
                    client,
                    server,
                });
            }
        }
    }

    async fn settle(&mut self) {
        self.drain_events().await;
        if let Some(deadline) = self.machine.next_heartbeat_deadline() {
            if self.now() >= deadline {
                let actions = self.machine.on_heartbeat(self.now());
                self.perform(actions).await;
            }
        }
    }
}

/// Run the protocol simulator
pub async fn run_simulator(config: SimulatorConfig) -> SimulatorReport {
    let mut sim = match Simulation::new(&config).await {
        Ok(sim) => sim,
        Err(detail) => {
            return SimulatorReport {
                config,
                stats: SimulatorStats::default(),
                violations: vec![Violation::Setup { detail }],
            };
        }
    };

    let actions = sim.machine.start();
    sim.perform(actions).await;
    if sim.machine.status() != ConnectionStatus::Connected {
        sim.violations.push(Violation::Setup {
            detail: format!("client status after handshake: {}", sim.machine.status()),
        });
    }

    for index in 0..config.operations {
        if config.stop_on_first_violation && !sim.violations.is_empty() {
            break;
        }
        sim.operation = index;
        let operation = SimulatedOperation::pick(&mut sim.rng);
        tracing::debug!(operation = %operation, index, "simulating");

        sim.run_operation(operation).await;
        sim.advance(Duration::from_millis(OPERATION_STEP_MS));
        sim.settle().await;
        sim.check_violations(operation);
        sim.check_cursor();
        sim.observed.results.clear();
        sim.stats.operations += 1;
    }

    let actions = sim.machine.stop();
    sim.perform(actions).await;

    tracing::info!(
        seed = config.seed,
        operations = sim.stats.operations,
        violations = sim.violations.len(),
        "simulation finished"
    );
    SimulatorReport {
        config,
        stats: sim.stats,
        violations: sim.violations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_mix_covers_every_kind() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..2_000 {
            seen.insert(SimulatedOperation::pick(&mut rng));
        }
        assert_eq!(seen.len(), 8);
    }

    #[test]
    fn only_injections_expect_violations() {
        assert_eq!(SimulatedOperation::ValidCommand.expected_violation(), None);
        assert_eq!(
            SimulatedOperation::SilentHeartbeat.expected_violation(),
            Some("heartbeat_timeout")
        );
    }

    #[test]
    fn report_text_lists_violations() {
        let report = SimulatorReport {
            config: SimulatorConfig::default(),
            stats: SimulatorStats::default(),
            violations: vec![Violation::CursorDrift {
                operation: 3,
                client: 4,
                server: 5,
            }],
        };
        let text = report.generate_text();
        assert!(text.contains("1. op 3: client cursor 4, server at 5"));
        assert!(text.ends_with("=== Result: FAIL ===\n"));
    }
}
