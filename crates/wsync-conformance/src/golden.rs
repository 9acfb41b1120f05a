//! Golden fixtures recorded from the reference server
//!
//! Each fixture gets a fresh [`WorldServer`] over [`reference_world`], so
//! seqs start at 1 and transcripts are reproducible. Timestamps are
//! restamped in transcript order from [`RECORD_EPOCH_MS`].

use crate::error::ConformanceError;
use crate::fixture::{ErrorClassCase, Fixture, FixtureBody, HeartbeatPolicy, TransitionCase};
use crate::world::{conformance_client, reference_world, REFERENCE_SCENE};
use serde_json::{json, Value};
use std::sync::Arc;
use wsync_client::ClientConfig;
use wsync_envelope::{encode, to_value, Channels, CommandData, Envelope, HelloResume};
use wsync_lifecycle::{EntityKind, Vec3};
use wsync_server::{ServerConfig, WorldServer, WorldSession};

/// First timestamp of every recorded transcript
pub const RECORD_EPOCH_MS: i64 = 1_700_000_000_000;

const TICK_MS: i64 = 10;
const PONG_DELAY_MS: i64 = 5;
const HEARTBEAT_ROUNDS: i64 = 3;

/// Messages with monotonically restamped `ts`
#[derive(Debug)]
struct Transcript {
    messages: Vec<Value>,
    clock: i64,
}

impl Transcript {
    fn new() -> Self {
        Self {
            messages: Vec::new(),
            clock: RECORD_EPOCH_MS,
        }
    }

    fn record(&mut self, envelope: &Envelope) -> Result<(), ConformanceError> {
        self.clock += TICK_MS;
        self.record_at(envelope, self.clock)
    }

    fn record_at(&mut self, envelope: &Envelope, ts: i64) -> Result<(), ConformanceError> {
        self.clock = self.clock.max(ts);
        let value = to_value(&envelope.clone().with_ts(ts)).map_err(setup)?;
        self.messages.push(value);
        Ok(())
    }

    fn record_raw(&mut self, mut value: Value) {
        self.clock += TICK_MS;
        if let Value::Object(map) = &mut value {
            map.insert("ts".to_string(), Value::from(self.clock));
        }
        self.messages.push(value);
    }

    fn into_messages(self) -> Vec<Value> {
        self.messages
    }
}

fn setup(err: impl std::fmt::Display) -> ConformanceError {
    ConformanceError::Setup(err.to_string())
}

fn reference_server() -> Result<Arc<WorldServer>, ConformanceError> {
    let config = ServerConfig::new().with_scene_id(REFERENCE_SCENE);
    WorldServer::seeded(config, &reference_world()).map_err(setup)
}

fn hello(last_seq: Option<i64>) -> Envelope {
    Envelope::hello(
        conformance_client(),
        HelloResume {
            last_seq,
            last_snapshot_id: None,
            scene_id: REFERENCE_SCENE.to_string(),
        },
    )
}

fn command(data: &CommandData) -> Envelope {
    Envelope::command(data.name().as_str(), data.to_data())
}

/// Send one envelope and record it with every reply
async fn exchange(
    session: &mut WorldSession,
    transcript: &mut Transcript,
    envelope: &Envelope,
) -> Result<Vec<Envelope>, ConformanceError> {
    transcript.record(envelope)?;
    let frame = encode(envelope).map_err(setup)?;
    let replies = session.handle_text(&frame).await;
    for reply in &replies {
        transcript.record(reply)?;
    }
    Ok(replies)
}

/// `hello` then `subscribe` on a fresh session
async fn join(
    server: &Arc<WorldServer>,
    transcript: &mut Transcript,
    last_seq: Option<i64>,
) -> Result<WorldSession, ConformanceError> {
    let mut session = server.session();
    exchange(&mut session, transcript, &hello(last_seq)).await?;
    exchange(
        &mut session,
        transcript,
        &Envelope::subscribe(REFERENCE_SCENE, Channels::all()),
    )
    .await?;
    Ok(session)
}

async fn record_handshake() -> Result<Fixture, ConformanceError> {
    let server = reference_server()?;

    let mut success = Transcript::new();
    let mut session = server.session();
    exchange(&mut session, &mut success, &hello(None)).await?;

    let mut incompatible = Transcript::new();
    let mut raw_hello = to_value(&hello(None)).map_err(setup)?;
    if let Value::Object(map) = &mut raw_hello {
        map.insert("v".to_string(), Value::from(2));
    }
    incompatible.record_raw(raw_hello.clone());
    let replies = server.session().handle_text(&raw_hello.to_string()).await;
    for reply in &replies {
        incompatible.record(reply)?;
    }

    Ok(Fixture::new(
        "handshake",
        FixtureBody::Handshake {
            success: success.into_messages(),
            incompatible: incompatible.into_messages(),
        },
    ))
}

async fn record_initial_snapshot() -> Result<Fixture, ConformanceError> {
    let server = reference_server()?;
    let mut transcript = Transcript::new();
    join(&server, &mut transcript, None).await?;
    Ok(Fixture::new(
        "initial_snapshot",
        FixtureBody::InitialSnapshot {
            messages: transcript.into_messages(),
        },
    ))
}

async fn record_reconnect_resync() -> Result<Fixture, ConformanceError> {
    let server = reference_server()?;

    // First connection advances the timeline to seq 3; it is not recorded
    let mut scratch = Transcript::new();
    let mut first = join(&server, &mut scratch, None).await?;
    exchange(
        &mut first,
        &mut scratch,
        &command(&CommandData::ResolveDecision {
            decision_id: "dec_copy".to_string(),
            choice: "playful".to_string(),
        }),
    )
    .await?;
    exchange(
        &mut first,
        &mut scratch,
        &command(&CommandData::AssignTask {
            task_id: "task_plan".to_string(),
            agent_id: "agent_res".to_string(),
        }),
    )
    .await?;
    drop(first);

    let mut transcript = Transcript::new();
    join(&server, &mut transcript, Some(1)).await?;
    Ok(Fixture::new(
        "reconnect_resync",
        FixtureBody::ReconnectResync {
            messages: transcript.into_messages(),
        },
    ))
}

async fn record_heartbeat() -> Result<Fixture, ConformanceError> {
    let defaults = ClientConfig::default();
    let policy = HeartbeatPolicy {
        ping_interval_ms: defaults.heartbeat_interval_ms,
        timeout_ms: defaults.heartbeat_timeout_ms,
    };
    let interval = i64::try_from(policy.ping_interval_ms).map_err(setup)?;

    let server = reference_server()?;
    let mut session = server.session();
    let mut scratch = Transcript::new();
    exchange(&mut session, &mut scratch, &hello(None)).await?;

    let mut transcript = Transcript::new();
    for round in 0..HEARTBEAT_ROUNDS {
        let ping_ts = RECORD_EPOCH_MS + round * interval;
        let ping = Envelope::ping(format!("hb_{round}"));
        transcript.record_at(&ping, ping_ts)?;
        let frame = encode(&ping).map_err(setup)?;
        for reply in session.handle_text(&frame).await {
            transcript.record_at(&reply, ping_ts + PONG_DELAY_MS)?;
        }
    }

    Ok(Fixture::new(
        "heartbeat",
        FixtureBody::Heartbeat {
            policy,
            messages: transcript.into_messages(),
        },
    ))
}

async fn record_correlation() -> Result<Fixture, ConformanceError> {
    let server = reference_server()?;
    let mut transcript = Transcript::new();
    let mut session = join(&server, &mut transcript, None).await?;

    let pos: Vec3 = [1.0, 0.0, 2.0];
    let commands = [
        CommandData::ResolveDecision {
            decision_id: "dec_copy".to_string(),
            choice: "playful".to_string(),
        },
        CommandData::AssignTask {
            task_id: "task_plan".to_string(),
            agent_id: "agent_ghost".to_string(),
        },
        CommandData::ApproveArtifact {
            artifact_id: "art_missing".to_string(),
        },
        CommandData::PlayerPos { pos, facing: None },
        CommandData::ResolveDecision {
            decision_id: "dec_copy".to_string(),
            choice: "formal".to_string(),
        },
    ];
    for data in &commands {
        exchange(&mut session, &mut transcript, &command(data)).await?;
    }
    // Unknown command name still gets exactly one terminal response
    exchange(
        &mut session,
        &mut transcript,
        &Envelope::command("summon_dragon", serde_json::Map::new()),
    )
    .await?;

    Ok(Fixture::new(
        "correlation",
        FixtureBody::Correlation {
            messages: transcript.into_messages(),
        },
    ))
}

async fn record_flow(
    name: &str,
    data: CommandData,
    expected_events: &[&str],
) -> Result<Fixture, ConformanceError> {
    let server = reference_server()?;
    let mut transcript = Transcript::new();
    let mut session = join(&server, &mut transcript, None).await?;
    exchange(&mut session, &mut transcript, &command(&data)).await?;
    Ok(Fixture::new(
        name,
        FixtureBody::FlowEventOrder {
            messages: transcript.into_messages(),
            expected_events: expected_events.iter().map(|e| (*e).to_string()).collect(),
        },
    ))
}

fn error_cases() -> Result<Fixture, ConformanceError> {
    let envelope_value = |envelope: &Envelope| to_value(envelope).map_err(setup);
    let mut missing_id = envelope_value(&Envelope::ping("n1"))?;
    let mut hello_without_client = envelope_value(&hello(None))?;
    let mut unsupported = envelope_value(&Envelope::ping("n2"))?;
    if let (Value::Object(a), Value::Object(b), Value::Object(c)) =
        (&mut missing_id, &mut hello_without_client, &mut unsupported)
    {
        a.remove("id");
        b.insert("payload".to_string(), json!({}));
        c.insert("v".to_string(), Value::from(2));
    }
    let event_without_seq = json!({
        "type": "event",
        "id": "evt_1",
        "ts": RECORD_EPOCH_MS,
        "v": 1,
        "payload": {"name": "task_started", "project_id": "proj_alpha"}
    });

    let case = |name: &str, message: Value, class: &str| ErrorClassCase {
        name: name.to_string(),
        message,
        raw: None,
        expected_error_class: class.to_string(),
    };
    let cases = vec![
        ErrorClassCase {
            name: "invalid_json".to_string(),
            message: Value::Null,
            raw: Some("{\"type\": \"hello\",".to_string()),
            expected_error_class: "ERR_INVALID_JSON".to_string(),
        },
        case("missing_id", missing_id, "ERR_ENVELOPE_SCHEMA"),
        case("hello_missing_client", hello_without_client, "ERR_HELLO_PAYLOAD"),
        case("event_missing_seq", event_without_seq, "ERR_EVENT_PAYLOAD"),
        case("unsupported_version", unsupported, "ERR_ENVELOPE_SCHEMA"),
    ];
    Ok(Fixture::new(
        "envelope_errors",
        FixtureBody::EnvelopeErrors { cases },
    ))
}

fn transition_cases() -> Fixture {
    let case = |entity: EntityKind, sequence: &[&str], valid: bool| TransitionCase {
        entity,
        sequence: sequence.iter().map(|s| (*s).to_string()).collect(),
        valid,
    };
    Fixture::new(
        "transition_sequences",
        FixtureBody::TransitionSequences {
            cases: vec![
                case(EntityKind::Task, &["planned", "in_progress", "done"], true),
                case(EntityKind::Task, &["planned", "in_progress", "blocked", "in_progress"], true),
                case(EntityKind::Task, &["done", "in_progress"], false),
                case(EntityKind::Task, &["planned"], false),
                case(EntityKind::Decision, &["open", "resolved"], true),
                case(EntityKind::Decision, &["resolved", "open"], false),
                case(
                    EntityKind::Artifact,
                    &["created", "delivered", "in_review", "approved", "archived"],
                    true,
                ),
                case(EntityKind::Artifact, &["created", "approved"], false),
                case(EntityKind::Project, &["planning", "executing", "completed"], true),
            ],
        },
    )
}

/// Record the full golden suite
pub async fn record_golden_fixtures() -> Result<Vec<Fixture>, ConformanceError> {
    let fixtures = vec![
        record_handshake().await?,
        record_initial_snapshot().await?,
        record_reconnect_resync().await?,
        record_heartbeat().await?,
        record_correlation().await?,
        record_flow(
            "flow_resolve_decision",
            CommandData::ResolveDecision {
                decision_id: "dec_copy".to_string(),
                choice: "playful".to_string(),
            },
            &["decision_resolved", "task_started"],
        )
        .await?,
        record_flow(
            "flow_approve_artifact",
            CommandData::ApproveArtifact {
                artifact_id: "art_design".to_string(),
            },
            &["review_approved", "task_done"],
        )
        .await?,
        error_cases()?,
        transition_cases(),
    ];
    tracing::info!(count = fixtures.len(), "golden fixtures recorded");
    Ok(fixtures)
}
