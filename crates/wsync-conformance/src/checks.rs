//! Protocol checks over recorded transcripts

use crate::error::ConformanceError;
use crate::fixture::{ErrorClassCase, Fixture, FixtureBody, HeartbeatPolicy, TransitionCase};
use crate::report::CheckOutcome;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use wsync_client::ClientConfig;
use wsync_envelope::{classify, decode_value, Envelope, Message, MessageType, ResumeStatus};
use wsync_lifecycle::validate_transition_sequence;

type CheckResult = Result<(), ConformanceError>;

/// Run one fixture
#[must_use]
pub fn run_check(fixture: &Fixture) -> CheckOutcome {
    let name = fixture.name.as_str();
    let result = match &fixture.body {
        FixtureBody::Handshake {
            success,
            incompatible,
        } => check_handshake(name, success, incompatible),
        FixtureBody::InitialSnapshot { messages } => check_initial_snapshot(name, messages),
        FixtureBody::ReconnectResync { messages } => check_reconnect_resync(name, messages),
        FixtureBody::Heartbeat { policy, messages } => check_heartbeat(name, *policy, messages),
        FixtureBody::Correlation { messages } => check_correlation(name, messages),
        FixtureBody::FlowEventOrder {
            messages,
            expected_events,
        } => check_flow_event_order(name, messages, expected_events),
        FixtureBody::EnvelopeErrors { cases } => check_envelope_errors(name, cases),
        FixtureBody::TransitionSequences { cases } => check_transition_sequences(name, cases),
    };
    match result {
        Ok(()) => {
            tracing::debug!(fixture = name, kind = fixture.body.kind(), "check passed");
            CheckOutcome::pass(name, fixture.body.kind())
        }
        Err(err) => {
            tracing::warn!(fixture = name, kind = fixture.body.kind(), error = %err, "check failed");
            CheckOutcome::fail(name, fixture.body.kind(), err.to_string())
        }
    }
}

/// Run every fixture in order
#[must_use]
pub fn run_checks(fixtures: &[Fixture]) -> Vec<CheckOutcome> {
    fixtures.iter().map(run_check).collect()
}

fn decode_all(fixture: &str, label: &str, messages: &[Value]) -> Result<Vec<Envelope>, ConformanceError> {
    messages
        .iter()
        .enumerate()
        .map(|(i, message)| {
            decode_value(message.clone()).map_err(|e| {
                ConformanceError::check(fixture, format!("{label}[{i}] failed validation: {e}"))
            })
        })
        .collect()
}

fn first_of(envelopes: &[Envelope], kind: MessageType) -> Option<(usize, &Envelope)> {
    envelopes
        .iter()
        .enumerate()
        .find(|(_, e)| e.message_type() == kind)
}

fn require<'a>(
    fixture: &str,
    envelopes: &'a [Envelope],
    kind: MessageType,
) -> Result<(usize, &'a Envelope), ConformanceError> {
    first_of(envelopes, kind)
        .ok_or_else(|| ConformanceError::check(fixture, format!("requires a {kind} message")))
}

fn check_handshake(fixture: &str, success: &[Value], incompatible: &[Value]) -> CheckResult {
    let success = decode_all(fixture, "success", success)?;
    let [hello, hello_ack, ..] = success.as_slice() else {
        return Err(ConformanceError::check(fixture, "success must hold hello and hello_ack"));
    };
    if hello.message_type() != MessageType::Hello || hello_ack.message_type() != MessageType::HelloAck {
        return Err(ConformanceError::check(
            fixture,
            "success must be hello followed by hello_ack",
        ));
    }
    if hello.ts >= hello_ack.ts {
        return Err(ConformanceError::check(fixture, "hello_ack must occur after hello"));
    }

    // The incompatible hello is expected to fail decode; read it raw
    let [bad_hello, bad_error, ..] = incompatible else {
        return Err(ConformanceError::check(
            fixture,
            "incompatible must hold hello and error",
        ));
    };
    if bad_hello.get("type").and_then(Value::as_str) != Some("hello") {
        return Err(ConformanceError::check(
            fixture,
            "incompatible must start with a hello",
        ));
    }
    let bad_error = decode_value(bad_error.clone()).map_err(|e| {
        ConformanceError::check(fixture, format!("incompatible[1] failed validation: {e}"))
    })?;
    let Message::Error(error) = &bad_error.message else {
        return Err(ConformanceError::check(
            fixture,
            "incompatible hello must be answered by an error",
        ));
    };
    if Some(error.in_reply_to.as_str()) != bad_hello.get("id").and_then(Value::as_str) {
        return Err(ConformanceError::check(
            fixture,
            "incompatible error must reference the hello id in in_reply_to",
        ));
    }
    Ok(())
}

fn check_initial_snapshot(fixture: &str, messages: &[Value]) -> CheckResult {
    let envelopes = decode_all(fixture, "messages", messages)?;
    let (subscribe_at, subscribe) = require(fixture, &envelopes, MessageType::Subscribe)?;
    let (snapshot_at, snapshot) = require(fixture, &envelopes, MessageType::Snapshot)?;
    if snapshot_at < subscribe_at || subscribe.ts >= snapshot.ts {
        return Err(ConformanceError::check(
            fixture,
            "snapshot must be emitted after subscribe",
        ));
    }
    if let Some((event_at, _)) = first_of(&envelopes, MessageType::Event) {
        if event_at < snapshot_at {
            return Err(ConformanceError::check(
                fixture,
                "an event arrived before the initial snapshot",
            ));
        }
    }
    let Message::Snapshot(world) = &snapshot.message else {
        return Err(ConformanceError::check(fixture, "snapshot payload missing"));
    };
    world
        .validate_references()
        .map_err(|e| ConformanceError::check(fixture, e.to_string()))
}

fn check_reconnect_resync(fixture: &str, messages: &[Value]) -> CheckResult {
    let envelopes = decode_all(fixture, "messages", messages)?;
    let (_, hello) = require(fixture, &envelopes, MessageType::Hello)?;
    let (_, hello_ack) = require(fixture, &envelopes, MessageType::HelloAck)?;
    let (_, subscribe) = require(fixture, &envelopes, MessageType::Subscribe)?;
    let (_, snapshot) = require(fixture, &envelopes, MessageType::Snapshot)?;

    let (Message::Hello(hello_payload), Message::HelloAck(ack), Message::Snapshot(world)) =
        (&hello.message, &hello_ack.message, &snapshot.message)
    else {
        return Err(ConformanceError::check(fixture, "snapshot payload missing"));
    };
    let cursor = hello_payload
        .resume
        .as_ref()
        .and_then(|r| r.last_seq)
        .and_then(|seq| u64::try_from(seq).ok())
        .ok_or_else(|| {
            ConformanceError::check(fixture, "hello resume.last_seq must be a non-negative integer")
        })?;
    if ack.resume.status != ResumeStatus::Resumed {
        return Err(ConformanceError::check(
            fixture,
            format!("expected resume.status=resumed but found {:?}", ack.resume.status),
        ));
    }
    let replay_from = ack
        .resume
        .replay_from_seq
        .filter(|seq| *seq == cursor + 1)
        .ok_or_else(|| {
            ConformanceError::check(fixture, "replay_from_seq must equal hello resume last_seq + 1")
        })?;
    if !(hello.ts < hello_ack.ts && hello_ack.ts < subscribe.ts && subscribe.ts < snapshot.ts) {
        return Err(ConformanceError::check(
            fixture,
            "timestamps must be ordered hello -> hello_ack -> subscribe -> snapshot",
        ));
    }

    let events: Vec<_> = envelopes
        .iter()
        .filter_map(|e| match &e.message {
            Message::Event(event) => Some((e.id.as_str(), event)),
            _ => None,
        })
        .collect();
    if events.is_empty() {
        return Err(ConformanceError::check(fixture, "requires replay event messages"));
    }
    let mut previous: Option<u64> = None;
    for (index, (id, event)) in events.iter().enumerate() {
        if index == 0 && event.seq != replay_from {
            return Err(ConformanceError::check(
                fixture,
                format!("first replay seq must equal replay_from_seq ({replay_from})"),
            ));
        }
        if let Some(previous) = previous {
            if event.seq != previous + 1 {
                return Err(ConformanceError::check(
                    fixture,
                    format!("replay must be gap-free and increasing; saw {} after {previous}", event.seq),
                ));
            }
        }
        previous = Some(event.seq);

        if world.project(&event.project_id).is_none() {
            return Err(ConformanceError::check(
                fixture,
                format!("event {id} references unknown project {}", event.project_id),
            ));
        }
        if let Some(task_id) = event.task_id.as_deref().filter(|t| world.task(t).is_none()) {
            return Err(ConformanceError::check(
                fixture,
                format!("event {id} references unknown task {task_id}"),
            ));
        }
        if let Some(agent_id) = event.agent_id.as_deref().filter(|a| world.agent(a).is_none()) {
            return Err(ConformanceError::check(
                fixture,
                format!("event {id} references unknown agent {agent_id}"),
            ));
        }
    }
    world
        .validate_references()
        .map_err(|e| ConformanceError::check(fixture, e.to_string()))
}

fn check_heartbeat(fixture: &str, policy: HeartbeatPolicy, messages: &[Value]) -> CheckResult {
    let expected = ClientConfig::default();
    if policy.ping_interval_ms != expected.heartbeat_interval_ms
        || policy.timeout_ms != expected.heartbeat_timeout_ms
    {
        return Err(ConformanceError::check(
            fixture,
            format!(
                "policy must define a {}ms ping interval and {}ms timeout",
                expected.heartbeat_interval_ms, expected.heartbeat_timeout_ms
            ),
        ));
    }

    let envelopes = decode_all(fixture, "messages", messages)?;
    let nonces = |kind: MessageType| -> Vec<(&str, i64)> {
        envelopes
            .iter()
            .filter(|e| e.message_type() == kind)
            .filter_map(|e| match &e.message {
                Message::Ping(p) | Message::Pong(p) => Some((p.nonce.as_str(), e.ts)),
                _ => None,
            })
            .collect()
    };
    let pings = nonces(MessageType::Ping);
    let pongs = nonces(MessageType::Pong);
    if pings.len() != pongs.len() {
        return Err(ConformanceError::check(fixture, "requires one pong for each ping"));
    }

    let interval = i64::try_from(policy.ping_interval_ms).unwrap_or(i64::MAX);
    let timeout = i64::try_from(policy.timeout_ms).unwrap_or(i64::MAX);
    for (index, ((ping_nonce, ping_ts), (pong_nonce, pong_ts))) in pings.iter().zip(&pongs).enumerate() {
        if ping_nonce != pong_nonce {
            return Err(ConformanceError::check(
                fixture,
                format!("nonce mismatch for pair index {index}"),
            ));
        }
        if pong_ts - ping_ts > timeout {
            return Err(ConformanceError::check(
                fixture,
                format!("pong exceeded timeout for nonce {ping_nonce}"),
            ));
        }
        if index > 0 {
            let delta = ping_ts - pings[index - 1].1;
            if delta != interval {
                return Err(ConformanceError::check(
                    fixture,
                    format!("expected ping interval {interval}ms but observed {delta}ms"),
                ));
            }
        }
    }
    Ok(())
}

fn check_correlation(fixture: &str, messages: &[Value]) -> CheckResult {
    let envelopes = decode_all(fixture, "messages", messages)?;
    let commands: Vec<&str> = envelopes
        .iter()
        .filter(|e| e.message_type() == MessageType::Command)
        .map(|e| e.id.as_str())
        .collect();
    let known: HashSet<&str> = commands.iter().copied().collect();
    let mut terminal: HashMap<&str, usize> = HashMap::new();

    for envelope in &envelopes {
        let Some(in_reply_to) = envelope.in_reply_to() else {
            continue;
        };
        if !known.contains(in_reply_to) {
            return Err(ConformanceError::check(
                fixture,
                format!(
                    "response {} references unknown command {in_reply_to}",
                    envelope.id
                ),
            ));
        }
        *terminal.entry(in_reply_to).or_default() += 1;
    }
    for command_id in commands {
        let count = terminal.get(command_id).copied().unwrap_or(0);
        if count != 1 {
            return Err(ConformanceError::check(
                fixture,
                format!("command {command_id} has {count} terminal responses (expected 1)"),
            ));
        }
    }
    Ok(())
}

fn check_flow_event_order(fixture: &str, messages: &[Value], expected: &[String]) -> CheckResult {
    let envelopes = decode_all(fixture, "messages", messages)?;
    let actual: Vec<&str> = envelopes
        .iter()
        .filter_map(|e| match &e.message {
            Message::Event(event) => Some(event.name.as_str()),
            _ => None,
        })
        .collect();
    if actual.len() != expected.len() {
        return Err(ConformanceError::check(
            fixture,
            format!("expected {} events but found {}", expected.len(), actual.len()),
        ));
    }
    for (index, (want, got)) in expected.iter().zip(&actual).enumerate() {
        if want != got {
            return Err(ConformanceError::check(
                fixture,
                format!("event index {index} expected \"{want}\" but found \"{got}\""),
            ));
        }
    }
    Ok(())
}

fn check_envelope_errors(fixture: &str, cases: &[ErrorClassCase]) -> CheckResult {
    for case in cases {
        let Some(class) = classify(&case.frame()) else {
            return Err(ConformanceError::check(
                fixture,
                format!("{} unexpectedly passed validation", case.name),
            ));
        };
        let observed = class.code();
        if observed != case.expected_error_class {
            return Err(ConformanceError::check(
                fixture,
                format!(
                    "class mismatch for {}: expected {}, got {observed}",
                    case.name, case.expected_error_class
                ),
            ));
        }
    }
    Ok(())
}

fn check_transition_sequences(fixture: &str, cases: &[TransitionCase]) -> CheckResult {
    for case in cases {
        let sequence: Vec<&str> = case.sequence.iter().map(String::as_str).collect();
        let observed = validate_transition_sequence(case.entity, &sequence);
        if observed != case.valid {
            return Err(ConformanceError::check(
                fixture,
                format!(
                    "{} path [{}] expected {} but was {}",
                    case.entity,
                    case.sequence.join(", "),
                    if case.valid { "valid" } else { "invalid" },
                    if observed { "valid" } else { "invalid" }
                ),
            ));
        }
    }
    Ok(())
}
