use pretty_assertions::assert_eq;
use serde_json::Value;
use wsync_conformance::{
    load_fixtures, record_golden_fixtures, run_check, run_checks, write_fixtures,
    ConformanceError, ConformanceReport, Fixture, FixtureBody,
};

async fn golden(name: &str) -> Fixture {
    record_golden_fixtures()
        .await
        .unwrap()
        .into_iter()
        .find(|f| f.name == name)
        .unwrap_or_else(|| panic!("no golden fixture {name}"))
}

fn messages_mut(fixture: &mut Fixture) -> &mut Vec<Value> {
    match &mut fixture.body {
        FixtureBody::InitialSnapshot { messages }
        | FixtureBody::ReconnectResync { messages }
        | FixtureBody::Heartbeat { messages, .. }
        | FixtureBody::Correlation { messages }
        | FixtureBody::FlowEventOrder { messages, .. } => messages,
        other => panic!("{} has no message list", other.kind()),
    }
}

fn position_of(messages: &[Value], kind: &str) -> usize {
    messages
        .iter()
        .position(|m| m["type"] == kind)
        .unwrap_or_else(|| panic!("no {kind} message"))
}

#[tokio::test]
async fn golden_fixtures_survive_disk_and_pass() {
    let fixtures = record_golden_fixtures().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let written = write_fixtures(dir.path(), &fixtures).unwrap();
    assert_eq!(written.len(), fixtures.len());

    let loaded = load_fixtures(dir.path()).unwrap();
    let names: Vec<&str> = loaded.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "correlation",
            "envelope_errors",
            "flow_approve_artifact",
            "flow_resolve_decision",
            "handshake",
            "heartbeat",
            "initial_snapshot",
            "reconnect_resync",
            "transition_sequences",
        ]
    );

    let report = ConformanceReport::new(run_checks(&loaded));
    assert!(report.passed(), "{}", report.generate_text());
}

#[tokio::test]
async fn replay_that_skips_its_first_event_fails() {
    let mut fixture = golden("reconnect_resync").await;
    let messages = messages_mut(&mut fixture);
    let first_event = position_of(messages, "event");
    messages.remove(first_event);

    let outcome = run_check(&fixture);
    assert!(!outcome.passed);
    assert_eq!(outcome.name, "reconnect_resync");
    assert!(
        outcome
            .detail
            .as_deref()
            .is_some_and(|d| d.contains("first replay seq must equal replay_from_seq (2)")),
        "{outcome:?}"
    );
}

#[tokio::test]
async fn reordered_handshake_fails() {
    let mut fixture = golden("reconnect_resync").await;
    let messages = messages_mut(&mut fixture);
    let hello = position_of(messages, "hello");
    let ack = position_of(messages, "hello_ack");
    messages[ack]["ts"] = messages[hello]["ts"].clone();

    let outcome = run_check(&fixture);
    assert!(!outcome.passed);
    assert!(outcome.detail.unwrap().contains("timestamps must be ordered"));
}

#[tokio::test]
async fn pong_with_another_nonce_fails() {
    let mut fixture = golden("heartbeat").await;
    let messages = messages_mut(&mut fixture);
    let pong = position_of(messages, "pong");
    messages[pong]["payload"]["nonce"] = Value::from("someone_else");

    let outcome = run_check(&fixture);
    assert!(!outcome.passed);
    assert!(outcome.detail.unwrap().contains("nonce mismatch for pair index 0"));
}

#[tokio::test]
async fn missing_terminal_response_fails() {
    let mut fixture = golden("correlation").await;
    let messages = messages_mut(&mut fixture);
    let ack = position_of(messages, "ack");
    messages.remove(ack);

    let outcome = run_check(&fixture);
    assert!(!outcome.passed);
    assert!(outcome.detail.unwrap().contains("has 0 terminal responses"));
}

#[tokio::test]
async fn flow_expecting_other_events_fails() {
    let mut fixture = golden("flow_resolve_decision").await;
    if let FixtureBody::FlowEventOrder {
        expected_events, ..
    } = &mut fixture.body
    {
        expected_events.reverse();
    }

    let outcome = run_check(&fixture);
    assert!(!outcome.passed);
    assert!(outcome
        .detail
        .unwrap()
        .contains("event index 0 expected \"task_started\" but found \"decision_resolved\""));
}

#[tokio::test]
async fn incompatible_error_must_answer_the_hello() {
    let mut fixture = golden("handshake").await;
    if let FixtureBody::Handshake { incompatible, .. } = &mut fixture.body {
        incompatible[1]["payload"]["in_reply_to"] = Value::from("msg_other");
    }

    let outcome = run_check(&fixture);
    assert!(!outcome.passed);
    assert!(outcome.detail.unwrap().contains("in_reply_to"));
}

#[test]
fn unreadable_fixture_names_the_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("broken.json"), "{\"name\": \"broken\"}").unwrap();
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let err = load_fixtures(dir.path()).unwrap_err();
    match err {
        ConformanceError::Fixture { path, .. } => assert!(path.ends_with("broken.json")),
        other => panic!("expected fixture error, got {other:?}"),
    }
}

#[test]
fn missing_directory_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_fixtures(dir.path().join("absent")).unwrap_err();
    assert!(err.is_retryable());
}
