use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::mpsc;
use wsync_client::{ClientEvent, CommandGateway, OfflineSimulator};
use wsync_envelope::ErrorCode;
use wsync_lifecycle::{DecisionStatus, TaskStatus};
use wsync_test_utils::{data, office_world};

async fn resolve_copy_decision(gateway: &dyn CommandGateway) -> Option<String> {
    gateway
        .send_command(
            "resolve_decision",
            data(json!({"decision_id": "dec_copy", "choice": "playful"})),
        )
        .await
}

fn drain(events: &mut mpsc::UnboundedReceiver<ClientEvent>) -> Vec<ClientEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test]
async fn resolve_then_resume_matches_networked_results() {
    let (simulator, mut events) = OfflineSimulator::seeded(&office_world()).unwrap();

    let command_id = resolve_copy_decision(&simulator).await.unwrap();
    let out = drain(&mut events);
    assert_eq!(out.len(), 3);

    let ClientEvent::CommandResult(result) = &out[0] else {
        panic!("result comes first, got {:?}", out[0]);
    };
    assert!(result.is_ack());
    assert_eq!(result.command_id, command_id);

    let events: Vec<(String, u64)> = out[1..]
        .iter()
        .map(|e| match e {
            ClientEvent::Event(e) => (e.name.clone(), e.seq),
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(
        events,
        vec![
            ("decision_resolved".to_string(), 1),
            ("task_started".to_string(), 2)
        ]
    );
    assert_eq!(simulator.latest_seq(), 2);

    let world = simulator.snapshot();
    let decision = world.decisions.iter().find(|d| d.decision_id == "dec_copy").unwrap();
    assert_eq!(decision.status, DecisionStatus::Resolved);
    assert_eq!(world.task("task_copy").unwrap().status, TaskStatus::InProgress);
}

#[tokio::test]
async fn rejections_produce_one_error_and_no_events() {
    let (simulator, mut events) = OfflineSimulator::seeded(&office_world()).unwrap();

    let command_id = simulator
        .send_command("approve_artifact", data(json!({"artifact_id": "art_missing"})))
        .await
        .unwrap();
    let out = drain(&mut events);
    assert_eq!(out.len(), 1);
    match &out[0] {
        ClientEvent::CommandResult(result) => {
            assert_eq!(result.command_id, command_id);
            assert_eq!(result.code, Some(ErrorCode::NotFound));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(simulator.latest_seq(), 0);
}

#[tokio::test]
async fn repeated_key_is_acked_once_more_without_events() {
    let (simulator, mut events) = OfflineSimulator::seeded(&office_world()).unwrap();
    let body = data(json!({"task_id": "task_plan", "agent_id": "agent_res"}));

    simulator
        .send_keyed_command("assign_task", body.clone(), "key_1")
        .await
        .unwrap();
    assert_eq!(drain(&mut events).len(), 2);

    simulator
        .send_keyed_command("assign_task", body, "key_1")
        .await
        .unwrap();
    let out = drain(&mut events);
    assert_eq!(out.len(), 1);
    assert!(matches!(&out[0], ClientEvent::CommandResult(r) if r.is_ack()));
    assert_eq!(simulator.latest_seq(), 1);
}
