use pretty_assertions::assert_eq;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use wsync_envelope::ErrorCode;
use wsync_lifecycle::{
    Agent, Artifact, ArtifactStatus, Decision, DecisionStatus, Project, ProjectStatus, Task,
    TaskStatus, WorldSnapshot,
};
use wsync_repository::{
    CommandOutcome, CommandProcessor, CommandRequest, EventTimeline, InMemoryStore, NewEvent,
    RepositoryError, RevisionRequest, RETAINED_COMMAND_ID_RECEIPTS, WORLD_SCOPE,
};

fn world() -> WorldSnapshot {
    WorldSnapshot {
        scene_id: Some("cozy_office_v0".to_string()),
        projects: vec![
            Project::new("proj_alpha", "Alpha", ProjectStatus::Executing),
            Project::new("proj_beta", "Beta", ProjectStatus::Executing),
        ],
        agents: vec![
            Agent::new("agent_bd").on_task("task_copy"),
            Agent::new("agent_eng"),
            Agent::new("agent_res"),
        ],
        tasks: vec![
            Task::new("task_copy", "proj_alpha", "Write copy", TaskStatus::Blocked)
                .with_assignee("agent_bd"),
            Task::new("task_design", "proj_alpha", "Design", TaskStatus::InProgress)
                .with_assignee("agent_eng"),
            Task::new("task_plan", "proj_alpha", "Plan", TaskStatus::Planned),
            Task::new("task_beta", "proj_beta", "Beta work", TaskStatus::Planned),
        ],
        decisions: vec![Decision::new(
            "dec_copy",
            "proj_alpha",
            "Which tone?",
            DecisionStatus::Open,
        )
        .for_task("task_copy")],
        artifacts: vec![
            Artifact::new("art_design", "proj_alpha", "mockup", ArtifactStatus::Delivered)
                .for_task("task_design"),
        ],
    }
}

fn data(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn processor() -> CommandProcessor {
    CommandProcessor::new(Arc::new(InMemoryStore::seeded(&world()).unwrap()))
}

#[test]
fn resolve_then_resume_is_atomic_and_ordered() {
    let store = InMemoryStore::seeded(&world()).unwrap();
    let events = store
        .with_transaction(|tx| {
            tx.resolve_decision_and_resume_task("dec_copy", "task_copy", Some("playful"))
        })
        .unwrap();

    let names: Vec<&str> = events.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["decision_resolved", "task_started"]);
    assert_eq!(events[0].seq + 1, events[1].seq);

    store.read(|view| {
        assert_eq!(view.decision("dec_copy").unwrap().status, DecisionStatus::Resolved);
        assert_eq!(view.task("task_copy").unwrap().status, TaskStatus::InProgress);
        assert_eq!(view.events_since("proj_alpha", 0).len(), 2);
    });
}

#[test]
fn invalid_second_update_rolls_back_everything() {
    let store = InMemoryStore::seeded(&world()).unwrap();
    // task_design is already in progress, so the resume hop is illegal
    let err = store
        .with_transaction(|tx| {
            tx.resolve_decision_and_resume_task("dec_copy", "task_design", None)
        })
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::Conflict);

    store.read(|view| {
        assert_eq!(view.decision("dec_copy").unwrap().status, DecisionStatus::Open);
        assert!(view.events_since("proj_alpha", 0).is_empty());
        assert_eq!(view.latest_project_seq("proj_alpha"), 0);
    });
}

#[test]
fn approve_then_complete_emits_both_events() {
    let store = InMemoryStore::seeded(&world()).unwrap();
    let events = store
        .with_transaction(|tx| tx.approve_artifact_and_complete_task("art_design", "task_design"))
        .unwrap();
    let names: Vec<&str> = events.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["review_approved", "task_done"]);
    assert_eq!(events[1].participants, vec!["agent_eng".to_string()]);
}

#[test]
fn version_three_on_version_one_parent_is_rejected() {
    let store = InMemoryStore::seeded(&world()).unwrap();
    let mut skip = Artifact::new("art_design_v3", "proj_alpha", "mockup", ArtifactStatus::Created);
    skip.version = 3;
    skip.version_parent_id = Some("art_design".to_string());

    let err = store.with_transaction(|tx| tx.create_artifact(skip)).unwrap_err();
    assert!(matches!(err, RepositoryError::InvalidArtifact(_)));
    assert!(err.to_string().contains("must be 2"));
}

#[test]
fn audit_trail_spans_the_chain() {
    let store = InMemoryStore::seeded(&world()).unwrap();
    store
        .with_transaction(|tx| {
            tx.create_revision(RevisionRequest::new("art_design", "art_design_v2"))?;
            tx.append_event(
                wsync_repository::NewEvent::new("proj_alpha", "artifact_delivered")
                    .artifact("art_design"),
            )?;
            tx.append_event(
                wsync_repository::NewEvent::new("proj_alpha", "artifact_delivered")
                    .artifact("art_design_v2"),
            )
        })
        .unwrap();

    let trail = store.read(|view| view.audit_trail("art_design_v2")).unwrap();
    let versions: Vec<u32> = trail.viewer.version_history.iter().map(|a| a.version).collect();
    assert_eq!(versions, vec![1, 2]);
    let seqs: Vec<u64> = trail.audit_events.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![1, 2]);
    assert_eq!(trail.viewer.content_reference.version, 2);
}

#[tokio::test]
async fn resolve_decision_command_resumes_blocked_task() {
    let processor = processor();
    let result = processor
        .process(CommandRequest::new(
            "cmd_1",
            "resolve_decision",
            data(json!({"decision_id": "dec_copy", "choice": "  playful\n tone "})),
        ))
        .await;

    assert_eq!(result.outcome, CommandOutcome::Ack);
    assert_eq!(result.scope, "proj_alpha");
    let names: Vec<&str> = result.events.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["decision_resolved", "task_started"]);
    assert_eq!(result.events[0].meta["choice"], json!("playful tone"));
    assert_eq!(result.events[0].meta["in_reply_to"], json!("cmd_1"));
    assert_eq!(result.events[1].meta["command_name"], json!("resolve_decision"));
}

#[tokio::test]
async fn repeated_idempotency_key_replays_without_side_effects() {
    let processor = processor();
    let request = CommandRequest::new(
        "cmd_a",
        "assign_task",
        data(json!({"task_id": "task_plan", "agent_id": "agent_res"})),
    )
    .with_idempotency_key("assign-plan");

    let first = processor.process(request.clone()).await;
    assert!(first.outcome.is_ack());
    assert_eq!(first.events.len(), 1);

    let mut retry = request;
    retry.command_id = "cmd_b".to_string();
    let second = processor.process(retry).await;
    assert!(second.replayed);
    assert!(second.outcome.is_ack());
    assert!(second.events.is_empty());

    let events = processor
        .store()
        .read(|view| view.events_since("proj_alpha", 0).len());
    assert_eq!(events, 1);
}

#[tokio::test]
async fn retryable_errors_are_not_pinned_to_the_key() {
    let processor = processor();
    let request = CommandRequest::new(
        "cmd_x",
        "cancel_task",
        data(json!({"task_id": "task_plan", "confirm": true, "expected_task_status": "in_progress"})),
    );
    let first = processor.process(request.clone()).await;
    let second = processor.process(request).await;

    let expected = CommandOutcome::Rejected {
        code: ErrorCode::Conflict,
        message: "precondition failed: task status no longer matches expected_task_status"
            .to_string(),
    };
    assert_eq!(first.outcome, expected);
    assert_eq!(second.outcome, expected);
    assert!(!second.replayed);
}

#[tokio::test]
async fn retry_with_same_key_succeeds_once_the_cause_is_fixed() {
    let processor = processor();
    let request = CommandRequest::new(
        "cmd_1",
        "assign_task",
        data(json!({"task_id": "task_plan", "agent_id": "agent_new"})),
    )
    .with_idempotency_key("k1");

    let first = processor.process(request.clone()).await;
    assert!(matches!(
        first.outcome,
        CommandOutcome::Rejected { code: ErrorCode::NotFound, .. }
    ));

    processor
        .store()
        .with_transaction(|tx| tx.upsert_agent(Agent::new("agent_new")))
        .unwrap();

    let mut retry = request;
    retry.command_id = "cmd_2".to_string();
    let second = processor.process(retry).await;
    assert!(!second.replayed);
    assert!(second.outcome.is_ack());
    assert_eq!(second.events[0].name, "task_assigned");
}

#[tokio::test]
async fn final_rejections_replay_under_their_key() {
    let processor = processor();
    let pause = CommandRequest::new(
        "cmd_p",
        "pause_project",
        data(json!({"project_id": "proj_alpha"})),
    );
    assert!(processor.process(pause).await.outcome.is_ack());

    let assign = CommandRequest::new(
        "cmd_q",
        "assign_task",
        data(json!({"task_id": "task_plan", "agent_id": "agent_res"})),
    )
    .with_idempotency_key("assign-plan");
    let first = processor.process(assign.clone()).await;
    assert!(matches!(
        first.outcome,
        CommandOutcome::Rejected { code: ErrorCode::NotAllowed, .. }
    ));

    let resume = CommandRequest::new(
        "cmd_r",
        "resume_project",
        data(json!({"project_id": "proj_alpha"})),
    );
    assert!(processor.process(resume).await.outcome.is_ack());

    let second = processor.process(assign).await;
    assert!(second.replayed);
    assert_eq!(second.outcome, first.outcome);
}

#[tokio::test]
async fn command_id_receipts_are_bounded() {
    let processor = processor();
    for i in 0..RETAINED_COMMAND_ID_RECEIPTS + 5 {
        let request = CommandRequest::new(
            format!("cmd_{i}"),
            "player_pos",
            data(json!({"pos": [1.0, 0.0, 2.0]})),
        );
        assert!(processor.process(request).await.outcome.is_ack());
    }

    let (oldest, newest) = processor.store().read(|view| {
        (
            view.receipt(WORLD_SCOPE, "cmd_0").is_some(),
            view.receipt(WORLD_SCOPE, &format!("cmd_{}", RETAINED_COMMAND_ID_RECEIPTS + 4))
                .is_some(),
        )
    });
    assert!(!oldest);
    assert!(newest);
}

#[test]
fn explicit_event_seq_cannot_move_backwards() {
    let store = InMemoryStore::seeded(&world()).unwrap();
    let seqs = store
        .with_transaction(|tx| {
            let a = tx.append_event(NewEvent::new("proj_alpha", "a"))?.seq;
            let b = tx.append_event(NewEvent::new("proj_alpha", "b"))?.seq;
            Ok(vec![a, b])
        })
        .unwrap();
    assert_eq!(seqs, vec![1, 2]);

    for seq in [1, 2] {
        let mut draft = NewEvent::new("proj_alpha", "c");
        draft.seq = Some(seq);
        draft.id = Some(format!("custom_{seq}"));
        let err = store.with_transaction(|tx| tx.append_event(draft)).unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::SequenceRegression { current: 2, .. }
        ));
    }

    let mut ahead = NewEvent::new("proj_alpha", "d");
    ahead.seq = Some(5);
    let appended = store.with_transaction(|tx| tx.append_event(ahead)).unwrap();
    assert_eq!(appended.seq, 5);
    let next = store
        .with_transaction(|tx| tx.append_event(NewEvent::new("proj_alpha", "e")))
        .unwrap();
    assert_eq!(next.seq, 6);
}

#[tokio::test]
async fn paused_project_blocks_dispatch() {
    let processor = processor();
    let paused = processor
        .process(CommandRequest::new(
            "cmd_p",
            "pause_project",
            data(json!({"project_id": "proj_alpha", "scope": "DISPATCH_ONLY"})),
        ))
        .await;
    assert!(paused.outcome.is_ack());
    assert_eq!(paused.events[0].name, "project_paused");
    assert_eq!(paused.events[0].meta["scope"], json!("dispatch_only"));

    let assign = processor
        .process(CommandRequest::new(
            "cmd_q",
            "assign_task",
            data(json!({"task_id": "task_plan", "agent_id": "agent_res"})),
        ))
        .await;
    assert!(matches!(
        assign.outcome,
        CommandOutcome::Rejected { code: ErrorCode::NotAllowed, .. }
    ));

    let resumed = processor
        .process(CommandRequest::new(
            "cmd_r",
            "resume_project",
            data(json!({"project_id": "proj_alpha"})),
        ))
        .await;
    assert!(resumed.outcome.is_ack());
    let status = processor
        .store()
        .read(|view| view.project("proj_alpha").map(|p| p.status));
    assert_eq!(status, Some(ProjectStatus::Executing));
}

#[tokio::test]
async fn unknown_keys_are_validation_failures() {
    let processor = processor();
    let result = processor
        .process(CommandRequest::new(
            "cmd_v",
            "auto_assign",
            data(json!({"project_id": "proj_alpha", "priority": 3})),
        ))
        .await;
    assert!(matches!(
        result.outcome,
        CommandOutcome::Rejected { code: ErrorCode::ValidationFailed, .. }
    ));
}

#[tokio::test]
async fn submit_request_creates_project_and_tasks() {
    let processor = processor();
    let result = processor
        .process(CommandRequest::new(
            "cmd_s",
            "submit_request",
            data(json!({"text": "Plan a launch. Write the blog post; Ship it"})),
        ))
        .await;
    assert!(result.outcome.is_ack());
    assert_eq!(result.scope, "world");
    let names: Vec<&str> = result.events.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["kickoff_started", "tasks_created"]);
    assert_eq!(
        result.events[1].meta["task_ids"],
        json!(["task_req_001_01", "task_req_001_02", "task_req_001_03"])
    );
    let project = processor
        .store()
        .read(|view| view.project("proj_req_001").cloned())
        .unwrap();
    assert_eq!(project.status, ProjectStatus::Planning);
}

#[tokio::test]
async fn request_changes_blocks_task_behind_a_decision() {
    let processor = processor();
    let result = processor
        .process(CommandRequest::new(
            "cmd_c",
            "request_changes",
            data(json!({"artifact_id": "art_design", "instructions": "Bigger logo"})),
        ))
        .await;
    assert!(result.outcome.is_ack());
    assert_eq!(result.events[0].name, "review_changes_requested");
    assert_eq!(result.events[0].meta["revision_artifact_id"], json!("art_design_v2"));

    processor.store().read(|view| {
        assert_eq!(view.task("task_design").unwrap().status, TaskStatus::Blocked);
        assert_eq!(view.open_decisions("proj_alpha").len(), 2);
        assert_eq!(
            view.artifact("art_design").unwrap().status,
            ArtifactStatus::ChangesRequested
        );
        assert_eq!(
            view.artifact("art_design_v2").unwrap().status,
            ArtifactStatus::Delivered
        );
    });
}

#[tokio::test]
async fn concurrent_commands_on_one_project_serialize() {
    let processor = Arc::new(processor());
    let mut handles = Vec::new();
    for (i, task) in ["task_plan", "task_beta"].iter().enumerate() {
        let processor = Arc::clone(&processor);
        let task = (*task).to_string();
        handles.push(tokio::spawn(async move {
            processor
                .process(CommandRequest::new(
                    format!("cmd_{i}"),
                    "cancel_task",
                    data(json!({"task_id": task, "confirm": true})),
                ))
                .await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().outcome.is_ack());
    }
    processor.store().read(|view| {
        assert_eq!(view.latest_project_seq("proj_alpha"), 1);
        assert_eq!(view.latest_project_seq("proj_beta"), 1);
    });
}

#[tokio::test]
async fn attached_timeline_receives_events_in_command_order() {
    let timeline = Arc::new(EventTimeline::default());
    let processor = CommandProcessor::new(Arc::new(InMemoryStore::seeded(&world()).unwrap()))
        .with_timeline(Arc::clone(&timeline));

    let resolved = processor
        .process(CommandRequest::new(
            "cmd_1",
            "resolve_decision",
            data(json!({"decision_id": "dec_copy", "choice": "playful"})),
        ))
        .await;
    let beta = processor
        .process(CommandRequest::new(
            "cmd_2",
            "cancel_task",
            data(json!({"task_id": "task_beta", "confirm": true})),
        ))
        .await;

    let wire: Vec<u64> = resolved.published.iter().map(|e| e.seq).collect();
    assert_eq!(wire, vec![1, 2]);
    // per-project seq restarts for proj_beta, the wire seq does not
    assert_eq!(beta.events[0].seq, 1);
    assert_eq!(beta.published[0].seq, 3);
    assert_eq!(timeline.latest_seq(), 3);
    assert!(timeline.verify_integrity().is_ok());
}
