//! Testing utilities for the wsync workspace
//!
//! Shared seed worlds, frame builders and assertions.

#![allow(missing_docs)]

use serde_json::{Map, Value};
use wsync_envelope::{
    decode, encode, Channels, ClientIdentity, CommandPayload, Envelope, ErrorCode, HelloResume,
    Message,
};
use wsync_lifecycle::{
    Agent, Artifact, ArtifactStatus, Decision, DecisionStatus, Project, ProjectStatus, Task,
    TaskStatus, WorldSnapshot,
};

pub const SCENE_ID: &str = "cozy_office_v0";

/// Office world with one blocked task behind an open decision and one
/// delivered artifact awaiting review.
pub fn office_world() -> WorldSnapshot {
    WorldSnapshot {
        scene_id: Some(SCENE_ID.to_string()),
        projects: vec![
            Project::new("proj_alpha", "Alpha launch", ProjectStatus::Executing),
            Project::new("proj_beta", "Beta research", ProjectStatus::Executing),
        ],
        agents: vec![
            Agent::new("agent_bd").on_task("task_copy"),
            Agent::new("agent_eng").on_task("task_design"),
            Agent::new("agent_res"),
        ],
        tasks: vec![
            Task::new("task_copy", "proj_alpha", "Write launch copy", TaskStatus::Blocked)
                .with_assignee("agent_bd"),
            Task::new("task_design", "proj_alpha", "Design landing page", TaskStatus::InProgress)
                .with_assignee("agent_eng"),
            Task::new("task_plan", "proj_alpha", "Plan rollout", TaskStatus::Planned),
            Task::new("task_beta", "proj_beta", "Survey users", TaskStatus::Planned),
        ],
        decisions: vec![
            Decision::new("dec_copy", "proj_alpha", "Which tone?", DecisionStatus::Open)
                .for_task("task_copy"),
        ],
        artifacts: vec![
            Artifact::new("art_design", "proj_alpha", "mockup", ArtifactStatus::Delivered)
                .for_task("task_design"),
        ],
    }
}

pub fn client_identity() -> ClientIdentity {
    ClientIdentity::new("wsync-tests", "dev", "linux")
}

/// JSON object literal as command data
pub fn data(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("command data must be an object, got {other}"),
    }
}

pub fn hello_frame(last_seq: Option<i64>) -> String {
    let resume = HelloResume {
        last_seq,
        last_snapshot_id: None,
        scene_id: SCENE_ID.to_string(),
    };
    encode(&Envelope::hello(client_identity(), resume)).unwrap()
}

pub fn subscribe_frame() -> String {
    encode(&Envelope::subscribe(SCENE_ID, Channels::all())).unwrap()
}

pub fn command_envelope(id: &str, name: &str, data: Map<String, Value>) -> Envelope {
    Envelope::command(name, data).with_id(id)
}

pub fn command_frame(id: &str, name: &str, data: Map<String, Value>) -> String {
    encode(&command_envelope(id, name, data)).unwrap()
}

pub fn keyed_command_frame(id: &str, name: &str, data: Map<String, Value>, key: &str) -> String {
    let envelope = Envelope::new(Message::Command(CommandPayload {
        name: name.to_string(),
        data,
        idempotency_key: Some(key.to_string()),
    }))
    .with_id(id);
    encode(&envelope).unwrap()
}

pub fn decode_all(frames: &[String]) -> Vec<Envelope> {
    frames.iter().map(|f| decode(f).unwrap()).collect()
}

/// Wire type names, in order
pub fn types(envelopes: &[Envelope]) -> Vec<&'static str> {
    envelopes.iter().map(|e| e.message_type().as_str()).collect()
}

/// Event names, in order, skipping other envelopes
pub fn event_names(envelopes: &[Envelope]) -> Vec<String> {
    envelopes
        .iter()
        .filter_map(|e| match &e.message {
            Message::Event(event) => Some(event.name.clone()),
            _ => None,
        })
        .collect()
}

/// Event seqs, in order, skipping other envelopes
pub fn event_seqs(envelopes: &[Envelope]) -> Vec<u64> {
    envelopes
        .iter()
        .filter_map(|e| match &e.message {
            Message::Event(event) => Some(event.seq),
            _ => None,
        })
        .collect()
}

#[track_caller]
pub fn assert_error(envelope: &Envelope, in_reply_to: &str, code: ErrorCode) {
    match &envelope.message {
        Message::Error(p) => {
            assert_eq!(p.in_reply_to, in_reply_to, "error answers the wrong id");
            assert_eq!(p.code, code, "unexpected error code: {}", p.message);
        }
        other => panic!("expected error, got {other:?}"),
    }
}

#[track_caller]
pub fn assert_ack(envelope: &Envelope, in_reply_to: &str) {
    match &envelope.message {
        Message::Ack(p) => assert_eq!(p.in_reply_to, in_reply_to),
        other => panic!("expected ack, got {other:?}"),
    }
}
