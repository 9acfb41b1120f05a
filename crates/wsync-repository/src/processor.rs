//! Receipt-aware command processing
//!
//! A command is sanitized, routed to the project it touches, serialized
//! behind that project's async lock and applied in one store transaction
//! together with its ack receipt. A repeated idempotency key short-circuits
//! to the recorded outcome without touching the world again.

use crate::error::{RepositoryError, Result};
use crate::metrics;
use crate::records::{CommandReceipt, NewEvent, ReceiptOutcome, RevisionRequest, WorldEvent};
use crate::store::InMemoryStore;
use crate::timeline::EventTimeline;
use crate::transaction::Transaction;
use crate::view::ReadView;
use dashmap::DashMap;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use wsync_envelope::{
    validate_and_sanitize, CommandData, ErrorCode, EventPayload, PauseScope, RerunMode,
};
use wsync_lifecycle::{
    ArtifactStatus, DecisionStatus, Lifecycle, Project, ProjectStatus, Task, TaskStatus,
};

/// Scope for commands that do not touch a project
pub const WORLD_SCOPE: &str = "world";

/// Receipts kept for commands sent without an idempotency key
pub const RETAINED_COMMAND_ID_RECEIPTS: usize = 1024;

/// Title length used for generated projects and task titles
const GENERATED_TITLE_MAX: usize = 80;

/// Command as received from a client
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRequest {
    pub command_id: String,
    pub name: String,
    pub data: Map<String, Value>,
    pub idempotency_key: Option<String>,
}

impl CommandRequest {
    #[must_use]
    pub fn new(
        command_id: impl Into<String>,
        name: impl Into<String>,
        data: Map<String, Value>,
    ) -> Self {
        Self {
            command_id: command_id.into(),
            name: name.into(),
            data,
            idempotency_key: None,
        }
    }

    #[must_use]
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Explicit key, else the command id
    #[must_use]
    pub fn idempotency_key(&self) -> &str {
        self.idempotency_key.as_deref().unwrap_or(&self.command_id)
    }

    /// Record `receipt` under this request's key policy
    fn record(&self, tx: &mut Transaction<'_>, receipt: CommandReceipt) {
        if self.idempotency_key.is_some() {
            tx.record_receipt(receipt);
        } else {
            tx.record_transient_receipt(receipt, RETAINED_COMMAND_ID_RECEIPTS);
        }
    }
}

/// Terminal outcome of a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Ack,
    Rejected { code: ErrorCode, message: String },
}

impl CommandOutcome {
    #[must_use]
    pub fn is_ack(&self) -> bool {
        matches!(self, Self::Ack)
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Ack => "ack",
            Self::Rejected { code, .. } => code.as_str(),
        }
    }
}

impl From<&ReceiptOutcome> for CommandOutcome {
    fn from(outcome: &ReceiptOutcome) -> Self {
        match outcome {
            ReceiptOutcome::Ack => Self::Ack,
            ReceiptOutcome::Error { code, message } => Self::Rejected {
                code: *code,
                message: message.clone(),
            },
        }
    }
}

/// Result of processing one command
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedCommand {
    pub command_id: String,
    pub command_name: String,
    /// Project id the command was serialized on, or [`WORLD_SCOPE`]
    pub scope: String,
    pub outcome: CommandOutcome,
    /// Events appended by this execution; empty on replay or rejection
    pub events: Vec<WorldEvent>,
    /// Wire form of `events` when a timeline is attached
    pub published: Vec<EventPayload>,
    /// Answered from a stored receipt
    pub replayed: bool,
}

/// Applies catalog commands to a shared store
#[derive(Debug)]
pub struct CommandProcessor {
    store: Arc<InMemoryStore>,
    timeline: Option<Arc<EventTimeline>>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl CommandProcessor {
    #[must_use]
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self {
            store,
            timeline: None,
            locks: DashMap::new(),
        }
    }

    /// Publish applied events to `timeline` before the scope lock is released
    #[must_use]
    pub fn with_timeline(mut self, timeline: Arc<EventTimeline>) -> Self {
        self.timeline = Some(timeline);
        self
    }

    /// Attached timeline, if any
    #[must_use]
    pub fn timeline(&self) -> Option<&Arc<EventTimeline>> {
        self.timeline.as_ref()
    }

    /// Backing store
    #[must_use]
    pub fn store(&self) -> &Arc<InMemoryStore> {
        &self.store
    }

    /// Process a command exactly once per idempotency key
    pub async fn process(&self, request: CommandRequest) -> ProcessedCommand {
        let sanitized = match validate_and_sanitize(&request.name, &request.data) {
            Ok(sanitized) => sanitized,
            Err(err) => {
                tracing::warn!(
                    command_id = %request.command_id,
                    command = %request.name,
                    error = %err,
                    "command rejected by catalog"
                );
                let outcome = CommandOutcome::Rejected {
                    code: err.error_code(),
                    message: err.to_string(),
                };
                metrics::record_command(&request.name, outcome.label());
                return ProcessedCommand {
                    command_id: request.command_id,
                    command_name: request.name,
                    scope: WORLD_SCOPE.to_string(),
                    outcome,
                    events: Vec::new(),
                    published: Vec::new(),
                    replayed: false,
                };
            }
        };
        let data = sanitized.data;
        let scope = self.store.read(|view| scope_for(view, &data));

        let lock = self.locks.entry(scope.clone()).or_default().clone();
        let waiting = Instant::now();
        let _guard = lock.lock().await;
        metrics::record_lock_wait(waiting.elapsed().as_secs_f64());

        let key = request.idempotency_key().to_string();
        if let Some(receipt) = self.store.read(|view| view.receipt(&scope, &key).cloned()) {
            tracing::debug!(
                command_id = %request.command_id,
                original_command_id = %receipt.command_id,
                project_id = %scope,
                "command answered from receipt"
            );
            metrics::record_replay(&request.name);
            return ProcessedCommand {
                command_id: request.command_id,
                command_name: request.name,
                scope,
                outcome: CommandOutcome::from(&receipt.outcome),
                events: Vec::new(),
                published: Vec::new(),
                replayed: true,
            };
        }

        let receipt = |outcome: ReceiptOutcome| CommandReceipt {
            project_id: scope.clone(),
            idempotency_key: key.clone(),
            command_id: request.command_id.clone(),
            command_name: request.name.clone(),
            outcome,
            created_ts: None,
        };

        let mut event_meta = Map::new();
        event_meta.insert("in_reply_to".to_string(), json!(request.command_id));
        event_meta.insert("command_name".to_string(), json!(request.name));

        let applied = self.store.with_transaction(|tx| {
            tx.set_event_meta(event_meta);
            let events = apply(tx, &data)?;
            request.record(tx, receipt(ReceiptOutcome::Ack));
            Ok(events)
        });

        let (outcome, events) = match applied {
            Ok(events) => {
                tracing::info!(
                    command_id = %request.command_id,
                    command = %request.name,
                    project_id = %scope,
                    events = events.len(),
                    "command applied"
                );
                metrics::record_events(&request.name, events.len());
                (CommandOutcome::Ack, events)
            }
            Err(err) => {
                tracing::warn!(
                    command_id = %request.command_id,
                    command = %request.name,
                    project_id = %scope,
                    error = %err,
                    "command rejected"
                );
                let code = err.error_code();
                let message = err.to_string();
                // A retry may succeed once the cause is gone, so only final
                // rejections are pinned to the key
                if !code.is_retryable() {
                    let recorded = self.store.with_transaction(|tx| {
                        request.record(
                            tx,
                            receipt(ReceiptOutcome::Error {
                                code,
                                message: message.clone(),
                            }),
                        );
                        Ok(())
                    });
                    if let Err(err) = recorded {
                        tracing::error!(error = %err, "failed to record error receipt");
                    }
                }
                (CommandOutcome::Rejected { code, message }, Vec::new())
            }
        };
        metrics::record_command(&request.name, outcome.label());

        let published = match &self.timeline {
            Some(timeline) => events.iter().map(|event| timeline.append(event)).collect(),
            None => Vec::new(),
        };

        ProcessedCommand {
            command_id: request.command_id,
            command_name: request.name,
            scope,
            outcome,
            events,
            published,
            replayed: false,
        }
    }
}

/// Project a command touches, resolved from committed state
fn scope_for(view: &ReadView<'_>, data: &CommandData) -> String {
    let project = match data {
        CommandData::AssignTask { task_id, .. }
        | CommandData::ReassignTask { task_id, .. }
        | CommandData::CancelTask { task_id, .. }
        | CommandData::RerunTask {
            source_task_id: task_id,
            ..
        } => view.task(task_id).map(|t| t.project_id.clone()),
        CommandData::ResolveDecision { decision_id, .. } => {
            view.decision(decision_id).map(|d| d.project_id.clone())
        }
        CommandData::ApproveArtifact { artifact_id }
        | CommandData::RequestChanges { artifact_id, .. }
        | CommandData::SplitIntoTasks { artifact_id, .. } => {
            view.artifact(artifact_id).map(|a| a.project_id.clone())
        }
        CommandData::AutoAssign { project_id }
        | CommandData::PauseProject { project_id, .. }
        | CommandData::ResumeProject { project_id, .. } => Some(project_id.clone()),
        CommandData::StartKickoff { project_id } => project_id.clone(),
        CommandData::SubmitRequest { .. }
        | CommandData::PlayerPos { .. }
        | CommandData::MovePlayerTo { .. } => None,
    };
    project.unwrap_or_else(|| WORLD_SCOPE.to_string())
}

fn apply(tx: &mut Transaction<'_>, data: &CommandData) -> Result<Vec<WorldEvent>> {
    match data {
        CommandData::SubmitRequest { text } => submit_request(tx, text),
        CommandData::AssignTask { task_id, agent_id } => assign_task(tx, task_id, agent_id),
        CommandData::AutoAssign { project_id } => auto_assign(tx, project_id),
        CommandData::ResolveDecision {
            decision_id,
            choice,
        } => resolve_decision(tx, decision_id, choice),
        CommandData::ApproveArtifact { artifact_id } => approve_artifact(tx, artifact_id),
        CommandData::RequestChanges {
            artifact_id,
            instructions,
        } => request_changes(tx, artifact_id, instructions),
        CommandData::SplitIntoTasks {
            artifact_id,
            task_titles,
        } => split_into_tasks(tx, artifact_id, task_titles),
        CommandData::PlayerPos { .. } | CommandData::MovePlayerTo { .. } => Ok(Vec::new()),
        CommandData::StartKickoff { project_id } => start_kickoff(tx, project_id.as_deref()),
        CommandData::ReassignTask {
            task_id,
            to_agent_id,
            from_agent_id,
            reason,
            expected_task_status,
        } => reassign_task(
            tx,
            task_id,
            to_agent_id,
            from_agent_id.as_deref(),
            reason.as_deref(),
            *expected_task_status,
        ),
        CommandData::CancelTask {
            task_id,
            reason,
            expected_task_status,
            ..
        } => cancel_task(tx, task_id, reason.as_deref(), *expected_task_status),
        CommandData::PauseProject {
            project_id,
            scope,
            reason,
            expected_project_status,
        } => pause_project(
            tx,
            project_id,
            *scope,
            reason.as_deref(),
            *expected_project_status,
        ),
        CommandData::ResumeProject {
            project_id,
            reason,
            expected_project_status,
        } => resume_project(tx, project_id, reason.as_deref(), *expected_project_status),
        CommandData::RerunTask {
            source_task_id,
            mode,
            reason,
            constraints_patch,
        } => rerun_task(
            tx,
            source_task_id,
            *mode,
            reason.as_deref(),
            constraints_patch.as_ref(),
        ),
    }
}

// Commands

fn submit_request(tx: &mut Transaction<'_>, text: &str) -> Result<Vec<WorldEvent>> {
    let project_id = {
        let view = tx.view();
        free_id("proj_req", |id| view.project(id).is_some())
    };
    let title: String = text.chars().take(GENERATED_TITLE_MAX).collect();
    tx.create_project(Project::new(&project_id, title, ProjectStatus::Planning))?;

    let mut task_ids = Vec::new();
    for (index, title) in decompose_request(text).into_iter().enumerate() {
        let task_id = format!("task_{}_{:02}", project_id.trim_start_matches("proj_"), index + 1);
        tx.create_task(Task::new(&task_id, &project_id, title, TaskStatus::Planned))?;
        task_ids.push(task_id);
    }

    let kickoff = tx.append_event(NewEvent::new(&project_id, "kickoff_started"))?;
    let created =
        tx.append_event(NewEvent::new(&project_id, "tasks_created").meta("task_ids", task_ids))?;
    Ok(vec![kickoff, created])
}

fn assign_task(tx: &mut Transaction<'_>, task_id: &str, agent_id: &str) -> Result<Vec<WorldEvent>> {
    let task = require_task(&tx.view(), task_id)?;
    if tx.view().is_paused(&task.project_id) {
        return Err(RepositoryError::NotAllowed(
            "project dispatch is paused".to_string(),
        ));
    }
    tx.assign_task(task_id, agent_id)?;
    let event = tx.append_event(
        NewEvent::new(&task.project_id, "task_assigned")
            .task(task_id)
            .agent(Some(agent_id.to_string())),
    )?;
    Ok(vec![event])
}

fn auto_assign(tx: &mut Transaction<'_>, project_id: &str) -> Result<Vec<WorldEvent>> {
    let (idle, pending) = {
        let view = tx.view();
        if view.project(project_id).is_none() {
            return Err(RepositoryError::not_found("Project", project_id));
        }
        if view.is_paused(project_id) {
            return Err(RepositoryError::NotAllowed(
                "project dispatch is paused".to_string(),
            ));
        }
        let idle: Vec<String> = view
            .agents()
            .into_iter()
            .filter(|a| a.task_id.is_none())
            .map(|a| a.agent_id.clone())
            .collect();
        let pending: Vec<String> = view
            .tasks_by_project(project_id, None)
            .into_iter()
            .filter(|t| t.assignee.is_none() && !t.status.is_terminal())
            .map(|t| t.task_id.clone())
            .collect();
        (idle, pending)
    };

    let mut events = Vec::new();
    for (agent_id, task_id) in idle.into_iter().zip(pending) {
        tx.assign_task(&task_id, &agent_id)?;
        events.push(
            tx.append_event(
                NewEvent::new(project_id, "task_assigned")
                    .task(&task_id)
                    .agent(Some(agent_id))
                    .meta("assignment_mode", "auto"),
            )?,
        );
    }
    Ok(events)
}

fn resolve_decision(
    tx: &mut Transaction<'_>,
    decision_id: &str,
    choice: &str,
) -> Result<Vec<WorldEvent>> {
    let (decision, blocked_task) = {
        let view = tx.view();
        let decision = view
            .decision(decision_id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found("Decision", decision_id))?;
        let blocked_task = decision
            .task_id
            .as_deref()
            .and_then(|id| view.task(id))
            .filter(|t| t.status == TaskStatus::Blocked)
            .map(|t| t.task_id.clone());
        (decision, blocked_task)
    };
    if decision.status != DecisionStatus::Open {
        return Err(RepositoryError::Precondition(format!(
            "decision {decision_id} is {}",
            decision.status
        )));
    }

    if let Some(task_id) = blocked_task {
        return tx.resolve_decision_and_resume_task(decision_id, &task_id, Some(choice));
    }
    tx.update_decision_status(decision_id, DecisionStatus::Resolved)?;
    let mut draft = NewEvent::new(&decision.project_id, "decision_resolved")
        .decision(decision_id)
        .meta("choice", choice);
    draft.task_id = decision.task_id;
    Ok(vec![tx.append_event(draft)?])
}

fn approve_artifact(tx: &mut Transaction<'_>, artifact_id: &str) -> Result<Vec<WorldEvent>> {
    let artifact = require_artifact(&tx.view(), artifact_id)?;
    match artifact.status {
        ArtifactStatus::Delivered | ArtifactStatus::InReview => {}
        ArtifactStatus::ChangesRequested => {
            tx.update_artifact_status(artifact_id, ArtifactStatus::InReview)?;
        }
        other => {
            return Err(RepositoryError::Precondition(format!(
                "artifact {artifact_id} cannot be approved while {other}"
            )))
        }
    }

    let working_task = artifact
        .task_id
        .as_deref()
        .and_then(|id| tx.view().task(id).cloned())
        .filter(|t| t.status == TaskStatus::InProgress);

    let events = match working_task {
        Some(task) => tx.approve_artifact_and_complete_task(artifact_id, &task.task_id)?,
        None => {
            tx.update_artifact_status(artifact_id, ArtifactStatus::Approved)?;
            let mut draft = NewEvent::new(&artifact.project_id, "review_approved")
                .artifact(artifact_id)
                .meta("version", artifact.version);
            draft.task_id = artifact.task_id.clone();
            vec![tx.append_event(draft)?]
        }
    };
    supersede_older_versions(tx, &artifact.artifact_id, artifact.version)?;
    Ok(events)
}

fn request_changes(
    tx: &mut Transaction<'_>,
    artifact_id: &str,
    instructions: &str,
) -> Result<Vec<WorldEvent>> {
    let artifact = require_artifact(&tx.view(), artifact_id)?;
    match artifact.status {
        ArtifactStatus::Approved => {
            return Err(RepositoryError::Precondition(
                "cannot request changes after approval".to_string(),
            ))
        }
        ArtifactStatus::Delivered => {
            tx.update_artifact_status(artifact_id, ArtifactStatus::InReview)?;
            tx.update_artifact_status(artifact_id, ArtifactStatus::ChangesRequested)?;
        }
        ArtifactStatus::InReview => {
            tx.update_artifact_status(artifact_id, ArtifactStatus::ChangesRequested)?;
        }
        ArtifactStatus::ChangesRequested => {}
        other => {
            return Err(RepositoryError::Precondition(format!(
                "artifact {artifact_id} cannot be revised while {other}"
            )))
        }
    }

    let revision_id = format!("{}_v{}", artifact.root_id(), artifact.version + 1);
    tx.create_revision(RevisionRequest::new(artifact_id, &revision_id))?;
    tx.update_artifact_status(&revision_id, ArtifactStatus::Delivered)?;

    let mut draft = NewEvent::new(&artifact.project_id, "review_changes_requested")
        .artifact(artifact_id)
        .meta("instructions", instructions)
        .meta("revision_artifact_id", revision_id.as_str());

    let live_task = artifact
        .task_id
        .as_deref()
        .and_then(|id| tx.view().task(id).cloned())
        .filter(|t| !t.status.is_terminal());
    if let Some(task) = live_task {
        let open = tx
            .view()
            .open_decisions(&task.project_id)
            .into_iter()
            .find(|d| d.task_id.as_deref() == Some(task.task_id.as_str()))
            .map(|d| d.decision_id.clone());
        let decision_id = match open {
            Some(id) => id,
            None => {
                let id = {
                    let view = tx.view();
                    free_id(&format!("dec_{}", task.task_id), |id| {
                        view.decision(id).is_some()
                    })
                };
                tx.create_decision(
                    wsync_lifecycle::Decision::new(
                        &id,
                        &task.project_id,
                        instructions,
                        DecisionStatus::Open,
                    )
                    .for_task(&task.task_id),
                )?;
                id
            }
        };
        if task.status == TaskStatus::InProgress {
            tx.update_task_status(&task.task_id, TaskStatus::Blocked)?;
        }
        draft = draft
            .task(&task.task_id)
            .decision(decision_id)
            .agent(task.assignee.clone());
    }
    Ok(vec![tx.append_event(draft)?])
}

fn split_into_tasks(
    tx: &mut Transaction<'_>,
    artifact_id: &str,
    titles: &[String],
) -> Result<Vec<WorldEvent>> {
    let artifact = require_artifact(&tx.view(), artifact_id)?;
    match artifact.status {
        ArtifactStatus::Delivered => {
            tx.update_artifact_status(artifact_id, ArtifactStatus::InReview)?;
        }
        ArtifactStatus::InReview | ArtifactStatus::ChangesRequested => {}
        other => {
            return Err(RepositoryError::Precondition(format!(
                "artifact {artifact_id} cannot be split while {other}"
            )))
        }
    }

    let mut task_ids = Vec::with_capacity(titles.len());
    for title in titles {
        let task_id = {
            let view = tx.view();
            free_id("task_split", |id| view.task(id).is_some())
        };
        tx.create_task(Task::new(
            &task_id,
            &artifact.project_id,
            title.as_str(),
            TaskStatus::Planned,
        ))?;
        task_ids.push(task_id);
    }
    let event = tx.append_event(
        NewEvent::new(&artifact.project_id, "tasks_created")
            .artifact(artifact_id)
            .meta("task_ids", task_ids),
    )?;
    Ok(vec![event])
}

fn start_kickoff(tx: &mut Transaction<'_>, project_id: Option<&str>) -> Result<Vec<WorldEvent>> {
    let project = {
        let view = tx.view();
        match project_id {
            Some(id) => view
                .project(id)
                .cloned()
                .ok_or_else(|| RepositoryError::not_found("Project", id))?,
            None => view
                .projects_by_status(ProjectStatus::Created)
                .first()
                .map(|p| (*p).clone())
                .or_else(|| view.to_snapshot(None).projects.into_iter().next())
                .ok_or_else(|| RepositoryError::not_found("Project", "(any)"))?,
        }
    };
    if project.status == ProjectStatus::Created {
        tx.update_project_status(&project.project_id, ProjectStatus::Planning)?;
    }
    Ok(vec![tx.append_event(NewEvent::new(
        &project.project_id,
        "kickoff_started",
    ))?])
}

fn reassign_task(
    tx: &mut Transaction<'_>,
    task_id: &str,
    to_agent_id: &str,
    from_agent_id: Option<&str>,
    reason: Option<&str>,
    expected: Option<TaskStatus>,
) -> Result<Vec<WorldEvent>> {
    let task = require_task(&tx.view(), task_id)?;
    expect_task_status(&task, expected)?;
    if let Some(from) = from_agent_id {
        if task.assignee.as_deref() != Some(from) {
            return Err(RepositoryError::Precondition(
                "task assignee no longer matches from_agent_id".to_string(),
            ));
        }
    }
    if task.status.is_terminal() {
        return Err(RepositoryError::NotAllowed(
            "cannot reassign terminal task".to_string(),
        ));
    }
    if task.status == TaskStatus::InProgress {
        return Err(RepositoryError::NotAllowed(
            "cannot reassign in_progress task without pause semantics".to_string(),
        ));
    }
    tx.assign_task(task_id, to_agent_id)?;
    let mut draft = NewEvent::new(&task.project_id, "task_reassigned")
        .task(task_id)
        .agent(Some(to_agent_id.to_string()))
        .meta("from_agent_id", task.assignee.clone());
    if let Some(reason) = reason {
        draft = draft.meta("reason", reason);
    }
    Ok(vec![tx.append_event(draft)?])
}

fn cancel_task(
    tx: &mut Transaction<'_>,
    task_id: &str,
    reason: Option<&str>,
    expected: Option<TaskStatus>,
) -> Result<Vec<WorldEvent>> {
    let task = require_task(&tx.view(), task_id)?;
    expect_task_status(&task, expected)?;
    if task.status.is_terminal() {
        return Err(RepositoryError::NotAllowed(
            "cannot cancel terminal task".to_string(),
        ));
    }
    tx.update_task_status(task_id, TaskStatus::Cancelled)?;
    let open: Vec<String> = tx
        .view()
        .open_decisions(&task.project_id)
        .into_iter()
        .filter(|d| d.task_id.as_deref() == Some(task_id))
        .map(|d| d.decision_id.clone())
        .collect();
    for decision_id in open {
        tx.update_decision_status(&decision_id, DecisionStatus::Cancelled)?;
    }
    let previous = tx.release_task(task_id)?;

    let mut draft = NewEvent::new(&task.project_id, "task_cancelled")
        .task(task_id)
        .agent(previous);
    if let Some(reason) = reason {
        draft = draft.meta("reason", reason);
    }
    Ok(vec![tx.append_event(draft)?])
}

fn pause_project(
    tx: &mut Transaction<'_>,
    project_id: &str,
    scope: PauseScope,
    reason: Option<&str>,
    expected: Option<ProjectStatus>,
) -> Result<Vec<WorldEvent>> {
    let project = require_project(&tx.view(), project_id)?;
    expect_project_status(&project, expected)?;
    tx.set_paused(project_id, true)?;
    if project.status.allowed_transitions().contains(&ProjectStatus::Blocked) {
        tx.update_project_status(project_id, ProjectStatus::Blocked)?;
    }
    let scope = match scope {
        PauseScope::DispatchOnly => "dispatch_only",
    };
    let mut draft = NewEvent::new(project_id, "project_paused").meta("scope", scope);
    if let Some(reason) = reason {
        draft = draft.meta("reason", reason);
    }
    Ok(vec![tx.append_event(draft)?])
}

fn resume_project(
    tx: &mut Transaction<'_>,
    project_id: &str,
    reason: Option<&str>,
    expected: Option<ProjectStatus>,
) -> Result<Vec<WorldEvent>> {
    let project = require_project(&tx.view(), project_id)?;
    expect_project_status(&project, expected)?;
    tx.set_paused(project_id, false)?;
    if project.status == ProjectStatus::Blocked {
        tx.update_project_status(project_id, ProjectStatus::Executing)?;
    }
    let mut draft = NewEvent::new(project_id, "project_resumed");
    if let Some(reason) = reason {
        draft = draft.meta("reason", reason);
    }
    Ok(vec![tx.append_event(draft)?])
}

fn rerun_task(
    tx: &mut Transaction<'_>,
    source_task_id: &str,
    mode: RerunMode,
    reason: Option<&str>,
    constraints_patch: Option<&Map<String, Value>>,
) -> Result<Vec<WorldEvent>> {
    let source = require_task(&tx.view(), source_task_id)?;
    if !source.status.is_terminal() {
        return Err(RepositoryError::NotAllowed(
            "rerun_task is allowed only for done or cancelled tasks".to_string(),
        ));
    }
    let task_id = {
        let view = tx.view();
        free_id("task_rerun", |id| view.task(id).is_some())
    };
    tx.create_task(Task::new(
        &task_id,
        &source.project_id,
        format!("{} (rerun)", source.title),
        TaskStatus::Planned,
    ))?;
    let mode = match mode {
        RerunMode::CloneAsNew => "clone_as_new",
    };
    let mut draft = NewEvent::new(&source.project_id, "tasks_created")
        .task(source_task_id)
        .meta("rerun_mode", mode)
        .meta("task_ids", vec![task_id]);
    if let Some(reason) = reason {
        draft = draft.meta("reason", reason);
    }
    if let Some(patch) = constraints_patch {
        draft = draft.meta("constraints_patch", Value::Object(patch.clone()));
    }
    Ok(vec![tx.append_event(draft)?])
}

// Helpers

fn require_task(view: &ReadView<'_>, task_id: &str) -> Result<Task> {
    view.task(task_id)
        .cloned()
        .ok_or_else(|| RepositoryError::not_found("Task", task_id))
}

fn require_project(view: &ReadView<'_>, project_id: &str) -> Result<Project> {
    view.project(project_id)
        .cloned()
        .ok_or_else(|| RepositoryError::not_found("Project", project_id))
}

fn require_artifact(view: &ReadView<'_>, artifact_id: &str) -> Result<wsync_lifecycle::Artifact> {
    view.artifact(artifact_id)
        .cloned()
        .ok_or_else(|| RepositoryError::not_found("Artifact", artifact_id))
}

fn expect_task_status(task: &Task, expected: Option<TaskStatus>) -> Result<()> {
    match expected {
        Some(status) if status != task.status => Err(RepositoryError::Precondition(
            "task status no longer matches expected_task_status".to_string(),
        )),
        _ => Ok(()),
    }
}

fn expect_project_status(project: &Project, expected: Option<ProjectStatus>) -> Result<()> {
    match expected {
        Some(status) if status != project.status => Err(RepositoryError::Precondition(
            "project status no longer matches expected_project_status".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Older live versions of an approved artifact's chain become superseded
fn supersede_older_versions(tx: &mut Transaction<'_>, artifact_id: &str, version: u32) -> Result<()> {
    let older: Vec<String> = tx
        .view()
        .version_history(artifact_id)?
        .into_iter()
        .filter(|a| {
            a.version < version
                && a.status
                    .allowed_transitions()
                    .contains(&ArtifactStatus::Superseded)
        })
        .map(|a| a.artifact_id)
        .collect();
    for id in older {
        tx.update_artifact_status(&id, ArtifactStatus::Superseded)?;
    }
    Ok(())
}

/// First `{prefix}_{nnn}` not taken
fn free_id(prefix: &str, taken: impl Fn(&str) -> bool) -> String {
    let mut n = 1u32;
    loop {
        let id = format!("{prefix}_{n:03}");
        if !taken(&id) {
            return id;
        }
        n += 1;
    }
}

/// Split request text into up to three task titles, padding with defaults
fn decompose_request(text: &str) -> Vec<String> {
    const DEFAULTS: [&str; 3] = [
        "Clarify request scope",
        "Produce initial plan",
        "Prepare deliverable draft",
    ];
    let mut titles: Vec<String> = text
        .split(['.', '\n', ';'])
        .filter_map(task_title)
        .take(DEFAULTS.len())
        .collect();
    for default in DEFAULTS.iter().skip(titles.len()) {
        titles.push((*default).to_string());
    }
    titles
}

fn task_title(fragment: &str) -> Option<String> {
    let collapsed = fragment.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_end_matches(['!', '?']);
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.chars().count() <= GENERATED_TITLE_MAX {
        return Some(trimmed.to_string());
    }
    let head: String = trimmed.chars().take(GENERATED_TITLE_MAX - 3).collect();
    Some(format!("{head}..."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn request_text_becomes_three_titles() {
        assert_eq!(
            decompose_request("Write the brief. Draft the copy; Review it!"),
            vec!["Write the brief", "Draft the copy", "Review it"]
        );
        assert_eq!(
            decompose_request("Just one thing"),
            vec!["Just one thing", "Produce initial plan", "Prepare deliverable draft"]
        );
    }

    #[test]
    fn long_titles_are_ellipsized() {
        let title = task_title(&"x".repeat(200)).unwrap();
        assert_eq!(title.chars().count(), GENERATED_TITLE_MAX);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn free_id_skips_taken() {
        let taken = ["task_split_001", "task_split_002"];
        assert_eq!(
            free_id("task_split", |id| taken.contains(&id)),
            "task_split_003"
        );
    }

    #[test]
    fn idempotency_key_falls_back_to_command_id() {
        let request = CommandRequest::new("cmd_1", "auto_assign", Map::new());
        assert_eq!(request.idempotency_key(), "cmd_1");
        assert_eq!(request.with_idempotency_key("k").idempotency_key(), "k");
    }
}
