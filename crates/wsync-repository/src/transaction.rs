//! Mutations applied inside a store transaction
//!
//! Every status update goes through the lifecycle transition tables. Nothing
//! here is visible to readers until the enclosing `with_transaction` returns
//! `Ok`.

use crate::error::{RepositoryError, Result};
use crate::records::{CommandReceipt, NewEvent, RecordedReceipt, RevisionRequest, WorldEvent};
use crate::store::Tables;
use crate::view::ReadView;
use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, info};
use wsync_lifecycle::{
    validate_transition, Agent, Artifact, ArtifactStatus, ContentRef, Decision, DecisionStatus,
    Lifecycle, LifecycleError, Project, ProjectStatus, Task, TaskStatus,
};

/// Write access to the working copy of the tables
#[derive(Debug)]
pub struct Transaction<'a> {
    tables: &'a mut Tables,
    event_meta: Map<String, Value>,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(tables: &'a mut Tables) -> Self {
        Self {
            tables,
            event_meta: Map::new(),
        }
    }

    /// Meta merged into every event appended afterwards; event keys win
    pub fn set_event_meta(&mut self, meta: Map<String, Value>) {
        self.event_meta = meta;
    }

    /// Read the working copy, including this transaction's writes
    #[must_use]
    pub fn view(&self) -> ReadView<'_> {
        ReadView::new(&*self.tables)
    }

    // Inserts

    pub fn create_project(&mut self, mut project: Project) -> Result<Project> {
        require_id("project.project_id", &project.project_id)?;
        if self.tables.projects.contains_key(&project.project_id) {
            return Err(RepositoryError::AlreadyExists {
                table: "projects",
                id: project.project_id,
            });
        }
        project.updated_ts = Some(Utc::now());
        self.tables
            .projects
            .insert(project.project_id.clone(), project.clone());
        debug!(project_id = %project.project_id, "project created");
        Ok(project)
    }

    pub fn create_task(&mut self, mut task: Task) -> Result<Task> {
        require_id("task.task_id", &task.task_id)?;
        if self.tables.tasks.contains_key(&task.task_id) {
            return Err(RepositoryError::AlreadyExists {
                table: "tasks",
                id: task.task_id,
            });
        }
        self.require_project(&task.project_id)?;
        if let Some(agent_id) = &task.assignee {
            self.require_agent(agent_id)?;
        }
        let now = Utc::now();
        task.created_ts = Some(now);
        task.updated_ts = Some(now);
        self.tables.tasks.insert(task.task_id.clone(), task.clone());
        debug!(task_id = %task.task_id, project_id = %task.project_id, "task created");
        Ok(task)
    }

    pub fn create_decision(&mut self, mut decision: Decision) -> Result<Decision> {
        require_id("decision.decision_id", &decision.decision_id)?;
        if self.tables.decisions.contains_key(&decision.decision_id) {
            return Err(RepositoryError::AlreadyExists {
                table: "decisions",
                id: decision.decision_id,
            });
        }
        self.require_project(&decision.project_id)?;
        if let Some(task_id) = &decision.task_id {
            self.require_task(task_id)?;
        }
        let now = Utc::now();
        decision.created_ts = Some(now);
        decision.updated_ts = Some(now);
        self.tables
            .decisions
            .insert(decision.decision_id.clone(), decision.clone());
        Ok(decision)
    }

    /// Insert or replace an agent; its task, if any, must exist
    pub fn upsert_agent(&mut self, agent: Agent) -> Result<Agent> {
        require_id("agent.agent_id", &agent.agent_id)?;
        if let Some(task_id) = &agent.task_id {
            self.require_task(task_id)?;
        }
        self.tables
            .agents
            .insert(agent.agent_id.clone(), agent.clone());
        Ok(agent)
    }

    /// Insert one artifact version, enforcing the version chain rules
    pub fn create_artifact(&mut self, mut artifact: Artifact) -> Result<Artifact> {
        require_id("artifact.artifact_id", &artifact.artifact_id)?;
        if self.tables.artifacts.contains_key(&artifact.artifact_id) {
            return Err(RepositoryError::AlreadyExists {
                table: "artifacts",
                id: artifact.artifact_id,
            });
        }
        if artifact.artifact_type.trim().is_empty() {
            return Err(invalid("artifact.type must be a non-empty string"));
        }
        if artifact.version == 0 {
            return Err(invalid("artifact.version must be a positive integer"));
        }
        self.require_project(&artifact.project_id)?;
        if let Some(task_id) = &artifact.task_id {
            self.require_task(task_id)?;
        }
        artifact.content_ref = artifact
            .content_ref
            .take()
            .map(ContentRef::normalized)
            .transpose()?;

        let root_id = match artifact.version_parent_id.as_deref() {
            Some(parent_id) => {
                let parent = self.tables.artifacts.get(parent_id).ok_or_else(|| {
                    invalid(format!("artifact.version_parent_id not found: {parent_id}"))
                })?;
                if parent.project_id != artifact.project_id {
                    return Err(invalid(
                        "artifact.version_parent_id must reference the same project",
                    ));
                }
                if parent.artifact_type != artifact.artifact_type {
                    return Err(invalid(
                        "artifact.version_parent_id must reference the same artifact type",
                    ));
                }
                if artifact.version != parent.version + 1 {
                    return Err(invalid(format!(
                        "artifact.version must be {} for parent {parent_id}, got {}",
                        parent.version + 1,
                        artifact.version
                    )));
                }
                let root_id = parent.root_id().to_string();
                if let Some(declared) = &artifact.version_root_id {
                    if *declared != root_id {
                        return Err(invalid(format!(
                            "artifact.version_root_id must be {root_id}, got {declared}"
                        )));
                    }
                }
                root_id
            }
            None => {
                if artifact.version > 1 {
                    return Err(invalid(
                        "artifact.version_parent_id is required when version > 1",
                    ));
                }
                if let Some(declared) = &artifact.version_root_id {
                    if *declared != artifact.artifact_id {
                        return Err(invalid(
                            "artifact.version_root_id must equal artifact_id for version 1",
                        ));
                    }
                }
                artifact.artifact_id.clone()
            }
        };

        let duplicate = self
            .tables
            .artifacts
            .values()
            .any(|a| a.root_id() == root_id && a.version == artifact.version);
        if duplicate {
            return Err(RepositoryError::DuplicateVersion {
                version: artifact.version,
                root_id,
            });
        }

        artifact.version_root_id = Some(root_id);
        let now = Utc::now();
        artifact.created_ts = Some(now);
        artifact.updated_ts = Some(now);
        self.tables
            .artifacts
            .insert(artifact.artifact_id.clone(), artifact.clone());
        debug!(
            artifact_id = %artifact.artifact_id,
            version = artifact.version,
            "artifact version created"
        );
        Ok(artifact)
    }

    /// Derive the next version from a parent, inheriting its placement
    pub fn create_revision(&mut self, request: RevisionRequest) -> Result<Artifact> {
        let parent = self.require_artifact(&request.parent_artifact_id)?.clone();
        let mut revision = Artifact::new(
            request.artifact_id,
            parent.project_id.clone(),
            parent.artifact_type.clone(),
            request.status,
        );
        revision.version = parent.version + 1;
        revision.version_parent_id = Some(parent.artifact_id.clone());
        revision.version_root_id = Some(parent.root_id().to_string());
        revision.task_id = parent.task_id;
        revision.poi_id = parent.poi_id;
        revision.content_ref = request.content_ref;
        revision.metadata = request.metadata;
        self.create_artifact(revision)
    }

    // Status updates

    pub fn update_project_status(&mut self, project_id: &str, to: ProjectStatus) -> Result<Project> {
        let project = self
            .tables
            .projects
            .get_mut(project_id)
            .ok_or_else(|| RepositoryError::not_found("Project", project_id))?;
        let from = project.status;
        validate_transition(from, to)?;
        project.status = to;
        project.updated_ts = Some(Utc::now());
        info!(project_id, %from, %to, "project status updated");
        Ok(project.clone())
    }

    pub fn update_task_status(&mut self, task_id: &str, to: TaskStatus) -> Result<Task> {
        let task = self
            .tables
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| RepositoryError::not_found("Task", task_id))?;
        let from = task.status;
        validate_transition(from, to)?;
        task.status = to;
        task.updated_ts = Some(Utc::now());
        info!(task_id, %from, %to, "task status updated");
        Ok(task.clone())
    }

    pub fn update_decision_status(
        &mut self,
        decision_id: &str,
        to: DecisionStatus,
    ) -> Result<Decision> {
        let decision = self
            .tables
            .decisions
            .get_mut(decision_id)
            .ok_or_else(|| RepositoryError::not_found("Decision", decision_id))?;
        let from = decision.status;
        validate_transition(from, to)?;
        decision.status = to;
        decision.updated_ts = Some(Utc::now());
        info!(decision_id, %from, %to, "decision status updated");
        Ok(decision.clone())
    }

    pub fn update_artifact_status(
        &mut self,
        artifact_id: &str,
        to: ArtifactStatus,
    ) -> Result<Artifact> {
        let artifact = self
            .tables
            .artifacts
            .get_mut(artifact_id)
            .ok_or_else(|| RepositoryError::not_found("Artifact", artifact_id))?;
        let from = artifact.status;
        validate_transition(from, to)?;
        artifact.status = to;
        artifact.updated_ts = Some(Utc::now());
        info!(artifact_id, %from, %to, "artifact status updated");
        Ok(artifact.clone())
    }

    /// Point a live task at an agent and the agent at the task
    pub fn assign_task(&mut self, task_id: &str, agent_id: &str) -> Result<Task> {
        self.require_agent(agent_id)?;
        let task = self
            .tables
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| RepositoryError::not_found("Task", task_id))?;
        if task.status.is_terminal() {
            return Err(RepositoryError::Precondition(format!(
                "task {task_id} is {}",
                task.status
            )));
        }
        let previous = task.assignee.replace(agent_id.to_string());
        task.updated_ts = Some(Utc::now());
        let task = task.clone();
        if let Some(previous) = previous.filter(|p| p != agent_id) {
            self.detach_agent(&previous, task_id);
        }
        if let Some(agent) = self.tables.agents.get_mut(agent_id) {
            agent.task_id = Some(task_id.to_string());
        }
        info!(task_id, agent_id, "task assigned");
        Ok(task)
    }

    /// Clear a task's assignee; returns the agent it had
    pub fn release_task(&mut self, task_id: &str) -> Result<Option<String>> {
        let task = self
            .tables
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| RepositoryError::not_found("Task", task_id))?;
        let previous = task.assignee.take();
        if let Some(agent_id) = &previous {
            task.updated_ts = Some(Utc::now());
            self.detach_agent(agent_id, task_id);
            debug!(task_id, agent_id = %agent_id, "task released");
        }
        Ok(previous)
    }

    fn detach_agent(&mut self, agent_id: &str, task_id: &str) {
        if let Some(agent) = self.tables.agents.get_mut(agent_id) {
            if agent.task_id.as_deref() == Some(task_id) {
                agent.task_id = None;
            }
        }
    }

    /// Mark dispatch for a project as paused or live
    pub fn set_paused(&mut self, project_id: &str, paused: bool) -> Result<()> {
        self.require_project(project_id)?;
        if paused {
            self.tables.paused_projects.insert(project_id.to_string());
        } else {
            self.tables.paused_projects.remove(project_id);
        }
        Ok(())
    }

    // Events and receipts

    /// Reserve the next per-project sequence number
    pub fn next_project_seq(&mut self, project_id: &str) -> u64 {
        let seq = self.current_project_seq(project_id) + 1;
        self.tables.seq_by_project.insert(project_id.to_string(), seq);
        seq
    }

    fn current_project_seq(&self, project_id: &str) -> u64 {
        self.tables.seq_by_project.get(project_id).copied().unwrap_or(0)
    }

    /// Append an immutable world event
    pub fn append_event(&mut self, draft: NewEvent) -> Result<WorldEvent> {
        require_id("event.project_id", &draft.project_id)?;
        require_id("event.name", &draft.name)?;
        let seq = match draft.seq {
            Some(seq) => {
                let current = self.current_project_seq(&draft.project_id);
                if seq <= current {
                    return Err(RepositoryError::SequenceRegression {
                        project_id: draft.project_id,
                        seq,
                        current,
                    });
                }
                self.tables
                    .seq_by_project
                    .insert(draft.project_id.clone(), seq);
                seq
            }
            None => self.next_project_seq(&draft.project_id),
        };
        let id = draft
            .id
            .unwrap_or_else(|| format!("{}:{seq}", draft.project_id));
        if self.tables.events.contains_key(&id) {
            return Err(RepositoryError::AlreadyExists { table: "events", id });
        }
        let mut meta = draft.meta;
        for (key, value) in &self.event_meta {
            meta.entry(key.clone()).or_insert_with(|| value.clone());
        }
        let event = WorldEvent {
            id,
            project_id: draft.project_id,
            seq,
            name: draft.name,
            task_id: draft.task_id,
            decision_id: draft.decision_id,
            artifact_id: draft.artifact_id,
            agent_id: draft.agent_id,
            participants: draft.participants,
            meta,
            ts: Utc::now(),
        };
        self.tables.events.insert(event.id.clone(), event.clone());
        debug!(project_id = %event.project_id, seq, name = %event.name, "event appended");
        Ok(event)
    }

    /// Record a receipt unless one already exists for its key
    pub fn record_receipt(&mut self, mut receipt: CommandReceipt) -> RecordedReceipt {
        let key = receipt.key();
        if let Some(existing) = self.tables.receipts.get(&key) {
            return RecordedReceipt {
                created: false,
                row: existing.clone(),
            };
        }
        receipt.created_ts = Some(Utc::now());
        self.tables.receipts.insert(key, receipt.clone());
        RecordedReceipt {
            created: true,
            row: receipt,
        }
    }

    /// Record a receipt keyed only by its command id
    ///
    /// At most `retain` of these are kept; the oldest are expired first.
    /// Receipts under an explicit idempotency key are never expired.
    pub fn record_transient_receipt(
        &mut self,
        receipt: CommandReceipt,
        retain: usize,
    ) -> RecordedReceipt {
        let key = receipt.key();
        let recorded = self.record_receipt(receipt);
        if recorded.created {
            self.tables.transient_receipts.push_back(key);
            while self.tables.transient_receipts.len() > retain {
                if let Some(expired) = self.tables.transient_receipts.pop_front() {
                    self.tables.receipts.remove(&expired);
                }
            }
        }
        recorded
    }

    // Multi-entity operations

    /// Resolve an open decision and unblock its task
    ///
    /// Appends `decision_resolved` then `task_started`.
    pub fn resolve_decision_and_resume_task(
        &mut self,
        decision_id: &str,
        task_id: &str,
        choice: Option<&str>,
    ) -> Result<Vec<WorldEvent>> {
        let decision = self.update_decision_status(decision_id, DecisionStatus::Resolved)?;
        let task = self.update_task_status(task_id, TaskStatus::InProgress)?;
        if task.project_id != decision.project_id {
            return Err(RepositoryError::Precondition(format!(
                "decision {decision_id} and task {task_id} belong to different projects"
            )));
        }
        let mut resolved = NewEvent::new(&decision.project_id, "decision_resolved")
            .decision(decision_id)
            .task(task_id);
        if let Some(choice) = choice {
            resolved = resolved.meta("choice", choice);
        }
        let resolved = self.append_event(resolved)?;
        let started = self.append_event(
            NewEvent::new(&task.project_id, "task_started")
                .task(task_id)
                .decision(decision_id)
                .agent(task.assignee.clone()),
        )?;
        Ok(vec![resolved, started])
    }

    /// Approve an artifact and finish the task that produced it
    ///
    /// Appends `review_approved` then `task_done`.
    pub fn approve_artifact_and_complete_task(
        &mut self,
        artifact_id: &str,
        task_id: &str,
    ) -> Result<Vec<WorldEvent>> {
        let artifact = self.update_artifact_status(artifact_id, ArtifactStatus::Approved)?;
        let task = self.update_task_status(task_id, TaskStatus::Done)?;
        if task.project_id != artifact.project_id {
            return Err(RepositoryError::Precondition(format!(
                "artifact {artifact_id} and task {task_id} belong to different projects"
            )));
        }
        let approved = self.append_event(
            NewEvent::new(&artifact.project_id, "review_approved")
                .artifact(artifact_id)
                .task(task_id)
                .meta("version", artifact.version),
        )?;
        let done = self.append_event(
            NewEvent::new(&task.project_id, "task_done")
                .task(task_id)
                .artifact(artifact_id)
                .agent(task.assignee.clone()),
        )?;
        Ok(vec![approved, done])
    }

    // Lookups that fail with NotFound

    fn require_project(&self, project_id: &str) -> Result<&Project> {
        self.tables
            .projects
            .get(project_id)
            .ok_or_else(|| RepositoryError::not_found("Project", project_id))
    }

    fn require_task(&self, task_id: &str) -> Result<&Task> {
        self.tables
            .tasks
            .get(task_id)
            .ok_or_else(|| RepositoryError::not_found("Task", task_id))
    }

    fn require_agent(&self, agent_id: &str) -> Result<&Agent> {
        self.tables
            .agents
            .get(agent_id)
            .ok_or_else(|| RepositoryError::not_found("Agent", agent_id))
    }

    fn require_artifact(&self, artifact_id: &str) -> Result<&Artifact> {
        self.tables
            .artifacts
            .get(artifact_id)
            .ok_or_else(|| RepositoryError::not_found("Artifact", artifact_id))
    }
}

fn invalid(message: impl Into<String>) -> RepositoryError {
    RepositoryError::InvalidArtifact(message.into())
}

fn require_id(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(LifecycleError::InvalidField {
            field,
            reason: "must be a non-empty string".to_string(),
        }
        .into());
    }
    Ok(())
}
