//! Read-only queries over committed (or in-transaction) tables

use crate::error::{RepositoryError, Result};
use crate::records::{
    receipt_key, AuditTrail, CommandReceipt, ContentReference, ViewerRecord, WorldEvent,
};
use crate::store::Tables;
use std::collections::HashSet;
use wsync_lifecycle::{
    Agent, Artifact, ArtifactStatus, Decision, DecisionStatus, Project, ProjectStatus, Task,
    TaskStatus, WorldSnapshot,
};

/// Borrowed view over the tables
#[derive(Debug, Clone, Copy)]
pub struct ReadView<'a> {
    tables: &'a Tables,
}

impl<'a> ReadView<'a> {
    pub(crate) fn new(tables: &'a Tables) -> Self {
        Self { tables }
    }

    // Projects

    #[must_use]
    pub fn project(&self, project_id: &str) -> Option<&'a Project> {
        self.tables.projects.get(project_id)
    }

    #[must_use]
    pub fn projects_by_status(&self, status: ProjectStatus) -> Vec<&'a Project> {
        self.tables
            .projects
            .values()
            .filter(|p| p.status == status)
            .collect()
    }

    /// Check if dispatch is paused for a project
    #[must_use]
    pub fn is_paused(&self, project_id: &str) -> bool {
        self.tables.paused_projects.contains(project_id)
    }

    // Tasks

    #[must_use]
    pub fn task(&self, task_id: &str) -> Option<&'a Task> {
        self.tables.tasks.get(task_id)
    }

    /// Tasks in a project, optionally filtered by status
    #[must_use]
    pub fn tasks_by_project(&self, project_id: &str, status: Option<TaskStatus>) -> Vec<&'a Task> {
        self.tables
            .tasks
            .values()
            .filter(|t| t.project_id == project_id && status.map_or(true, |s| t.status == s))
            .collect()
    }

    /// Tasks held by an agent, optionally restricted to some statuses
    #[must_use]
    pub fn tasks_by_assignee(&self, agent_id: &str, statuses: Option<&[TaskStatus]>) -> Vec<&'a Task> {
        self.tables
            .tasks
            .values()
            .filter(|t| {
                t.assignee.as_deref() == Some(agent_id)
                    && statuses.map_or(true, |set| set.contains(&t.status))
            })
            .collect()
    }

    // Decisions

    #[must_use]
    pub fn decision(&self, decision_id: &str) -> Option<&'a Decision> {
        self.tables.decisions.get(decision_id)
    }

    #[must_use]
    pub fn open_decisions(&self, project_id: &str) -> Vec<&'a Decision> {
        self.tables
            .decisions
            .values()
            .filter(|d| d.project_id == project_id && d.status == DecisionStatus::Open)
            .collect()
    }

    // Agents

    #[must_use]
    pub fn agent(&self, agent_id: &str) -> Option<&'a Agent> {
        self.tables.agents.get(agent_id)
    }

    /// Every agent, ordered by id
    #[must_use]
    pub fn agents(&self) -> Vec<&'a Agent> {
        self.tables.agents.values().collect()
    }

    // Artifacts

    #[must_use]
    pub fn artifact(&self, artifact_id: &str) -> Option<&'a Artifact> {
        self.tables.artifacts.get(artifact_id)
    }

    #[must_use]
    pub fn artifacts_by_project(
        &self,
        project_id: &str,
        status: Option<ArtifactStatus>,
    ) -> Vec<&'a Artifact> {
        self.tables
            .artifacts
            .values()
            .filter(|a| a.project_id == project_id && status.map_or(true, |s| a.status == s))
            .collect()
    }

    /// Every version in the artifact's chain, by version then id
    pub fn version_history(&self, artifact_id: &str) -> Result<Vec<Artifact>> {
        let artifact = self
            .artifact(artifact_id)
            .ok_or_else(|| RepositoryError::not_found("Artifact", artifact_id))?;
        let root_id = artifact.root_id();
        let mut chain: Vec<Artifact> = self
            .tables
            .artifacts
            .values()
            .filter(|a| a.root_id() == root_id)
            .cloned()
            .collect();
        chain.sort_by(|a, b| {
            a.version
                .cmp(&b.version)
                .then_with(|| a.artifact_id.cmp(&b.artifact_id))
        });
        Ok(chain)
    }

    #[must_use]
    pub fn content_reference(&self, artifact_id: &str) -> Option<ContentReference> {
        self.artifact(artifact_id).map(|a| ContentReference {
            artifact_id: a.artifact_id.clone(),
            version: a.version,
            status: a.status,
            content_ref: a.content_ref.clone(),
            metadata: a.metadata.clone(),
        })
    }

    /// Artifact, its chain and its content pointer
    #[must_use]
    pub fn viewer_record(&self, artifact_id: &str) -> Option<ViewerRecord> {
        let artifact = self.artifact(artifact_id)?.clone();
        let version_history = self.version_history(artifact_id).ok()?;
        let content_reference = self.content_reference(artifact_id)?;
        Some(ViewerRecord {
            artifact,
            version_history,
            content_reference,
        })
    }

    /// Viewer record plus deduplicated chain events ordered by seq
    #[must_use]
    pub fn audit_trail(&self, artifact_id: &str) -> Option<AuditTrail> {
        let viewer = self.viewer_record(artifact_id)?;
        let mut seen = HashSet::new();
        let mut audit_events = Vec::new();
        for version in &viewer.version_history {
            for event in self.events_by_artifact(&version.artifact_id) {
                if seen.insert(event.id.clone()) {
                    audit_events.push(event.clone());
                }
            }
        }
        audit_events.sort_by_key(|e| e.seq);
        Some(AuditTrail {
            viewer,
            audit_events,
        })
    }

    // Events

    /// Project events with `seq > since_seq`, ascending
    #[must_use]
    pub fn events_since(&self, project_id: &str, since_seq: u64) -> Vec<&'a WorldEvent> {
        let mut events: Vec<&WorldEvent> = self
            .tables
            .events
            .values()
            .filter(|e| e.project_id == project_id && e.seq > since_seq)
            .collect();
        events.sort_by_key(|e| e.seq);
        events
    }

    /// Events naming an artifact, ascending by seq
    #[must_use]
    pub fn events_by_artifact(&self, artifact_id: &str) -> Vec<&'a WorldEvent> {
        let mut events: Vec<&WorldEvent> = self
            .tables
            .events
            .values()
            .filter(|e| e.artifact_id.as_deref() == Some(artifact_id))
            .collect();
        events.sort_by_key(|e| e.seq);
        events
    }

    /// Last assigned seq for a project
    #[must_use]
    pub fn latest_project_seq(&self, project_id: &str) -> u64 {
        self.tables
            .seq_by_project
            .get(project_id)
            .copied()
            .unwrap_or(0)
    }

    // Receipts

    #[must_use]
    pub fn receipt(&self, project_id: &str, idempotency_key: &str) -> Option<&'a CommandReceipt> {
        self.tables
            .receipts
            .get(&receipt_key(project_id, idempotency_key))
    }

    /// Consistent snapshot of every entity
    #[must_use]
    pub fn to_snapshot(&self, scene_id: Option<String>) -> WorldSnapshot {
        WorldSnapshot {
            scene_id,
            agents: self.tables.agents.values().cloned().collect(),
            tasks: self.tables.tasks.values().cloned().collect(),
            artifacts: self.tables.artifacts.values().cloned().collect(),
            decisions: self.tables.decisions.values().cloned().collect(),
            projects: self.tables.projects.values().cloned().collect(),
        }
    }
}
