//! Full-world snapshot and its referential integrity check

use crate::entities::{Agent, Artifact, Decision, Project, Task};
use crate::error::ReferenceError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Self-consistent copy of every entity in scope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_id: Option<String>,
    pub agents: Vec<Agent>,
    pub tasks: Vec<Task>,
    pub artifacts: Vec<Artifact>,
    pub decisions: Vec<Decision>,
    pub projects: Vec<Project>,
}

impl WorldSnapshot {
    /// Check that every reference resolves inside this snapshot.
    ///
    /// Returns the first dangling reference found, walking tasks, decisions,
    /// artifacts and agents in that order.
    pub fn validate_references(&self) -> Result<(), ReferenceError> {
        let project_ids: HashSet<&str> =
            self.projects.iter().map(|p| p.project_id.as_str()).collect();
        let task_ids: HashSet<&str> = self.tasks.iter().map(|t| t.task_id.as_str()).collect();
        let agent_ids: HashSet<&str> = self.agents.iter().map(|a| a.agent_id.as_str()).collect();
        let artifact_ids: HashSet<&str> =
            self.artifacts.iter().map(|a| a.artifact_id.as_str()).collect();

        for task in &self.tasks {
            if !project_ids.contains(task.project_id.as_str()) {
                return Err(ReferenceError::new("Task", &task.task_id, "project", &task.project_id));
            }
            if let Some(assignee) = &task.assignee {
                if !agent_ids.contains(assignee.as_str()) {
                    return Err(ReferenceError::new("Task", &task.task_id, "assignee", assignee));
                }
            }
        }

        for decision in &self.decisions {
            if !project_ids.contains(decision.project_id.as_str()) {
                return Err(ReferenceError::new(
                    "Decision",
                    &decision.decision_id,
                    "project",
                    &decision.project_id,
                ));
            }
            if let Some(task_id) = &decision.task_id {
                if !task_ids.contains(task_id.as_str()) {
                    return Err(ReferenceError::new(
                        "Decision",
                        &decision.decision_id,
                        "task",
                        task_id,
                    ));
                }
            }
        }

        for artifact in &self.artifacts {
            if !project_ids.contains(artifact.project_id.as_str()) {
                return Err(ReferenceError::new(
                    "Artifact",
                    &artifact.artifact_id,
                    "project",
                    &artifact.project_id,
                ));
            }
            if let Some(task_id) = &artifact.task_id {
                if !task_ids.contains(task_id.as_str()) {
                    return Err(ReferenceError::new(
                        "Artifact",
                        &artifact.artifact_id,
                        "task",
                        task_id,
                    ));
                }
            }
            let versions = [
                ("version_parent", &artifact.version_parent_id),
                ("version_root", &artifact.version_root_id),
            ];
            for (target, reference) in versions {
                if let Some(id) = reference {
                    if !artifact_ids.contains(id.as_str()) {
                        return Err(ReferenceError::new("Artifact", &artifact.artifact_id, target, id));
                    }
                }
            }
        }

        for agent in &self.agents {
            if let Some(task_id) = &agent.task_id {
                if !task_ids.contains(task_id.as_str()) {
                    return Err(ReferenceError::new("Agent", &agent.agent_id, "task", task_id));
                }
            }
        }

        Ok(())
    }

    /// Look up a project by id
    #[must_use]
    pub fn project(&self, project_id: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.project_id == project_id)
    }

    /// Look up a task by id
    #[must_use]
    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }

    /// Look up an agent by id
    #[must_use]
    pub fn agent(&self, agent_id: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.agent_id == agent_id)
    }

    /// Total entity count
    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
            + self.tasks.len()
            + self.artifacts.len()
            + self.decisions.len()
            + self.projects.len()
    }

    /// No entities at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{ArtifactStatus, DecisionStatus, ProjectStatus, TaskStatus};

    fn consistent() -> WorldSnapshot {
        WorldSnapshot {
            scene_id: Some("cozy_office_v0".to_string()),
            agents: vec![Agent::new("agent_bd").on_task("task_1")],
            tasks: vec![Task::new("task_1", "proj_alpha", "Draft", TaskStatus::Blocked)
                .with_assignee("agent_bd")],
            artifacts: vec![Artifact::new("art_1", "proj_alpha", "copy_doc", ArtifactStatus::Delivered)
                .for_task("task_1")],
            decisions: vec![Decision::new("dec_1", "proj_alpha", "Audience?", DecisionStatus::Open)
                .for_task("task_1")],
            projects: vec![Project::new("proj_alpha", "Alpha", ProjectStatus::Executing)],
        }
    }

    #[test]
    fn consistent_snapshot_passes() {
        assert!(consistent().validate_references().is_ok());
    }

    #[test]
    fn task_with_missing_project_fails_with_id() {
        let mut snapshot = consistent();
        snapshot.tasks[0].project_id = "proj_ghost".to_string();
        let err = snapshot.validate_references().unwrap_err();
        assert!(err.to_string().contains("proj_ghost"));
        assert_eq!(err.entity, "Task");
    }

    #[test]
    fn dangling_assignee_fails() {
        let mut snapshot = consistent();
        snapshot.tasks[0].assignee = Some("agent_nobody".to_string());
        let err = snapshot.validate_references().unwrap_err();
        assert_eq!(err.target, "assignee");
    }

    #[test]
    fn artifact_version_chain_must_resolve() {
        let mut snapshot = consistent();
        snapshot.artifacts[0].version_root_id = Some("art_1".to_string());
        let mut revision = Artifact::new("art_2", "proj_alpha", "copy_doc", ArtifactStatus::Created);
        revision.version = 2;
        revision.version_parent_id = Some("art_1".to_string());
        revision.version_root_id = Some("art_1".to_string());
        snapshot.artifacts.push(revision);
        assert!(snapshot.validate_references().is_ok());

        snapshot.artifacts[1].version_parent_id = Some("art_gone".to_string());
        let err = snapshot.validate_references().unwrap_err();
        assert_eq!((err.target, err.target_id.as_str()), ("version_parent", "art_gone"));

        snapshot.artifacts[1].version_parent_id = Some("art_1".to_string());
        snapshot.artifacts[1].version_root_id = Some("art_root".to_string());
        let err = snapshot.validate_references().unwrap_err();
        assert_eq!(err.target, "version_root");
        assert_eq!(err.entity_id, "art_2");
    }

    #[test]
    fn dangling_agent_task_fails() {
        let mut snapshot = consistent();
        snapshot.agents[0].task_id = Some("task_ghost".to_string());
        let err = snapshot.validate_references().unwrap_err();
        assert_eq!(err.entity, "Agent");
        assert_eq!(err.target_id, "task_ghost");
    }
}
