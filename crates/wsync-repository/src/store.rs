//! In-memory table store with copy-on-write transactions
//!
//! Writers take the single write lock, work on a clone of every table and
//! swap it in only when the work returns `Ok`. Tables are `im` persistent
//! maps, so the clone shares structure with committed state and a
//! transaction only pays for what it touches. Readers only ever see
//! committed tables.

use crate::error::Result;
use crate::records::{CommandReceipt, WorldEvent};
use crate::transaction::Transaction;
use crate::view::ReadView;
use parking_lot::RwLock;
use im::{OrdMap, OrdSet, Vector};
use tracing::debug;
use wsync_lifecycle::{Agent, Artifact, Decision, Project, Task, WorldSnapshot};

/// Every table plus sequence counters
#[derive(Debug, Clone, Default)]
pub(crate) struct Tables {
    pub(crate) projects: OrdMap<String, Project>,
    pub(crate) tasks: OrdMap<String, Task>,
    pub(crate) decisions: OrdMap<String, Decision>,
    pub(crate) artifacts: OrdMap<String, Artifact>,
    pub(crate) agents: OrdMap<String, Agent>,
    pub(crate) events: OrdMap<String, WorldEvent>,
    pub(crate) receipts: OrdMap<String, CommandReceipt>,
    /// Receipt keys that are bare command ids, oldest first
    pub(crate) transient_receipts: Vector<String>,
    pub(crate) seq_by_project: OrdMap<String, u64>,
    pub(crate) paused_projects: OrdSet<String>,
}

impl Tables {
    fn from_snapshot(snapshot: &WorldSnapshot) -> Self {
        let mut tables = Self::default();
        for project in &snapshot.projects {
            tables.projects.insert(project.project_id.clone(), project.clone());
        }
        for task in &snapshot.tasks {
            tables.tasks.insert(task.task_id.clone(), task.clone());
        }
        for decision in &snapshot.decisions {
            tables.decisions.insert(decision.decision_id.clone(), decision.clone());
        }
        for artifact in &snapshot.artifacts {
            tables.artifacts.insert(artifact.artifact_id.clone(), artifact.clone());
        }
        for agent in &snapshot.agents {
            tables.agents.insert(agent.agent_id.clone(), agent.clone());
        }
        tables
    }
}

/// Single-writer in-memory store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded from a snapshot; references must resolve
    pub fn seeded(snapshot: &WorldSnapshot) -> Result<Self> {
        snapshot.validate_references()?;
        Ok(Self {
            tables: RwLock::new(Tables::from_snapshot(snapshot)),
        })
    }

    /// Seed world events, advancing per-project sequences past them
    pub fn seed_events(&self, events: impl IntoIterator<Item = WorldEvent>) {
        let mut tables = self.tables.write();
        for event in events {
            let current = tables.seq_by_project.get(&event.project_id).copied().unwrap_or(0);
            tables
                .seq_by_project
                .insert(event.project_id.clone(), current.max(event.seq));
            tables.events.insert(event.id.clone(), event);
        }
    }

    /// Run `work` against committed state
    pub fn read<T>(&self, work: impl FnOnce(&ReadView<'_>) -> T) -> T {
        let tables = self.tables.read();
        work(&ReadView::new(&tables))
    }

    /// Run `work` in a transaction; commits only on `Ok`
    pub fn with_transaction<T>(
        &self,
        work: impl FnOnce(&mut Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut committed = self.tables.write();
        let mut working = committed.clone();
        let result = work(&mut Transaction::new(&mut working));
        match result {
            Ok(value) => {
                *committed = working;
                Ok(value)
            }
            Err(err) => {
                debug!(error = %err, "transaction rolled back");
                Err(err)
            }
        }
    }

    /// Consistent snapshot of every entity
    #[must_use]
    pub fn snapshot(&self, scene_id: Option<String>) -> WorldSnapshot {
        self.read(|view| view.to_snapshot(scene_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RepositoryError;
    use wsync_lifecycle::{ProjectStatus, TaskStatus};

    fn seed() -> WorldSnapshot {
        WorldSnapshot {
            projects: vec![Project::new("proj_a", "A", ProjectStatus::Executing)],
            tasks: vec![Task::new("task_1", "proj_a", "T", TaskStatus::Planned)],
            ..WorldSnapshot::default()
        }
    }

    #[test]
    fn failed_transaction_leaves_no_trace() {
        let store = InMemoryStore::seeded(&seed()).unwrap();
        let result: Result<()> = store.with_transaction(|tx| {
            tx.update_task_status("task_1", TaskStatus::InProgress)?;
            Err(RepositoryError::Precondition("abort".to_string()))
        });
        assert!(result.is_err());
        let status = store.read(|view| view.task("task_1").map(|t| t.status));
        assert_eq!(status, Some(TaskStatus::Planned));
    }

    #[test]
    fn committed_transaction_is_visible() {
        let store = InMemoryStore::seeded(&seed()).unwrap();
        store
            .with_transaction(|tx| tx.update_task_status("task_1", TaskStatus::InProgress))
            .unwrap();
        let status = store.read(|view| view.task("task_1").map(|t| t.status));
        assert_eq!(status, Some(TaskStatus::InProgress));
    }

    #[test]
    fn seeding_rejects_dangling_references() {
        let mut snapshot = seed();
        snapshot.tasks[0].project_id = "proj_missing".to_string();
        let err = InMemoryStore::seeded(&snapshot).unwrap_err();
        assert!(err.to_string().contains("proj_missing"));
    }
}
