//! Optimistic mutations awaiting their command response
//!
//! Entries overlay the durable snapshot for reads; they are never merged
//! into it. An ack moves the change into the confirmed overlay of the world
//! view, an error rolls it back.

use indexmap::IndexMap;
use serde_json::{Map, Value};

/// Optimistic change tied to one command id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingOperation {
    /// `assign_task` sent, not yet answered
    AssignTask { task_id: String, agent_id: String },
}

impl PendingOperation {
    /// Optimistic change implied by a command, if any
    #[must_use]
    pub fn for_command(name: &str, data: &Map<String, Value>) -> Option<Self> {
        match name {
            "assign_task" => {
                let task_id = data.get("task_id")?.as_str()?.trim();
                let agent_id = data.get("agent_id")?.as_str()?.trim();
                if task_id.is_empty() || agent_id.is_empty() {
                    return None;
                }
                Some(Self::AssignTask {
                    task_id: task_id.to_string(),
                    agent_id: agent_id.to_string(),
                })
            }
            _ => None,
        }
    }
}

/// Pending operations keyed by command id, in submission order
#[derive(Debug, Default)]
pub struct PendingOperations {
    entries: IndexMap<String, PendingOperation>,
}

impl PendingOperations {
    /// Nothing pending
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the change a sent command implies
    pub fn track(&mut self, command_id: impl Into<String>, operation: PendingOperation) {
        let command_id = command_id.into();
        self.entries.shift_remove(&command_id);
        self.entries.insert(command_id, operation);
    }

    /// Ack received: the server state now carries the change
    pub fn confirm(&mut self, command_id: &str) -> Option<PendingOperation> {
        self.entries.shift_remove(command_id)
    }

    /// Error received: drop the optimistic change
    pub fn rollback(&mut self, command_id: &str) -> Option<PendingOperation> {
        let rolled_back = self.entries.shift_remove(command_id);
        if let Some(op) = &rolled_back {
            tracing::debug!(command_id, operation = ?op, "optimistic change rolled back");
        }
        rolled_back
    }

    /// Pending count
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Nothing pending
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Latest optimistic assignee for a task
    #[must_use]
    pub fn assignee_for(&self, task_id: &str) -> Option<&str> {
        self.entries.values().rev().find_map(|op| match op {
            PendingOperation::AssignTask {
                task_id: t,
                agent_id,
            } if t == task_id => Some(agent_id.as_str()),
            PendingOperation::AssignTask { .. } => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assign(task: &str, agent: &str) -> PendingOperation {
        PendingOperation::AssignTask {
            task_id: task.to_string(),
            agent_id: agent.to_string(),
        }
    }

    #[test]
    fn assign_command_yields_operation() {
        let data = json!({"task_id": " task_1 ", "agent_id": "agent_bd"});
        let op = PendingOperation::for_command("assign_task", data.as_object().unwrap());
        assert_eq!(op, Some(assign("task_1", "agent_bd")));
        assert!(PendingOperation::for_command("player_pos", &Map::new()).is_none());
    }

    #[test]
    fn latest_pending_assignment_wins_until_rolled_back() {
        let mut pending = PendingOperations::new();
        pending.track("cmd_1", assign("task_1", "agent_a"));
        pending.track("cmd_2", assign("task_1", "agent_b"));
        assert_eq!(pending.assignee_for("task_1"), Some("agent_b"));

        assert!(pending.rollback("cmd_2").is_some());
        assert_eq!(pending.assignee_for("task_1"), Some("agent_a"));

        assert!(pending.confirm("cmd_1").is_some());
        assert!(pending.is_empty());
        assert_eq!(pending.assignee_for("task_1"), None);
    }
}
