//! Client-side copy of the world
//!
//! Snapshots replace state in full. Events are applied in seq order on top
//! of the latest snapshot and advance the resume cursor. Entity changes the
//! server has confirmed since that snapshot live in a [`ConfirmedChanges`]
//! overlay, which the next snapshot discards.

use crate::error::ProtocolViolation;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use wsync_envelope::{EventPayload, ResumeDecision};
use wsync_lifecycle::{ArtifactStatus, DecisionStatus, TaskStatus, WorldSnapshot};

/// What to do with a snapshot that arrives after events were applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MidStreamSnapshotPolicy {
    /// Replace state in full
    #[default]
    Replace,
    /// Drop it and report a violation
    Reject,
}

/// Client-held resume position
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeCursor {
    /// Seq of the last applied event
    pub last_seq: Option<u64>,
    /// Envelope id of the last applied snapshot
    pub last_snapshot_id: Option<String>,
}

/// Outcome of applying one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDisposition {
    /// Next in sequence
    Applied,
    /// At or below the cursor; ignored
    Duplicate,
    /// Applied, but the seq skipped past `expected`
    AppliedAfterGap { expected: u64 },
}

/// Server-confirmed entity changes newer than the durable snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfirmedChanges {
    assignees: HashMap<String, String>,
    task_status: HashMap<String, TaskStatus>,
    decision_status: HashMap<String, DecisionStatus>,
    artifact_status: HashMap<String, ArtifactStatus>,
}

impl ConfirmedChanges {
    /// Fold one event; names without an entity effect are ignored
    pub fn fold(&mut self, event: &EventPayload) {
        let task_id = event.task_id.as_deref();
        match event.name.as_str() {
            "task_assigned" | "task_reassigned" => {
                if let (Some(task_id), Some(agent_id)) = (task_id, event.agent_id.as_deref()) {
                    self.assign(task_id, agent_id);
                }
            }
            "task_started" => self.set_task_status(task_id, TaskStatus::InProgress),
            "task_done" => self.set_task_status(task_id, TaskStatus::Done),
            "task_cancelled" => self.set_task_status(task_id, TaskStatus::Cancelled),
            "decision_resolved" => {
                if let Some(decision_id) = &event.decision_id {
                    self.decision_status
                        .insert(decision_id.clone(), DecisionStatus::Resolved);
                }
            }
            "review_approved" => self.set_artifact_status(event, ArtifactStatus::Approved),
            "review_changes_requested" => {
                self.set_artifact_status(event, ArtifactStatus::ChangesRequested);
            }
            _ => {}
        }
    }

    /// Record an assignee
    pub fn assign(&mut self, task_id: &str, agent_id: &str) {
        self.assignees
            .insert(task_id.to_string(), agent_id.to_string());
    }

    fn set_task_status(&mut self, task_id: Option<&str>, status: TaskStatus) {
        if let Some(task_id) = task_id {
            self.task_status.insert(task_id.to_string(), status);
        }
    }

    fn set_artifact_status(&mut self, event: &EventPayload, status: ArtifactStatus) {
        if let Some(artifact_id) = &event.artifact_id {
            self.artifact_status.insert(artifact_id.clone(), status);
        }
    }

    /// Confirmed assignee
    #[must_use]
    pub fn assignee(&self, task_id: &str) -> Option<&str> {
        self.assignees.get(task_id).map(String::as_str)
    }

    /// Confirmed task status
    #[must_use]
    pub fn task_status(&self, task_id: &str) -> Option<TaskStatus> {
        self.task_status.get(task_id).copied()
    }

    /// Confirmed decision status
    #[must_use]
    pub fn decision_status(&self, decision_id: &str) -> Option<DecisionStatus> {
        self.decision_status.get(decision_id).copied()
    }

    /// Confirmed artifact status
    #[must_use]
    pub fn artifact_status(&self, artifact_id: &str) -> Option<ArtifactStatus> {
        self.artifact_status.get(artifact_id).copied()
    }

    /// Nothing confirmed since the snapshot
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assignees.is_empty()
            && self.task_status.is_empty()
            && self.decision_status.is_empty()
            && self.artifact_status.is_empty()
    }
}

/// Durable snapshot, confirmed changes, recent events and the resume cursor
#[derive(Debug)]
pub struct WorldView {
    snapshot: Option<WorldSnapshot>,
    confirmed: ConfirmedChanges,
    cursor: ResumeCursor,
    events: VecDeque<EventPayload>,
    history: usize,
    policy: MidStreamSnapshotPolicy,
    awaiting_snapshot: bool,
    stale: bool,
}

impl WorldView {
    /// Empty view keeping at most `history` recent events
    #[must_use]
    pub fn new(policy: MidStreamSnapshotPolicy, history: usize) -> Self {
        Self {
            snapshot: None,
            confirmed: ConfirmedChanges::default(),
            cursor: ResumeCursor::default(),
            events: VecDeque::new(),
            history: history.max(1),
            policy,
            awaiting_snapshot: false,
            stale: false,
        }
    }

    /// Durable snapshot, without confirmed changes
    #[must_use]
    pub fn snapshot(&self) -> Option<&WorldSnapshot> {
        self.snapshot.as_ref()
    }

    /// Changes confirmed since the snapshot
    #[must_use]
    pub fn confirmed(&self) -> &ConfirmedChanges {
        &self.confirmed
    }

    /// An acked assignment, ahead of its `task_assigned` event
    pub fn confirm_assignment(&mut self, task_id: &str, agent_id: &str) {
        self.confirmed.assign(task_id, agent_id);
    }

    /// Current assignee: confirmed overlay first, then the snapshot
    #[must_use]
    pub fn task_assignee(&self, task_id: &str) -> Option<&str> {
        if let Some(agent_id) = self.confirmed.assignee(task_id) {
            return Some(agent_id);
        }
        self.snapshot.as_ref()?.task(task_id)?.assignee.as_deref()
    }

    /// Task status with confirmed changes applied
    #[must_use]
    pub fn task_status(&self, task_id: &str) -> Option<TaskStatus> {
        self.confirmed
            .task_status(task_id)
            .or_else(|| Some(self.snapshot.as_ref()?.task(task_id)?.status))
    }

    /// Decision status with confirmed changes applied
    #[must_use]
    pub fn decision_status(&self, decision_id: &str) -> Option<DecisionStatus> {
        self.confirmed.decision_status(decision_id).or_else(|| {
            self.snapshot
                .as_ref()?
                .decisions
                .iter()
                .find(|d| d.decision_id == decision_id)
                .map(|d| d.status)
        })
    }

    /// Artifact status with confirmed changes applied
    #[must_use]
    pub fn artifact_status(&self, artifact_id: &str) -> Option<ArtifactStatus> {
        self.confirmed.artifact_status(artifact_id).or_else(|| {
            self.snapshot
                .as_ref()?
                .artifacts
                .iter()
                .find(|a| a.artifact_id == artifact_id)
                .map(|a| a.status)
        })
    }

    /// Resume position
    #[must_use]
    pub fn cursor(&self) -> &ResumeCursor {
        &self.cursor
    }

    /// Recent events, oldest first
    #[must_use]
    pub fn events(&self) -> &VecDeque<EventPayload> {
        &self.events
    }

    /// State kept from a lost connection; not reliable until the next snapshot
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Connection lost; keep state until the next snapshot
    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    /// Apply the resume decision from `hello_ack`
    ///
    /// `fresh` is the truncate signal: the old cursor is meaningless against
    /// the server's timeline and is dropped before the snapshot arrives.
    pub fn on_resume_decision(&mut self, decision: &ResumeDecision) {
        if !decision.is_resumed() {
            self.cursor.last_seq = None;
        }
    }

    /// A subscribe was sent; the next snapshot is the expected one
    pub fn begin_subscription(&mut self) {
        self.awaiting_snapshot = true;
    }

    /// Replace state with a snapshot identified by its envelope id
    pub fn apply_snapshot(
        &mut self,
        snapshot_id: &str,
        snapshot: WorldSnapshot,
    ) -> Result<(), ProtocolViolation> {
        if !self.awaiting_snapshot && self.policy == MidStreamSnapshotPolicy::Reject {
            return Err(ProtocolViolation::MidStreamSnapshot {
                snapshot_id: snapshot_id.to_string(),
            });
        }
        snapshot
            .validate_references()
            .map_err(|e| ProtocolViolation::InconsistentSnapshot {
                snapshot_id: snapshot_id.to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!(
            snapshot_id,
            tasks = snapshot.tasks.len(),
            mid_stream = !self.awaiting_snapshot,
            "snapshot applied"
        );
        self.snapshot = Some(snapshot);
        self.confirmed = ConfirmedChanges::default();
        self.cursor.last_snapshot_id = Some(snapshot_id.to_string());
        self.awaiting_snapshot = false;
        self.stale = false;
        Ok(())
    }

    /// Apply one event after the current cursor
    pub fn apply_event(&mut self, event: EventPayload) -> Result<EventDisposition, ProtocolViolation> {
        if self.snapshot.is_none() || self.awaiting_snapshot {
            return Err(ProtocolViolation::EventBeforeSnapshot { seq: event.seq });
        }
        let disposition = match self.cursor.last_seq {
            Some(last) if event.seq <= last => return Ok(EventDisposition::Duplicate),
            Some(last) if event.seq > last + 1 => EventDisposition::AppliedAfterGap {
                expected: last + 1,
            },
            _ => EventDisposition::Applied,
        };
        self.cursor.last_seq = Some(event.seq);
        self.confirmed.fold(&event);
        self.events.push_back(event);
        while self.events.len() > self.history {
            self.events.pop_front();
        }
        Ok(disposition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use wsync_envelope::FallbackReason;
    use wsync_lifecycle::{Agent, Decision, Project, ProjectStatus, Task};

    fn event(seq: u64) -> EventPayload {
        EventPayload {
            seq,
            name: "task_assigned".to_string(),
            project_id: "proj_alpha".to_string(),
            task_id: None,
            decision_id: None,
            artifact_id: None,
            agent_id: None,
            participants: Vec::new(),
            meta: Map::new(),
        }
    }

    fn named(seq: u64, name: &str) -> EventPayload {
        EventPayload {
            name: name.to_string(),
            task_id: Some("task_1".to_string()),
            ..event(seq)
        }
    }

    fn office() -> WorldSnapshot {
        WorldSnapshot {
            agents: vec![Agent::new("agent_a"), Agent::new("agent_b")],
            tasks: vec![
                Task::new("task_1", "proj_alpha", "t", TaskStatus::Planned).with_assignee("agent_a"),
            ],
            decisions: vec![Decision::new("dec_1", "proj_alpha", "Pick one?", DecisionStatus::Open)],
            projects: vec![Project::new("proj_alpha", "Alpha", ProjectStatus::Executing)],
            ..WorldSnapshot::default()
        }
    }

    fn subscribed(policy: MidStreamSnapshotPolicy) -> WorldView {
        let mut view = WorldView::new(policy, 10);
        view.begin_subscription();
        view.apply_snapshot("snap_1", WorldSnapshot::default()).unwrap();
        view
    }

    #[test]
    fn events_before_snapshot_are_rejected() {
        let mut view = WorldView::new(MidStreamSnapshotPolicy::Replace, 10);
        assert!(matches!(
            view.apply_event(event(1)),
            Err(ProtocolViolation::EventBeforeSnapshot { seq: 1 })
        ));
    }

    #[test]
    fn cursor_tracks_events_and_skips_duplicates() {
        let mut view = subscribed(MidStreamSnapshotPolicy::Replace);
        assert_eq!(view.apply_event(event(1)), Ok(EventDisposition::Applied));
        assert_eq!(view.apply_event(event(2)), Ok(EventDisposition::Applied));
        assert_eq!(view.apply_event(event(2)), Ok(EventDisposition::Duplicate));
        assert_eq!(
            view.apply_event(event(5)),
            Ok(EventDisposition::AppliedAfterGap { expected: 3 })
        );
        assert_eq!(view.cursor().last_seq, Some(5));
        assert_eq!(view.cursor().last_snapshot_id.as_deref(), Some("snap_1"));
    }

    #[test]
    fn fresh_decision_truncates_cursor() {
        let mut view = subscribed(MidStreamSnapshotPolicy::Replace);
        view.apply_event(event(7)).unwrap();
        view.on_resume_decision(&ResumeDecision::fresh(FallbackReason::ServerRestarted));
        assert_eq!(view.cursor().last_seq, None);
    }

    #[test]
    fn mid_stream_snapshot_follows_policy() {
        let mut replace = subscribed(MidStreamSnapshotPolicy::Replace);
        assert!(replace.apply_snapshot("snap_2", WorldSnapshot::default()).is_ok());
        assert_eq!(replace.cursor().last_snapshot_id.as_deref(), Some("snap_2"));

        let mut reject = subscribed(MidStreamSnapshotPolicy::Reject);
        assert!(reject.apply_snapshot("snap_2", WorldSnapshot::default()).is_err());
        assert_eq!(reject.cursor().last_snapshot_id.as_deref(), Some("snap_1"));
    }

    #[test]
    fn dangling_snapshot_is_not_applied() {
        let mut view = WorldView::new(MidStreamSnapshotPolicy::Replace, 10);
        view.begin_subscription();
        let broken = WorldSnapshot {
            tasks: vec![Task::new("task_1", "proj_missing", "t", TaskStatus::Planned)],
            projects: vec![Project::new("proj_alpha", "Alpha", ProjectStatus::Executing)],
            ..WorldSnapshot::default()
        };
        let err = view.apply_snapshot("snap_x", broken).unwrap_err();
        assert!(err.to_string().contains("proj_missing"));
        assert!(view.snapshot().is_none());
    }

    #[test]
    fn confirmed_events_overlay_the_snapshot() {
        let mut view = WorldView::new(MidStreamSnapshotPolicy::Replace, 10);
        view.begin_subscription();
        view.apply_snapshot("snap_1", office()).unwrap();
        assert_eq!(view.task_assignee("task_1"), Some("agent_a"));

        let assigned = EventPayload {
            agent_id: Some("agent_b".to_string()),
            ..named(1, "task_assigned")
        };
        view.apply_event(assigned).unwrap();
        view.apply_event(named(2, "task_started")).unwrap();
        view.apply_event(EventPayload {
            decision_id: Some("dec_1".to_string()),
            ..named(3, "decision_resolved")
        })
        .unwrap();

        assert_eq!(view.task_assignee("task_1"), Some("agent_b"));
        assert_eq!(view.task_status("task_1"), Some(TaskStatus::InProgress));
        assert_eq!(view.decision_status("dec_1"), Some(DecisionStatus::Resolved));
        let durable = view.snapshot().and_then(|s| s.task("task_1")).unwrap();
        assert_eq!(durable.assignee.as_deref(), Some("agent_a"));
    }

    #[test]
    fn snapshot_discards_confirmed_changes() {
        let mut view = WorldView::new(MidStreamSnapshotPolicy::Replace, 10);
        view.begin_subscription();
        view.apply_snapshot("snap_1", office()).unwrap();
        view.confirm_assignment("task_1", "agent_b");
        view.apply_event(named(1, "task_cancelled")).unwrap();
        assert!(!view.confirmed().is_empty());

        view.apply_snapshot("snap_2", office()).unwrap();
        assert!(view.confirmed().is_empty());
        assert_eq!(view.task_assignee("task_1"), Some("agent_a"));
        assert_eq!(view.task_status("task_1"), Some(TaskStatus::Planned));
    }

    #[test]
    fn duplicate_events_do_not_fold() {
        let mut view = WorldView::new(MidStreamSnapshotPolicy::Replace, 10);
        view.begin_subscription();
        view.apply_snapshot("snap_1", office()).unwrap();
        view.apply_event(named(4, "task_done")).unwrap();
        view.apply_event(named(4, "task_cancelled")).unwrap();
        assert_eq!(view.task_status("task_1"), Some(TaskStatus::Done));
    }

    #[test]
    fn history_is_bounded() {
        let mut view = WorldView::new(MidStreamSnapshotPolicy::Replace, 2);
        view.begin_subscription();
        view.apply_snapshot("s", WorldSnapshot::default()).unwrap();
        for seq in 1..=4 {
            view.apply_event(event(seq)).unwrap();
        }
        let seqs: Vec<u64> = view.events().iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![3, 4]);
    }
}
