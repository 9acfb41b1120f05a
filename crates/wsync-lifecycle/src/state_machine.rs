use crate::error::LifecycleError;
use crate::status::{ArtifactStatus, DecisionStatus, EntityKind, ProjectStatus, TaskStatus};
use std::str::FromStr;

/// A status enum with a fixed transition table.
pub trait Lifecycle: Copy + Eq + FromStr<Err = LifecycleError> + 'static {
    /// Entity the status belongs to
    const KIND: EntityKind;

    /// Statuses reachable in one hop from `self`
    fn allowed_transitions(self) -> &'static [Self];

    /// Wire name of the status
    fn wire_name(self) -> &'static str;

    /// No outgoing transitions
    fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }
}

impl Lifecycle for TaskStatus {
    const KIND: EntityKind = EntityKind::Task;

    fn allowed_transitions(self) -> &'static [Self] {
        use TaskStatus::*;
        match self {
            Planned => &[InProgress, Cancelled],
            InProgress => &[Blocked, Done, Cancelled],
            Blocked => &[InProgress, Cancelled],
            Done | Cancelled => &[],
        }
    }

    fn wire_name(self) -> &'static str {
        self.as_str()
    }
}

impl Lifecycle for DecisionStatus {
    const KIND: EntityKind = EntityKind::Decision;

    fn allowed_transitions(self) -> &'static [Self] {
        use DecisionStatus::*;
        match self {
            Open => &[Resolved, Cancelled],
            Resolved | Cancelled => &[],
        }
    }

    fn wire_name(self) -> &'static str {
        self.as_str()
    }
}

impl Lifecycle for ArtifactStatus {
    const KIND: EntityKind = EntityKind::Artifact;

    fn allowed_transitions(self) -> &'static [Self] {
        use ArtifactStatus::*;
        match self {
            Created => &[Delivered, Superseded],
            Delivered => &[InReview, Approved, ChangesRequested, Superseded],
            InReview => &[Approved, ChangesRequested, Superseded],
            ChangesRequested => &[InReview, Superseded],
            Approved => &[Archived, Superseded],
            Superseded => &[Archived],
            Archived => &[],
        }
    }

    fn wire_name(self) -> &'static str {
        self.as_str()
    }
}

/// Project status moves are driven by pause/resume overrides and kickoff,
/// so the table is looser than the task table but still closed.
impl Lifecycle for ProjectStatus {
    const KIND: EntityKind = EntityKind::Project;

    fn allowed_transitions(self) -> &'static [Self] {
        use ProjectStatus::*;
        match self {
            Created => &[Planning, Executing, Archived],
            Planning => &[Executing, Blocked, Archived],
            Executing => &[Blocked, Completed, Archived],
            Blocked => &[Executing, Planning, Archived],
            Completed => &[Archived],
            Archived => &[],
        }
    }

    fn wire_name(self) -> &'static str {
        self.as_str()
    }
}

/// Validates a single hop.
///
/// Illegal hops are returned as errors, never clamped to the nearest legal
/// status. A self-transition is not a hop and is rejected as well.
pub fn validate_transition<S: Lifecycle>(from: S, to: S) -> Result<(), LifecycleError> {
    if from.allowed_transitions().contains(&to) {
        Ok(())
    } else {
        Err(LifecycleError::IllegalTransition {
            kind: S::KIND,
            from: from.wire_name().to_string(),
            to: to.wire_name().to_string(),
        })
    }
}

/// Validates a full path of wire names for `kind`.
///
/// Fewer than two statuses is never a valid path. Unknown status names fail.
pub fn validate_transition_sequence(kind: EntityKind, sequence: &[&str]) -> bool {
    match kind {
        EntityKind::Task => sequence_is_valid::<TaskStatus>(sequence),
        EntityKind::Decision => sequence_is_valid::<DecisionStatus>(sequence),
        EntityKind::Artifact => sequence_is_valid::<ArtifactStatus>(sequence),
        EntityKind::Project => sequence_is_valid::<ProjectStatus>(sequence),
    }
}

/// Same as [`validate_transition_sequence`] but reports the first offending hop.
pub fn check_transition_sequence<S: Lifecycle>(sequence: &[&str]) -> Result<(), LifecycleError> {
    if sequence.len() < 2 {
        return Err(LifecycleError::SequenceTooShort {
            kind: S::KIND,
            len: sequence.len(),
        });
    }
    let parsed = sequence
        .iter()
        .map(|name| name.parse::<S>())
        .collect::<Result<Vec<_>, _>>()?;
    parsed
        .windows(2)
        .try_for_each(|pair| validate_transition(pair[0], pair[1]))
}

fn sequence_is_valid<S: Lifecycle>(sequence: &[&str]) -> bool {
    check_transition_sequence::<S>(sequence).is_ok()
}
