//! Error types for lifecycle and integrity rules

use crate::status::EntityKind;

/// Lifecycle rule violations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    /// Hop not present in the transition table
    #[error("illegal {kind} transition: {from} -> {to}")]
    IllegalTransition {
        kind: EntityKind,
        from: String,
        to: String,
    },

    /// Status name outside the closed enum
    #[error("invalid {kind} status: {value}")]
    UnknownStatus { kind: EntityKind, value: String },

    /// Entity kind name not recognized
    #[error("unknown entity kind: {0}")]
    UnknownEntityKind(String),

    /// Sequence with no hop in it
    #[error("{kind} transition sequence needs at least two statuses, got {len}")]
    SequenceTooShort { kind: EntityKind, len: usize },

    /// Field value rejected by a record invariant
    #[error("{field} {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Dangling reference found while validating a snapshot
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} {entity_id} references unknown {target} {target_id}")]
pub struct ReferenceError {
    /// Referencing entity label ("Task", "Decision", ...)
    pub entity: &'static str,
    /// Referencing entity id
    pub entity_id: String,
    /// Referenced entity label ("project", "task", "assignee", ...)
    pub target: &'static str,
    /// Missing id
    pub target_id: String,
}

impl ReferenceError {
    pub(crate) fn new(
        entity: &'static str,
        entity_id: impl Into<String>,
        target: &'static str,
        target_id: impl Into<String>,
    ) -> Self {
        Self {
            entity,
            entity_id: entity_id.into(),
            target,
            target_id: target_id.into(),
        }
    }
}
