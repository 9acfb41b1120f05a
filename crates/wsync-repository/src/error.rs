//! Error types for the world repository

use wsync_envelope::ErrorCode;
use wsync_lifecycle::{LifecycleError, ReferenceError};

/// Repository failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    /// Entity lookup missed
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Insert collided with an existing row
    #[error("{table}:{id} already exists")]
    AlreadyExists { table: &'static str, id: String },

    /// Transition or record invariant rejected
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Seed data referenced a missing entity
    #[error(transparent)]
    Reference(#[from] ReferenceError),

    /// Artifact record or version chain rule violated
    #[error("{0}")]
    InvalidArtifact(String),

    /// Version already present in the chain
    #[error("artifact version {version} already exists for chain {root_id}")]
    DuplicateVersion { version: u32, root_id: String },

    /// Caller's expectation about current state did not hold
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Refused by policy (for example a paused project)
    #[error("not allowed: {0}")]
    NotAllowed(String),

    /// Explicit event seq at or below the project's current seq
    #[error("event seq {seq} for {project_id} must exceed current seq {current}")]
    SequenceRegression {
        project_id: String,
        seq: u64,
        current: u64,
    },

    /// Event timeline hash chain broken
    #[error("event timeline integrity violation at seq {seq}")]
    Integrity { seq: u64 },
}

impl RepositoryError {
    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Wire error code for this failure
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::AlreadyExists { .. }
            | Self::DuplicateVersion { .. }
            | Self::Precondition(_)
            | Self::SequenceRegression { .. } => ErrorCode::Conflict,
            Self::Lifecycle(LifecycleError::IllegalTransition { .. }) => ErrorCode::Conflict,
            Self::Lifecycle(_) | Self::Reference(_) | Self::InvalidArtifact(_) => {
                ErrorCode::ValidationFailed
            }
            Self::NotAllowed(_) => ErrorCode::NotAllowed,
            Self::Integrity { .. } => ErrorCode::Internal,
        }
    }

    /// Check if retrying after a refresh may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.error_code().is_retryable()
    }
}

/// Result alias for repository operations
pub type Result<T> = std::result::Result<T, RepositoryError>;

#[cfg(test)]
mod tests {
    use super::*;
    use wsync_lifecycle::EntityKind;

    #[test]
    fn illegal_transition_maps_to_conflict() {
        let err = RepositoryError::from(LifecycleError::IllegalTransition {
            kind: EntityKind::Task,
            from: "done".to_string(),
            to: "in_progress".to_string(),
        });
        assert_eq!(err.error_code(), ErrorCode::Conflict);
        assert!(err.is_retryable());
    }

    #[test]
    fn missing_entity_maps_to_not_found() {
        let err = RepositoryError::not_found("Task", "task_9");
        assert_eq!(err.to_string(), "Task not found: task_9");
        assert_eq!(err.error_code(), ErrorCode::NotFound);
    }
}
