//! wsync Lifecycle - entity records and the rules they obey
//!
//! Provides:
//! - Closed status enums for projects, tasks, decisions and artifacts
//! - Fixed transition tables with single-hop and path validation
//! - Snapshot referential-integrity checks
//!
//! # Example
//!
//! ```rust
//! use wsync_lifecycle::{validate_transition_sequence, EntityKind};
//!
//! assert!(validate_transition_sequence(EntityKind::Task, &["planned", "in_progress", "done"]));
//! assert!(!validate_transition_sequence(EntityKind::Task, &["done", "in_progress"]));
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod entities;
pub mod error;
pub mod snapshot;
pub mod state_machine;
pub mod status;

pub use entities::{Agent, Artifact, ContentRef, Decision, Project, Task, Vec3};
pub use error::{LifecycleError, ReferenceError};
pub use snapshot::WorldSnapshot;
pub use state_machine::{
    check_transition_sequence, validate_transition, validate_transition_sequence, Lifecycle,
};
pub use status::{ArtifactStatus, DecisionStatus, EntityKind, ProjectStatus, TaskStatus};
