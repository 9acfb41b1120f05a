//! wsync Repository - authoritative world storage
//!
//! Provides:
//! - An in-memory store with all-or-nothing transactions
//! - Lifecycle-enforcing status updates and artifact version chains
//! - Atomic multi-entity operations with ordered world events
//! - Command receipts for idempotent replays
//! - A bounded, hash-chained event timeline with resume evaluation
//! - The command processor that ties them together
//!
//! # Example
//!
//! ```rust
//! use wsync_lifecycle::{Project, ProjectStatus, Task, TaskStatus, WorldSnapshot};
//! use wsync_repository::InMemoryStore;
//!
//! let store = InMemoryStore::seeded(&WorldSnapshot {
//!     projects: vec![Project::new("proj_alpha", "Alpha", ProjectStatus::Executing)],
//!     tasks: vec![Task::new("task_1", "proj_alpha", "Draft", TaskStatus::Planned)],
//!     ..WorldSnapshot::default()
//! })
//! .unwrap();
//!
//! store
//!     .with_transaction(|tx| tx.update_task_status("task_1", TaskStatus::InProgress))
//!     .unwrap();
//! assert_eq!(
//!     store.read(|view| view.task("task_1").map(|t| t.status)),
//!     Some(TaskStatus::InProgress)
//! );
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod error;
pub mod metrics;
pub mod processor;
pub mod records;
pub mod store;
pub mod timeline;
pub mod transaction;
pub mod view;

pub use error::{RepositoryError, Result};
pub use processor::{
    CommandOutcome, CommandProcessor, CommandRequest, ProcessedCommand,
    RETAINED_COMMAND_ID_RECEIPTS, WORLD_SCOPE,
};
pub use records::{
    AuditTrail, CommandReceipt, ContentReference, NewEvent, ReceiptOutcome, RecordedReceipt,
    RevisionRequest, ViewerRecord, WorldEvent,
};
pub use store::InMemoryStore;
pub use timeline::{
    EventTimeline, ReplayPage, ResumeEvaluation, TimelineEntry, DEFAULT_RETAINED_EVENTS,
    MIN_RETAINED_EVENTS,
};
pub use transaction::Transaction;
pub use view::ReadView;
