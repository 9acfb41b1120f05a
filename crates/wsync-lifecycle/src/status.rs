//! Closed status enums for every synchronized entity
//!
//! Wire names are snake_case and round-trip through `as_str`/`FromStr`.

use crate::error::LifecycleError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Entity kinds that carry a lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Project container
    Project,
    /// Unit of work inside a project
    Task,
    /// Question waiting on the user
    Decision,
    /// Versioned deliverable
    Artifact,
}

impl EntityKind {
    /// Wire name
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Task => "task",
            Self::Decision => "decision",
            Self::Artifact => "artifact",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "project" => Ok(Self::Project),
            "task" => Ok(Self::Task),
            "decision" => Ok(Self::Decision),
            "artifact" => Ok(Self::Artifact),
            other => Err(LifecycleError::UnknownEntityKind(other.to_string())),
        }
    }
}

macro_rules! status_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:expr, {
            $($(#[$vmeta:meta])* $variant:ident => $wire:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Every status, in declaration order
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Wire name
            #[inline]
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = LifecycleError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok(Self::$variant),)+
                    other => Err(LifecycleError::UnknownStatus {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

status_enum! {
    /// Project status
    ProjectStatus, EntityKind::Project, {
        /// Request captured, nothing planned yet
        Created => "created",
        /// Kickoff in progress
        Planning => "planning",
        /// Tasks dispatched
        Executing => "executing",
        /// Waiting on a decision or paused
        Blocked => "blocked",
        /// All work delivered
        Completed => "completed",
        /// Frozen for reference
        Archived => "archived",
    }
}

status_enum! {
    /// Task status
    TaskStatus, EntityKind::Task, {
        /// Not started
        Planned => "planned",
        /// Being worked on
        InProgress => "in_progress",
        /// Waiting on a decision
        Blocked => "blocked",
        /// Finished
        Done => "done",
        /// Abandoned
        Cancelled => "cancelled",
    }
}

status_enum! {
    /// Decision status
    DecisionStatus, EntityKind::Decision, {
        /// Waiting for a choice
        Open => "open",
        /// Choice recorded
        Resolved => "resolved",
        /// Withdrawn
        Cancelled => "cancelled",
    }
}

status_enum! {
    /// Artifact status
    ArtifactStatus, EntityKind::Artifact, {
        /// Produced but not handed over
        Created => "created",
        /// Handed to the user
        Delivered => "delivered",
        /// Under review
        InReview => "in_review",
        /// Accepted
        Approved => "approved",
        /// Sent back for another revision
        ChangesRequested => "changes_requested",
        /// Replaced by a newer version
        Superseded => "superseded",
        /// Frozen for reference
        Archived => "archived",
    }
}
