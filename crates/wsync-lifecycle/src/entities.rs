//! Entity records shared by snapshots, the repository and the client view
//!
//! Unknown fields are ignored on decode so newer peers can add attributes
//! without breaking older ones.

use crate::error::LifecycleError;
use crate::status::{ArtifactStatus, DecisionStatus, ProjectStatus, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// World position `[x, y, z]`
pub type Vec3 = [f64; 3];

/// Project record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub project_id: String,
    #[serde(default)]
    pub title: String,
    pub status: ProjectStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_ts: Option<DateTime<Utc>>,
}

impl Project {
    /// Create a project record
    #[must_use]
    pub fn new(project_id: impl Into<String>, title: impl Into<String>, status: ProjectStatus) -> Self {
        Self {
            project_id: project_id.into(),
            title: title.into(),
            status,
            updated_ts: None,
        }
    }
}

/// Task record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub project_id: String,
    #[serde(default)]
    pub title: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_ts: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_ts: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a task record
    #[must_use]
    pub fn new(
        task_id: impl Into<String>,
        project_id: impl Into<String>,
        title: impl Into<String>,
        status: TaskStatus,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            project_id: project_id.into(),
            title: title.into(),
            status,
            assignee: None,
            created_ts: None,
            updated_ts: None,
        }
    }

    /// With assignee
    #[must_use]
    pub fn with_assignee(mut self, agent_id: impl Into<String>) -> Self {
        self.assignee = Some(agent_id.into());
        self
    }
}

/// Decision record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub decision_id: String,
    pub project_id: String,
    pub status: DecisionStatus,
    #[serde(default)]
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_ts: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_ts: Option<DateTime<Utc>>,
}

impl Decision {
    /// Create a decision record
    #[must_use]
    pub fn new(
        decision_id: impl Into<String>,
        project_id: impl Into<String>,
        prompt: impl Into<String>,
        status: DecisionStatus,
    ) -> Self {
        Self {
            decision_id: decision_id.into(),
            project_id: project_id.into(),
            status,
            prompt: prompt.into(),
            task_id: None,
            created_ts: None,
            updated_ts: None,
        }
    }

    /// Attach to the task it blocks
    #[must_use]
    pub fn for_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }
}

/// Where an artifact's content lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentRef {
    /// Externally addressable content
    Uri {
        uri: String,
        #[serde(default)]
        mime_type: Option<String>,
        #[serde(default)]
        sha256: Option<String>,
    },
    /// Small text stored inline
    InlineText {
        text: String,
        #[serde(default = "default_text_mime")]
        mime_type: String,
    },
    /// Opaque blob in the store
    Blob {
        blob_id: String,
        #[serde(default)]
        mime_type: Option<String>,
        #[serde(default)]
        sha256: Option<String>,
    },
}

fn default_text_mime() -> String {
    "text/plain".to_string()
}

impl ContentRef {
    /// Trim identifiers and reject empty locations
    pub fn normalized(self) -> Result<Self, LifecycleError> {
        match self {
            Self::Uri { uri, mime_type, sha256 } => {
                let uri = uri.trim().to_string();
                if uri.is_empty() {
                    return Err(LifecycleError::InvalidField {
                        field: "artifact.content_ref.uri",
                        reason: "is required for kind=uri".to_string(),
                    });
                }
                Ok(Self::Uri { uri, mime_type, sha256 })
            }
            Self::InlineText { text, mime_type } => Ok(Self::InlineText { text, mime_type }),
            Self::Blob { blob_id, mime_type, sha256 } => {
                let blob_id = blob_id.trim().to_string();
                if blob_id.is_empty() {
                    return Err(LifecycleError::InvalidField {
                        field: "artifact.content_ref.blob_id",
                        reason: "is required for kind=blob".to_string(),
                    });
                }
                Ok(Self::Blob { blob_id, mime_type, sha256 })
            }
        }
    }
}

/// Artifact record, one version of a chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub artifact_id: String,
    pub project_id: String,
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub status: ArtifactStatus,
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_root_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poi_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_ref: Option<ContentRef>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_ts: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_ts: Option<DateTime<Utc>>,
}

impl Artifact {
    /// First version of a new chain
    #[must_use]
    pub fn new(
        artifact_id: impl Into<String>,
        project_id: impl Into<String>,
        artifact_type: impl Into<String>,
        status: ArtifactStatus,
    ) -> Self {
        Self {
            artifact_id: artifact_id.into(),
            project_id: project_id.into(),
            artifact_type: artifact_type.into(),
            status,
            version: 1,
            version_parent_id: None,
            version_root_id: None,
            task_id: None,
            poi_id: None,
            content_ref: None,
            metadata: Map::new(),
            created_ts: None,
            updated_ts: None,
        }
    }

    /// Attach to the task that produced it
    #[must_use]
    pub fn for_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// Id shared by every version of the chain
    #[must_use]
    pub fn root_id(&self) -> &str {
        self.version_root_id.as_deref().unwrap_or(&self.artifact_id)
    }
}

/// Agent record as seen in snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub pos: Vec3,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

impl Agent {
    /// Idle agent at the origin
    #[must_use]
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            state: "IdleAtHome".to_string(),
            pos: [0.0, 0.0, 0.0],
            task_id: None,
        }
    }

    /// Working on a task
    #[must_use]
    pub fn on_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_root_defaults_to_self() {
        let artifact = Artifact::new("art_1", "proj_a", "copy_doc", ArtifactStatus::Created);
        assert_eq!(artifact.root_id(), "art_1");
    }

    #[test]
    fn artifact_type_uses_wire_name() {
        let artifact = Artifact::new("art_1", "proj_a", "copy_doc", ArtifactStatus::Created);
        let json = serde_json::to_value(&artifact).unwrap();
        assert_eq!(json["type"], "copy_doc");
        assert!(json.get("metadata").is_none());
    }

    #[test]
    fn content_ref_rejects_blank_uri() {
        let content = ContentRef::Uri {
            uri: "   ".to_string(),
            mime_type: None,
            sha256: None,
        };
        assert!(content.normalized().is_err());
    }

    #[test]
    fn inline_text_defaults_mime() {
        let parsed: ContentRef =
            serde_json::from_str(r#"{"kind":"inline_text","text":"hi"}"#).unwrap();
        assert_eq!(
            parsed,
            ContentRef::InlineText {
                text: "hi".to_string(),
                mime_type: "text/plain".to_string()
            }
        );
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let task: Task = serde_json::from_str(
            r#"{"task_id":"task_1","project_id":"proj_a","title":"t","status":"planned","priority":3}"#,
        )
        .unwrap();
        assert_eq!(task.status, TaskStatus::Planned);
    }
}
