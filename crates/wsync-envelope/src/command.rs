//! Command catalog: names, typed data and sanitization
//!
//! Every command has a fixed set of data keys. Unknown keys are rejected,
//! identifiers are cleaned and length-checked, text is normalized and
//! truncated, enum fields are lowercased.

use crate::error::CommandValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use wsync_lifecycle::{ProjectStatus, TaskStatus, Vec3};

/// Maximum identifier length after cleaning
pub const ID_MAX_LENGTH: usize = 128;
/// Maximum number of titles in `split_into_tasks`
pub const MAX_TASK_TITLES: usize = 16;

/// Text limits per field
pub mod limits {
    pub const SUBMIT_REQUEST_TEXT: usize = 2000;
    pub const RESOLVE_DECISION_CHOICE: usize = 280;
    pub const REQUEST_CHANGES_INSTRUCTIONS: usize = 4000;
    pub const SPLIT_TASK_TITLE: usize = 160;
    pub const OVERRIDE_REASON: usize = 400;
}

static CONTROL_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x00-\x1F\x7F]").expect("control char pattern"));
static TEXT_CONTROL_CHARS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").expect("text control char pattern")
});
static CRLF: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r\n?").expect("crlf pattern"));
static INLINE_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").expect("space pattern"));
static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("blank run pattern"));
static ANY_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

/// Catalog command names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandName {
    SubmitRequest,
    AssignTask,
    AutoAssign,
    ResolveDecision,
    ApproveArtifact,
    RequestChanges,
    SplitIntoTasks,
    PlayerPos,
    MovePlayerTo,
    StartKickoff,
    ReassignTask,
    CancelTask,
    PauseProject,
    ResumeProject,
    RerunTask,
}

impl CommandName {
    /// Every command
    pub const ALL: &'static [Self] = &[
        Self::SubmitRequest,
        Self::AssignTask,
        Self::AutoAssign,
        Self::ResolveDecision,
        Self::ApproveArtifact,
        Self::RequestChanges,
        Self::SplitIntoTasks,
        Self::PlayerPos,
        Self::MovePlayerTo,
        Self::StartKickoff,
        Self::ReassignTask,
        Self::CancelTask,
        Self::PauseProject,
        Self::ResumeProject,
        Self::RerunTask,
    ];

    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SubmitRequest => "submit_request",
            Self::AssignTask => "assign_task",
            Self::AutoAssign => "auto_assign",
            Self::ResolveDecision => "resolve_decision",
            Self::ApproveArtifact => "approve_artifact",
            Self::RequestChanges => "request_changes",
            Self::SplitIntoTasks => "split_into_tasks",
            Self::PlayerPos => "player_pos",
            Self::MovePlayerTo => "move_player_to",
            Self::StartKickoff => "start_kickoff",
            Self::ReassignTask => "reassign_task",
            Self::CancelTask => "cancel_task",
            Self::PauseProject => "pause_project",
            Self::ResumeProject => "resume_project",
            Self::RerunTask => "rerun_task",
        }
    }

    /// Data keys accepted by this command
    #[must_use]
    pub const fn allowed_keys(self) -> &'static [&'static str] {
        match self {
            Self::SubmitRequest => &["text"],
            Self::AssignTask => &["task_id", "agent_id"],
            Self::AutoAssign => &["project_id"],
            Self::ResolveDecision => &["decision_id", "choice"],
            Self::ApproveArtifact => &["artifact_id"],
            Self::RequestChanges => &["artifact_id", "instructions"],
            Self::SplitIntoTasks => &["artifact_id", "task_titles"],
            Self::PlayerPos => &["pos", "facing"],
            Self::MovePlayerTo => &["pos"],
            Self::StartKickoff => &["project_id"],
            Self::ReassignTask => &[
                "task_id",
                "from_agent_id",
                "to_agent_id",
                "reason",
                "expected_task_status",
            ],
            Self::CancelTask => &["task_id", "reason", "confirm", "expected_task_status"],
            Self::PauseProject => &["project_id", "reason", "scope", "expected_project_status"],
            Self::ResumeProject => &["project_id", "reason", "expected_project_status"],
            Self::RerunTask => &["source_task_id", "mode", "reason", "constraints_patch"],
        }
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandName {
    type Err = CommandValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| CommandValidationError::new(format!("unknown command: {s}")))
    }
}

/// Scope of a project pause
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseScope {
    #[default]
    DispatchOnly,
}

/// How a task is rerun
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerunMode {
    #[default]
    CloneAsNew,
}

/// Sanitized command data, one variant per catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "data", rename_all = "snake_case")]
pub enum CommandData {
    SubmitRequest {
        text: String,
    },
    AssignTask {
        task_id: String,
        agent_id: String,
    },
    AutoAssign {
        project_id: String,
    },
    ResolveDecision {
        decision_id: String,
        choice: String,
    },
    ApproveArtifact {
        artifact_id: String,
    },
    RequestChanges {
        artifact_id: String,
        instructions: String,
    },
    SplitIntoTasks {
        artifact_id: String,
        task_titles: Vec<String>,
    },
    PlayerPos {
        pos: Vec3,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        facing: Option<Vec3>,
    },
    MovePlayerTo {
        pos: Vec3,
    },
    StartKickoff {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        project_id: Option<String>,
    },
    ReassignTask {
        task_id: String,
        to_agent_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from_agent_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expected_task_status: Option<TaskStatus>,
    },
    CancelTask {
        task_id: String,
        confirm: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expected_task_status: Option<TaskStatus>,
    },
    PauseProject {
        project_id: String,
        #[serde(default)]
        scope: PauseScope,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expected_project_status: Option<ProjectStatus>,
    },
    ResumeProject {
        project_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expected_project_status: Option<ProjectStatus>,
    },
    RerunTask {
        source_task_id: String,
        #[serde(default)]
        mode: RerunMode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        constraints_patch: Option<Map<String, Value>>,
    },
}

impl CommandData {
    /// Catalog name
    #[must_use]
    pub const fn name(&self) -> CommandName {
        match self {
            Self::SubmitRequest { .. } => CommandName::SubmitRequest,
            Self::AssignTask { .. } => CommandName::AssignTask,
            Self::AutoAssign { .. } => CommandName::AutoAssign,
            Self::ResolveDecision { .. } => CommandName::ResolveDecision,
            Self::ApproveArtifact { .. } => CommandName::ApproveArtifact,
            Self::RequestChanges { .. } => CommandName::RequestChanges,
            Self::SplitIntoTasks { .. } => CommandName::SplitIntoTasks,
            Self::PlayerPos { .. } => CommandName::PlayerPos,
            Self::MovePlayerTo { .. } => CommandName::MovePlayerTo,
            Self::StartKickoff { .. } => CommandName::StartKickoff,
            Self::ReassignTask { .. } => CommandName::ReassignTask,
            Self::CancelTask { .. } => CommandName::CancelTask,
            Self::PauseProject { .. } => CommandName::PauseProject,
            Self::ResumeProject { .. } => CommandName::ResumeProject,
            Self::RerunTask { .. } => CommandName::RerunTask,
        }
    }

    /// Data object as sent on the wire
    #[must_use]
    pub fn to_data(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut map)) => match map.remove("data") {
                Some(Value::Object(data)) => data,
                _ => Map::new(),
            },
            _ => Map::new(),
        }
    }
}

/// Result of a successful catalog check
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizedCommand {
    pub data: CommandData,
    /// Text fields whose value changed during sanitization
    pub sanitized_text_fields: usize,
}

/// Validate `data` against the catalog entry for `name` and clean it
pub fn validate_and_sanitize(
    name: &str,
    data: &Map<String, Value>,
) -> Result<SanitizedCommand, CommandValidationError> {
    let command: CommandName = name.parse()?;
    let allowed = command.allowed_keys();
    if data.keys().any(|key| !allowed.contains(&key.as_str())) {
        return Err(CommandValidationError::new(format!(
            "{command} accepts only {{{}}}",
            allowed.join(",")
        )));
    }

    let fields = Fields { command, data };
    let mut changed = 0usize;

    let data = match command {
        CommandName::SubmitRequest => CommandData::SubmitRequest {
            text: fields.text("text", limits::SUBMIT_REQUEST_TEXT, false, &mut changed)?,
        },
        CommandName::AssignTask => CommandData::AssignTask {
            task_id: fields.identifier("task_id")?,
            agent_id: fields.identifier("agent_id")?,
        },
        CommandName::AutoAssign => CommandData::AutoAssign {
            project_id: fields.identifier("project_id")?,
        },
        CommandName::ResolveDecision => {
            let decision_id = fields.identifier("decision_id")?;
            CommandData::ResolveDecision {
                decision_id,
                choice: fields.text("choice", limits::RESOLVE_DECISION_CHOICE, false, &mut changed)?,
            }
        }
        CommandName::ApproveArtifact => CommandData::ApproveArtifact {
            artifact_id: fields.identifier("artifact_id")?,
        },
        CommandName::RequestChanges => {
            let artifact_id = fields.identifier("artifact_id")?;
            CommandData::RequestChanges {
                artifact_id,
                instructions: fields.text(
                    "instructions",
                    limits::REQUEST_CHANGES_INSTRUCTIONS,
                    true,
                    &mut changed,
                )?,
            }
        }
        CommandName::SplitIntoTasks => {
            let artifact_id = fields.identifier("artifact_id")?;
            let (task_titles, titles_changed) = fields.task_titles()?;
            changed += titles_changed;
            CommandData::SplitIntoTasks {
                artifact_id,
                task_titles,
            }
        }
        CommandName::PlayerPos => CommandData::PlayerPos {
            pos: fields.vec3("pos")?,
            facing: fields.optional_vec3("facing")?,
        },
        CommandName::MovePlayerTo => CommandData::MovePlayerTo {
            pos: fields.vec3("pos")?,
        },
        CommandName::StartKickoff => CommandData::StartKickoff {
            project_id: fields.optional_identifier("project_id")?,
        },
        CommandName::ReassignTask => {
            let task_id = fields.identifier("task_id")?;
            let to_agent_id = fields.identifier("to_agent_id")?;
            let from_agent_id = fields.optional_identifier("from_agent_id")?;
            let expected_task_status = fields.optional_enum::<TaskStatus>("expected_task_status")?;
            CommandData::ReassignTask {
                task_id,
                to_agent_id,
                from_agent_id,
                reason: fields.optional_reason(&mut changed)?,
                expected_task_status,
            }
        }
        CommandName::CancelTask => {
            let task_id = fields.identifier("task_id")?;
            if data.get("confirm") != Some(&Value::Bool(true)) {
                return Err(fields.fail("confirm", "must be true"));
            }
            let expected_task_status = fields.optional_enum::<TaskStatus>("expected_task_status")?;
            CommandData::CancelTask {
                task_id,
                confirm: true,
                reason: fields.optional_reason(&mut changed)?,
                expected_task_status,
            }
        }
        CommandName::PauseProject => {
            let project_id = fields.identifier("project_id")?;
            match data.get("scope") {
                None => {}
                Some(Value::String(scope)) if scope.trim().eq_ignore_ascii_case("dispatch_only") => {}
                Some(_) => return Err(fields.fail("scope", "must be dispatch_only when provided")),
            }
            let expected_project_status =
                fields.optional_enum::<ProjectStatus>("expected_project_status")?;
            CommandData::PauseProject {
                project_id,
                scope: PauseScope::DispatchOnly,
                reason: fields.optional_reason(&mut changed)?,
                expected_project_status,
            }
        }
        CommandName::ResumeProject => {
            let project_id = fields.identifier("project_id")?;
            let expected_project_status =
                fields.optional_enum::<ProjectStatus>("expected_project_status")?;
            CommandData::ResumeProject {
                project_id,
                reason: fields.optional_reason(&mut changed)?,
                expected_project_status,
            }
        }
        CommandName::RerunTask => {
            let source_task_id = fields.identifier("source_task_id")?;
            match data.get("mode") {
                None => {}
                Some(Value::String(mode)) if mode.trim().eq_ignore_ascii_case("clone_as_new") => {}
                Some(_) => return Err(fields.fail("mode", "must be clone_as_new when provided")),
            }
            let reason = fields.optional_reason(&mut changed)?;
            let constraints_patch = match data.get("constraints_patch") {
                None => None,
                Some(Value::Object(patch)) => Some(patch.clone()),
                Some(_) => {
                    return Err(fields.fail("constraints_patch", "must be an object when provided"))
                }
            };
            CommandData::RerunTask {
                source_task_id,
                mode: RerunMode::CloneAsNew,
                reason,
                constraints_patch,
            }
        }
    };

    Ok(SanitizedCommand {
        data,
        sanitized_text_fields: changed,
    })
}

struct Fields<'a> {
    command: CommandName,
    data: &'a Map<String, Value>,
}

impl Fields<'_> {
    fn fail(&self, key: &str, reason: &str) -> CommandValidationError {
        CommandValidationError::new(format!("{}.{key} {reason}", self.command))
    }

    fn identifier(&self, key: &str) -> Result<String, CommandValidationError> {
        match self.data.get(key) {
            Some(value) => self.clean_identifier(key, value),
            None => Err(self.fail(key, "must be a string")),
        }
    }

    fn optional_identifier(&self, key: &str) -> Result<Option<String>, CommandValidationError> {
        self.data
            .get(key)
            .map(|value| self.clean_identifier(key, value))
            .transpose()
    }

    fn clean_identifier(&self, key: &str, value: &Value) -> Result<String, CommandValidationError> {
        let Value::String(raw) = value else {
            return Err(self.fail(key, "must be a string"));
        };
        let cleaned = CONTROL_CHARS.replace_all(raw, "");
        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            return Err(self.fail(key, "must be non-empty"));
        }
        if cleaned.chars().count() > ID_MAX_LENGTH {
            return Err(self.fail(key, &format!("exceeds max length {ID_MAX_LENGTH}")));
        }
        Ok(cleaned.to_string())
    }

    /// Cleaned text; bumps `changed` when the value was altered
    fn text(
        &self,
        key: &str,
        limit: usize,
        preserve_newlines: bool,
        changed: &mut usize,
    ) -> Result<String, CommandValidationError> {
        let Some(value) = self.data.get(key) else {
            return Err(self.fail(key, "must be a string"));
        };
        let (text, was_changed) = clean_text(value, limit, preserve_newlines)
            .ok_or_else(|| self.fail(key, "must be a non-empty string"))?;
        *changed += usize::from(was_changed);
        Ok(text)
    }

    fn task_titles(&self) -> Result<(Vec<String>, usize), CommandValidationError> {
        let Some(Value::Array(titles)) = self.data.get("task_titles") else {
            return Err(self.fail("task_titles", "must be an array"));
        };
        if titles.is_empty() {
            return Err(self.fail("task_titles", "must contain at least one title"));
        }
        if titles.len() > MAX_TASK_TITLES {
            return Err(self.fail("task_titles", &format!("exceeds max count {MAX_TASK_TITLES}")));
        }
        let mut changed = 0;
        let mut cleaned = Vec::with_capacity(titles.len());
        for (index, title) in titles.iter().enumerate() {
            let (value, was_changed) = clean_text(title, limits::SPLIT_TASK_TITLE, false)
                .ok_or_else(|| {
                    self.fail(&format!("task_titles[{index}]"), "must be a non-empty string")
                })?;
            changed += usize::from(was_changed);
            cleaned.push(value);
        }
        Ok((cleaned, changed))
    }

    fn optional_reason(&self, changed: &mut usize) -> Result<Option<String>, CommandValidationError> {
        match self.data.get("reason") {
            None => Ok(None),
            Some(value) => {
                let (reason, was_changed) = clean_text(value, limits::OVERRIDE_REASON, true)
                    .ok_or_else(|| self.fail("reason", "must be a non-empty string"))?;
                *changed += usize::from(was_changed);
                Ok(Some(reason))
            }
        }
    }

    fn optional_enum<T>(&self, key: &str) -> Result<Option<T>, CommandValidationError>
    where
        T: FromStr,
    {
        match self.data.get(key) {
            None => Ok(None),
            Some(Value::String(raw)) => raw
                .trim()
                .to_lowercase()
                .parse::<T>()
                .map(Some)
                .map_err(|_| self.fail(key, "is not a recognized status")),
            Some(_) => Err(self.fail(key, "must be a string")),
        }
    }

    fn vec3(&self, key: &str) -> Result<Vec3, CommandValidationError> {
        self.data
            .get(key)
            .and_then(as_vec3)
            .ok_or_else(|| self.fail(key, "must be [x,y,z]"))
    }

    fn optional_vec3(&self, key: &str) -> Result<Option<Vec3>, CommandValidationError> {
        match self.data.get(key) {
            None => Ok(None),
            Some(value) => as_vec3(value)
                .map(Some)
                .ok_or_else(|| self.fail(key, "must be [x,y,z] when provided")),
        }
    }
}

fn as_vec3(value: &Value) -> Option<Vec3> {
    let Value::Array(items) = value else {
        return None;
    };
    if items.len() != 3 {
        return None;
    }
    let mut out = [0.0; 3];
    for (slot, item) in out.iter_mut().zip(items) {
        let n = item.as_f64().filter(|n| n.is_finite())?;
        *slot = n;
    }
    Some(out)
}

/// Clean one text value; `None` when it is not a string or ends up empty
fn clean_text(value: &Value, limit: usize, preserve_newlines: bool) -> Option<(String, bool)> {
    let Value::String(raw) = value else {
        return None;
    };
    let stripped = TEXT_CONTROL_CHARS.replace_all(raw, "");
    let mut cleaned = if preserve_newlines {
        let unix = CRLF.replace_all(&stripped, "\n");
        let spaced = INLINE_SPACE.replace_all(&unix, " ");
        BLANK_RUNS.replace_all(&spaced, "\n\n").trim().to_string()
    } else {
        ANY_SPACE.replace_all(&stripped, " ").trim().to_string()
    };
    if cleaned.is_empty() {
        return None;
    }
    if cleaned.chars().count() > limit {
        cleaned = cleaned.chars().take(limit).collect::<String>().trim_end().to_string();
    }
    let changed = cleaned != *raw;
    Some((cleaned, changed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn data(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("object expected"),
        }
    }

    #[test]
    fn unknown_command_is_rejected() {
        let err = validate_and_sanitize("launch_rocket", &Map::new()).unwrap_err();
        assert_eq!(err.message, "unknown command: launch_rocket");
    }

    #[test]
    fn extra_keys_are_rejected() {
        let err = validate_and_sanitize(
            "assign_task",
            &data(json!({"task_id": "task_1", "agent_id": "agent_bd", "priority": 1})),
        )
        .unwrap_err();
        assert_eq!(err.message, "assign_task accepts only {task_id,agent_id}");
    }

    #[test]
    fn identifiers_are_cleaned() {
        let out = validate_and_sanitize(
            "assign_task",
            &data(json!({"task_id": "  task_1\u{0007} ", "agent_id": "agent_bd"})),
        )
        .unwrap();
        assert_eq!(
            out.data,
            CommandData::AssignTask {
                task_id: "task_1".to_string(),
                agent_id: "agent_bd".to_string()
            }
        );
    }

    #[test]
    fn long_identifier_is_rejected() {
        let long = "t".repeat(ID_MAX_LENGTH + 1);
        let err =
            validate_and_sanitize("approve_artifact", &data(json!({"artifact_id": long}))).unwrap_err();
        assert!(err.message.contains("exceeds max length 128"));
    }

    #[test]
    fn request_text_is_collapsed_and_truncated() {
        let text = format!("  hello \n\n world {}", "x".repeat(3000));
        let out = validate_and_sanitize("submit_request", &data(json!({ "text": text }))).unwrap();
        match out.data {
            CommandData::SubmitRequest { text } => {
                assert!(text.starts_with("hello world x"));
                assert_eq!(text.chars().count(), limits::SUBMIT_REQUEST_TEXT);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(out.sanitized_text_fields, 1);
    }

    #[test]
    fn instructions_keep_paragraphs() {
        let out = validate_and_sanitize(
            "request_changes",
            &data(json!({"artifact_id": "art_1", "instructions": "Fix intro\r\n\r\n\r\n\tTighten  tone"})),
        )
        .unwrap();
        match out.data {
            CommandData::RequestChanges { instructions, .. } => {
                assert_eq!(instructions, "Fix intro\n\n Tighten tone");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn cancel_requires_confirm_true() {
        let err = validate_and_sanitize("cancel_task", &data(json!({"task_id": "task_1"}))).unwrap_err();
        assert_eq!(err.message, "cancel_task.confirm must be true");
        assert!(validate_and_sanitize(
            "cancel_task",
            &data(json!({"task_id": "task_1", "confirm": true}))
        )
        .is_ok());
    }

    #[test]
    fn enum_fields_are_case_normalized() {
        let out = validate_and_sanitize(
            "reassign_task",
            &data(json!({
                "task_id": "task_1",
                "to_agent_id": "agent_bd",
                "expected_task_status": " In_Progress "
            })),
        )
        .unwrap();
        match out.data {
            CommandData::ReassignTask { expected_task_status, .. } => {
                assert_eq!(expected_task_status, Some(TaskStatus::InProgress));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn pause_scope_is_fixed() {
        let err = validate_and_sanitize(
            "pause_project",
            &data(json!({"project_id": "proj_alpha", "scope": "everything"})),
        )
        .unwrap_err();
        assert!(err.message.contains("dispatch_only"));
    }

    #[test]
    fn too_many_titles_rejected() {
        let titles: Vec<String> = (0..17).map(|i| format!("Task {i}")).collect();
        let err = validate_and_sanitize(
            "split_into_tasks",
            &data(json!({"artifact_id": "art_1", "task_titles": titles})),
        )
        .unwrap_err();
        assert!(err.message.contains("max count 16"));
    }

    #[test]
    fn player_pos_requires_three_numbers() {
        assert!(validate_and_sanitize("player_pos", &data(json!({"pos": [1, 2]}))).is_err());
        let out = validate_and_sanitize("player_pos", &data(json!({"pos": [1, 2, 3]}))).unwrap();
        assert_eq!(
            out.data,
            CommandData::PlayerPos {
                pos: [1.0, 2.0, 3.0],
                facing: None
            }
        );
    }

    #[test]
    fn data_serializes_back_to_wire_shape() {
        let data = CommandData::RerunTask {
            source_task_id: "task_1".to_string(),
            mode: RerunMode::CloneAsNew,
            reason: None,
            constraints_patch: None,
        };
        assert_eq!(Value::Object(data.to_data()), json!({"source_task_id": "task_1", "mode": "clone_as_new"}));
    }
}
