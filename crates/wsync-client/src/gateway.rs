//! Collaborator-facing command interface

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use wsync_envelope::{ErrorCode, ErrorPolicy};

/// Terminal response kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandResultKind {
    /// Command applied
    Ack,
    /// Command rejected
    Error,
}

/// Terminal response for one command id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    /// Ack or error
    pub kind: CommandResultKind,
    /// Command id the response answers
    pub command_id: String,
    /// Name the command was sent with, when known
    pub command_name: Option<String>,
    /// Error code; `None` for an ack
    pub code: Option<ErrorCode>,
    /// Error message; `None` for an ack
    pub message: Option<String>,
}

impl CommandResult {
    /// Successful result
    #[must_use]
    pub fn ack(command_id: impl Into<String>, command_name: Option<String>) -> Self {
        Self {
            kind: CommandResultKind::Ack,
            command_id: command_id.into(),
            command_name,
            code: None,
            message: None,
        }
    }

    /// Rejected result with its code
    #[must_use]
    pub fn error(
        command_id: impl Into<String>,
        command_name: Option<String>,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind: CommandResultKind::Error,
            command_id: command_id.into(),
            command_name,
            code: Some(code),
            message: Some(message.into()),
        }
    }

    /// Whether the command was applied
    #[inline]
    #[must_use]
    pub fn is_ack(&self) -> bool {
        self.kind == CommandResultKind::Ack
    }

    /// UI policy for an error result
    #[must_use]
    pub fn policy(&self) -> Option<ErrorPolicy> {
        self.code.map(ErrorCode::policy)
    }
}

/// Sends catalog commands; results arrive on the implementor's event stream
#[async_trait]
pub trait CommandGateway: Send + Sync {
    /// Command id, or `None` when the command cannot be sent now
    async fn send_command(&self, name: &str, data: Map<String, Value>) -> Option<String>;
}
