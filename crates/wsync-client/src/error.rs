//! Error types for the wsync client
//!
//! Covers:
//! - Transport failures (recoverable, drive reconnect)
//! - Configuration errors
//! - Correlation violations on command responses
//! - Protocol violations reported to the embedder

use wsync_envelope::{ErrorClass, ErrorCode};
use wsync_repository::RepositoryError;

/// Client failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Transport could not be opened or failed mid-stream
    #[error("transport error: {0}")]
    Transport(String),

    /// Operation needs an established connection
    #[error("not connected")]
    NotConnected,

    /// Client task has shut down
    #[error("client stopped")]
    Stopped,

    /// Configuration could not be read or is invalid
    #[error("configuration error: {0}")]
    Config(String),

    /// Outbound envelope could not be encoded
    #[error("encode failed: {0}")]
    Encode(String),

    /// Offline world could not be seeded
    #[error("offline world rejected: {0}")]
    Seed(#[from] RepositoryError),
}

impl ClientError {
    /// Check if retrying may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::NotConnected)
    }

    /// Code to surface through the command result path
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Config(_) => ErrorCode::ValidationFailed,
            Self::Seed(err) => err.error_code(),
            Self::Transport(_) | Self::NotConnected | Self::Stopped | Self::Encode(_) => {
                ErrorCode::Internal
            }
        }
    }
}

/// Response that does not match exactly one outstanding command
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CorrelationViolation {
    /// No command with this id was ever sent
    #[error("response for unknown command {command_id}")]
    UnknownCommand { command_id: String },

    /// The command already received its terminal response
    #[error("second response for command {command_id}")]
    DuplicateResponse { command_id: String },
}

impl CorrelationViolation {
    /// Command id the response named
    #[must_use]
    pub fn command_id(&self) -> &str {
        match self {
            Self::UnknownCommand { command_id } | Self::DuplicateResponse { command_id } => {
                command_id
            }
        }
    }
}

/// Inbound traffic that broke the protocol; the envelope is dropped and
/// the connection kept unless noted
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolViolation {
    /// Frame failed to decode
    #[error("{class}: {message}")]
    Malformed { class: ErrorClass, message: String },

    /// Response did not match a sent command
    #[error(transparent)]
    Correlation(#[from] CorrelationViolation),

    /// Pong nonce does not match the outstanding ping
    #[error("pong nonce {got} does not match outstanding ping {expected:?}")]
    PongMismatch { expected: Option<String>, got: String },

    /// Outstanding ping went unanswered; the connection is torn down
    #[error("no pong for ping {nonce} within {timeout_ms}ms")]
    HeartbeatTimeout { nonce: String, timeout_ms: u64 },

    /// Event arrived before the first snapshot of a subscription
    #[error("event {seq} arrived before the snapshot")]
    EventBeforeSnapshot { seq: u64 },

    /// Event seq skipped ahead of the cursor
    #[error("event seq gap: expected {expected}, got {got}")]
    SequenceGap { expected: u64, got: u64 },

    /// Snapshot arrived mid-stream under the reject policy
    #[error("mid-stream snapshot {snapshot_id} rejected")]
    MidStreamSnapshot { snapshot_id: String },

    /// Snapshot references do not resolve
    #[error("inconsistent snapshot {snapshot_id}: {reason}")]
    InconsistentSnapshot { snapshot_id: String, reason: String },

    /// Message type the client never expects from a server
    #[error("unexpected {message_type} from server")]
    UnexpectedMessage { message_type: String },

    /// Server rejected the handshake
    #[error("handshake rejected: {code}: {message}")]
    HandshakeRejected { code: ErrorCode, message: String },
}
