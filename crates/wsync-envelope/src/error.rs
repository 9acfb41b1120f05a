//! Error types for the envelope codec
//!
//! Covers:
//! - Undecodable JSON
//! - Envelope-level schema failures (including unsupported versions)
//! - Per-type payload failures
//! - Command catalog rejections
//! - Session key format errors

use crate::error_code::ErrorCode;
use crate::message::MessageType;
use std::fmt;

/// Classification reported for a rejected envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Text was not JSON
    InvalidJson,
    /// Envelope fields failed validation
    EnvelopeSchema,
    /// Payload failed the schema for its declared type
    Payload(MessageType),
}

impl ErrorClass {
    /// Wire code, e.g. `ERR_ENVELOPE_SCHEMA` or `ERR_HELLO_ACK_PAYLOAD`
    #[must_use]
    pub fn code(self) -> String {
        match self {
            Self::InvalidJson => "ERR_INVALID_JSON".to_string(),
            Self::EnvelopeSchema => "ERR_ENVELOPE_SCHEMA".to_string(),
            Self::Payload(kind) => format!("ERR_{}_PAYLOAD", kind.as_str().to_uppercase()),
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

/// Codec failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    /// Input was not valid JSON
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// Envelope fields failed the envelope schema
    #[error("envelope schema violation: {}", .details.join("; "))]
    EnvelopeSchema {
        /// Envelope id, when one could be read
        id: Option<String>,
        details: Vec<String>,
    },

    /// Envelope declares a newer protocol version
    #[error("unsupported protocol version {version} (supported: {supported})")]
    UnsupportedVersion {
        id: String,
        message_type: MessageType,
        version: u64,
        supported: u32,
    },

    /// Payload failed the schema for its type
    #[error("{message_type} payload violation: {}", .details.join("; "))]
    Payload {
        id: String,
        message_type: MessageType,
        details: Vec<String>,
    },

    /// Serialization failed on encode
    #[error("encode failed: {0}")]
    Encode(String),
}

impl CodecError {
    /// Classification of this failure
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidJson(_) | Self::Encode(_) => ErrorClass::InvalidJson,
            Self::EnvelopeSchema { .. } | Self::UnsupportedVersion { .. } => {
                ErrorClass::EnvelopeSchema
            }
            Self::Payload { message_type, .. } => ErrorClass::Payload(*message_type),
        }
    }

    /// Id of the offending envelope, when known
    #[must_use]
    pub fn envelope_id(&self) -> Option<&str> {
        match self {
            Self::EnvelopeSchema { id, .. } => id.as_deref(),
            Self::UnsupportedVersion { id, .. } | Self::Payload { id, .. } => Some(id),
            Self::InvalidJson(_) | Self::Encode(_) => None,
        }
    }

    /// Code to answer a peer with
    #[inline]
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        ErrorCode::ValidationFailed
    }
}

/// Command rejected by the catalog
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct CommandValidationError {
    pub message: String,
}

impl CommandValidationError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Always `VALIDATION_FAILED`
    #[inline]
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        ErrorCode::ValidationFailed
    }
}

/// Session key build/parse failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionKeyError {
    #[error("{0} must be a non-empty string")]
    Empty(&'static str),

    #[error("Invalid agentId format: {0}")]
    InvalidAgentId(String),

    #[error("Invalid projectId format: {0}")]
    InvalidProjectId(String),

    #[error("Invalid session key segment count: {0}")]
    SegmentCount(String),

    #[error("Invalid session key namespace: {0}")]
    Namespace(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_class_uses_uppercase_type() {
        assert_eq!(
            ErrorClass::Payload(MessageType::HelloAck).code(),
            "ERR_HELLO_ACK_PAYLOAD"
        );
        assert_eq!(ErrorClass::EnvelopeSchema.code(), "ERR_ENVELOPE_SCHEMA");
    }

    #[test]
    fn unsupported_version_is_envelope_class() {
        let err = CodecError::UnsupportedVersion {
            id: "hello_1".to_string(),
            message_type: MessageType::Hello,
            version: 2,
            supported: 1,
        };
        assert_eq!(err.class(), ErrorClass::EnvelopeSchema);
        assert_eq!(err.envelope_id(), Some("hello_1"));
    }
}
