//! Error types for the world server

use wsync_envelope::ErrorCode;

/// Server failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServerError {
    /// Configuration could not be read or is out of range
    #[error("configuration error: {0}")]
    Config(String),

    /// Seed world failed validation
    #[error("seed rejected: {0}")]
    Seed(String),

    /// Peer side of the connection went away
    #[error("connection closed")]
    ConnectionClosed,

    /// Outbound envelope could not be encoded
    #[error("encode failed: {0}")]
    Encode(String),
}

impl ServerError {
    /// Wire error code for this failure
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Config(_) | Self::Seed(_) => ErrorCode::ValidationFailed,
            Self::ConnectionClosed | Self::Encode(_) => ErrorCode::Internal,
        }
    }

    /// Check if retrying may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectionClosed)
    }
}
