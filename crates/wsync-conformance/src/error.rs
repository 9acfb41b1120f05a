//! Error types for the conformance suite

use std::path::{Path, PathBuf};
use wsync_envelope::ErrorCode;

/// Conformance failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConformanceError {
    /// Fixture directory or report file could not be accessed
    #[error("io error at {}: {message}", .path.display())]
    Io { path: PathBuf, message: String },

    /// Fixture file is not a valid fixture document
    #[error("invalid fixture {}: {message}", .path.display())]
    Fixture { path: PathBuf, message: String },

    /// A fixture broke a protocol rule
    #[error("{fixture}: {reason}")]
    Check { fixture: String, reason: String },

    /// Simulator configuration is unusable
    #[error("configuration error: {0}")]
    Config(String),

    /// Reference peer could not be set up
    #[error("setup failed: {0}")]
    Setup(String),
}

impl ConformanceError {
    pub(crate) fn io(path: &Path, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }

    pub(crate) fn check(fixture: &str, reason: impl Into<String>) -> Self {
        Self::Check {
            fixture: fixture.to_string(),
            reason: reason.into(),
        }
    }

    /// Check if retrying may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Fixture { .. } | Self::Check { .. } | Self::Config(_) => {
                ErrorCode::ValidationFailed
            }
            Self::Io { .. } | Self::Setup(_) => ErrorCode::Internal,
        }
    }
}
