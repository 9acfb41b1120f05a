//! Command error codes and the UI policy attached to each one

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of codes carried by `error` envelopes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Payload failed validation or sanitization
    ValidationFailed,
    /// Referenced entity does not exist
    NotFound,
    /// Command conflicts with current state
    Conflict,
    /// Too many commands in the window
    RateLimited,
    /// Refused by policy
    NotAllowed,
    /// Unexpected server failure
    Internal,
}

/// How the UI should react to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UiState {
    FixInput,
    RefreshState,
    ChooseAlternative,
    RetryLater,
    BlockedByPolicy,
    RetryOrFallback,
}

/// Policy for one error code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ErrorPolicy {
    pub ui_state: UiState,
    pub retryable: bool,
    pub user_safe_message: &'static str,
}

impl ErrorCode {
    /// Every code, in declaration order
    pub const ALL: &'static [Self] = &[
        Self::ValidationFailed,
        Self::NotFound,
        Self::Conflict,
        Self::RateLimited,
        Self::NotAllowed,
        Self::Internal,
    ];

    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::RateLimited => "RATE_LIMITED",
            Self::NotAllowed => "NOT_ALLOWED",
            Self::Internal => "INTERNAL",
        }
    }

    /// Policy for this code
    #[must_use]
    pub const fn policy(self) -> ErrorPolicy {
        match self {
            Self::ValidationFailed => ErrorPolicy {
                ui_state: UiState::FixInput,
                retryable: false,
                user_safe_message: "That action is missing required information.",
            },
            Self::NotFound => ErrorPolicy {
                ui_state: UiState::RefreshState,
                retryable: true,
                user_safe_message: "That item no longer exists in the current session.",
            },
            Self::Conflict => ErrorPolicy {
                ui_state: UiState::ChooseAlternative,
                retryable: true,
                user_safe_message: "That action conflicts with the latest office state.",
            },
            Self::RateLimited => ErrorPolicy {
                ui_state: UiState::RetryLater,
                retryable: true,
                user_safe_message: "Too many requests in a short time.",
            },
            Self::NotAllowed => ErrorPolicy {
                ui_state: UiState::BlockedByPolicy,
                retryable: false,
                user_safe_message: "This action is not allowed right now.",
            },
            Self::Internal => ErrorPolicy {
                ui_state: UiState::RetryOrFallback,
                retryable: true,
                user_safe_message: "Something went wrong on the server.",
            },
        }
    }

    /// Check if the caller may retry
    #[inline]
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        self.policy().retryable
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| format!("unknown error code: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_is_not_retryable() {
        let policy = ErrorCode::ValidationFailed.policy();
        assert_eq!(policy.ui_state, UiState::FixInput);
        assert!(!policy.retryable);
    }

    #[test]
    fn rate_limited_retries_later() {
        assert_eq!(ErrorCode::RateLimited.policy().ui_state, UiState::RetryLater);
        assert!(ErrorCode::RateLimited.is_retryable());
    }

    #[test]
    fn wire_names_round_trip() {
        for code in ErrorCode::ALL {
            assert_eq!(code.as_str().parse::<ErrorCode>().unwrap(), *code);
            let json = serde_json::to_value(code).unwrap();
            assert_eq!(json, code.as_str());
        }
    }
}
