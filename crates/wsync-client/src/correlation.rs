//! Command/response correlation
//!
//! Every command id gets exactly one terminal response. Ids are remembered
//! after completion so a second response is reported, not silently dropped.

use crate::error::CorrelationViolation;
use crate::gateway::CommandResult;
use indexmap::IndexSet;
use std::collections::HashMap;
use wsync_envelope::{AckPayload, ErrorPayload};

/// Completed ids remembered for duplicate detection
pub const COMPLETED_MEMORY: usize = 1024;

#[derive(Debug, Clone)]
struct InFlight {
    name: String,
}

/// Outstanding commands keyed by id
#[derive(Debug, Default)]
pub struct CommandCorrelator {
    in_flight: HashMap<String, InFlight>,
    /// Oldest first
    completed: IndexSet<String>,
}

impl CommandCorrelator {
    /// Empty correlator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a sent command
    pub fn register(&mut self, command_id: impl Into<String>, name: impl Into<String>) {
        self.in_flight.insert(command_id.into(), InFlight { name: name.into() });
    }

    /// Sent and still waiting for a response
    #[must_use]
    pub fn is_pending(&self, command_id: &str) -> bool {
        self.in_flight.contains_key(command_id)
    }

    /// Commands waiting for a response
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Name of an in-flight command
    #[must_use]
    pub fn name_of(&self, command_id: &str) -> Option<&str> {
        self.in_flight.get(command_id).map(|c| c.name.as_str())
    }

    /// Match an `ack` to its command
    pub fn on_ack(&mut self, ack: &AckPayload) -> Result<CommandResult, CorrelationViolation> {
        let name = self.complete(&ack.in_reply_to)?;
        Ok(CommandResult::ack(ack.in_reply_to.clone(), Some(name)))
    }

    /// Match an `error` to its command
    pub fn on_error(&mut self, error: &ErrorPayload) -> Result<CommandResult, CorrelationViolation> {
        let name = self.complete(&error.in_reply_to)?;
        Ok(CommandResult::error(
            error.in_reply_to.clone(),
            Some(name),
            error.code,
            error.message.clone(),
        ))
    }

    fn complete(&mut self, command_id: &str) -> Result<String, CorrelationViolation> {
        if let Some(in_flight) = self.in_flight.remove(command_id) {
            self.remember(command_id);
            return Ok(in_flight.name);
        }
        if self.completed.contains(command_id) {
            return Err(CorrelationViolation::DuplicateResponse {
                command_id: command_id.to_string(),
            });
        }
        Err(CorrelationViolation::UnknownCommand {
            command_id: command_id.to_string(),
        })
    }

    fn remember(&mut self, command_id: &str) {
        self.completed.insert(command_id.to_string());
        while self.completed.len() > COMPLETED_MEMORY {
            self.completed.shift_remove_index(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wsync_envelope::ErrorCode;

    fn ack(id: &str) -> AckPayload {
        AckPayload::ok(id)
    }

    #[test]
    fn exactly_one_terminal_response() {
        let mut correlator = CommandCorrelator::new();
        correlator.register("cmd_1", "assign_task");

        let result = correlator.on_ack(&ack("cmd_1")).unwrap();
        assert!(result.is_ack());
        assert_eq!(result.command_name.as_deref(), Some("assign_task"));

        let second = correlator.on_error(&ErrorPayload {
            in_reply_to: "cmd_1".to_string(),
            code: ErrorCode::Conflict,
            message: "late".to_string(),
        });
        assert_eq!(
            second,
            Err(CorrelationViolation::DuplicateResponse {
                command_id: "cmd_1".to_string()
            })
        );
    }

    #[test]
    fn unknown_id_is_a_violation() {
        let mut correlator = CommandCorrelator::new();
        assert!(matches!(
            correlator.on_ack(&ack("cmd_ghost")),
            Err(CorrelationViolation::UnknownCommand { .. })
        ));
    }

    #[test]
    fn error_result_carries_code_and_policy() {
        let mut correlator = CommandCorrelator::new();
        correlator.register("cmd_2", "cancel_task");
        let result = correlator
            .on_error(&ErrorPayload {
                in_reply_to: "cmd_2".to_string(),
                code: ErrorCode::RateLimited,
                message: "slow down".to_string(),
            })
            .unwrap();
        assert_eq!(result.code, Some(ErrorCode::RateLimited));
        assert!(result.policy().is_some_and(|p| p.retryable));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[test]
    fn completed_memory_is_bounded() {
        let mut correlator = CommandCorrelator::new();
        for i in 0..=COMPLETED_MEMORY {
            let id = format!("cmd_{i}");
            correlator.register(id.clone(), "player_pos");
            correlator.on_ack(&ack(&id)).unwrap();
        }
        // the oldest id fell out of memory and now reads as unknown
        assert!(matches!(
            correlator.on_ack(&ack("cmd_0")),
            Err(CorrelationViolation::UnknownCommand { .. })
        ));
        assert!(matches!(
            correlator.on_ack(&ack("cmd_1")),
            Err(CorrelationViolation::DuplicateResponse { .. })
        ));
        assert_eq!(correlator.completed.len(), COMPLETED_MEMORY);
    }
}
