//! Simulator configuration

use crate::error::ConformanceError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Simulator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Operations to run against the reference server
    pub operations: u64,
    /// Stop at the first violation
    pub stop_on_first_violation: bool,
    /// Server replay limit; small values exercise the fresh fallback
    pub replay_limit: usize,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            operations: 500,
            stop_on_first_violation: false,
            replay_limit: 200,
        }
    }
}

impl SimulatorConfig {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_operations(mut self, operations: u64) -> Self {
        self.operations = operations;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_stop_on_first_violation(mut self, stop: bool) -> Self {
        self.stop_on_first_violation = stop;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_replay_limit(mut self, limit: usize) -> Self {
        self.replay_limit = limit;
        self
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConformanceError> {
        let config: Self =
            toml::from_str(text).map_err(|e| ConformanceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConformanceError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConformanceError::io(path, &e))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConformanceError> {
        if self.operations == 0 {
            return Err(ConformanceError::Config(
                "operations must be at least 1".to_string(),
            ));
        }
        if self.replay_limit == 0 {
            return Err(ConformanceError::Config(
                "replay_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_overrides_defaults() {
        let config = SimulatorConfig::from_toml_str("seed = 7\nstop_on_first_violation = true").unwrap();
        assert_eq!(config.seed, 7);
        assert!(config.stop_on_first_violation);
        assert_eq!(config.operations, 500);
    }

    #[test]
    fn zero_operations_is_rejected() {
        assert!(SimulatorConfig::from_toml_str("operations = 0").is_err());
    }
}
