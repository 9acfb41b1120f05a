//! Reconnect backoff schedule

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay per reconnect attempt: fixed steps, then a capped delay with jitter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Delays for attempts 1..=n
    pub steps_ms: Vec<u64>,
    /// Delay once the steps are exhausted
    pub cap_ms: u64,
    /// Upper bound (exclusive) of the jitter added to the capped delay
    pub jitter_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            steps_ms: vec![1000, 2000, 4000],
            cap_ms: 8000,
            jitter_ms: 500,
        }
    }
}

impl BackoffConfig {
    /// Delay before reconnect attempt `attempt` (1-based; 0 is treated as 1)
    pub fn delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let index = attempt.max(1) as usize - 1;
        if let Some(step) = self.steps_ms.get(index) {
            return Duration::from_millis(*step);
        }
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rng.random_range(0..self.jitter_ms)
        };
        Duration::from_millis(self.cap_ms + jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn first_attempts_follow_fixed_steps() {
        let backoff = BackoffConfig::default();
        let mut rng = StdRng::seed_from_u64(7);
        let delays: Vec<u64> = (1..=3)
            .map(|a| backoff.delay(a, &mut rng).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000]);
        assert_eq!(backoff.delay(0, &mut rng), Duration::from_millis(1000));
    }

    #[test]
    fn zero_jitter_is_exact() {
        let backoff = BackoffConfig {
            jitter_ms: 0,
            ..BackoffConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(backoff.delay(9, &mut rng), Duration::from_millis(8000));
    }

    proptest! {
        #[test]
        fn prop_capped_delay_stays_in_jitter_window(attempt in 4u32..10_000, seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let ms = BackoffConfig::default().delay(attempt, &mut rng).as_millis();
            prop_assert!((8000..8500).contains(&ms));
        }
    }
}
