//! Per-session command rate limiter
//!
//! A direct (not keyed) `governor` limiter per session. The bucket holds
//! `max_commands` cells and refills evenly over `window_ms`. Time comes from
//! the session's message clock through a [`FakeRelativeClock`], so recorded
//! and simulated runs limit the same way a live connection does.

use crate::config::RateLimitConfig;
use governor::clock::{Clock, FakeRelativeClock};
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;

type SessionLimiter = RateLimiter<
    NotKeyed,
    InMemoryState,
    FakeRelativeClock,
    NoOpMiddleware<<FakeRelativeClock as Clock>::Instant>,
>;

/// Per-session command quota
pub struct CommandRateLimiter {
    config: RateLimitConfig,
    clock: FakeRelativeClock,
    limiter: SessionLimiter,
    origin_ms: Option<i64>,
    elapsed_ms: u64,
}

impl std::fmt::Debug for CommandRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRateLimiter")
            .field("config", &self.config)
            .field("elapsed_ms", &self.elapsed_ms)
            .field("limiter", &"<governor>")
            .finish()
    }
}

fn quota(config: RateLimitConfig) -> Quota {
    let burst = NonZeroU32::new(config.max_commands).unwrap_or(NonZeroU32::MIN);
    let period = Duration::from_millis(config.window_ms) / burst.get();
    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}

impl CommandRateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        let config = config.bounded();
        let clock = FakeRelativeClock::default();
        let limiter = RateLimiter::direct_with_clock(quota(config), &clock);
        Self {
            config,
            clock,
            limiter,
            origin_ms: None,
            elapsed_ms: 0,
        }
    }

    /// Move the limiter clock to `now_ms`; it never runs backwards
    fn sync_clock(&mut self, now_ms: i64) {
        let origin = *self.origin_ms.get_or_insert(now_ms);
        let target = u64::try_from(now_ms.saturating_sub(origin)).unwrap_or(0);
        if target > self.elapsed_ms {
            self.clock
                .advance(Duration::from_millis(target - self.elapsed_ms));
            self.elapsed_ms = target;
        }
    }

    /// Consume one command at `now_ms`
    ///
    /// Returns the milliseconds until a cell frees up when the quota is spent.
    pub fn try_acquire(&mut self, now_ms: i64) -> Result<(), u64> {
        self.sync_clock(now_ms);
        self.limiter.check().map_err(|not_until| {
            let wait = not_until.wait_time_from(self.clock.now());
            let mut ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX);
            if wait.subsec_nanos() % 1_000_000 != 0 {
                ms = ms.saturating_add(1);
            }
            ms.max(1)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn spent_quota_refills_over_the_window() {
        let mut limiter = CommandRateLimiter::new(RateLimitConfig {
            max_commands: 2,
            window_ms: 1000,
        });
        assert!(limiter.try_acquire(0).is_ok());
        assert!(limiter.try_acquire(100).is_ok());
        let retry = limiter.try_acquire(100).unwrap_err();
        assert!(retry > 0 && retry <= 1000, "retry {retry}");
        assert!(limiter.try_acquire(1100).is_ok());
    }

    #[test]
    fn clock_going_backwards_does_not_refill() {
        let mut limiter = CommandRateLimiter::new(RateLimitConfig {
            max_commands: 1,
            window_ms: 1000,
        });
        assert!(limiter.try_acquire(5_000).is_ok());
        assert!(limiter.try_acquire(4_000).is_err());
        assert!(limiter.try_acquire(6_000).is_ok());
    }

    proptest! {
        #[test]
        fn prop_burst_never_exceeds_max(
            max in 1u32..20,
            attempts in 1usize..200,
        ) {
            let mut limiter = CommandRateLimiter::new(RateLimitConfig { max_commands: max, window_ms: 5000 });
            let accepted = (0..attempts).filter(|_| limiter.try_acquire(0).is_ok()).count();
            prop_assert_eq!(accepted, attempts.min(max as usize));
        }
    }
}
