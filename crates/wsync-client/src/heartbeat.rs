//! Ping/pong liveness tracking
//!
//! The monitor is clock-agnostic: callers pass `now` and sleep until
//! [`HeartbeatMonitor::next_deadline`].

use crate::error::ProtocolViolation;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// What the connection should do at a deadline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Nothing is due
    Idle,
    /// Send `ping{nonce}`
    SendPing(String),
    /// The outstanding ping expired
    TimedOut(ProtocolViolation),
}

#[derive(Debug, Clone)]
struct Outstanding {
    nonce: String,
    sent_at: Instant,
}

/// One outstanding ping at a time, answered within `timeout`
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    interval: Duration,
    timeout: Duration,
    next_ping_at: Option<Instant>,
    outstanding: Option<Outstanding>,
}

impl HeartbeatMonitor {
    /// Disarmed monitor with the given ping period and pong deadline
    #[must_use]
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            next_ping_at: None,
            outstanding: None,
        }
    }

    /// Start pinging one interval from `now`
    pub fn arm(&mut self, now: Instant) {
        self.next_ping_at = Some(now + self.interval);
        self.outstanding = None;
    }

    /// Stop pinging until the next handshake
    pub fn disarm(&mut self) {
        self.next_ping_at = None;
        self.outstanding = None;
    }

    /// Pings are scheduled
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.next_ping_at.is_some()
    }

    /// Nonce of the unanswered ping
    #[must_use]
    pub fn outstanding_nonce(&self) -> Option<&str> {
        self.outstanding.as_ref().map(|o| o.nonce.as_str())
    }

    /// Earliest instant at which [`Self::poll`] has work
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        let expiry = self.outstanding.as_ref().map(|o| o.sent_at + self.timeout);
        match (self.next_ping_at, expiry) {
            (Some(ping), Some(expiry)) => Some(ping.min(expiry)),
            (ping, expiry) => ping.or(expiry),
        }
    }

    /// Advance to `now`
    pub fn poll(&mut self, now: Instant) -> HeartbeatAction {
        let Some(next_ping_at) = self.next_ping_at else {
            return HeartbeatAction::Idle;
        };
        if let Some(outstanding) = &self.outstanding {
            if now >= outstanding.sent_at + self.timeout {
                let violation = ProtocolViolation::HeartbeatTimeout {
                    nonce: outstanding.nonce.clone(),
                    timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                };
                self.disarm();
                return HeartbeatAction::TimedOut(violation);
            }
        }
        if now < next_ping_at {
            return HeartbeatAction::Idle;
        }
        self.next_ping_at = Some(now + self.interval);
        if self.outstanding.is_some() {
            return HeartbeatAction::Idle;
        }
        let nonce = Uuid::new_v4().simple().to_string();
        self.outstanding = Some(Outstanding {
            nonce: nonce.clone(),
            sent_at: now,
        });
        HeartbeatAction::SendPing(nonce)
    }

    /// Record a pong; a nonce other than the outstanding one is a violation
    pub fn on_pong(&mut self, nonce: &str) -> Result<(), ProtocolViolation> {
        match &self.outstanding {
            Some(outstanding) if outstanding.nonce == nonce => {
                self.outstanding = None;
                Ok(())
            }
            other => Err(ProtocolViolation::PongMismatch {
                expected: other.as_ref().map(|o| o.nonce.clone()),
                got: nonce.to_string(),
            }),
        }
    }

    /// Track a ping sent with a caller-chosen nonce
    pub fn record_ping(&mut self, nonce: impl Into<String>, now: Instant) {
        self.outstanding = Some(Outstanding {
            nonce: nonce.into(),
            sent_at: now,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> HeartbeatMonitor {
        HeartbeatMonitor::new(Duration::from_secs(15), Duration::from_secs(45))
    }

    #[test]
    fn disarmed_monitor_is_idle() {
        let mut hb = monitor();
        assert_eq!(hb.poll(Instant::now()), HeartbeatAction::Idle);
        assert!(hb.next_deadline().is_none());
    }

    #[test]
    fn pings_every_interval_while_answered() {
        let mut hb = monitor();
        let start = Instant::now();
        hb.arm(start);
        assert_eq!(hb.poll(start + Duration::from_secs(14)), HeartbeatAction::Idle);

        let HeartbeatAction::SendPing(nonce) = hb.poll(start + Duration::from_secs(15)) else {
            panic!("expected ping");
        };
        assert!(hb.on_pong(&nonce).is_ok());
        assert!(matches!(
            hb.poll(start + Duration::from_secs(30)),
            HeartbeatAction::SendPing(_)
        ));
    }

    #[test]
    fn unanswered_ping_times_out_after_deadline() {
        let mut hb = monitor();
        let start = Instant::now();
        hb.arm(start);
        hb.record_ping("abc", start);
        assert_eq!(hb.next_deadline(), Some(start + Duration::from_secs(15)));

        assert_eq!(hb.poll(start + Duration::from_secs(44)), HeartbeatAction::Idle);
        match hb.poll(start + Duration::from_secs(45)) {
            HeartbeatAction::TimedOut(ProtocolViolation::HeartbeatTimeout { nonce, .. }) => {
                assert_eq!(nonce, "abc");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!hb.is_armed());
    }

    #[test]
    fn mismatched_pong_is_reported_and_keeps_ping_outstanding() {
        let mut hb = monitor();
        hb.arm(Instant::now());
        hb.record_ping("abc", Instant::now());
        assert!(hb.on_pong("xyz").is_err());
        assert_eq!(hb.outstanding_nonce(), Some("abc"));
    }
}
