use proptest::prelude::*;
use wsync_conformance::{run_check, Fixture, FixtureBody, HeartbeatPolicy, RECORD_EPOCH_MS};
use wsync_envelope::{to_value, Envelope};

const INTERVAL_MS: i64 = 15_000;
const TIMEOUT_MS: i64 = 45_000;

fn transcript(delays: &[i64]) -> Fixture {
    let mut messages = Vec::new();
    for (round, delay) in (0_i64..).zip(delays) {
        let ping_ts = RECORD_EPOCH_MS + round * INTERVAL_MS;
        let nonce = format!("n{round}");
        messages.push(to_value(&Envelope::ping(nonce.as_str()).with_ts(ping_ts)).unwrap());
        messages.push(to_value(&Envelope::pong(nonce).with_ts(ping_ts + delay)).unwrap());
    }
    Fixture::new(
        "heartbeat",
        FixtureBody::Heartbeat {
            policy: HeartbeatPolicy {
                ping_interval_ms: 15_000,
                timeout_ms: 45_000,
            },
            messages,
        },
    )
}

proptest! {
    #[test]
    fn pongs_within_timeout_pass(delays in prop::collection::vec(0..=TIMEOUT_MS, 1..6)) {
        let outcome = run_check(&transcript(&delays));
        prop_assert!(outcome.passed, "{:?}", outcome.detail);
    }

    #[test]
    fn one_late_pong_fails(
        mut delays in prop::collection::vec(0..=TIMEOUT_MS, 1..6),
        late in (TIMEOUT_MS + 1)..(TIMEOUT_MS * 2),
        index in any::<prop::sample::Index>(),
    ) {
        let at = index.index(delays.len());
        delays[at] = late;
        let outcome = run_check(&transcript(&delays));
        prop_assert!(!outcome.passed);
    }
}
