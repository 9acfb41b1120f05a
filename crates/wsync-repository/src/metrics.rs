//! Command processor metrics
//!
//! Counters complement the `tracing` spans emitted by the processor.

use metrics::{counter, describe_counter, describe_histogram, histogram};

/// Commands processed, labelled by command and outcome.
pub const COMMANDS_PROCESSED: &str = "wsync_commands_processed_total";

/// Commands answered from a stored receipt.
pub const COMMAND_REPLAYS: &str = "wsync_command_receipt_replays_total";

/// World events appended by commands.
pub const EVENTS_APPENDED: &str = "wsync_events_appended_total";

/// Time spent waiting for the per-project lock.
pub const SCOPE_LOCK_WAIT: &str = "wsync_scope_lock_wait_seconds";

/// Registers all processor metric descriptions.
///
/// Call this once at startup after installing a metrics recorder.
pub fn register_metrics() {
    describe_counter!(COMMANDS_PROCESSED, "Total commands processed");
    describe_counter!(COMMAND_REPLAYS, "Total commands answered from receipts");
    describe_counter!(EVENTS_APPENDED, "Total world events appended by commands");
    describe_histogram!(SCOPE_LOCK_WAIT, "Wait for the per-project command lock in seconds");
}

/// Records one processed command.
pub fn record_command(command: &str, outcome: &str) {
    counter!(
        COMMANDS_PROCESSED,
        "command" => command.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Records a receipt replay.
pub fn record_replay(command: &str) {
    counter!(COMMAND_REPLAYS, "command" => command.to_string()).increment(1);
}

/// Records appended events.
pub fn record_events(command: &str, count: usize) {
    counter!(EVENTS_APPENDED, "command" => command.to_string()).increment(count as u64);
}

/// Records the lock wait for one command.
pub fn record_lock_wait(seconds: f64) {
    histogram!(SCOPE_LOCK_WAIT).record(seconds);
}
