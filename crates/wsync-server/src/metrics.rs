//! Session metrics

use metrics::{counter, describe_counter, describe_gauge, gauge};

/// Sessions that completed the handshake.
pub const SESSIONS_OPENED: &str = "wsync_sessions_opened_total";

/// Connections currently served.
pub const ACTIVE_CONNECTIONS: &str = "wsync_active_connections";

/// Inbound envelopes, labelled by type.
pub const MESSAGES_RECEIVED: &str = "wsync_messages_received_total";

/// Error envelopes sent, labelled by code.
pub const ERRORS_SENT: &str = "wsync_errors_sent_total";

/// Resume evaluations, labelled by status and reason.
pub const RESUME_DECISIONS: &str = "wsync_resume_decisions_total";

/// Registers all session metric descriptions.
pub fn register_metrics() {
    describe_counter!(SESSIONS_OPENED, "Total sessions that completed hello");
    describe_gauge!(ACTIVE_CONNECTIONS, "Connections currently served");
    describe_counter!(MESSAGES_RECEIVED, "Total inbound envelopes");
    describe_counter!(ERRORS_SENT, "Total error envelopes sent");
    describe_counter!(RESUME_DECISIONS, "Total resume evaluations");
    wsync_repository::metrics::register_metrics();
}

pub(crate) fn record_session_opened() {
    counter!(SESSIONS_OPENED).increment(1);
}

pub(crate) fn connection_opened() {
    gauge!(ACTIVE_CONNECTIONS).increment(1.0);
}

pub(crate) fn connection_closed() {
    gauge!(ACTIVE_CONNECTIONS).decrement(1.0);
}

pub(crate) fn record_message(kind: &str) {
    counter!(MESSAGES_RECEIVED, "type" => kind.to_string()).increment(1);
}

pub(crate) fn record_error(code: &str) {
    counter!(ERRORS_SENT, "code" => code.to_string()).increment(1);
}

pub(crate) fn record_resume(status: &str, reason: &str) {
    counter!(
        RESUME_DECISIONS,
        "status" => status.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}
