//! Ambient metrics (spec.md §6 ambient stack). Thin wrappers over the
//! `metrics` facade so call sites never hand-roll a metric name.

pub const CHANGES_FETCHED_TOTAL: &str = "exchange_sync_changes_fetched_total";
pub const HEARTBEAT_FAILURES_TOTAL: &str = "exchange_sync_heartbeat_failures_total";
pub const CURSOR_ADVANCE_TOTAL: &str = "exchange_sync_cursor_advance_total";

pub fn record_changes_fetched(n: u64) {
    metrics::counter!(CHANGES_FETCHED_TOTAL).increment(n);
}

pub fn record_heartbeat_failure() {
    metrics::counter!(HEARTBEAT_FAILURES_TOTAL).increment(1);
}

pub fn record_cursor_advance() {
    metrics::counter!(CURSOR_ADVANCE_TOTAL).increment(1);
}
