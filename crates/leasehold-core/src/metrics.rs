// Lock metrics
// Recorded through the `metrics` facade; the host application installs the exporter

use metrics::{counter, describe_counter, describe_gauge, gauge};

pub const LOCK_ACQUIRED_TOTAL: &str = "leasehold_lock_acquired_total";
pub const LOCK_RELEASED_TOTAL: &str = "leasehold_lock_released_total";
pub const LOCK_TIMEOUTS_TOTAL: &str = "leasehold_lock_timeouts_total";
pub const LOCK_ERRORS_TOTAL: &str = "leasehold_lock_errors_total";
pub const LOCK_RENEWAL_FAILURES_TOTAL: &str = "leasehold_lock_renewal_failures_total";
pub const LOCKS_HELD: &str = "leasehold_locks_held";

/// Register metric descriptions.
/// Call once at startup, after the recorder is installed.
pub fn describe_metrics() {
    describe_counter!(
        LOCK_ACQUIRED_TOTAL,
        "Total number of locks acquired through a lock manager"
    );
    describe_counter!(
        LOCK_RELEASED_TOTAL,
        "Total number of managed locks released or deregistered"
    );
    describe_counter!(
        LOCK_TIMEOUTS_TOTAL,
        "Total number of acquisitions that gave up on contention or timeout"
    );
    describe_counter!(
        LOCK_ERRORS_TOTAL,
        "Total number of lock operations that failed on a store error"
    );
    describe_counter!(
        LOCK_RENEWAL_FAILURES_TOTAL,
        "Total number of held locks lost because renewal failed"
    );
    describe_gauge!(LOCKS_HELD, "Number of locks currently held by lock managers");
}

pub(crate) fn record_acquired(namespace: &str) {
    counter!(LOCK_ACQUIRED_TOTAL, "namespace" => namespace.to_string()).increment(1);
    gauge!(LOCKS_HELD, "namespace" => namespace.to_string()).increment(1.0);
}

pub(crate) fn record_released(namespace: &str) {
    counter!(LOCK_RELEASED_TOTAL, "namespace" => namespace.to_string()).increment(1);
    gauge!(LOCKS_HELD, "namespace" => namespace.to_string()).decrement(1.0);
}

pub(crate) fn record_timeout(namespace: &str) {
    counter!(LOCK_TIMEOUTS_TOTAL, "namespace" => namespace.to_string()).increment(1);
}

pub(crate) fn record_error(namespace: &str) {
    counter!(LOCK_ERRORS_TOTAL, "namespace" => namespace.to_string()).increment(1);
}

pub(crate) fn record_renewal_failure() {
    counter!(LOCK_RENEWAL_FAILURES_TOTAL).increment(1);
}
