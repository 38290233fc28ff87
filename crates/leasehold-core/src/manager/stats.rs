//! Manager counters

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Point-in-time manager statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockStats {
    /// Successful acquisitions
    pub acquired: u64,
    /// Registrations ended (release, scope exit, drop or force release)
    pub released: u64,
    /// Acquisitions that gave up on contention or timeout
    pub timeouts: u64,
    /// Operations that failed on a store error
    pub errors: u64,
    /// Locks currently tracked by this manager
    pub active: u64,
    /// Average hold time of ended registrations in milliseconds
    pub avg_hold_time_ms: u64,
}

#[derive(Debug, Default)]
pub(crate) struct LockStatsCollector {
    acquired: AtomicU64,
    released: AtomicU64,
    timeouts: AtomicU64,
    errors: AtomicU64,
    total_hold_time_ms: AtomicU64,
}

impl LockStatsCollector {
    pub(crate) fn record_acquired(&self) {
        self.acquired.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_released(&self, held_for: Duration) {
        self.total_hold_time_ms
            .fetch_add(held_for.as_millis() as u64, Ordering::Relaxed);
        self.released.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, active: usize) -> LockStats {
        let released = self.released.load(Ordering::Relaxed);
        let total_hold = self.total_hold_time_ms.load(Ordering::Relaxed);
        let avg_hold_time_ms = if released > 0 {
            total_hold / released
        } else {
            0
        };

        LockStats {
            acquired: self.acquired.load(Ordering::Relaxed),
            released,
            timeouts: self.timeouts.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            active: active as u64,
            avg_hold_time_ms,
        }
    }
}
