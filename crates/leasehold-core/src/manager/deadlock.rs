//! Deadlock heuristics
//!
//! Advisory only: suspects are reported, never remediated.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Why a tracked lock looks unhealthy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspectKind {
    /// Held, but the remaining TTL dropped under the low-water mark
    StalledRenewal,
    /// Tracked locally while the store record is gone
    Expired,
    /// Still registered although the handle is no longer acquired
    OrphanedHandle,
}

/// One suspicious registry entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadlockSuspect {
    pub name: String,
    pub kind: SuspectKind,
    /// Remaining lease lifetime at inspection time
    pub remaining_ttl: Option<Duration>,
    /// Time since the registration was made
    pub held_for: Duration,
}

/// Classify one registry entry.
///
/// `remaining_ttl` is only consulted for entries whose handle still believes
/// it holds the lease.
pub(crate) fn classify(
    acquired: bool,
    remaining_ttl: Option<Duration>,
    low_water_mark: Duration,
) -> Option<SuspectKind> {
    if !acquired {
        return Some(SuspectKind::OrphanedHandle);
    }
    match remaining_ttl {
        None => Some(SuspectKind::Expired),
        Some(ttl) if ttl < low_water_mark => Some(SuspectKind::StalledRenewal),
        Some(_) => None,
    }
}
