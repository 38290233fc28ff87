//! Lock data model: tokens, options, and the shared handle status

use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use leasehold_common::{
    DEFAULT_MAX_RETRY_INTERVAL_MS, DEFAULT_RENEWAL_RATIO, DEFAULT_RETRY_INTERVAL_MS,
    DEFAULT_TTL_MS, LeaseError,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Lock handle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    /// Never acquired
    #[default]
    Idle,
    /// Acquire in progress
    Acquiring,
    /// Lease held
    Held,
    /// Release in progress
    Releasing,
    /// Released by this handle
    Released,
    /// Acquire gave up (contention or timeout) or hit a store error
    Failed,
    /// Renewal failed or the lease was taken over while held
    Lost,
}

/// Opaque ownership proof, minted fresh for every acquisition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockToken(String);

impl LockToken {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for LockToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Acquisition options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOptions {
    /// Lease time-to-live
    pub ttl: Duration,
    /// Retry until acquired or `blocking_timeout` elapses
    pub blocking: bool,
    /// Upper bound for a blocking acquire (`None` waits forever)
    pub blocking_timeout: Option<Duration>,
    /// Keep the lease alive from a background task while held
    pub auto_renewal: bool,
    /// Renewal period (defaults to a third of the TTL)
    pub renewal_interval: Option<Duration>,
    /// First backoff step of a blocking acquire
    pub retry_interval: Duration,
    /// Backoff ceiling of a blocking acquire
    pub max_retry_interval: Duration,
    /// Automatic renewals allowed (0 = unlimited)
    pub max_renewals: u32,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::from_millis(DEFAULT_TTL_MS),
            blocking: false,
            blocking_timeout: None,
            auto_renewal: true,
            renewal_interval: None,
            retry_interval: Duration::from_millis(DEFAULT_RETRY_INTERVAL_MS),
            max_retry_interval: Duration::from_millis(DEFAULT_MAX_RETRY_INTERVAL_MS),
            max_renewals: 0,
        }
    }
}

impl LockOptions {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            ..Default::default()
        }
    }

    /// Block until acquired, giving up after `timeout` when one is given
    pub fn blocking(mut self, timeout: Option<Duration>) -> Self {
        self.blocking = true;
        self.blocking_timeout = timeout;
        self
    }

    pub fn non_blocking(mut self) -> Self {
        self.blocking = false;
        self.blocking_timeout = None;
        self
    }

    pub fn with_auto_renewal(mut self, enabled: bool) -> Self {
        self.auto_renewal = enabled;
        self
    }

    pub fn with_renewal_interval(mut self, interval: Duration) -> Self {
        self.renewal_interval = Some(interval);
        self
    }

    pub fn with_retry(mut self, initial: Duration, max: Duration) -> Self {
        self.retry_interval = initial;
        self.max_retry_interval = max;
        self
    }

    pub fn with_max_renewals(mut self, max_renewals: u32) -> Self {
        self.max_renewals = max_renewals;
        self
    }

    /// Effective renewal period
    pub fn effective_renewal_interval(&self) -> Duration {
        self.renewal_interval
            .unwrap_or(self.ttl / DEFAULT_RENEWAL_RATIO)
    }

    pub fn validate(&self) -> Result<(), LeaseError> {
        if self.ttl.is_zero() {
            return Err(LeaseError::InvalidOptions("ttl must be positive".to_string()));
        }
        if Instant::now().checked_add(self.ttl).is_none() {
            return Err(LeaseError::InvalidOptions(format!(
                "ttl {:?} is out of range",
                self.ttl
            )));
        }
        let interval = self.effective_renewal_interval();
        if self.auto_renewal && (interval.is_zero() || interval >= self.ttl) {
            return Err(LeaseError::InvalidOptions(format!(
                "renewal interval {:?} must be positive and shorter than ttl {:?}",
                interval, self.ttl
            )));
        }
        if self.blocking && self.retry_interval.is_zero() {
            return Err(LeaseError::InvalidOptions(
                "retry interval must be positive".to_string(),
            ));
        }
        if self.max_retry_interval < self.retry_interval {
            return Err(LeaseError::InvalidOptions(format!(
                "max retry interval {:?} is shorter than retry interval {:?}",
                self.max_retry_interval, self.retry_interval
            )));
        }
        Ok(())
    }
}

/// Status shared between a handle, its renewal task and manager introspection.
///
/// `acquired` is the single flag guarding further operations; the state enum
/// adds detail for reporting.
#[derive(Debug, Default)]
pub struct LockStatus {
    acquired: AtomicBool,
    state: Mutex<LockState>,
    acquired_at: Mutex<Option<Instant>>,
    renewals: AtomicU32,
}

impl LockStatus {
    pub fn is_acquired(&self) -> bool {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> LockState {
        *self.state.lock()
    }

    /// Successful automatic renewals since the last acquire
    pub fn renewals(&self) -> u32 {
        self.renewals.load(Ordering::SeqCst)
    }

    /// How long the current lease has been held
    pub fn held_for(&self) -> Option<Duration> {
        self.acquired_at.lock().map(|at| at.elapsed())
    }

    pub(crate) fn set_state(&self, state: LockState) {
        *self.state.lock() = state;
    }

    pub(crate) fn mark_held(&self) {
        let mut state = self.state.lock();
        *self.acquired_at.lock() = Some(Instant::now());
        self.renewals.store(0, Ordering::SeqCst);
        self.acquired.store(true, Ordering::SeqCst);
        *state = LockState::Held;
    }

    /// Flip to lost; returns whether this call did the transition
    pub(crate) fn mark_lost(&self) -> bool {
        let mut state = self.state.lock();
        let was_acquired = self.acquired.swap(false, Ordering::SeqCst);
        if was_acquired {
            *state = LockState::Lost;
        }
        was_acquired
    }

    pub(crate) fn begin_release(&self) {
        let mut state = self.state.lock();
        self.acquired.store(false, Ordering::SeqCst);
        *state = LockState::Releasing;
    }

    pub(crate) fn finish_release(&self) {
        *self.state.lock() = LockState::Released;
        *self.acquired_at.lock() = None;
    }

    pub(crate) fn record_renewal(&self) -> u32 {
        self.renewals.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Read-only view of a held lock, handed to scoped critical sections.
///
/// Long critical sections should call [`LockWatch::ensure_held`] before any
/// step that assumes exclusivity; a failed renewal never interrupts them.
#[derive(Debug, Clone)]
pub struct LockWatch {
    name: String,
    status: std::sync::Arc<LockStatus>,
}

impl LockWatch {
    pub(crate) fn new(name: String, status: std::sync::Arc<LockStatus>) -> Self {
        Self { name, status }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_acquired(&self) -> bool {
        self.status.is_acquired()
    }

    pub fn state(&self) -> LockState {
        self.status.state()
    }

    pub fn ensure_held(&self) -> Result<(), LeaseError> {
        if self.status.is_acquired() {
            Ok(())
        } else {
            Err(LeaseError::LockLost {
                name: self.name.clone(),
            })
        }
    }
}
