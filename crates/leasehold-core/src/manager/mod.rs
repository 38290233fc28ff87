//! Lock manager
//!
//! Hands out lease locks within one namespace, tracks the ones held by this
//! process, and offers introspection and recovery on top of the store.

mod deadlock;
mod stats;

use std::collections::HashMap;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use futures::FutureExt;
use leasehold_common::utils::is_valid_namespace;
use leasehold_common::{
    DEFAULT_DEADLOCK_LOW_WATER_MS, DEFAULT_MAX_RETRY_INTERVAL_MS, DEFAULT_NAMESPACE,
    DEFAULT_RENEWAL_RATIO, DEFAULT_RETRY_INTERVAL_MS, DEFAULT_TTL_MS, LeaseConfiguration,
    LeaseError, is_valid_name, lock_key, name_from_key,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub use deadlock::{DeadlockSuspect, SuspectKind};
pub use stats::LockStats;

use crate::lock::{Lock, LockOptions, LockState, LockStatus, LockToken, LockWatch};
use crate::metrics;
use crate::store::{LeaseStore, MemoryLeaseStore, open_store};
use stats::LockStatsCollector;

static SHARED: LazyLock<LockManager> =
    LazyLock::new(|| LockManager::new(Arc::new(MemoryLeaseStore::new())));

/// Manager settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Key namespace isolating this manager's locks
    pub namespace: String,
    pub default_ttl: Duration,
    pub retry_interval: Duration,
    pub max_retry_interval: Duration,
    /// Renewal fires every `ttl / renewal_ratio`
    pub renewal_ratio: u32,
    /// Remaining TTL under which a held lock is reported as stalled
    pub low_water_mark: Duration,
    pub auto_renewal: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            default_ttl: Duration::from_millis(DEFAULT_TTL_MS),
            retry_interval: Duration::from_millis(DEFAULT_RETRY_INTERVAL_MS),
            max_retry_interval: Duration::from_millis(DEFAULT_MAX_RETRY_INTERVAL_MS),
            renewal_ratio: DEFAULT_RENEWAL_RATIO,
            low_water_mark: Duration::from_millis(DEFAULT_DEADLOCK_LOW_WATER_MS),
            auto_renewal: true,
        }
    }
}

impl From<&LeaseConfiguration> for ManagerConfig {
    fn from(configuration: &LeaseConfiguration) -> Self {
        Self {
            namespace: configuration.namespace(),
            default_ttl: configuration.default_ttl(),
            retry_interval: configuration.retry_interval(),
            max_retry_interval: configuration.max_retry_interval(),
            renewal_ratio: configuration.renewal_ratio(),
            low_water_mark: configuration.deadlock_low_water(),
            auto_renewal: configuration.auto_renewal(),
        }
    }
}

impl ManagerConfig {
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }
}

/// Lock state as seen from the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockInfo {
    pub name: String,
    /// A live record exists
    pub locked: bool,
    /// Token of the live record
    pub token: Option<String>,
    /// Remaining lease lifetime
    pub ttl: Option<Duration>,
    /// The live record belongs to a lock held through this manager
    pub is_mine: bool,
}

/// Registry entry for a lock held through the manager
#[derive(Debug, Clone)]
struct RegisteredLock {
    token: LockToken,
    key: String,
    status: Arc<LockStatus>,
    registered_at: Instant,
}

type Registry = Arc<Mutex<HashMap<String, RegisteredLock>>>;

/// Lease lock manager.
///
/// Clones share the registry and counters. Several managers (or processes)
/// coordinate only through the store.
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn LeaseStore>,
    config: ManagerConfig,
    registry: Registry,
    stats: Arc<LockStatsCollector>,
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("config", &self.config)
            .field("active", &self.registry.lock().len())
            .finish()
    }
}

impl LockManager {
    /// Manager with default settings
    pub fn new(store: Arc<dyn LeaseStore>) -> Self {
        Self {
            store,
            config: ManagerConfig::default(),
            registry: Arc::new(Mutex::new(HashMap::new())),
            stats: Arc::new(LockStatsCollector::default()),
        }
    }

    pub fn with_config(
        store: Arc<dyn LeaseStore>,
        config: ManagerConfig,
    ) -> Result<Self, LeaseError> {
        if !is_valid_namespace(&config.namespace) {
            return Err(LeaseError::InvalidOptions(format!(
                "invalid namespace '{}'",
                config.namespace
            )));
        }
        if config.renewal_ratio < 2 {
            return Err(LeaseError::InvalidOptions(
                "renewal ratio must be at least 2".to_string(),
            ));
        }
        Self::options_from(&config, config.default_ttl).validate()?;

        Ok(Self {
            config,
            ..Self::new(store)
        })
    }

    /// Manager over the store and settings named by `configuration`
    pub async fn from_configuration(
        configuration: &LeaseConfiguration,
    ) -> Result<Self, LeaseError> {
        let store = open_store(configuration).await?;
        Self::with_config(store, ManagerConfig::from(configuration))
    }

    /// Process-wide manager over an in-memory store
    pub fn shared() -> &'static LockManager {
        &SHARED
    }

    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn LeaseStore> {
        self.store.clone()
    }

    /// Default acquisition options (non-blocking) for `ttl`
    pub fn options(&self, ttl: Option<Duration>) -> LockOptions {
        Self::options_from(&self.config, ttl.unwrap_or(self.config.default_ttl))
    }

    fn options_from(config: &ManagerConfig, ttl: Duration) -> LockOptions {
        LockOptions::new(ttl)
            .with_auto_renewal(config.auto_renewal)
            .with_renewal_interval(ttl / config.renewal_ratio.max(2))
            .with_retry(config.retry_interval, config.max_retry_interval)
    }

    /// An unregistered lock handle in this manager's namespace
    pub fn create_lock(&self, name: &str, options: LockOptions) -> Result<Lock, LeaseError> {
        Lock::with_namespace(self.store.clone(), &self.config.namespace, name, options)
    }

    /// Acquire `name` and register it.
    ///
    /// Returns `Ok(None)` when the lock could not be taken within `options`
    /// (contention or blocking timeout).
    pub async fn acquire(
        &self,
        name: &str,
        options: LockOptions,
    ) -> Result<Option<ManagedLock>, LeaseError> {
        let mut lock = self.create_lock(name, options)?;

        match lock.acquire().await {
            Ok(true) => Ok(Some(self.register(lock))),
            Ok(false) => {
                self.stats.record_timeout();
                metrics::record_timeout(self.namespace());
                debug!(name, namespace = %self.config.namespace, "Lock not acquired");
                Ok(None)
            }
            Err(e) => {
                if e.is_store_error() {
                    self.stats.record_error();
                    metrics::record_error(self.namespace());
                }
                Err(e)
            }
        }
    }

    /// Run `f` with `name` locked, releasing it on every exit path.
    ///
    /// Fails with `AcquireTimeout` when the lock is not acquired within
    /// `options`, including plain contention on a non-blocking acquire.
    pub async fn lock<F, Fut, T>(
        &self,
        name: &str,
        options: LockOptions,
        f: F,
    ) -> Result<T, LeaseError>
    where
        F: FnOnce(LockWatch) -> Fut,
        Fut: Future<Output = T>,
    {
        let started = Instant::now();
        let guard = match self.acquire(name, options).await {
            Ok(Some(guard)) => guard,
            Ok(None) => {
                return Err(LeaseError::AcquireTimeout {
                    name: name.to_string(),
                    waited: started.elapsed(),
                });
            }
            Err(e) => {
                warn!(name, error = %e, "Scoped lock acquire failed");
                return Err(e);
            }
        };

        let watch = guard.watch();
        let outcome = AssertUnwindSafe(async move { f(watch).await })
            .catch_unwind()
            .await;

        if let Err(e) = guard.release().await {
            warn!(name, error = %e, "Release after scoped lock failed, lease will expire");
        }

        match outcome {
            Ok(value) => Ok(value),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// Non-blocking acquire that never fails.
    ///
    /// `None` on contention, invalid names and store errors alike.
    pub async fn try_lock(&self, name: &str, ttl: Option<Duration>) -> Option<ManagedLock> {
        match self.acquire(name, self.options(ttl)).await {
            Ok(guard) => guard,
            Err(e) => {
                warn!(name, error = %e, "try_lock failed");
                None
            }
        }
    }

    /// Whether a live record exists for `name`. Store errors read as unlocked.
    pub async fn is_locked(&self, name: &str) -> bool {
        if !is_valid_name(name) {
            return false;
        }
        match self.store.exists(&self.key(name)).await {
            Ok(exists) => exists,
            Err(e) => {
                self.record_store_error();
                warn!(name, error = %e, "Lock probe failed, reporting unlocked");
                false
            }
        }
    }

    pub async fn get_lock_info(&self, name: &str) -> Result<LockInfo, LeaseError> {
        if !is_valid_name(name) {
            return Err(LeaseError::InvalidOptions(format!(
                "invalid lock name '{}'",
                name
            )));
        }
        let key = self.key(name);

        let lookup = async {
            let token = self.store.current_token(&key).await?;
            let ttl = match token {
                Some(_) => self.store.remaining_ttl(&key).await?,
                None => None,
            };
            Ok::<_, LeaseError>((token, ttl))
        };
        let (token, ttl) = lookup.await.inspect_err(|_| self.record_store_error())?;

        let is_mine = token.as_deref().is_some_and(|current| {
            self.registry.lock().get(name).is_some_and(|entry| {
                entry.token.as_str() == current && entry.status.is_acquired()
            })
        });

        Ok(LockInfo {
            name: name.to_string(),
            locked: token.is_some(),
            token,
            ttl,
            is_mine,
        })
    }

    /// Names of live locks in this namespace matching a glob pattern.
    /// Store errors yield an empty list.
    pub async fn list_locks(&self, pattern: &str) -> Vec<String> {
        let namespace = &self.config.namespace;
        match self.store.list_keys(&lock_key(namespace, pattern)).await {
            Ok(keys) => keys
                .iter()
                .filter_map(|key| name_from_key(namespace, key))
                .map(str::to_string)
                .collect(),
            Err(e) => {
                self.record_store_error();
                warn!(pattern, error = %e, "Lock listing failed");
                Vec::new()
            }
        }
    }

    /// Delete `name` regardless of owner.
    ///
    /// Recovery tool for stuck locks: the previous holder is not told beyond
    /// its handle being marked lost, and may still believe it has exclusivity
    /// until it checks. Returns whether a live record was deleted.
    pub async fn force_release(&self, name: &str) -> bool {
        if !is_valid_name(name) {
            return false;
        }
        let deleted = match self.store.delete_unconditional(&self.key(name)).await {
            Ok(deleted) => deleted,
            Err(e) => {
                self.record_store_error();
                warn!(name, error = %e, "Force release failed");
                return false;
            }
        };

        let evicted = self.registry.lock().remove(name);
        if let Some(entry) = evicted {
            entry.status.mark_lost();
            self.count_released(&entry);
        }

        info!(name, namespace = %self.config.namespace, deleted, "Lock force released");
        deleted
    }

    /// Report tracked locks that look stuck. Never blocks or remediates.
    pub async fn detect_deadlocks(&self) -> Vec<DeadlockSuspect> {
        let entries: Vec<(String, RegisteredLock)> = self
            .registry
            .lock()
            .iter()
            .map(|(name, entry)| (name.clone(), entry.clone()))
            .collect();

        let mut suspects = Vec::new();
        for (name, entry) in entries {
            let acquired = entry.status.is_acquired();
            let remaining_ttl = if acquired {
                match self.store.remaining_ttl(&entry.key).await {
                    Ok(ttl) => ttl,
                    Err(e) => {
                        self.record_store_error();
                        debug!(name = %name, error = %e, "Skipping deadlock check");
                        continue;
                    }
                }
            } else {
                None
            };

            let low_water_mark = self.config.low_water_mark;
            if let Some(kind) = deadlock::classify(acquired, remaining_ttl, low_water_mark) {
                let held_for = entry.registered_at.elapsed();
                warn!(
                    name = %name,
                    kind = ?kind,
                    held_ms = held_for.as_millis() as u64,
                    "Possible deadlock"
                );
                suspects.push(DeadlockSuspect {
                    name,
                    kind,
                    remaining_ttl,
                    held_for,
                });
            }
        }
        suspects.sort_by(|a, b| a.name.cmp(&b.name));
        suspects
    }

    pub fn get_stats(&self) -> LockStats {
        self.stats.snapshot(self.registry.lock().len())
    }

    /// Release every lock this manager tracks.
    ///
    /// The handles stop renewing and report `Released`, or `Lost` when the
    /// store did not confirm the delete. Returns how many releases the store
    /// confirmed.
    pub async fn cleanup(&self) -> usize {
        let drained: Vec<(String, RegisteredLock)> = self.registry.lock().drain().collect();
        let total = drained.len();

        let mut released = 0;
        for (name, entry) in drained {
            entry.status.begin_release();
            self.count_released(&entry);
            match self.store.release(&entry.key, &entry.token).await {
                Ok(true) => {
                    entry.status.finish_release();
                    released += 1;
                }
                Ok(false) => {
                    entry.status.set_state(LockState::Lost);
                    debug!(name = %name, "Lock already gone during cleanup");
                }
                Err(e) => {
                    entry.status.set_state(LockState::Lost);
                    self.record_store_error();
                    warn!(name = %name, error = %e, "Cleanup release failed, lease will expire");
                }
            }
        }

        if total > 0 {
            info!(
                namespace = %self.config.namespace,
                total,
                released,
                "Lock manager cleanup finished"
            );
        }
        released
    }

    fn key(&self, name: &str) -> String {
        lock_key(&self.config.namespace, name)
    }

    fn record_store_error(&self) {
        self.stats.record_error();
        metrics::record_error(self.namespace());
    }

    fn register(&self, lock: Lock) -> ManagedLock {
        // an acquired lock always carries a token
        let token = lock.token().cloned().unwrap_or_else(LockToken::generate);
        let entry = RegisteredLock {
            token: token.clone(),
            key: lock.key().to_string(),
            status: lock.status(),
            registered_at: Instant::now(),
        };

        let displaced = self.registry.lock().insert(lock.name().to_string(), entry);
        // a stale registration for a lease that expired under its holder
        if let Some(stale) = displaced {
            stale.status.mark_lost();
            self.count_released(&stale);
        }

        self.stats.record_acquired();
        metrics::record_acquired(self.namespace());

        ManagedLock {
            lock,
            token,
            manager: self.clone(),
        }
    }

    /// Remove the registration for `name` if it still belongs to `token`
    fn deregister(&self, name: &str, token: &LockToken) -> bool {
        let removed = {
            let mut registry = self.registry.lock();
            let owned = registry.get(name).is_some_and(|entry| &entry.token == token);
            if owned { registry.remove(name) } else { None }
        };
        match removed {
            Some(entry) => {
                self.count_released(&entry);
                true
            }
            None => false,
        }
    }

    fn count_released(&self, entry: &RegisteredLock) {
        self.stats.record_released(entry.registered_at.elapsed());
        metrics::record_released(self.namespace());
    }
}

/// A lock held through a [`LockManager`].
///
/// Derefs to the underlying [`Lock`]. Dropping the guard deregisters it and
/// releases the lease in the background.
pub struct ManagedLock {
    lock: Lock,
    token: LockToken,
    manager: LockManager,
}

impl std::fmt::Debug for ManagedLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedLock")
            .field("lock", &self.lock)
            .field("namespace", &self.manager.namespace())
            .finish()
    }
}

impl ManagedLock {
    /// Release the lease and deregister from the manager
    pub async fn release(mut self) -> Result<bool, LeaseError> {
        let result = self.lock.release().await;
        self.manager.deregister(self.lock.name(), &self.token);
        result
    }
}

impl Deref for ManagedLock {
    type Target = Lock;

    fn deref(&self) -> &Self::Target {
        &self.lock
    }
}

impl DerefMut for ManagedLock {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.lock
    }
}

impl Drop for ManagedLock {
    fn drop(&mut self) {
        self.manager.deregister(self.lock.name(), &self.token);
    }
}
