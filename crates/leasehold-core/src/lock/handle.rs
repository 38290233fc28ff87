//! Single-resource lease holder
//!
//! State machine: `Idle -> Acquiring -> Held -> Releasing -> Released`, with
//! `Acquiring -> Failed` when the acquire gives up and `Held -> Lost` when the
//! renewal task finds the lease gone.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use leasehold_common::{DEFAULT_NAMESPACE, LeaseError, is_valid_name, lock_key};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::model::{LockOptions, LockState, LockStatus, LockToken, LockWatch};
use super::renewal::{RenewalParams, RenewalTask};
use crate::store::LeaseStore;

/// A lease lock on one named resource.
///
/// The handle is owned by the call site that acquires it. Dropping a handle
/// that still holds its lease stops renewal and issues a best-effort release
/// in the background.
pub struct Lock {
    name: String,
    key: String,
    store: Arc<dyn LeaseStore>,
    options: LockOptions,
    token: Option<LockToken>,
    /// Token of a store acquire that has been sent but not answered
    pending: Option<LockToken>,
    status: Arc<LockStatus>,
    renewal: Option<RenewalTask>,
}

impl std::fmt::Debug for Lock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lock")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("state", &self.status.state())
            .field("ttl", &self.options.ttl)
            .finish()
    }
}

impl Lock {
    /// Lock `name` in the default namespace
    pub fn new(
        store: Arc<dyn LeaseStore>,
        name: impl Into<String>,
        options: LockOptions,
    ) -> Result<Self, LeaseError> {
        Self::with_namespace(store, DEFAULT_NAMESPACE, name, options)
    }

    pub fn with_namespace(
        store: Arc<dyn LeaseStore>,
        namespace: &str,
        name: impl Into<String>,
        options: LockOptions,
    ) -> Result<Self, LeaseError> {
        let name = name.into();
        if !is_valid_name(&name) {
            return Err(LeaseError::InvalidOptions(format!(
                "invalid lock name '{}'",
                name
            )));
        }
        options.validate()?;

        Ok(Self {
            key: lock_key(namespace, &name),
            name,
            store,
            options,
            token: None,
            pending: None,
            status: Arc::new(LockStatus::default()),
            renewal: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store key of the lease record
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn options(&self) -> &LockOptions {
        &self.options
    }

    /// Token of the current acquisition
    pub fn token(&self) -> Option<&LockToken> {
        self.token.as_ref()
    }

    pub fn state(&self) -> LockState {
        self.status.state()
    }

    /// Whether the lease is still believed held. Goes false as soon as a
    /// renewal fails.
    pub fn is_acquired(&self) -> bool {
        self.status.is_acquired()
    }

    /// Whether a renewal task is currently running
    pub fn is_renewing(&self) -> bool {
        self.renewal
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    pub fn watch(&self) -> LockWatch {
        LockWatch::new(self.name.clone(), self.status.clone())
    }

    pub(crate) fn status(&self) -> Arc<LockStatus> {
        self.status.clone()
    }

    /// Fail with `LockLost` if the lease is no longer held
    pub fn ensure_held(&self) -> Result<(), LeaseError> {
        match self.status.state() {
            LockState::Held if self.status.is_acquired() => Ok(()),
            LockState::Lost | LockState::Held => Err(LeaseError::LockLost {
                name: self.name.clone(),
            }),
            _ => Err(LeaseError::NotHeld {
                name: self.name.clone(),
            }),
        }
    }

    /// Try to take the lease.
    ///
    /// Non-blocking options make exactly one store call. Blocking options
    /// retry with exponential backoff and return `Ok(false)` once
    /// `blocking_timeout` elapses. Store failures are returned as errors and
    /// never count as success.
    pub async fn acquire(&mut self) -> Result<bool, LeaseError> {
        if self.status.is_acquired() {
            return Err(LeaseError::AlreadyAcquired {
                name: self.name.clone(),
            });
        }
        // a lost lease may still have an exited renewal task attached
        if let Some(task) = self.renewal.take() {
            task.stop().await;
        }
        // an earlier acquire failed on a store error after its write may
        // have landed
        if let Some(stale) = self.pending.take() {
            let _ = self.store.release(&self.key, &stale).await;
        }

        self.status.set_state(LockState::Acquiring);
        let token = LockToken::generate();
        let started = Instant::now();
        // a deadline past what Instant can represent means no deadline
        let deadline = self
            .options
            .blocking_timeout
            .and_then(|timeout| started.checked_add(timeout));
        let mut backoff = self.options.retry_interval;
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            // the write may land even if this future is dropped before the
            // reply arrives; Drop releases a pending token
            self.pending = Some(token.clone());
            match self
                .store
                .acquire(&self.key, &token, self.options.ttl)
                .await
            {
                Ok(true) => break,
                Ok(false) => self.pending = None,
                Err(e) => {
                    self.status.set_state(LockState::Failed);
                    warn!(name = %self.name, error = %e, "Lock acquire failed on store error");
                    return Err(e.into());
                }
            }

            if !self.options.blocking {
                self.status.set_state(LockState::Failed);
                debug!(name = %self.name, "Lock is held elsewhere");
                return Ok(false);
            }

            let mut sleep_for = backoff;
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    self.status.set_state(LockState::Failed);
                    debug!(
                        name = %self.name,
                        attempts,
                        waited_ms = started.elapsed().as_millis() as u64,
                        "Blocking acquire timed out"
                    );
                    return Ok(false);
                }
                sleep_for = sleep_for.min(deadline - now);
            }

            tokio::time::sleep(sleep_for).await;
            backoff = backoff
                .saturating_mul(2)
                .min(self.options.max_retry_interval);
        }

        // no await between the store confirming and the handle taking
        // ownership
        self.pending = None;
        self.token = Some(token.clone());
        self.status.mark_held();
        info!(
            name = %self.name,
            attempts,
            ttl_ms = self.options.ttl.as_millis() as u64,
            "Lock acquired"
        );

        if self.options.auto_renewal {
            self.renewal = Some(RenewalTask::spawn(RenewalParams {
                store: self.store.clone(),
                name: self.name.clone(),
                key: self.key.clone(),
                token,
                ttl: self.options.ttl,
                interval: self.options.effective_renewal_interval(),
                max_renewals: self.options.max_renewals,
                status: self.status.clone(),
            }));
        }

        Ok(true)
    }

    /// Reset the lease to `ttl` (the configured TTL when `None`).
    ///
    /// Fails with `LockLost` on a handle that is not held. Returns `Ok(false)`
    /// and marks the handle lost when the store no longer holds this handle's
    /// token.
    pub async fn extend(&mut self, ttl: Option<Duration>) -> Result<bool, LeaseError> {
        let lost = || LeaseError::LockLost {
            name: self.name.clone(),
        };
        if !self.status.is_acquired() {
            return Err(lost());
        }
        let Some(token) = self.token.as_ref() else {
            return Err(lost());
        };

        let ttl = ttl.unwrap_or(self.options.ttl);
        let extended = self.store.extend(&self.key, token, ttl).await?;
        if extended {
            debug!(name = %self.name, ttl_ms = ttl.as_millis() as u64, "Lock extended");
        } else if self.status.mark_lost() {
            warn!(name = %self.name, "Lock extend rejected: lease expired or taken over");
        }
        Ok(extended)
    }

    /// Stop automatic renewal and wait for the task to exit. The lease stays
    /// held until it expires or is released.
    pub async fn stop_renewal(&mut self) {
        if let Some(task) = self.renewal.take() {
            task.stop().await;
        }
    }

    /// Give the lease back.
    ///
    /// Renewal is stopped and drained before the compare-and-delete. Returns
    /// `Ok(false)` when there was nothing of ours to delete: never acquired,
    /// already released, expired, or taken over.
    pub async fn release(&mut self) -> Result<bool, LeaseError> {
        self.stop_renewal().await;

        let Some(token) = self.token.clone() else {
            return Ok(false);
        };

        self.status.begin_release();
        let result = self.store.release(&self.key, &token).await;
        // cleared only once the store answered; a release cancelled mid-call
        // still leaves the token for Drop to retry
        self.token = None;
        self.status.finish_release();

        match result {
            Ok(true) => {
                info!(name = %self.name, "Lock released");
                Ok(true)
            }
            Ok(false) => {
                debug!(name = %self.name, "Lock already expired or taken over, nothing to release");
                Ok(false)
            }
            Err(e) => {
                warn!(name = %self.name, error = %e, "Lock release failed, lease will expire");
                Err(e.into())
            }
        }
    }

    /// Run `f` with the lock held and release on every exit path.
    ///
    /// Fails with `AcquireTimeout` if the lease cannot be taken. A panic
    /// inside `f` is resumed after the release.
    pub async fn scoped<F, Fut, T>(&mut self, f: F) -> Result<T, LeaseError>
    where
        F: FnOnce(LockWatch) -> Fut,
        Fut: Future<Output = T>,
    {
        let started = Instant::now();
        if !self.acquire().await? {
            return Err(LeaseError::AcquireTimeout {
                name: self.name.clone(),
                waited: started.elapsed(),
            });
        }

        let watch = self.watch();
        let outcome = AssertUnwindSafe(async move { f(watch).await })
            .catch_unwind()
            .await;

        if let Err(e) = self.release().await {
            warn!(name = %self.name, error = %e, "Release after scoped section failed");
        }

        match outcome {
            Ok(value) => Ok(value),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        if let Some(task) = self.renewal.take() {
            task.abort();
        }

        let held = self.token.take();
        let was_held = held.is_some();
        let tokens: Vec<LockToken> = held.into_iter().chain(self.pending.take()).collect();
        if tokens.is_empty() {
            return;
        }
        if was_held {
            self.status.begin_release();
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let store = self.store.clone();
                let key = std::mem::take(&mut self.key);
                let name = std::mem::take(&mut self.name);
                runtime.spawn(async move {
                    // release compares tokens, so an unanswered acquire that
                    // never landed is a no-op here
                    for token in tokens {
                        match store.release(&key, &token).await {
                            Ok(released) => {
                                debug!(name = %name, released, "Dropped lock released");
                            }
                            Err(e) => {
                                warn!(
                                    name = %name,
                                    error = %e,
                                    "Dropped lock release failed, lease will expire"
                                );
                            }
                        }
                    }
                });
            }
            Err(_) => {
                warn!(name = %self.name, "Lock dropped outside a runtime, lease will expire");
            }
        }
        if was_held {
            self.status.finish_release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use leasehold_common::StoreError;

    use crate::store::MemoryLeaseStore;

    /// Applies every write immediately but answers late
    struct SlowReply {
        inner: MemoryLeaseStore,
        delay: Duration,
    }

    #[async_trait]
    impl LeaseStore for SlowReply {
        async fn acquire(
            &self,
            key: &str,
            token: &LockToken,
            ttl: Duration,
        ) -> Result<bool, StoreError> {
            let acquired = self.inner.acquire(key, token, ttl).await;
            tokio::time::sleep(self.delay).await;
            acquired
        }

        async fn extend(
            &self,
            key: &str,
            token: &LockToken,
            ttl: Duration,
        ) -> Result<bool, StoreError> {
            self.inner.extend(key, token, ttl).await
        }

        async fn release(&self, key: &str, token: &LockToken) -> Result<bool, StoreError> {
            self.inner.release(key, token).await
        }

        async fn exists(&self, key: &str) -> Result<bool, StoreError> {
            self.inner.exists(key).await
        }

        async fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
            self.inner.remaining_ttl(key).await
        }

        async fn current_token(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.current_token(key).await
        }

        async fn list_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
            self.inner.list_keys(pattern).await
        }

        async fn delete_unconditional(&self, key: &str) -> Result<bool, StoreError> {
            self.inner.delete_unconditional(key).await
        }
    }

    fn store() -> Arc<dyn LeaseStore> {
        Arc::new(MemoryLeaseStore::new())
    }

    fn quick(ttl_ms: u64) -> LockOptions {
        LockOptions::new(Duration::from_millis(ttl_ms)).with_auto_renewal(false)
    }

    #[tokio::test]
    async fn test_acquire_release_cycle() {
        let store = store();
        let mut lock = Lock::new(store.clone(), "job", quick(5_000)).unwrap();
        assert_eq!(lock.state(), LockState::Idle);

        assert!(lock.acquire().await.unwrap());
        assert_eq!(lock.state(), LockState::Held);
        assert!(lock.is_acquired());
        assert!(store.exists("lock:default:job").await.unwrap());

        assert!(lock.release().await.unwrap());
        assert_eq!(lock.state(), LockState::Released);
        assert!(!lock.is_acquired());
        assert!(!store.exists("lock:default:job").await.unwrap());

        // idempotent
        assert!(!lock.release().await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_name_rejected() {
        let result = Lock::new(store(), "has space", quick(1_000));
        assert!(matches!(result, Err(LeaseError::InvalidOptions(_))));
    }

    #[tokio::test]
    async fn test_double_acquire_is_error() {
        let mut lock = Lock::new(store(), "job", quick(5_000)).unwrap();
        assert!(lock.acquire().await.unwrap());
        assert!(matches!(
            lock.acquire().await,
            Err(LeaseError::AlreadyAcquired { .. })
        ));
        lock.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_tokens_are_fresh_per_acquisition() {
        let mut lock = Lock::new(store(), "job", quick(5_000)).unwrap();
        lock.acquire().await.unwrap();
        let first = lock.token().cloned().unwrap();
        lock.release().await.unwrap();

        lock.acquire().await.unwrap();
        let second = lock.token().cloned().unwrap();
        assert_ne!(first, second);
        lock.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_non_blocking_contention_fails() {
        let store = store();
        let mut holder = Lock::new(store.clone(), "job", quick(5_000)).unwrap();
        let mut other = Lock::new(store, "job", quick(5_000)).unwrap();

        assert!(holder.acquire().await.unwrap());
        assert!(!other.acquire().await.unwrap());
        assert_eq!(other.state(), LockState::Failed);
        assert!(other.token().is_none());
    }

    #[tokio::test]
    async fn test_blocking_acquire_times_out_without_error() {
        let store = store();
        let mut holder = Lock::new(store.clone(), "job", quick(5_000)).unwrap();
        holder.acquire().await.unwrap();

        let options = quick(5_000)
            .blocking(Some(Duration::from_millis(120)))
            .with_retry(Duration::from_millis(10), Duration::from_millis(40));
        let mut waiter = Lock::new(store, "job", options).unwrap();

        let started = std::time::Instant::now();
        assert!(!waiter.acquire().await.unwrap());
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(120));
        assert!(waited < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_blocking_acquire_succeeds_after_release() {
        let store = store();
        let mut holder = Lock::new(store.clone(), "job", quick(5_000)).unwrap();
        holder.acquire().await.unwrap();

        let options = quick(5_000)
            .blocking(Some(Duration::from_secs(2)))
            .with_retry(Duration::from_millis(10), Duration::from_millis(20));
        let mut waiter = Lock::new(store, "job", options).unwrap();

        let releaser = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            holder.release().await.unwrap();
        });

        assert!(waiter.acquire().await.unwrap());
        releaser.await.unwrap();
        waiter.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_blocking_acquire_waits_for_expiry() {
        let store = store();
        let mut holder = Lock::new(store.clone(), "job", quick(60)).unwrap();
        holder.acquire().await.unwrap();

        let options = quick(5_000)
            .blocking(Some(Duration::from_secs(2)))
            .with_retry(Duration::from_millis(10), Duration::from_millis(20));
        let mut waiter = Lock::new(store, "job", options).unwrap();
        assert!(waiter.acquire().await.unwrap());
    }

    #[tokio::test]
    async fn test_store_error_is_not_success() {
        let memory = MemoryLeaseStore::new();
        memory.set_available(false);
        let mut lock = Lock::new(Arc::new(memory), "job", quick(1_000)).unwrap();

        let result = lock.acquire().await;
        assert!(matches!(result, Err(LeaseError::Store(_))));
        assert!(!lock.is_acquired());
        assert_eq!(lock.state(), LockState::Failed);
    }

    #[tokio::test]
    async fn test_auto_renewal_keeps_lease_alive() {
        let store = store();
        let options = LockOptions::new(Duration::from_millis(150))
            .with_renewal_interval(Duration::from_millis(40));
        let mut lock = Lock::new(store.clone(), "job", options).unwrap();
        lock.acquire().await.unwrap();
        assert!(lock.is_renewing());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(lock.is_acquired());
        assert!(store.exists("lock:default:job").await.unwrap());
        assert!(lock.watch().ensure_held().is_ok());

        assert!(lock.release().await.unwrap());
        assert!(!lock.is_renewing());
    }

    #[tokio::test]
    async fn test_renewal_failure_marks_lost() {
        let memory = MemoryLeaseStore::new();
        let store: Arc<dyn LeaseStore> = Arc::new(memory.clone());
        let options = LockOptions::new(Duration::from_millis(500))
            .with_renewal_interval(Duration::from_millis(30));
        let mut lock = Lock::new(store.clone(), "job", options).unwrap();
        lock.acquire().await.unwrap();

        // operator wipes the record; the next renewal notices
        memory.delete_unconditional("lock:default:job").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!lock.is_acquired());
        assert_eq!(lock.state(), LockState::Lost);
        assert!(!lock.is_renewing());
        assert!(matches!(
            lock.extend(None).await,
            Err(LeaseError::LockLost { .. })
        ));
        assert!(matches!(lock.ensure_held(), Err(LeaseError::LockLost { .. })));
        // releasing a lost lock is a no-op, not an error
        assert!(!lock.release().await.unwrap());
    }

    #[tokio::test]
    async fn test_max_renewals_stops_renewal() {
        let store = store();
        let options = LockOptions::new(Duration::from_millis(200))
            .with_renewal_interval(Duration::from_millis(20))
            .with_max_renewals(2);
        let mut lock = Lock::new(store, "job", options).unwrap();
        lock.acquire().await.unwrap();

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(!lock.is_renewing());
        assert_eq!(lock.status().renewals(), 2);
        // still held until the lease runs out
        assert!(lock.is_acquired());
        lock.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_extend_on_unacquired_lock() {
        let mut lock = Lock::new(store(), "job", quick(1_000)).unwrap();
        assert!(matches!(
            lock.extend(None).await,
            Err(LeaseError::LockLost { .. })
        ));
        assert!(matches!(lock.ensure_held(), Err(LeaseError::NotHeld { .. })));
    }

    #[tokio::test]
    async fn test_scoped_releases_on_error_result() {
        let store = store();
        let mut lock = Lock::new(store.clone(), "job", quick(5_000)).unwrap();

        let result: Result<Result<(), &str>, LeaseError> = lock
            .scoped(|watch| async move {
                assert!(watch.is_acquired());
                Err("business failure")
            })
            .await;
        assert_eq!(result.unwrap(), Err("business failure"));
        assert!(!store.exists("lock:default:job").await.unwrap());
    }

    async fn explode() {
        panic!("boom");
    }

    #[tokio::test]
    async fn test_scoped_releases_on_panic() {
        let store = store();
        let task_store = store.clone();

        let joined = tokio::spawn(async move {
            let mut lock = Lock::new(task_store, "job", quick(5_000)).unwrap();
            lock.scoped(|_| explode()).await
        })
        .await;

        assert!(joined.unwrap_err().is_panic());
        assert!(!store.exists("lock:default:job").await.unwrap());
    }

    #[tokio::test]
    async fn test_scoped_contention_is_timeout() {
        let store = store();
        let mut holder = Lock::new(store.clone(), "job", quick(5_000)).unwrap();
        holder.acquire().await.unwrap();

        let mut other = Lock::new(store, "job", quick(5_000)).unwrap();
        let result = other.scoped(|_| async {}).await;
        assert!(matches!(result, Err(LeaseError::AcquireTimeout { .. })));
    }

    #[tokio::test]
    async fn test_drop_releases_in_background() {
        let store = store();
        {
            let mut lock = Lock::new(store.clone(), "job", quick(5_000)).unwrap();
            lock.acquire().await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!store.exists("lock:default:job").await.unwrap());
    }

    #[tokio::test]
    async fn test_cancelled_blocking_acquire_leaves_nothing() {
        let store = store();
        let mut holder = Lock::new(store.clone(), "job", quick(5_000)).unwrap();
        holder.acquire().await.unwrap();

        let options = quick(5_000)
            .blocking(None)
            .with_retry(Duration::from_millis(10), Duration::from_millis(10));
        let mut waiter = Lock::new(store.clone(), "job", options).unwrap();
        let cancelled =
            tokio::time::timeout(Duration::from_millis(50), waiter.acquire()).await;
        assert!(cancelled.is_err());
        assert!(!waiter.is_acquired());
        assert!(waiter.token().is_none());

        holder.release().await.unwrap();
        assert!(!store.exists("lock:default:job").await.unwrap());
    }

    #[tokio::test]
    async fn test_acquire_cancelled_after_write_leaves_no_lease() {
        let memory = MemoryLeaseStore::new();
        let slow = SlowReply {
            inner: memory.clone(),
            delay: Duration::from_millis(50),
        };
        let mut lock = Lock::new(Arc::new(slow), "job", quick(30_000)).unwrap();

        let cancelled =
            tokio::time::timeout(Duration::from_millis(10), lock.acquire()).await;
        assert!(cancelled.is_err());
        // the write already landed before the reply was abandoned
        assert!(memory.exists("lock:default:job").await.unwrap());

        drop(lock);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!memory.exists("lock:default:job").await.unwrap());

        let mut next = Lock::new(Arc::new(memory), "job", quick(1_000)).unwrap();
        assert!(next.acquire().await.unwrap());
    }

    #[tokio::test]
    async fn test_cancelled_release_still_deletes_on_drop() {
        let memory = MemoryLeaseStore::new();
        let slow: Arc<dyn LeaseStore> =
            Arc::new(memory.clone().with_latency(Duration::from_millis(40)));
        let mut lock = Lock::new(slow, "job", quick(30_000)).unwrap();
        assert!(lock.acquire().await.unwrap());

        let cancelled =
            tokio::time::timeout(Duration::from_millis(10), lock.release()).await;
        assert!(cancelled.is_err());
        assert!(memory.exists("lock:default:job").await.unwrap());

        drop(lock);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!memory.exists("lock:default:job").await.unwrap());
    }

    #[tokio::test]
    async fn test_unbounded_blocking_timeout_does_not_overflow() {
        let store = store();
        let mut holder = Lock::new(store.clone(), "job", quick(5_000)).unwrap();
        holder.acquire().await.unwrap();

        let options = quick(5_000)
            .blocking(Some(Duration::MAX))
            .with_retry(Duration::from_millis(5), Duration::MAX);
        let mut waiter = Lock::new(store, "job", options).unwrap();

        // keeps retrying instead of panicking on the deadline or the backoff
        let waited = tokio::time::timeout(Duration::from_millis(100), waiter.acquire()).await;
        assert!(waited.is_err());
        assert!(!waiter.is_acquired());
    }

    #[tokio::test]
    async fn test_unrepresentable_ttl_is_rejected() {
        let options = LockOptions::new(Duration::MAX).with_auto_renewal(false);
        assert!(matches!(
            Lock::new(store(), "job", options),
            Err(LeaseError::InvalidOptions(_))
        ));
    }
}
