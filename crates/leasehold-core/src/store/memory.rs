// In-memory lease store
// Single-process backend and test double: DashMap entry locks give every
// mutation the same atomicity a server-side script gives a remote store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use leasehold_common::{StoreError, glob_matches};
use tokio::time::Instant;
use tracing::debug;

use super::LeaseStore;
use crate::lock::LockToken;

/// A stored lease
#[derive(Debug, Clone)]
struct LeaseRecord {
    token: String,
    expires_at: Instant,
}

fn expiry(now: Instant, ttl: Duration) -> Result<Instant, StoreError> {
    now.checked_add(ttl)
        .ok_or_else(|| StoreError::Backend(format!("ttl {:?} is out of range", ttl)))
}

impl LeaseRecord {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

struct Inner {
    records: DashMap<String, LeaseRecord>,
    available: AtomicBool,
}

/// In-memory lease store.
///
/// Clones share the same records, so several managers built from clones of one
/// store observe each other exactly like processes sharing a remote store.
#[derive(Clone)]
pub struct MemoryLeaseStore {
    inner: Arc<Inner>,
    latency: Option<Duration>,
}

impl Default for MemoryLeaseStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLeaseStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                records: DashMap::new(),
                available: AtomicBool::new(true),
            }),
            latency: None,
        }
    }

    /// Delay every call made through this clone, simulating a network hop
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Spawn a background task that purges expired records.
    ///
    /// Reads already treat expired records as absent; the sweep only bounds
    /// memory. The task stops once every clone of the store is dropped.
    pub fn with_expiry_sweep(self, interval: Duration) -> Self {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let purged = Self::purge_expired(&inner.records);
                if purged > 0 {
                    debug!(count = purged, "Purged expired lease records");
                }
            }
        });
        self
    }

    /// Simulate an outage: while unavailable every call fails
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Number of stored records, expired ones included
    pub fn record_count(&self) -> usize {
        self.inner.records.len()
    }

    fn purge_expired(records: &DashMap<String, LeaseRecord>) -> usize {
        let now = Instant::now();
        let before = records.len();
        records.retain(|_, record| record.is_live(now));
        before.saturating_sub(records.len())
    }

    async fn round_trip(&self) -> Result<(), StoreError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if !self.inner.available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn live_record(&self, key: &str) -> Option<LeaseRecord> {
        let now = Instant::now();
        self.inner
            .records
            .get(key)
            .filter(|record| record.is_live(now))
            .map(|record| record.value().clone())
    }
}

#[async_trait]
impl LeaseStore for MemoryLeaseStore {
    async fn acquire(
        &self,
        key: &str,
        token: &LockToken,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.round_trip().await?;

        let now = Instant::now();
        let record = LeaseRecord {
            token: token.as_str().to_string(),
            expires_at: expiry(now, ttl)?,
        };

        match self.inner.records.entry(key.to_string()) {
            Entry::Occupied(mut existing) => {
                if existing.get().is_live(now) {
                    return Ok(false);
                }
                existing.insert(record);
                Ok(true)
            }
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(true)
            }
        }
    }

    async fn extend(
        &self,
        key: &str,
        token: &LockToken,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.round_trip().await?;

        let now = Instant::now();
        let expires_at = expiry(now, ttl)?;
        match self.inner.records.get_mut(key) {
            Some(mut record) if record.is_live(now) && record.token == token.as_str() => {
                record.expires_at = expires_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, key: &str, token: &LockToken) -> Result<bool, StoreError> {
        self.round_trip().await?;

        let now = Instant::now();
        let removed = self
            .inner
            .records
            .remove_if(key, |_, record| {
                record.is_live(now) && record.token == token.as_str()
            });
        Ok(removed.is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.round_trip().await?;
        Ok(self.live_record(key).is_some())
    }

    async fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        self.round_trip().await?;
        let now = Instant::now();
        Ok(self
            .live_record(key)
            .map(|record| record.expires_at.saturating_duration_since(now)))
    }

    async fn current_token(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.round_trip().await?;
        Ok(self.live_record(key).map(|record| record.token))
    }

    async fn list_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        self.round_trip().await?;

        let now = Instant::now();
        let mut keys: Vec<String> = self
            .inner
            .records
            .iter()
            .filter(|entry| entry.value().is_live(now) && glob_matches(pattern, entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete_unconditional(&self, key: &str) -> Result<bool, StoreError> {
        self.round_trip().await?;

        let now = Instant::now();
        Ok(self
            .inner
            .records
            .remove(key)
            .is_some_and(|(_, record)| record.is_live(now)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> LockToken {
        LockToken::generate()
    }

    #[tokio::test]
    async fn test_acquire_is_exclusive() {
        let store = MemoryLeaseStore::new();
        let (a, b) = (token(), token());

        assert!(store.acquire("k", &a, Duration::from_secs(5)).await.unwrap());
        assert!(!store.acquire("k", &b, Duration::from_secs(5)).await.unwrap());
        // the holder itself cannot acquire twice either
        assert!(!store.acquire("k", &a, Duration::from_secs(5)).await.unwrap());
        assert_eq!(
            store.current_token("k").await.unwrap().as_deref(),
            Some(a.as_str())
        );
    }

    #[tokio::test]
    async fn test_expired_record_counts_as_absent() {
        let store = MemoryLeaseStore::new();
        let (a, b) = (token(), token());

        assert!(store.acquire("k", &a, Duration::from_millis(20)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(!store.exists("k").await.unwrap());
        assert!(store.remaining_ttl("k").await.unwrap().is_none());
        assert!(!store.extend("k", &a, Duration::from_secs(1)).await.unwrap());
        assert!(store.acquire("k", &b, Duration::from_secs(5)).await.unwrap());
    }

    #[tokio::test]
    async fn test_extend_and_release_are_fenced() {
        let store = MemoryLeaseStore::new();
        let (a, b) = (token(), token());

        assert!(store.acquire("k", &a, Duration::from_secs(1)).await.unwrap());
        assert!(!store.extend("k", &b, Duration::from_secs(60)).await.unwrap());
        assert!(!store.release("k", &b).await.unwrap());

        assert!(store.extend("k", &a, Duration::from_secs(60)).await.unwrap());
        let remaining = store.remaining_ttl("k").await.unwrap().unwrap();
        assert!(remaining > Duration::from_secs(50));

        assert!(store.release("k", &a).await.unwrap());
        assert!(!store.release("k", &a).await.unwrap());
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_keys_filters_by_pattern() {
        let store = MemoryLeaseStore::new();
        let ttl = Duration::from_secs(5);
        store.acquire("lock:a:job-1", &token(), ttl).await.unwrap();
        store.acquire("lock:a:job-2", &token(), ttl).await.unwrap();
        store.acquire("lock:b:job-1", &token(), ttl).await.unwrap();

        let keys = store.list_keys("lock:a:*").await.unwrap();
        assert_eq!(keys, vec!["lock:a:job-1", "lock:a:job-2"]);
        assert_eq!(store.list_keys("*").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_delete_unconditional() {
        let store = MemoryLeaseStore::new();
        store
            .acquire("k", &token(), Duration::from_secs(5))
            .await
            .unwrap();

        assert!(store.delete_unconditional("k").await.unwrap());
        assert!(!store.delete_unconditional("k").await.unwrap());
        assert!(store.acquire("k", &token(), Duration::from_secs(5)).await.unwrap());
    }

    #[tokio::test]
    async fn test_unavailable_store_errors() {
        let store = MemoryLeaseStore::new();
        let observer = store.clone();
        observer.set_available(false);

        let result = store.acquire("k", &token(), Duration::from_secs(5)).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert!(store.list_keys("*").await.is_err());

        observer.set_available(true);
        assert!(store.acquire("k", &token(), Duration::from_secs(5)).await.unwrap());
    }

    #[tokio::test]
    async fn test_expiry_sweep_purges_records() {
        let store = MemoryLeaseStore::new().with_expiry_sweep(Duration::from_millis(10));
        store
            .acquire("k", &token(), Duration::from_millis(5))
            .await
            .unwrap();
        assert_eq!(store.record_count(), 1);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.record_count(), 0);
    }

    #[tokio::test]
    async fn test_out_of_range_ttl_is_an_error() {
        let store = MemoryLeaseStore::new();
        let a = token();

        let result = store.acquire("k", &a, Duration::MAX).await;
        assert!(matches!(result, Err(StoreError::Backend(_))));
        assert!(!store.exists("k").await.unwrap());

        assert!(store.acquire("k", &a, Duration::from_secs(5)).await.unwrap());
        assert!(store.extend("k", &a, Duration::MAX).await.is_err());
        assert!(store.exists("k").await.unwrap());
    }
}
