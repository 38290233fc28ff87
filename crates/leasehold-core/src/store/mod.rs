//! Lease store capability surface
//!
//! Any key-value store offering atomic conditional writes with a TTL can back
//! the locks. Every mutating call must be a single atomic step at the store;
//! a check followed by a separate write is not acceptable.

mod memory;
#[cfg(feature = "redis")]
mod redis_store;

use std::time::Duration;

use std::sync::Arc;

use async_trait::async_trait;
use leasehold_common::{LeaseConfiguration, LeaseError, StoreError};

pub use memory::MemoryLeaseStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisLeaseStore;

use crate::lock::LockToken;

/// Lease store contract
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Create the record if no live record exists for `key`
    async fn acquire(&self, key: &str, token: &LockToken, ttl: Duration)
    -> Result<bool, StoreError>;

    /// Reset the record's TTL if it is still owned by `token`
    async fn extend(&self, key: &str, token: &LockToken, ttl: Duration)
    -> Result<bool, StoreError>;

    /// Delete the record if it is still owned by `token`
    async fn release(&self, key: &str, token: &LockToken) -> Result<bool, StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Remaining lifetime of the live record, `None` when there is none
    async fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;

    /// Token of the live record, if any
    async fn current_token(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Keys of live records matching a glob pattern (`*`, `?`)
    async fn list_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// Delete the record regardless of owner. Administrative recovery only.
    async fn delete_unconditional(&self, key: &str) -> Result<bool, StoreError>;
}

/// Open the store named by the configuration.
///
/// Without a configured `store.url` this is a fresh in-memory store. URLs
/// need the `redis` feature.
pub async fn open_store(
    configuration: &LeaseConfiguration,
) -> Result<Arc<dyn LeaseStore>, LeaseError> {
    match configuration.store_url() {
        None => Ok(Arc::new(MemoryLeaseStore::new())),
        #[cfg(feature = "redis")]
        Some(url) => Ok(Arc::new(RedisLeaseStore::connect(&url).await?)),
        #[cfg(not(feature = "redis"))]
        Some(url) => Err(LeaseError::Config(format!(
            "store url '{}' requires the redis feature",
            url
        ))),
    }
}
