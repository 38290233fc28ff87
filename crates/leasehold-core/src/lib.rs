//! Leasehold Core - Lease-based distributed locks
//!
//! This crate provides:
//! - The lease store contract with in-memory and Redis backends
//! - The lease lock with fencing tokens and background renewal
//! - A lock manager with a local registry, statistics and recovery tools

pub mod lock;
pub mod manager;
pub mod metrics;
pub mod store;

// Re-exports for convenience
pub use leasehold_common::{LeaseConfiguration, LeaseError, StoreError};
pub use lock::{Lock, LockOptions, LockState, LockStatus, LockToken, LockWatch};
pub use manager::{
    DeadlockSuspect, LockInfo, LockManager, LockStats, ManagedLock, ManagerConfig, SuspectKind,
};
pub use metrics::describe_metrics;
pub use store::{LeaseStore, MemoryLeaseStore, open_store};
#[cfg(feature = "redis")]
pub use store::RedisLeaseStore;
