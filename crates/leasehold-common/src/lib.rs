//! Leasehold Common - Shared types and utilities
//!
//! This crate provides the foundational pieces used by the lease lock crates:
//! - Error taxonomy (`LeaseError`, `StoreError`)
//! - Configuration loading
//! - Logging bootstrap
//! - Key naming and pattern helpers

pub mod config;
pub mod error;
pub mod logging;
pub mod utils;

// Re-exports for convenience
pub use config::LeaseConfiguration;
pub use error::{LeaseError, StoreError};
pub use logging::{LoggingConfig, LoggingGuard, init_logging};
pub use utils::{glob_matches, is_valid_name, lock_key, name_from_key};

/// Namespace used when none is configured
pub const DEFAULT_NAMESPACE: &str = "default";

/// Prefix shared by every lock record key
pub const LOCK_KEY_PREFIX: &str = "lock";

/// Default lease time-to-live in milliseconds
pub const DEFAULT_TTL_MS: u64 = 30_000;

/// Default first backoff step of a blocking acquire in milliseconds
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 100;

/// Default backoff ceiling of a blocking acquire in milliseconds
pub const DEFAULT_MAX_RETRY_INTERVAL_MS: u64 = 1_000;

/// Renewal fires every `ttl / DEFAULT_RENEWAL_RATIO`
pub const DEFAULT_RENEWAL_RATIO: u32 = 3;

/// Remaining TTL under which a held lock is reported as a stalled renewal
pub const DEFAULT_DEADLOCK_LOW_WATER_MS: u64 = 1_000;
