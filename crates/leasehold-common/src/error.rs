//! Error types for Leasehold
//!
//! - `StoreError`: the lease store could not be reached or rejected a call
//! - `LeaseError`: everything a lock or manager operation can fail with
//!
//! Releasing a lock that already expired or was taken over is not an error;
//! those calls return `Ok(false)`.

use std::time::Duration;

/// Failures reaching the lease store
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("lease store unavailable: {0}")]
    Unavailable(String),

    #[error("lease store backend error: {0}")]
    Backend(String),

    #[error("lease store call timed out")]
    Timeout,
}

/// Lock and manager errors
#[derive(thiserror::Error, Debug)]
pub enum LeaseError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("timed out acquiring lock '{name}' after {waited:?}")]
    AcquireTimeout { name: String, waited: Duration },

    #[error("lock '{name}' was lost: renewal failed or it was taken over")]
    LockLost { name: String },

    #[error("lock '{name}' is not held")]
    NotHeld { name: String },

    #[error("lock '{name}' is already held by this handle")]
    AlreadyAcquired { name: String },

    #[error("invalid lock options: {0}")]
    InvalidOptions(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl LeaseError {
    /// Whether the failure came from the lease store rather than lock state
    pub fn is_store_error(&self) -> bool {
        matches!(self, LeaseError::Store(_))
    }
}

impl From<config::ConfigError> for LeaseError {
    fn from(value: config::ConfigError) -> Self {
        LeaseError::Config(value.to_string())
    }
}
