//! Lease lock primitive
//!
//! A [`Lock`] guards one named resource for one holder at a time. Ownership is
//! proven by a token minted per acquisition, and every store mutation is
//! conditional on that token.

mod handle;
mod model;
mod renewal;

pub use handle::Lock;
pub use model::{LockOptions, LockState, LockStatus, LockToken, LockWatch};
