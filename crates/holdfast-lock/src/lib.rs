//! Holdfast Distributed Lock Manager
//!
//! Exclusive, expiring leases over named resources, built on the backing
//! store's conditional-write primitive (exclusive create of the next
//! transition record).
//! Every successful acquisition mints a strictly increasing fence token that
//! the holder attaches to its state writes; the object store rejects stale
//! tokens, which closes the "lock thought held, actually expired" race
//! without trusting any holder's clock.
//!
//! Release is an optimization: a crashed holder's lease self-expires at
//! `expires_at` and becomes stealable.

pub mod error;
pub mod lease;
pub mod manager;

// Re-exports
pub use error::{LockError, Result};
pub use lease::{Lease, default_holder_id};
pub use manager::LockManager;
