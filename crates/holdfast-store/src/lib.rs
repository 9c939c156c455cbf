//! Holdfast Versioned Object Store
//!
//! Durable key-value storage for opaque infrastructure-state blobs with
//! optimistic concurrency control. Every write appends an immutable,
//! encrypted version record; writes commit only when the writer's expected
//! version matches the stored one, and writes bearing a stale lock fence
//! token are rejected regardless of what the writer believes about its lease.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │             StateCoordinator              │
//! │        (holdfast-deploy, locked)          │
//! └───────────────────┬──────────────────────┘
//!                     │ put(key, payload, expected_version, fence)
//! ┌───────────────────▼──────────────────────┐
//! │            trait ObjectStore              │
//! │   get / put / list_versions / get_version │
//! └───────────────────┬──────────────────────┘
//!                     │
//! ┌───────────────────▼──────────────────────┐
//! │                DirStore                   │
//! │  <root>/<key>/v00000001.json (immutable)  │
//! │  AES-256-GCM payloads, SHA-256 checksums  │
//! └──────────────────────────────────────────┘
//! ```

pub mod blob;
pub mod crypto;
pub mod error;
pub mod store;

// Re-exports
pub use blob::{StateBlob, VersionRecord, checksum};
pub use crypto::Cipher;
pub use error::{Result, StoreError};
pub use store::{DirStore, ObjectStore};
