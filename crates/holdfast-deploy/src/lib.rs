//! Holdfast State Coordinator
//!
//! The unit of work every provisioning run performs: acquire a lease on a
//! resource, read the latest committed state, compute the next state, write
//! it back under optimistic concurrency with the lease's fence token, and
//! release. Also owns the [`DeploymentTarget`] record handed to a host's
//! bootstrap sequencer.
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │            Deployment Trigger (CLI/CI)            │
//! └──────────────────────┬───────────────────────────┘
//!                        │ apply(resource, mutation) / read(resource)
//! ┌──────────────────────▼───────────────────────────┐
//! │               StateCoordinator                    │
//! │  acquire ──▶ read ──▶ mutate ──▶ put(fence) ──▶  │
//! │  release                                          │
//! └──────┬───────────────────────────────┬───────────┘
//!        │                               │
//! ┌──────▼────────┐              ┌───────▼────────┐
//! │ holdfast-lock │              │ holdfast-store │
//! └───────────────┘              └────────────────┘
//! ```

pub mod coordinator;
pub mod error;
pub mod retry;
pub mod target;

// Re-exports
pub use coordinator::{ApplyOptions, StateCoordinator};
pub use error::{DeployError, Result};
pub use retry::RetryConfig;
pub use target::DeploymentTarget;
