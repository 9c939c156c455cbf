//! Lease record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An exclusive, expiring lease over a named resource
///
/// At most one unexpired lease exists per resource. The fence token is
/// strictly increasing across all successful acquisitions of a resource and
/// accompanies every state write the holder makes, so the object store can
/// reject writers whose lease has silently expired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    /// Resource this lease guards
    pub resource_id: String,

    /// Identity of the holder (hostname + pid by convention)
    pub holder_id: String,

    /// When the lease was granted
    pub acquired_at: DateTime<Utc>,

    /// When the lease self-expires if not renewed
    pub expires_at: DateTime<Utc>,

    /// Monotonically increasing proof of lease freshness
    pub fence_token: u64,
}

impl Lease {
    /// Whether the lease has expired as of `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Default holder identity: hostname (or "unknown") plus pid
pub fn default_holder_id() -> String {
    let host = std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("HOST"))
        .unwrap_or_else(|_| "unknown".to_string());
    format!("{}#{}", host, std::process::id())
}
