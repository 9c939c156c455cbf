//! State coordinator: the locked read-mutate-write unit of work
//!
//! Every provisioning run goes through [`StateCoordinator::apply`]:
//! acquire a lease, read the latest state, compute the candidate next state,
//! commit it with the lease's fence token attached, release. Recoverable
//! failures (conflict, held lock, transient IO) surface to the caller —
//! retry policy belongs to the caller so contending runs back off instead
//! of hammering the lock from inside the coordinator.

use crate::error::Result;
use crate::retry::RetryConfig;
use holdfast_lock::{Lease, LockManager, default_holder_id};
use holdfast_store::{ObjectStore, StateBlob, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Tuning for a single apply
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Lease TTL; a crash mid-apply frees the resource after this long
    pub lock_ttl: Duration,

    /// How long to wait for a contended lock before giving up
    pub lock_timeout: Duration,

    /// Bounded backoff for transient storage IO failures
    pub io_retry: RetryConfig,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            lock_ttl: Duration::from_secs(60),
            lock_timeout: Duration::from_secs(30),
            io_retry: RetryConfig::default(),
        }
    }
}

/// Composes the object store and lock manager into atomic state mutations
pub struct StateCoordinator {
    store: Arc<dyn ObjectStore>,
    locks: LockManager,
    holder_id: String,
    options: ApplyOptions,
}

impl StateCoordinator {
    pub fn new(store: Arc<dyn ObjectStore>, locks: LockManager) -> Self {
        Self {
            store,
            locks,
            holder_id: default_holder_id(),
            options: ApplyOptions::default(),
        }
    }

    pub fn with_holder_id(mut self, holder_id: impl Into<String>) -> Self {
        self.holder_id = holder_id.into();
        self
    }

    pub fn with_options(mut self, options: ApplyOptions) -> Self {
        self.options = options;
        self
    }

    /// Apply a mutation to a resource's state under an exclusive lease
    ///
    /// The mutation sees the latest committed blob (`None` on first apply)
    /// and returns the candidate next payload. It runs exactly once per
    /// call; only the surrounding storage IO is retried. Recoverable errors
    /// (`Conflict`, `Held`) mean the whole apply should be retried by the
    /// caller after re-reading.
    pub async fn apply<F>(&self, resource_id: &str, mutation: F) -> Result<StateBlob>
    where
        F: FnOnce(Option<&StateBlob>) -> Result<Vec<u8>> + Send,
    {
        let lease = self
            .locks
            .acquire(
                resource_id,
                &self.holder_id,
                self.options.lock_ttl,
                self.options.lock_timeout,
            )
            .await?;

        let result = self.apply_locked(resource_id, &lease, mutation).await;

        // Best-effort: the lease self-expires if this fails
        if let Err(e) = self.locks.release(&lease).await {
            tracing::warn!("Failed to release lock on '{}': {}", resource_id, e);
        }

        result
    }

    async fn apply_locked<F>(&self, resource_id: &str, lease: &Lease, mutation: F) -> Result<StateBlob>
    where
        F: FnOnce(Option<&StateBlob>) -> Result<Vec<u8>> + Send,
    {
        let current = self.get_with_retry(resource_id).await?;
        let expected = current.as_ref().map(|b| b.version).unwrap_or(0);

        let payload = mutation(current.as_ref())?;

        // The fence token rides along so the store rejects this write if the
        // lease expired mid-apply, no matter what our local clock says.
        let mut attempt = 0;
        loop {
            match self
                .store
                .put(resource_id, &payload, expected, Some(lease.fence_token))
                .await
            {
                Ok(blob) => {
                    tracing::info!(
                        "Applied '{}' version {} (fence {})",
                        resource_id,
                        blob.version,
                        lease.fence_token
                    );
                    return Ok(blob);
                }
                Err(StoreError::Io(e)) if attempt + 1 < self.options.io_retry.max_attempts => {
                    let delay = self.options.io_retry.delay_for_attempt(attempt);
                    tracing::warn!(
                        "Transient IO failure writing '{}' (attempt {}): {}; retrying in {:?}",
                        resource_id,
                        attempt + 1,
                        e,
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Lock-free read of the latest committed state
    ///
    /// For status reporting only: the observed blob may be superseded by an
    /// in-flight apply. Mutation decisions must go through [`Self::apply`].
    pub async fn read(&self, resource_id: &str) -> Result<Option<StateBlob>> {
        Ok(self.store.get(resource_id).await?)
    }

    async fn get_with_retry(&self, resource_id: &str) -> Result<Option<StateBlob>> {
        let mut attempt = 0;
        loop {
            match self.store.get(resource_id).await {
                Ok(blob) => return Ok(blob),
                Err(StoreError::Io(e)) if attempt + 1 < self.options.io_retry.max_attempts => {
                    let delay = self.options.io_retry.delay_for_attempt(attempt);
                    tracing::warn!(
                        "Transient IO failure reading '{}' (attempt {}): {}; retrying in {:?}",
                        resource_id,
                        attempt + 1,
                        e,
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeployError;
    use holdfast_store::{Cipher, DirStore};
    use tempfile::tempdir;

    fn coordinator(root: &std::path::Path, holder: &str) -> StateCoordinator {
        let store = Arc::new(DirStore::new(root.join("state"), Cipher::new([1u8; 32])));
        let locks = LockManager::new(root.join("locks"))
            .with_poll_interval(Duration::from_millis(10));
        StateCoordinator::new(store, locks)
            .with_holder_id(holder)
            .with_options(ApplyOptions {
                lock_ttl: Duration::from_secs(30),
                lock_timeout: Duration::from_millis(500),
                io_retry: RetryConfig::default(),
            })
    }

    fn add_rule(rule: &str) -> impl FnOnce(Option<&StateBlob>) -> Result<Vec<u8>> + Send + use<> {
        let rule = rule.to_string();
        move |current| {
            let mut rules: Vec<String> = match current {
                Some(blob) => serde_json::from_slice(&blob.payload)?,
                None => Vec::new(),
            };
            rules.push(rule);
            Ok(serde_json::to_vec(&rules)?)
        }
    }

    #[tokio::test]
    async fn test_apply_on_empty_state() {
        let dir = tempdir().unwrap();
        let coord = coordinator(dir.path(), "op-a");

        let blob = coord.apply("net-sg", add_rule("ingress:443")).await.unwrap();
        assert_eq!(blob.version, 1);

        let read = coord.read("net-sg").await.unwrap().unwrap();
        let rules: Vec<String> = serde_json::from_slice(&read.payload).unwrap();
        assert_eq!(rules, vec!["ingress:443"]);
    }

    #[tokio::test]
    async fn test_read_unknown_resource() {
        let dir = tempdir().unwrap();
        let coord = coordinator(dir.path(), "op-a");
        assert!(coord.read("nothing").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_contending_applies_lose_nothing() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();

        // Two operators race on the same resource; the loser of each round
        // sees a recoverable error and retries until it commits.
        let mut handles = Vec::new();
        for (holder, rule) in [("op-a", "ingress:443"), ("op-b", "ingress:80")] {
            let root = root.clone();
            handles.push(tokio::spawn(async move {
                let coord = coordinator(&root, holder);
                for _ in 0..20 {
                    match coord.apply("net-sg", add_rule(rule)).await {
                        Ok(blob) => return Ok(blob),
                        Err(e) if e.is_recoverable() => {
                            sleep(Duration::from_millis(20)).await;
                        }
                        Err(e) => return Err(e),
                    }
                }
                panic!("starved after bounded retries");
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let coord = coordinator(&root, "observer");
        let blob = coord.read("net-sg").await.unwrap().unwrap();
        assert_eq!(blob.version, 2);
        let rules: Vec<String> = serde_json::from_slice(&blob.payload).unwrap();
        assert!(rules.contains(&"ingress:443".to_string()));
        assert!(rules.contains(&"ingress:80".to_string()));
    }

    #[tokio::test]
    async fn test_expired_lease_write_is_fenced() {
        let dir = tempdir().unwrap();
        let store = Arc::new(DirStore::new(dir.path().join("state"), Cipher::new([1u8; 32])));
        let locks = LockManager::new(dir.path().join("locks"))
            .with_poll_interval(Duration::from_millis(10));

        // A slow holder whose lease expires mid-operation
        let stale = locks
            .acquire("net-sg", "slow-op", Duration::from_millis(30), Duration::ZERO)
            .await
            .unwrap();
        sleep(Duration::from_millis(60)).await;

        // A second operator steals the lock and commits
        let fresh = locks
            .acquire("net-sg", "fast-op", Duration::from_secs(30), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(fresh.fence_token > stale.fence_token);
        store
            .put("net-sg", b"fresh", 0, Some(fresh.fence_token))
            .await
            .unwrap();

        // The stale holder still believes it holds the lock; the store
        // rejects its token regardless.
        let err = store
            .put("net-sg", b"stale", 1, Some(stale.fence_token))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::StaleFence { .. }));
    }

    #[tokio::test]
    async fn test_mutation_error_surfaces_and_releases_lock() {
        let dir = tempdir().unwrap();
        let coord = coordinator(dir.path(), "op-a");

        let err = coord
            .apply("net-sg", |_| Err(DeployError::Mutation("bad input".to_string())))
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::Mutation(_)));
        assert!(!err.is_recoverable());

        // Lock was released despite the failure
        coord.apply("net-sg", add_rule("ingress:22")).await.unwrap();
    }
}
