//! Lease transitions over an append-only record log
//!
//! Each resource's lock state lives in a directory of numbered transition
//! records; the highest record is authoritative. Acquire, renew and release
//! all commit by creating the next record with an exclusive create,
//! conditioned on the highest record the committer observed — the same
//! conditional-write discipline the object store uses for state versions,
//! so two racing transitions (including two stealers of the same expired
//! lease) can never both succeed. Expiry is judged by the clock of the host
//! that owns the lock directory, never by an acquirer's elapsed-time
//! arithmetic. Fence tokens ride in the records and increase by one per
//! successful acquisition.

use crate::error::{LockError, Result};
use crate::lease::Lease;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::time::sleep;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// One committed lock transition
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockRecord {
    lease: Lease,

    /// A release marker frees the lock while preserving the fence counter
    released: bool,
}

impl LockRecord {
    fn free(&self, now: DateTime<Utc>) -> bool {
        self.released || self.lease.is_expired(now)
    }
}

/// Manager for exclusive, expiring leases
pub struct LockManager {
    root: PathBuf,
    poll_interval: Duration,
}

impl LockManager {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn lock_dir(&self, resource_id: &str) -> PathBuf {
        self.root.join(format!("{}.lock.d", resource_id))
    }

    /// Acquire an exclusive lease, polling up to `timeout`
    ///
    /// Fails with [`LockError::Held`] if another unexpired holder survives
    /// the whole timeout window. An expired lease is stolen; when several
    /// acquirers race for it, the exclusive create of the next transition
    /// record picks exactly one winner.
    pub async fn acquire(
        &self,
        resource_id: &str,
        holder_id: &str,
        ttl: Duration,
        timeout: Duration,
    ) -> Result<Lease> {
        validate_resource(resource_id)?;
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(lease) = self.try_acquire(resource_id, holder_id, ttl).await? {
                tracing::debug!(
                    "Acquired lock on '{}' (fence {}, expires {})",
                    resource_id,
                    lease.fence_token,
                    lease.expires_at
                );
                return Ok(lease);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            sleep(self.poll_interval.min(remaining)).await;
        }

        let current = self.read_lease(resource_id).await?;
        let (holder, expires_at) = match current {
            Some(lease) => (lease.holder_id, lease.expires_at),
            None => ("unknown".to_string(), Utc::now()),
        };
        Err(LockError::Held {
            resource_id: resource_id.to_string(),
            holder,
            expires_at,
        })
    }

    /// Single acquisition attempt; `None` means the lock is held or was
    /// transitioned by someone else between our read and our commit
    async fn try_acquire(
        &self,
        resource_id: &str,
        holder_id: &str,
        ttl: Duration,
    ) -> Result<Option<Lease>> {
        fs::create_dir_all(self.lock_dir(resource_id)).await?;

        let (next_seq, fence_token) = match self.head(resource_id).await? {
            None => (1, 1),
            Some((seq, record)) => {
                if !record.free(Utc::now()) {
                    return Ok(None);
                }
                if !record.released {
                    tracing::warn!(
                        "Stealing expired lock on '{}' from {} (expired {})",
                        resource_id,
                        record.lease.holder_id,
                        record.lease.expires_at
                    );
                }
                (seq + 1, record.lease.fence_token + 1)
            }
        };

        let now = Utc::now();
        let lease = Lease {
            resource_id: resource_id.to_string(),
            holder_id: holder_id.to_string(),
            acquired_at: now,
            expires_at: now + lease_duration(ttl),
            fence_token,
        };
        let record = LockRecord {
            lease: lease.clone(),
            released: false,
        };
        if self.commit(resource_id, next_seq, &record).await? {
            self.compact(resource_id, next_seq).await;
            Ok(Some(lease))
        } else {
            Ok(None)
        }
    }

    /// Extend a held lease's expiry
    ///
    /// Fails with [`LockError::Lost`] if the recorded lease no longer
    /// matches — it expired and was stolen, or was released elsewhere — or
    /// if another transition commits first.
    pub async fn renew(&self, lease: &Lease, ttl: Duration) -> Result<Lease> {
        let Some((seq, record)) = self.head(&lease.resource_id).await? else {
            return Err(LockError::Lost {
                resource_id: lease.resource_id.clone(),
            });
        };
        let still_ours = !record.released
            && record.lease.holder_id == lease.holder_id
            && record.lease.fence_token == lease.fence_token
            && !record.lease.is_expired(Utc::now());
        if !still_ours {
            return Err(LockError::Lost {
                resource_id: lease.resource_id.clone(),
            });
        }

        let mut renewed = record.lease.clone();
        renewed.expires_at = Utc::now() + lease_duration(ttl);
        let next = LockRecord {
            lease: renewed.clone(),
            released: false,
        };
        if self.commit(&lease.resource_id, seq + 1, &next).await? {
            self.compact(&lease.resource_id, seq + 1).await;
            tracing::debug!(
                "Renewed lock on '{}' until {}",
                renewed.resource_id,
                renewed.expires_at
            );
            Ok(renewed)
        } else {
            Err(LockError::Lost {
                resource_id: lease.resource_id.clone(),
            })
        }
    }

    /// Best-effort release; a crashed holder's lease self-expires anyway
    ///
    /// The release is itself a conditional transition, so it can never
    /// clobber a lease a stealer committed after ours expired.
    pub async fn release(&self, lease: &Lease) -> Result<()> {
        let Some((seq, record)) = self.head(&lease.resource_id).await? else {
            return Ok(());
        };
        let ours = !record.released
            && record.lease.holder_id == lease.holder_id
            && record.lease.fence_token == lease.fence_token;
        if !ours {
            tracing::debug!(
                "Skipping release of '{}': lease is no longer ours",
                lease.resource_id
            );
            return Ok(());
        }

        let marker = LockRecord {
            lease: record.lease.clone(),
            released: true,
        };
        if self.commit(&lease.resource_id, seq + 1, &marker).await? {
            self.compact(&lease.resource_id, seq + 1).await;
            tracing::debug!("Released lock on '{}'", lease.resource_id);
        }
        Ok(())
    }

    /// Current unreleased lease record for a resource, if any
    pub async fn read_lease(&self, resource_id: &str) -> Result<Option<Lease>> {
        Ok(self
            .head(resource_id)
            .await?
            .and_then(|(_, record)| (!record.released).then_some(record.lease)))
    }

    /// Highest transition record, or `None` for a resource with no history
    async fn head(&self, resource_id: &str) -> Result<Option<(u64, LockRecord)>> {
        let dir = self.lock_dir(resource_id);
        loop {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            };

            let mut highest = 0u64;
            while let Some(entry) = entries.next_entry().await? {
                if let Some(seq) = parse_record_filename(&entry.file_name().to_string_lossy()) {
                    highest = highest.max(seq);
                }
            }
            if highest == 0 {
                return Ok(None);
            }

            match fs::read_to_string(dir.join(record_filename(highest))).await {
                Ok(content) => return Ok(Some((highest, serde_json::from_str(&content)?))),
                // Compacted after a newer commit; rescan for the new head
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Claim a sequence slot with an exclusive create; `false` means a
    /// racing transition committed first
    async fn commit(&self, resource_id: &str, seq: u64, record: &LockRecord) -> Result<bool> {
        let dir = self.lock_dir(resource_id);
        let content = serde_json::to_string_pretty(record)?;
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dir.join(record_filename(seq)))
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;

        // Compaction can hand a low slot back to a committer working from a
        // stale scan; the highest record stays authoritative, so re-check.
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(s) = parse_record_filename(&entry.file_name().to_string_lossy()) {
                if s > seq {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Drop records below the committed head; best-effort
    async fn compact(&self, resource_id: &str, head_seq: u64) {
        let dir = self.lock_dir(resource_id);
        let Ok(mut entries) = fs::read_dir(&dir).await else {
            return;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            if let Some(seq) = parse_record_filename(&entry.file_name().to_string_lossy()) {
                if seq < head_seq {
                    let _ = fs::remove_file(entry.path()).await;
                }
            }
        }
    }
}

fn record_filename(seq: u64) -> String {
    format!("l{:08}.json", seq)
}

fn parse_record_filename(name: &str) -> Option<u64> {
    name.strip_prefix('l')?
        .strip_suffix(".json")?
        .parse::<u64>()
        .ok()
}

/// Absurdly long TTLs are clamped instead of overflowing the expiry math
fn lease_duration(ttl: Duration) -> chrono::Duration {
    chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(3650))
}

fn validate_resource(resource_id: &str) -> Result<()> {
    let valid = !resource_id.is_empty()
        && resource_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(LockError::InvalidResource(resource_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    const TTL: Duration = Duration::from_secs(30);
    const NO_WAIT: Duration = Duration::from_millis(0);

    #[tokio::test]
    async fn test_acquire_and_release() {
        let dir = tempdir().unwrap();
        let locks = LockManager::new(dir.path());

        let lease = locks.acquire("net-sg", "op-a", TTL, NO_WAIT).await.unwrap();
        assert_eq!(lease.fence_token, 1);

        locks.release(&lease).await.unwrap();
        let lease2 = locks.acquire("net-sg", "op-b", TTL, NO_WAIT).await.unwrap();
        assert!(lease2.fence_token > lease.fence_token);
    }

    #[tokio::test]
    async fn test_held_lock_rejects_second_holder() {
        let dir = tempdir().unwrap();
        let locks = LockManager::new(dir.path()).with_poll_interval(Duration::from_millis(10));

        let _lease = locks.acquire("r", "op-a", TTL, NO_WAIT).await.unwrap();
        let err = locks
            .acquire("r", "op-b", TTL, Duration::from_millis(50))
            .await
            .unwrap_err();
        match err {
            LockError::Held { holder, .. } => assert_eq!(holder, "op-a"),
            other => panic!("expected Held, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_expired_lock_is_stolen() {
        let dir = tempdir().unwrap();
        let locks = LockManager::new(dir.path()).with_poll_interval(Duration::from_millis(10));

        let first = locks
            .acquire("r", "op-a", Duration::from_millis(50), NO_WAIT)
            .await
            .unwrap();

        // Before expiry: held
        assert!(locks.acquire("r", "op-b", TTL, NO_WAIT).await.is_err());

        tokio::time::sleep(Duration::from_millis(80)).await;
        let stolen = locks
            .acquire("r", "op-b", TTL, Duration::from_millis(500))
            .await
            .unwrap();
        assert!(stolen.fence_token > first.fence_token);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_stealers_single_winner() {
        let dir = tempdir().unwrap();
        let locks = Arc::new(LockManager::new(dir.path()));

        // Plant an already-expired lease, then race a crowd for it
        let dead = locks
            .acquire("r", "dead-op", Duration::from_millis(10), NO_WAIT)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let mut handles = Vec::new();
        for i in 0..8 {
            let locks = Arc::clone(&locks);
            handles.push(tokio::spawn(async move {
                locks.acquire("r", &format!("op-{}", i), TTL, NO_WAIT).await
            }));
        }

        let mut winners = Vec::new();
        for handle in handles {
            if let Ok(lease) = handle.await.unwrap() {
                winners.push(lease);
            }
        }
        assert_eq!(
            winners.len(),
            1,
            "stealers all holding: {:?}",
            winners.iter().map(|l| &l.holder_id).collect::<Vec<_>>()
        );
        assert!(winners[0].fence_token > dead.fence_token);
    }

    #[tokio::test]
    async fn test_release_after_steal_leaves_new_lease() {
        let dir = tempdir().unwrap();
        let locks = LockManager::new(dir.path()).with_poll_interval(Duration::from_millis(10));

        let stale = locks
            .acquire("r", "op-a", Duration::from_millis(30), NO_WAIT)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        let stolen = locks
            .acquire("r", "op-b", TTL, Duration::from_millis(500))
            .await
            .unwrap();

        // The original holder's late release must not touch the new lease
        locks.release(&stale).await.unwrap();
        let current = locks.read_lease("r").await.unwrap().unwrap();
        assert_eq!(current.holder_id, "op-b");
        assert_eq!(current.fence_token, stolen.fence_token);
    }

    #[tokio::test]
    async fn test_renew_extends_expiry() {
        let dir = tempdir().unwrap();
        let locks = LockManager::new(dir.path());

        let lease = locks.acquire("r", "op-a", TTL, NO_WAIT).await.unwrap();
        let renewed = locks.renew(&lease, Duration::from_secs(120)).await.unwrap();
        assert!(renewed.expires_at > lease.expires_at);
        assert_eq!(renewed.fence_token, lease.fence_token);
    }

    #[tokio::test]
    async fn test_renew_after_steal_is_lost() {
        let dir = tempdir().unwrap();
        let locks = LockManager::new(dir.path());

        let lease = locks
            .acquire("r", "op-a", Duration::from_millis(30), NO_WAIT)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        let _stolen = locks
            .acquire("r", "op-b", TTL, Duration::from_millis(500))
            .await
            .unwrap();

        let err = locks.renew(&lease, TTL).await.unwrap_err();
        assert!(matches!(err, LockError::Lost { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_acquire_single_winner() {
        let dir = tempdir().unwrap();
        let locks = Arc::new(LockManager::new(dir.path()));

        let mut handles = Vec::new();
        for i in 0..4 {
            let locks = Arc::clone(&locks);
            handles.push(tokio::spawn(async move {
                locks.acquire("r", &format!("op-{}", i), TTL, NO_WAIT).await
            }));
        }

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn test_fence_tokens_strictly_increase() {
        let dir = tempdir().unwrap();
        let locks = LockManager::new(dir.path());

        let mut previous = 0;
        for _ in 0..5 {
            let lease = locks.acquire("r", "op", TTL, NO_WAIT).await.unwrap();
            assert!(lease.fence_token > previous);
            previous = lease.fence_token;
            locks.release(&lease).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_contended_polling_leaves_no_debris() {
        let dir = tempdir().unwrap();
        let locks = LockManager::new(dir.path()).with_poll_interval(Duration::from_millis(5));

        let _held = locks.acquire("r", "op-a", TTL, NO_WAIT).await.unwrap();
        let _ = locks
            .acquire("r", "op-b", TTL, Duration::from_millis(100))
            .await;

        // Dozens of failed polls later, only the held lease record exists
        let records = std::fs::read_dir(dir.path().join("r.lock.d"))
            .unwrap()
            .count();
        assert_eq!(records, 1);
    }

    #[tokio::test]
    async fn test_transition_log_is_compacted() {
        let dir = tempdir().unwrap();
        let locks = LockManager::new(dir.path());

        for _ in 0..5 {
            let lease = locks.acquire("r", "op", TTL, NO_WAIT).await.unwrap();
            locks.renew(&lease, TTL).await.unwrap();
            locks.release(&lease).await.unwrap();
        }

        let records = std::fs::read_dir(dir.path().join("r.lock.d"))
            .unwrap()
            .count();
        assert_eq!(records, 1);
    }

    #[tokio::test]
    async fn test_invalid_resource_rejected() {
        let dir = tempdir().unwrap();
        let locks = LockManager::new(dir.path());
        let err = locks
            .acquire("a/b", "op", TTL, NO_WAIT)
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::InvalidResource(_)));
    }
}
