//! Versioned object store with compare-and-swap writes
//!
//! Each state key owns a directory of immutable version records. A write
//! commits by creating the next version file with `create_new`, so two
//! writers racing on the same predecessor version cannot both succeed —
//! the filesystem's exclusive create is the conditional write, standing in
//! for the remote store's conditional put.

use crate::blob::{StateBlob, VersionRecord, checksum};
use crate::crypto::Cipher;
use crate::error::{Result, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Object store abstraction
///
/// The directory backend below is the default; a remote backend implements
/// the same contract against its own conditional-write primitive.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Latest version of a key, or `None` if the key has never been written
    async fn get(&self, key: &str) -> Result<Option<StateBlob>>;

    /// Compare-and-swap write
    ///
    /// `expected_version` must equal the currently stored version (0 for a
    /// key that has never been written). `fence` is the writer's lock fence
    /// token; writes bearing a token below the highest token ever committed
    /// for the key are rejected as stale.
    async fn put(
        &self,
        key: &str,
        payload: &[u8],
        expected_version: u64,
        fence: Option<u64>,
    ) -> Result<StateBlob>;

    /// Version history for a key, ascending. Empty if the key is unknown.
    async fn list_versions(&self, key: &str) -> Result<Vec<VersionRecord>>;

    /// Read one historical version
    async fn get_version(&self, key: &str, version: u64) -> Result<StateBlob>;
}

/// One persisted version record
#[derive(Debug, Serialize, Deserialize)]
struct StoredVersion {
    version: u64,
    checksum: String,
    fence_token: Option<u64>,

    /// Highest fence token committed up to and including this version
    fence_floor: u64,

    written_at: DateTime<Utc>,
    size: u64,

    /// base64(nonce || AES-256-GCM ciphertext) of the payload
    ciphertext: String,
}

/// Directory-backed object store
pub struct DirStore {
    root: PathBuf,
    cipher: Cipher,
}

impl DirStore {
    pub fn new(root: impl AsRef<Path>, cipher: Cipher) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            cipher,
        }
    }

    fn key_dir(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn version_path(&self, key: &str, version: u64) -> PathBuf {
        self.key_dir(key).join(format!("v{:08}.json", version))
    }

    async fn read_record(&self, key: &str, version: u64) -> Result<Option<StoredVersion>> {
        let path = self.version_path(key, version);
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Highest committed version for a key, 0 if none
    async fn latest_version(&self, key: &str) -> Result<u64> {
        let dir = self.key_dir(key);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut latest = 0;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(v) = parse_version_filename(&entry.file_name().to_string_lossy()) {
                latest = latest.max(v);
            }
        }
        Ok(latest)
    }

    fn into_blob(&self, key: &str, record: StoredVersion) -> Result<StateBlob> {
        let payload = self.cipher.decrypt(&record.ciphertext)?;
        if checksum(&payload) != record.checksum {
            return Err(StoreError::ChecksumMismatch {
                key: key.to_string(),
                version: record.version,
            });
        }
        Ok(StateBlob {
            key: key.to_string(),
            version: record.version,
            checksum: record.checksum,
            payload,
            fence_token: record.fence_token,
            written_at: record.written_at,
        })
    }
}

#[async_trait::async_trait]
impl ObjectStore for DirStore {
    async fn get(&self, key: &str) -> Result<Option<StateBlob>> {
        validate_key(key)?;
        let latest = self.latest_version(key).await?;
        if latest == 0 {
            return Ok(None);
        }
        match self.read_record(key, latest).await? {
            Some(record) => Ok(Some(self.into_blob(key, record)?)),
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        key: &str,
        payload: &[u8],
        expected_version: u64,
        fence: Option<u64>,
    ) -> Result<StateBlob> {
        validate_key(key)?;

        let actual = self.latest_version(key).await?;
        if actual != expected_version {
            return Err(StoreError::Conflict {
                key: key.to_string(),
                expected: expected_version,
                actual,
            });
        }

        let floor = if actual > 0 {
            self.read_record(key, actual)
                .await?
                .map(|r| r.fence_floor)
                .unwrap_or(0)
        } else {
            0
        };
        if let Some(token) = fence {
            if token < floor {
                return Err(StoreError::StaleFence {
                    key: key.to_string(),
                    fence: token,
                    floor,
                });
            }
        }

        let record = StoredVersion {
            version: actual + 1,
            checksum: checksum(payload),
            fence_token: fence,
            fence_floor: floor.max(fence.unwrap_or(0)),
            written_at: Utc::now(),
            size: payload.len() as u64,
            ciphertext: self.cipher.encrypt(payload)?,
        };

        fs::create_dir_all(self.key_dir(key)).await?;

        // Commit point: exclusive create of the next version file. A racing
        // writer that read the same predecessor loses here.
        let path = self.version_path(key, record.version);
        let content = serde_json::to_string_pretty(&record)?;
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let actual = self.latest_version(key).await?;
                return Err(StoreError::Conflict {
                    key: key.to_string(),
                    expected: expected_version,
                    actual,
                });
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;

        tracing::debug!(
            "Committed '{}' version {} ({} bytes)",
            key,
            record.version,
            record.size
        );

        Ok(StateBlob {
            key: key.to_string(),
            version: record.version,
            checksum: record.checksum,
            payload: payload.to_vec(),
            fence_token: fence,
            written_at: record.written_at,
        })
    }

    async fn list_versions(&self, key: &str) -> Result<Vec<VersionRecord>> {
        validate_key(key)?;
        let latest = self.latest_version(key).await?;
        let mut records = Vec::with_capacity(latest as usize);
        for version in 1..=latest {
            if let Some(r) = self.read_record(key, version).await? {
                records.push(VersionRecord {
                    version: r.version,
                    checksum: r.checksum,
                    fence_token: r.fence_token,
                    written_at: r.written_at,
                    size: r.size,
                });
            }
        }
        Ok(records)
    }

    async fn get_version(&self, key: &str, version: u64) -> Result<StateBlob> {
        validate_key(key)?;
        match self.read_record(key, version).await? {
            Some(record) => self.into_blob(key, record),
            None => Err(StoreError::VersionNotFound {
                key: key.to_string(),
                version,
            }),
        }
    }
}

fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

fn parse_version_filename(name: &str) -> Option<u64> {
    name.strip_prefix('v')?
        .strip_suffix(".json")?
        .parse::<u64>()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn test_store(root: &Path) -> DirStore {
        DirStore::new(root, Cipher::new([42u8; 32]))
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());

        let blob = store.put("net-sg", b"{\"rules\":[]}", 0, None).await.unwrap();
        assert_eq!(blob.version, 1);

        let read = store.get("net-sg").await.unwrap().unwrap();
        assert_eq!(read.version, 1);
        assert_eq!(read.payload, b"{\"rules\":[]}");
        assert_eq!(read.checksum, blob.checksum);
    }

    #[tokio::test]
    async fn test_get_unknown_key() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());
        assert!(store.get("never-written").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_version_conflict() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());

        store.put("net-sg", b"a", 0, None).await.unwrap();
        let err = store.put("net-sg", b"b", 0, None).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict {
                expected: 0,
                actual: 1,
                ..
            }
        ));

        // Retrying against the observed version succeeds
        let blob = store.put("net-sg", b"b", 1, None).await.unwrap();
        assert_eq!(blob.version, 2);
    }

    #[tokio::test]
    async fn test_versions_strictly_increase() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());

        let mut seen = 0;
        for i in 0..5u64 {
            let blob = store
                .put("k", format!("payload-{}", i).as_bytes(), i, None)
                .await
                .unwrap();
            assert!(blob.version > seen);
            seen = blob.version;
        }

        let versions = store.list_versions("k").await.unwrap();
        assert_eq!(
            versions.iter().map(|v| v.version).collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5]
        );
    }

    #[tokio::test]
    async fn test_historical_read() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());

        store.put("k", b"first", 0, None).await.unwrap();
        store.put("k", b"second", 1, None).await.unwrap();

        let old = store.get_version("k", 1).await.unwrap();
        assert_eq!(old.payload, b"first");

        let err = store.get_version("k", 9).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionNotFound { version: 9, .. }));
    }

    #[tokio::test]
    async fn test_stale_fence_rejected() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());

        store.put("k", b"a", 0, Some(5)).await.unwrap();
        let err = store.put("k", b"b", 1, Some(3)).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::StaleFence {
                fence: 3,
                floor: 5,
                ..
            }
        ));

        // Equal or newer tokens pass
        store.put("k", b"b", 1, Some(5)).await.unwrap();
        store.put("k", b"c", 2, Some(6)).await.unwrap();
    }

    #[tokio::test]
    async fn test_payload_encrypted_at_rest() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());

        store
            .put("k", b"very-recognizable-plaintext", 0, None)
            .await
            .unwrap();

        let raw = std::fs::read_to_string(dir.path().join("k").join("v00000001.json")).unwrap();
        assert!(!raw.contains("very-recognizable-plaintext"));
    }

    #[tokio::test]
    async fn test_concurrent_cas_single_winner() {
        let dir = tempdir().unwrap();
        let store = Arc::new(test_store(dir.path()));
        store.put("k", b"base", 0, None).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..4 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .put("k", format!("contender-{}", i).as_bytes(), 1, None)
                    .await
            }));
        }

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(store.get("k").await.unwrap().unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_invalid_key_rejected() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());
        let err = store.put("../escape", b"x", 0, None).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey(_)));
    }
}
