//! LMDB-backed snapshot cache.
//!
//! Uses the heed crate (Rust bindings for LMDB) so cached snapshots survive a
//! process restart. Keys are `snap:` followed by the 16 raw bytes of the
//! owning user's id; values use the shared entry encoding, so expiry is read
//! from the first eight bytes without decoding the payload.
//!
//! # Thread Safety
//!
//! - Read transactions for `get`
//! - Write transactions for `put`, `invalidate` and expired-entry removal
//! - Statistics are tracked with atomic counters

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use herald_core::{CacheError, Snapshot, UserId};
use std::time::Duration;
use tracing::trace;

use super::traits::{
    decode_entry, encode_entry, is_expired, CacheStats, CachedSnapshot, SnapshotCache,
    StatCounters,
};

const KEY_PREFIX: &[u8] = b"snap:";

/// Error type for opening the LMDB environment.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCacheError> for CacheError {
    fn from(e: LmdbCacheError) -> Self {
        CacheError::Unavailable {
            reason: e.to_string(),
        }
    }
}

fn txn_error(e: heed::Error) -> CacheError {
    LmdbCacheError::Transaction(e.to_string()).into()
}

fn user_key(user_id: UserId) -> Vec<u8> {
    let mut key = Vec::with_capacity(KEY_PREFIX.len() + 16);
    key.extend_from_slice(KEY_PREFIX);
    key.extend_from_slice(user_id.as_uuid().as_bytes());
    key
}

/// Snapshot cache stored in an LMDB environment on disk.
pub struct LmdbSnapshotCache {
    env: Env,
    db: Database<Bytes, Bytes>,
    stats: StatCounters,
}

impl LmdbSnapshotCache {
    /// Open (or create) the cache at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the LMDB
    /// environment or database cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;

        let existing = db
            .len(&wtxn)
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let stats = StatCounters::default();
        for _ in 0..existing {
            stats.inserted();
        }

        Ok(Self { env, db, stats })
    }

    /// Delete `key` only if it still holds `expected`.
    fn remove_if_unchanged(&self, key: &[u8], expected: &[u8]) -> Result<bool, CacheError> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let unchanged = self.db.get(&wtxn, key).map_err(txn_error)? == Some(expected);
        let deleted = unchanged && self.db.delete(&mut wtxn, key).map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(deleted)
    }
}

#[async_trait]
impl SnapshotCache for LmdbSnapshotCache {
    async fn get(&self, user_id: UserId) -> Result<Option<CachedSnapshot>, CacheError> {
        let key = user_key(user_id);
        let now = Utc::now();

        let blob = {
            let rtxn = self.env.read_txn().map_err(txn_error)?;
            match self.db.get(&rtxn, &key).map_err(txn_error)? {
                Some(bytes) => bytes.to_vec(),
                None => {
                    self.stats.miss();
                    return Ok(None);
                }
            }
        };

        if is_expired(&blob, now)? {
            if self.remove_if_unchanged(&key, &blob)? {
                self.stats.expired();
            }
            self.stats.miss();
            trace!(user_id = %user_id, "lmdb cache entry expired");
            return Ok(None);
        }

        let cached = decode_entry(&blob)?;
        self.stats.hit();
        Ok(Some(cached))
    }

    async fn put(
        &self,
        user_id: UserId,
        snapshot: &Snapshot,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let key = user_key(user_id);
        let blob = encode_entry(snapshot, Utc::now(), ttl)?;

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let is_new = self.db.get(&wtxn, &key).map_err(txn_error)?.is_none();
        self.db.put(&mut wtxn, &key, &blob).map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;

        if is_new {
            self.stats.inserted();
        }
        Ok(())
    }

    async fn invalidate(&self, user_id: UserId) -> Result<(), CacheError> {
        let key = user_key(user_id);

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let deleted = self.db.delete(&mut wtxn, &key).map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;

        if deleted {
            self.stats.invalidated();
        }
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::{Category, Notification, NotificationId};
    use tempfile::TempDir;

    fn create_test_cache() -> (LmdbSnapshotCache, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let cache = LmdbSnapshotCache::open(temp_dir.path(), 10)
            .expect("LMDB cache creation should succeed");
        (cache, temp_dir)
    }

    fn snapshot_for(user_id: UserId, titles: &[&str]) -> Snapshot {
        titles
            .iter()
            .map(|title| Notification {
                id: NotificationId::now_v7(),
                user_id,
                title: title.to_string(),
                message: "m".to_string(),
                category: Category::Alert,
                read: false,
                timestamp: Utc::now(),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let (cache, _dir) = create_test_cache();
        let user = UserId::now_v7();
        let snap = snapshot_for(user, &["B", "A"]);

        cache.put(user, &snap, Duration::from_secs(60)).await.unwrap();
        let cached = cache.get(user).await.unwrap().expect("entry present");
        assert_eq!(cached.snapshot, snap);
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let (cache, _dir) = create_test_cache();
        assert!(cache.get(UserId::now_v7()).await.unwrap().is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_invalidate() {
        let (cache, _dir) = create_test_cache();
        let user = UserId::now_v7();
        cache
            .put(user, &snapshot_for(user, &["A"]), Duration::from_secs(60))
            .await
            .unwrap();

        cache.invalidate(user).await.unwrap();
        assert!(cache.get(user).await.unwrap().is_none());

        let stats = cache.stats();
        assert_eq!(stats.entry_count, 0);
        assert_eq!(stats.invalidations, 1);
    }

    #[tokio::test]
    async fn test_invalidate_without_put() {
        let (cache, _dir) = create_test_cache();
        cache.invalidate(UserId::now_v7()).await.unwrap();
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[tokio::test]
    async fn test_user_isolation() {
        let (cache, _dir) = create_test_cache();
        let alice = UserId::now_v7();
        let bob = UserId::now_v7();
        cache
            .put(alice, &snapshot_for(alice, &["A"]), Duration::from_secs(60))
            .await
            .unwrap();
        cache
            .put(bob, &snapshot_for(bob, &["B"]), Duration::from_secs(60))
            .await
            .unwrap();

        cache.invalidate(alice).await.unwrap();
        assert!(cache.get(alice).await.unwrap().is_none());
        let bob_entry = cache.get(bob).await.unwrap().unwrap();
        assert_eq!(bob_entry.snapshot[0].title, "B");
    }

    #[tokio::test]
    async fn test_entry_expires() {
        let (cache, _dir) = create_test_cache();
        let user = UserId::now_v7();
        cache
            .put(user, &snapshot_for(user, &["A"]), Duration::from_secs(1))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert!(cache.get(user).await.unwrap().is_none());
        assert_eq!(cache.stats().expired, 1);
    }

    #[tokio::test]
    async fn test_reopen_keeps_entries() {
        let temp_dir = TempDir::new().unwrap();
        let user = UserId::now_v7();
        let snap = snapshot_for(user, &["persisted"]);
        {
            let cache = LmdbSnapshotCache::open(temp_dir.path(), 10).unwrap();
            cache.put(user, &snap, Duration::from_secs(60)).await.unwrap();
        }

        let cache = LmdbSnapshotCache::open(temp_dir.path(), 10).unwrap();
        assert_eq!(cache.stats().entry_count, 1);
        assert_eq!(cache.get(user).await.unwrap().unwrap().snapshot, snap);
    }

    #[tokio::test]
    async fn test_overwrite() {
        let (cache, _dir) = create_test_cache();
        let user = UserId::now_v7();
        cache
            .put(user, &snapshot_for(user, &["v1"]), Duration::from_secs(60))
            .await
            .unwrap();
        cache
            .put(user, &snapshot_for(user, &["v2", "v1"]), Duration::from_secs(60))
            .await
            .unwrap();

        let cached = cache.get(user).await.unwrap().unwrap();
        assert_eq!(cached.snapshot.len(), 2);
        assert_eq!(cache.stats().entry_count, 1);
    }
}
