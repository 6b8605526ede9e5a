//! Read-through snapshot loading.
//!
//! A read asks the cache first; on a miss (or an unreadable cache) it loads
//! the user's snapshot from the durable store and repopulates the cache. The
//! store is always the source of truth, so cache failures degrade to a store
//! read and never fail the request.

use std::sync::Arc;
use std::time::Duration;

use herald_core::{CacheError, HeraldResult, Snapshot, UserId, DEFAULT_CACHE_TTL_SECS};
use tracing::{debug, warn};

use super::freshness::CacheRead;
use super::traits::{CacheStats, SnapshotCache};
use crate::NotificationStore;

/// Configuration for the read-through cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// TTL applied to every entry written on a miss.
    pub entry_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            entry_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entry TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.entry_ttl = ttl;
        self
    }
}

/// Snapshot reader that fronts a [`NotificationStore`] with a [`SnapshotCache`].
///
/// Also the owner of invalidation: writers call [`invalidate`](Self::invalidate)
/// after every successful store write.
#[derive(Clone)]
pub struct ReadThroughSnapshots {
    store: Arc<dyn NotificationStore>,
    cache: Arc<dyn SnapshotCache>,
    config: CacheConfig,
}

impl ReadThroughSnapshots {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        cache: Arc<dyn SnapshotCache>,
        config: CacheConfig,
    ) -> Self {
        Self {
            store,
            cache,
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn NotificationStore> {
        &self.store
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Load `user_id`'s snapshot, newest first.
    ///
    /// # Errors
    ///
    /// Only a store failure on a miss is reported. Cache read or write
    /// failures are logged and skipped.
    pub async fn load(&self, user_id: UserId) -> HeraldResult<CacheRead<Snapshot>> {
        match self.cache.get(user_id).await {
            Ok(Some(cached)) => {
                let read = CacheRead::from_cache(cached.snapshot, cached.cached_at);
                debug!(
                    user_id = %user_id,
                    items = read.value().len(),
                    staleness_ms = read.staleness().as_millis() as u64,
                    "snapshot cache hit"
                );
                return Ok(read);
            }
            Ok(None) => {
                debug!(user_id = %user_id, "snapshot cache miss");
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "snapshot cache read failed, loading from store");
            }
        }

        let snapshot = self.store.find_by_user(user_id).await?;

        if let Err(e) = self
            .cache
            .put(user_id, &snapshot, self.config.entry_ttl)
            .await
        {
            warn!(user_id = %user_id, error = %e, "failed to repopulate snapshot cache");
        }

        Ok(CacheRead::from_storage(snapshot))
    }

    /// Drop `user_id`'s cached snapshot.
    pub async fn invalidate(&self, user_id: UserId) -> Result<(), CacheError> {
        self.cache.invalidate(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemorySnapshotCache;
    use crate::{InMemoryNotificationStore, NewNotification};
    use async_trait::async_trait;
    use chrono::Utc;
    use herald_core::{
        Category, HeraldError, Notification, NotificationId, NotificationPatch, StorageError,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::cache::traits::CachedSnapshot;

    /// Store wrapper that counts snapshot loads.
    struct CountingStore {
        inner: InMemoryNotificationStore,
        loads: AtomicUsize,
        fail_loads: bool,
    }

    impl CountingStore {
        fn new(fail_loads: bool) -> Self {
            Self {
                inner: InMemoryNotificationStore::new(),
                loads: AtomicUsize::new(0),
                fail_loads,
            }
        }
    }

    #[async_trait]
    impl NotificationStore for CountingStore {
        async fn find_by_user(&self, user_id: UserId) -> Result<Snapshot, StorageError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.fail_loads {
                return Err(StorageError::Unavailable {
                    reason: "down".to_string(),
                });
            }
            self.inner.find_by_user(user_id).await
        }

        async fn insert(&self, record: NewNotification) -> Result<Notification, StorageError> {
            self.inner.insert(record).await
        }

        async fn update_fields(
            &self,
            id: NotificationId,
            user_id: UserId,
            patch: NotificationPatch,
        ) -> Result<Notification, StorageError> {
            self.inner.update_fields(id, user_id, patch).await
        }

        async fn delete(&self, id: NotificationId, user_id: UserId) -> Result<(), StorageError> {
            self.inner.delete(id, user_id).await
        }
    }

    /// Cache whose every call fails.
    struct BrokenCache;

    #[async_trait]
    impl SnapshotCache for BrokenCache {
        async fn get(&self, _user_id: UserId) -> Result<Option<CachedSnapshot>, CacheError> {
            Err(CacheError::Unavailable {
                reason: "broken".to_string(),
            })
        }

        async fn put(
            &self,
            _user_id: UserId,
            _snapshot: &Snapshot,
            _ttl: Duration,
        ) -> Result<(), CacheError> {
            Err(CacheError::Unavailable {
                reason: "broken".to_string(),
            })
        }

        async fn invalidate(&self, _user_id: UserId) -> Result<(), CacheError> {
            Err(CacheError::Unavailable {
                reason: "broken".to_string(),
            })
        }

        fn stats(&self) -> CacheStats {
            CacheStats::default()
        }
    }

    fn record(user_id: UserId, title: &str) -> NewNotification {
        NewNotification {
            user_id,
            title: title.to_string(),
            message: "m".to_string(),
            category: Category::Info,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_miss_loads_and_repopulates() {
        let store = Arc::new(CountingStore::new(false));
        let reader = ReadThroughSnapshots::new(
            store.clone(),
            Arc::new(MemorySnapshotCache::new()),
            CacheConfig::default(),
        );
        let user = UserId::now_v7();
        store.insert(record(user, "A")).await.unwrap();

        let first = reader.load(user).await.unwrap();
        assert!(first.was_cache_miss());
        assert_eq!(first.value().len(), 1);

        let second = reader.load(user).await.unwrap();
        assert!(second.was_cache_hit());
        assert_eq!(second.into_value(), first.into_value());
        assert_eq!(store.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_store_load() {
        let store = Arc::new(CountingStore::new(false));
        let reader = ReadThroughSnapshots::new(
            store.clone(),
            Arc::new(MemorySnapshotCache::new()),
            CacheConfig::default(),
        );
        let user = UserId::now_v7();
        store.insert(record(user, "A")).await.unwrap();
        reader.load(user).await.unwrap();

        store.insert(record(user, "B")).await.unwrap();
        reader.invalidate(user).await.unwrap();

        let read = reader.load(user).await.unwrap();
        assert!(read.was_cache_miss());
        assert_eq!(read.value().len(), 2);
        assert_eq!(store.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_ttl_expiry_reloads() {
        let store = Arc::new(CountingStore::new(false));
        let reader = ReadThroughSnapshots::new(
            store.clone(),
            Arc::new(MemorySnapshotCache::new()),
            CacheConfig::new().with_ttl(Duration::from_secs(1)),
        );
        let user = UserId::now_v7();
        reader.load(user).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert!(reader.load(user).await.unwrap().was_cache_miss());
        assert_eq!(store.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_broken_cache_falls_back_to_store() {
        let store = Arc::new(CountingStore::new(false));
        let reader = ReadThroughSnapshots::new(
            store.clone(),
            Arc::new(BrokenCache),
            CacheConfig::default(),
        );
        let user = UserId::now_v7();
        store.insert(record(user, "A")).await.unwrap();

        let read = reader.load(user).await.unwrap();
        assert!(read.was_cache_miss());
        assert_eq!(read.value()[0].title, "A");
        assert!(reader.invalidate(user).await.is_err());
    }

    #[tokio::test]
    async fn test_store_failure_on_miss_is_reported() {
        let reader = ReadThroughSnapshots::new(
            Arc::new(CountingStore::new(true)),
            Arc::new(MemorySnapshotCache::new()),
            CacheConfig::default(),
        );
        let err = reader.load(UserId::now_v7()).await.unwrap_err();
        assert!(matches!(err, HeraldError::StoreUnavailable { .. }));
        assert_eq!(reader.cache_stats().entry_count, 0);
    }

    #[test]
    fn test_cache_config_builder() {
        assert_eq!(CacheConfig::default().entry_ttl, Duration::from_secs(3600));
        let config = CacheConfig::new().with_ttl(Duration::from_secs(1800));
        assert_eq!(config.entry_ttl, Duration::from_secs(1800));
    }
}
