//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use herald_core::HeraldResult;
use herald_storage::{
    CacheConfig, LmdbSnapshotCache, MemorySnapshotCache, NotificationStore, ReadThroughSnapshots,
    RecipientDirectory, SnapshotCache, StaticRecipients,
};
use tracing::info;

use crate::broadcast::BroadcastChannel;
use crate::config::{CacheBackendKind, ServerConfig};
use crate::services::ChangeProcessor;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<ChangeProcessor>,
    pub broadcast: Arc<BroadcastChannel>,
    pub recipients: Arc<dyn RecipientDirectory>,
    pub start_time: Instant,
}

impl AppState {
    /// Wire the store, cache and broadcast channel together.
    pub fn new(
        store: Arc<dyn NotificationStore>,
        cache: Arc<dyn SnapshotCache>,
        cache_config: CacheConfig,
        recipients: Arc<dyn RecipientDirectory>,
    ) -> Self {
        let broadcast = Arc::new(BroadcastChannel::new());
        let snapshots = ReadThroughSnapshots::new(store, cache, cache_config);
        Self {
            processor: Arc::new(ChangeProcessor::new(snapshots, broadcast.clone())),
            broadcast,
            recipients,
            start_time: Instant::now(),
        }
    }

    /// Build state from server configuration, opening the configured cache.
    pub fn from_config(
        config: &ServerConfig,
        store: Arc<dyn NotificationStore>,
    ) -> HeraldResult<Self> {
        let cache = open_cache(&config.cache_backend)?;
        let recipients = Arc::new(StaticRecipients::new(config.recipients.clone()));
        Ok(Self::new(
            store,
            cache,
            CacheConfig::new().with_ttl(config.cache_ttl),
            recipients,
        ))
    }
}

/// Open the snapshot cache backend once at startup.
pub fn open_cache(kind: &CacheBackendKind) -> HeraldResult<Arc<dyn SnapshotCache>> {
    match kind {
        CacheBackendKind::Memory => {
            info!("using in-memory snapshot cache");
            Ok(Arc::new(MemorySnapshotCache::new()))
        }
        CacheBackendKind::Lmdb { path, max_size_mb } => {
            let cache = LmdbSnapshotCache::open(path, *max_size_mb)
                .map_err(herald_core::CacheError::from)?;
            info!(path = %path.display(), max_size_mb, "using LMDB snapshot cache");
            Ok(Arc::new(cache))
        }
    }
}

crate::impl_from_ref!(Arc<ChangeProcessor>, processor);
crate::impl_from_ref!(Arc<BroadcastChannel>, broadcast);
crate::impl_from_ref!(Arc<dyn RecipientDirectory>, recipients);
crate::impl_from_ref!(Instant, start_time);
