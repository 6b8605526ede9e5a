//! In-process snapshot cache backed by a sharded concurrent map.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use herald_core::{CacheError, Snapshot, UserId};
use std::time::Duration;
use tracing::trace;

use super::traits::{
    decode_entry, encode_entry, is_expired, CacheStats, CachedSnapshot, SnapshotCache,
    StatCounters,
};

/// Snapshot cache held in process memory.
///
/// Entries are stored encoded, the same as on disk, so a read never hands
/// out a reference into the map. Expired entries are removed on the read
/// that discovers them.
#[derive(Debug, Default)]
pub struct MemorySnapshotCache {
    entries: DashMap<UserId, Vec<u8>>,
    stats: StatCounters,
}

impl MemorySnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SnapshotCache for MemorySnapshotCache {
    async fn get(&self, user_id: UserId) -> Result<Option<CachedSnapshot>, CacheError> {
        let now = Utc::now();
        let blob = match self.entries.get(&user_id) {
            Some(entry) => entry.value().clone(),
            None => {
                self.stats.miss();
                return Ok(None);
            }
        };

        if is_expired(&blob, now)? {
            // Only drop the entry if nobody replaced it since we looked.
            if self
                .entries
                .remove_if(&user_id, |_, current| *current == blob)
                .is_some()
            {
                self.stats.expired();
            }
            self.stats.miss();
            trace!(user_id = %user_id, "memory cache entry expired");
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
        let blob = encode_entry(snapshot, Utc::now(), ttl)?;
        if self.entries.insert(user_id, blob).is_none() {
            self.stats.inserted();
        }
        Ok(())
    }

    async fn invalidate(&self, user_id: UserId) -> Result<(), CacheError> {
        if self.entries.remove(&user_id).is_some() {
            self.stats.invalidated();
        }
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }
}
