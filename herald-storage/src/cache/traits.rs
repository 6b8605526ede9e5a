//! Snapshot cache trait, statistics and the entry encoding shared by backends.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use herald_core::{CacheError, Snapshot, UserId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Per-user snapshot cache.
///
/// Entries are keyed by owning user and expire after the ttl given to
/// [`put`](SnapshotCache::put). Expiry may be lazy, but `get` never returns
/// an expired entry.
#[async_trait]
pub trait SnapshotCache: Send + Sync {
    /// Cached snapshot for `user_id` if present and unexpired.
    async fn get(&self, user_id: UserId) -> Result<Option<CachedSnapshot>, CacheError>;

    /// Store or overwrite the entry for `user_id`.
    async fn put(&self, user_id: UserId, snapshot: &Snapshot, ttl: Duration)
        -> Result<(), CacheError>;

    /// Remove the entry for `user_id`. Succeeds when no entry exists.
    async fn invalidate(&self, user_id: UserId) -> Result<(), CacheError>;

    /// Current usage counters.
    fn stats(&self) -> CacheStats;
}

/// A snapshot read from the cache, with the time it was stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedSnapshot {
    pub snapshot: Snapshot,
    pub cached_at: DateTime<Utc>,
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of misses, including reads of expired entries.
    pub misses: u64,
    /// Number of entries currently stored (expired entries count until removed).
    pub entry_count: u64,
    /// Entries found expired on read and dropped.
    pub expired: u64,
    /// Explicit invalidations that removed an entry.
    pub invalidations: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Lock-free counters backing [`CacheStats`].
#[derive(Debug, Default)]
pub(crate) struct StatCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    entries: AtomicU64,
    expired: AtomicU64,
    invalidations: AtomicU64,
}

impl StatCounters {
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn expired(&self) {
        self.expired.fetch_add(1, Ordering::Relaxed);
        self.removed();
    }

    pub(crate) fn inserted(&self) {
        self.entries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn invalidated(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        self.removed();
    }

    fn removed(&self) {
        let _ = self
            .entries
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.entries.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// ENTRY ENCODING
// ============================================================================

const HEADER_LEN: usize = 16;

/// Encode an entry as `[expires_at ms LE][cached_at ms LE][json snapshot]`.
pub(crate) fn encode_entry(
    snapshot: &Snapshot,
    cached_at: DateTime<Utc>,
    ttl: Duration,
) -> Result<Vec<u8>, CacheError> {
    let json = serde_json::to_vec(snapshot).map_err(|e| CacheError::Serialization {
        reason: e.to_string(),
    })?;
    let cached_ms = cached_at.timestamp_millis();
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    let expires_ms = cached_ms.saturating_add(ttl_ms);

    let mut blob = Vec::with_capacity(HEADER_LEN + json.len());
    blob.extend_from_slice(&expires_ms.to_le_bytes());
    blob.extend_from_slice(&cached_ms.to_le_bytes());
    blob.extend_from_slice(&json);
    Ok(blob)
}

fn read_i64(bytes: &[u8]) -> Result<i64, CacheError> {
    let array: [u8; 8] = bytes.try_into().map_err(|_| CacheError::Serialization {
        reason: "truncated cache entry header".to_string(),
    })?;
    Ok(i64::from_le_bytes(array))
}

/// Expiry timestamp in milliseconds, read without decoding the payload.
pub(crate) fn entry_expires_at(blob: &[u8]) -> Result<i64, CacheError> {
    if blob.len() < HEADER_LEN {
        return Err(CacheError::Serialization {
            reason: format!("cache entry too short: {} bytes", blob.len()),
        });
    }
    read_i64(&blob[0..8])
}

/// Whether the entry is expired at `now`.
pub(crate) fn is_expired(blob: &[u8], now: DateTime<Utc>) -> Result<bool, CacheError> {
    Ok(now.timestamp_millis() >= entry_expires_at(blob)?)
}

pub(crate) fn decode_entry(blob: &[u8]) -> Result<CachedSnapshot, CacheError> {
    entry_expires_at(blob)?;
    let cached_ms = read_i64(&blob[8..HEADER_LEN])?;
    let cached_at = Utc
        .timestamp_millis_opt(cached_ms)
        .single()
        .ok_or_else(|| CacheError::Serialization {
            reason: format!("invalid cached_at {}", cached_ms),
        })?;
    let snapshot = serde_json::from_slice(&blob[HEADER_LEN..]).map_err(|e| {
        CacheError::Serialization {
            reason: e.to_string(),
        }
    })?;
    Ok(CachedSnapshot {
        snapshot,
        cached_at,
    })
}
