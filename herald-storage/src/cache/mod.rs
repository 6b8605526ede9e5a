//! Per-user snapshot cache.
//!
//! The cache maps a user to a serialized, time-bounded snapshot of that
//! user's notifications. It is advisory: every read can fall back to the
//! durable store, and a write never patches an entry, it drops it.
//!
//! Two backends share one entry encoding:
//!
//! - [`MemorySnapshotCache`]: in-process, sharded concurrent map
//! - [`LmdbSnapshotCache`]: on disk via LMDB, survives restarts
//!
//! Reads go through [`ReadThroughSnapshots`], which returns a [`CacheRead`]
//! so callers can tell a hit from a store load.

pub mod freshness;
pub mod lmdb_backend;
pub mod memory;
pub mod read_through;
pub mod traits;

pub use freshness::CacheRead;
pub use lmdb_backend::{LmdbCacheError, LmdbSnapshotCache};
pub use memory::MemorySnapshotCache;
pub use read_through::{CacheConfig, ReadThroughSnapshots};
pub use traits::{CacheStats, CachedSnapshot, SnapshotCache};
