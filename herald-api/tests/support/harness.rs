//! Shared wiring for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use herald_api::{AppState, BroadcastChannel, ChangeProcessor};
use herald_core::UserId;
use herald_storage::{CacheConfig, ReadThroughSnapshots, StaticRecipients};
use herald_test_utils::{FailingCache, FailingStore};

/// A processor over failure-injectable doubles, with handles to each part.
pub struct Harness {
    pub store: Arc<FailingStore>,
    pub cache: Arc<FailingCache>,
    pub broadcast: Arc<BroadcastChannel>,
    pub processor: Arc<ChangeProcessor>,
}

pub fn harness() -> Harness {
    let store = Arc::new(FailingStore::new());
    let cache = Arc::new(FailingCache::new());
    let broadcast = Arc::new(BroadcastChannel::new());
    let snapshots = ReadThroughSnapshots::new(store.clone(), cache.clone(), CacheConfig::default());
    let processor = Arc::new(ChangeProcessor::new(snapshots, broadcast.clone()));
    Harness {
        store,
        cache,
        broadcast,
        processor,
    }
}

/// Application state over failure-injectable doubles.
pub fn app_state(recipients: Vec<UserId>) -> (AppState, Arc<FailingStore>, Arc<FailingCache>) {
    let store = Arc::new(FailingStore::new());
    let cache = Arc::new(FailingCache::new());
    let state = AppState::new(
        store.clone(),
        cache.clone(),
        CacheConfig::default(),
        Arc::new(StaticRecipients::new(recipients)),
    );
    (state, store, cache)
}
