//! Herald Test Utilities
//!
//! Shared test infrastructure for the Herald workspace:
//! - Proptest generators for notifications, drafts and change events
//! - Store and cache doubles with switchable failures
//! - Fixtures and assertions for snapshot ordering

pub use herald_core::{
    Category, ChangeEvent, Notification, NotificationDraft, NotificationId, Snapshot, Timestamp,
    UserId,
};

use async_trait::async_trait;
use chrono::Utc;
use herald_core::{CacheError, NotificationPatch, StorageError};
use herald_storage::{
    CacheStats, CachedSnapshot, InMemoryNotificationStore, MemorySnapshotCache, NewNotification,
    NotificationStore, SnapshotCache,
};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Herald types.

    use super::*;
    use proptest::prelude::*;
    use uuid::Uuid;

    pub fn arb_user_id() -> impl Strategy<Value = UserId> {
        any::<[u8; 16]>().prop_map(|b| UserId::new(Uuid::from_bytes(b)))
    }

    pub fn arb_notification_id() -> impl Strategy<Value = NotificationId> {
        any::<[u8; 16]>().prop_map(|b| NotificationId::new(Uuid::from_bytes(b)))
    }

    /// Timestamps between 2020 and 2030, millisecond precision.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1_577_836_800_000i64..1_893_456_000_000i64).prop_map(|ms| {
            chrono::DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
        })
    }

    pub fn arb_category() -> impl Strategy<Value = Category> {
        prop_oneof![
            Just(Category::Info),
            Just(Category::Alert),
            Just(Category::Message),
        ]
    }

    /// Non-blank text.
    pub fn arb_text() -> impl Strategy<Value = String> {
        "[A-Za-z0-9][A-Za-z0-9 ]{0,30}"
    }

    /// Drafts that pass validation.
    pub fn arb_draft() -> impl Strategy<Value = NotificationDraft> {
        (arb_text(), arb_text(), arb_category()).prop_map(|(title, message, category)| {
            NotificationDraft::new(title, message, category.as_str())
        })
    }

    /// Drafts that fail validation for exactly one reason.
    pub fn arb_invalid_draft() -> impl Strategy<Value = NotificationDraft> {
        prop_oneof![
            (arb_text(), arb_category())
                .prop_map(|(m, c)| NotificationDraft::new("  ", m, c.as_str())),
            (arb_text(), arb_category())
                .prop_map(|(t, c)| NotificationDraft::new(t, "", c.as_str())),
            (arb_text(), arb_text(), "[a-z]{1,8}")
                .prop_filter("must not be a known category", |(_, _, c)| {
                    c.parse::<Category>().is_err()
                })
                .prop_map(|(t, m, c)| NotificationDraft::new(t, m, c)),
        ]
    }

    /// A notification owned by `user_id`.
    pub fn arb_notification_for(user_id: UserId) -> impl Strategy<Value = Notification> {
        (
            arb_notification_id(),
            arb_text(),
            arb_text(),
            arb_category(),
            any::<bool>(),
            arb_timestamp(),
        )
            .prop_map(move |(id, title, message, category, read, timestamp)| Notification {
                id,
                user_id,
                title,
                message,
                category,
                read,
                timestamp,
            })
    }

    pub fn arb_notification() -> impl Strategy<Value = Notification> {
        arb_user_id().prop_flat_map(arb_notification_for)
    }

    /// Change events drawn from a small pool of ids so that events collide.
    pub fn arb_change_event(
        user_id: UserId,
        ids: Vec<NotificationId>,
    ) -> impl Strategy<Value = ChangeEvent> {
        let pool = ids.clone();
        prop_oneof![
            (prop::sample::select(ids.clone()), arb_notification_for(user_id)).prop_map(
                |(id, mut notification)| {
                    notification.id = id;
                    ChangeEvent::Created { notification }
                }
            ),
            (prop::sample::select(ids), arb_notification_for(user_id)).prop_map(
                |(id, mut notification)| {
                    notification.id = id;
                    ChangeEvent::Updated { notification }
                }
            ),
            prop::sample::select(pool)
                .prop_map(move |id| ChangeEvent::Deleted { id, user_id }),
        ]
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Ready-made values for example-based tests.

    use super::*;

    /// Notification owned by `user_id`, created `offset_secs` from now.
    pub fn notification_for(user_id: UserId, title: &str, offset_secs: i64) -> Notification {
        Notification {
            id: NotificationId::now_v7(),
            user_id,
            title: title.to_string(),
            message: format!("{} body", title),
            category: Category::Info,
            read: false,
            timestamp: Utc::now() + chrono::Duration::seconds(offset_secs),
        }
    }

    pub fn draft(title: &str, message: &str, category: &str) -> NotificationDraft {
        NotificationDraft::new(title, message, category)
    }

    pub fn created(notification: &Notification) -> ChangeEvent {
        ChangeEvent::Created {
            notification: notification.clone(),
        }
    }

    pub fn updated(notification: &Notification) -> ChangeEvent {
        ChangeEvent::Updated {
            notification: notification.clone(),
        }
    }

    pub fn deleted(notification: &Notification) -> ChangeEvent {
        ChangeEvent::Deleted {
            id: notification.id,
            user_id: notification.user_id,
        }
    }
}

// ============================================================================
// STORE AND CACHE DOUBLES
// ============================================================================

fn store_down() -> StorageError {
    StorageError::Unavailable {
        reason: "injected store failure".to_string(),
    }
}

fn cache_down() -> CacheError {
    CacheError::Unavailable {
        reason: "injected cache failure".to_string(),
    }
}

/// In-memory store whose reads and writes can be made to fail.
#[derive(Debug, Default)]
pub struct FailingStore {
    inner: InMemoryNotificationStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    /// Inserts allowed before every further insert fails.
    insert_allowance: Mutex<Option<usize>>,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &InMemoryNotificationStore {
        &self.inner
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Let `n` more inserts succeed, then fail the rest.
    pub fn fail_inserts_after(&self, n: usize) {
        if let Ok(mut allowance) = self.insert_allowance.lock() {
            *allowance = Some(n);
        }
    }

    fn check_write(&self) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(store_down())
        } else {
            Ok(())
        }
    }

    fn take_insert_allowance(&self) -> Result<(), StorageError> {
        let mut allowance = self.insert_allowance.lock().map_err(|_| store_down())?;
        match allowance.as_mut() {
            Some(0) => Err(store_down()),
            Some(n) => {
                *n -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl NotificationStore for FailingStore {
    async fn find_by_user(&self, user_id: UserId) -> Result<Snapshot, StorageError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(store_down());
        }
        self.inner.find_by_user(user_id).await
    }

    async fn insert(&self, record: NewNotification) -> Result<Notification, StorageError> {
        self.check_write()?;
        self.take_insert_allowance()?;
        self.inner.insert(record).await
    }

    async fn update_fields(
        &self,
        id: NotificationId,
        user_id: UserId,
        patch: NotificationPatch,
    ) -> Result<Notification, StorageError> {
        self.check_write()?;
        self.inner.update_fields(id, user_id, patch).await
    }

    async fn delete(&self, id: NotificationId, user_id: UserId) -> Result<(), StorageError> {
        self.check_write()?;
        self.inner.delete(id, user_id).await
    }
}

/// Memory cache that records invalidations and can be made to fail.
#[derive(Debug, Default)]
pub struct FailingCache {
    inner: MemorySnapshotCache,
    fail_gets: AtomicBool,
    fail_invalidations: AtomicBool,
    invalidate_delay_ms: AtomicU64,
    invalidate_calls: AtomicUsize,
}

impl FailingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    pub fn fail_invalidations(&self, fail: bool) {
        self.fail_invalidations.store(fail, Ordering::SeqCst);
    }

    /// Make every `invalidate` wait this long first, like a networked cache.
    pub fn delay_invalidations(&self, delay: Duration) {
        self.invalidate_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of `invalidate` calls, successful or not.
    pub fn invalidate_calls(&self) -> usize {
        self.invalidate_calls.load(Ordering::SeqCst)
    }

    /// Entries currently held, expired or not.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[async_trait]
impl SnapshotCache for FailingCache {
    async fn get(&self, user_id: UserId) -> Result<Option<CachedSnapshot>, CacheError> {
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(cache_down());
        }
        self.inner.get(user_id).await
    }

    async fn put(
        &self,
        user_id: UserId,
        snapshot: &Snapshot,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.inner.put(user_id, snapshot, ttl).await
    }

    async fn invalidate(&self, user_id: UserId) -> Result<(), CacheError> {
        self.invalidate_calls.fetch_add(1, Ordering::SeqCst);
        let delay_ms = self.invalidate_delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        if self.fail_invalidations.load(Ordering::SeqCst) {
            return Err(cache_down());
        }
        self.inner.invalidate(user_id).await
    }

    fn stats(&self) -> CacheStats {
        self.inner.stats()
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertions for snapshot shape.

    use super::*;

    /// Panics unless `snapshot` is ordered newest first.
    pub fn assert_newest_first(snapshot: &[Notification]) {
        for pair in snapshot.windows(2) {
            assert!(
                Notification::newest_first(&pair[0], &pair[1]) != std::cmp::Ordering::Greater,
                "snapshot out of order: {} ({}) before {} ({})",
                pair[0].id,
                pair[0].timestamp,
                pair[1].id,
                pair[1].timestamp
            );
        }
    }

    /// Panics if `snapshot` contains the same id twice.
    pub fn assert_unique_ids(snapshot: &[Notification]) {
        let mut ids: Vec<_> = snapshot.iter().map(|n| n.id).collect();
        ids.sort();
        let before = ids.len();
        ids.dedup();
        assert_eq!(before, ids.len(), "snapshot contains duplicate ids");
    }

    pub fn titles(snapshot: &[Notification]) -> Vec<&str> {
        snapshot.iter().map(|n| n.title.as_str()).collect()
    }
}
