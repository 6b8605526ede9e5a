//! Change Processor
//!
//! The single path through which notifications are created, updated and
//! deleted. Every operation runs the same named sequence:
//!
//! 1. **write** the durable store (failure aborts, nothing else happens)
//! 2. **invalidate** the owner's cached snapshot (failure is logged and counted)
//! 3. **publish** the change event on the broadcast channel
//!
//! The three steps of one operation run under a per-user lock, so two
//! operations on the same user never interleave their steps and that user's
//! events are published in store-write order. Different users never contend.
//! Each sequence runs on its own task, so once the write has started the
//! invalidate and publish happen even if the caller is dropped.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use dashmap::DashMap;
use herald_core::{
    ChangeEvent, HeraldError, HeraldResult, Notification, NotificationDraft, NotificationId,
    NotificationPatch, Snapshot, Timestamp, UserId,
};
use herald_storage::{CacheRead, NewNotification, NotificationStore, ReadThroughSnapshots};
use tracing::{debug, info, warn};

use crate::broadcast::{BroadcastChannel, PublishReport};
use crate::telemetry::with_metrics;

type UserLock = Arc<tokio::sync::Mutex<()>>;

/// Runs write → invalidate → publish for every notification mutation.
pub struct ChangeProcessor {
    snapshots: ReadThroughSnapshots,
    broadcast: Arc<BroadcastChannel>,
    user_locks: DashMap<UserId, UserLock>,
    last_timestamp: Mutex<Option<Timestamp>>,
}

impl ChangeProcessor {
    pub fn new(snapshots: ReadThroughSnapshots, broadcast: Arc<BroadcastChannel>) -> Self {
        Self {
            snapshots,
            broadcast,
            user_locks: DashMap::new(),
            last_timestamp: Mutex::new(None),
        }
    }

    pub fn broadcast(&self) -> &Arc<BroadcastChannel> {
        &self.broadcast
    }

    pub fn snapshots(&self) -> &ReadThroughSnapshots {
        &self.snapshots
    }

    fn store(&self) -> &Arc<dyn NotificationStore> {
        self.snapshots.store()
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// The user's snapshot, through the cache.
    pub async fn snapshot(&self, user_id: UserId) -> HeraldResult<CacheRead<Snapshot>> {
        let read = self.snapshots.load(user_id).await?;
        with_metrics(|m| m.record_cache_lookup(read.was_cache_hit()));
        Ok(read)
    }

    // ========================================================================
    // MUTATIONS
    // ========================================================================

    /// Validate and insert a notification for `user_id`, then emit `Created`.
    pub async fn create(
        self: &Arc<Self>,
        user_id: UserId,
        draft: &NotificationDraft,
    ) -> HeraldResult<Notification> {
        let valid = draft.validate()?;
        let notification = self
            .run_sequence(
                user_id,
                move |this| async move {
                    let record =
                        NewNotification::from_draft(user_id, valid, this.next_timestamp());
                    this.write_insert(record).await
                },
                |n: &Notification| ChangeEvent::Created {
                    notification: n.clone(),
                },
            )
            .await?;

        info!(
            user_id = %user_id,
            notification_id = %notification.id,
            category = %notification.category,
            "notification created"
        );
        Ok(notification)
    }

    /// Set the read flag on one of the user's notifications, then emit `Updated`.
    pub async fn set_read(
        self: &Arc<Self>,
        id: NotificationId,
        user_id: UserId,
        read: bool,
    ) -> HeraldResult<Notification> {
        let result = self
            .run_sequence(
                user_id,
                move |this| async move {
                    this.store()
                        .update_fields(id, user_id, NotificationPatch::read(read))
                        .await
                        .map_err(HeraldError::from)
                },
                |n: &Notification| ChangeEvent::Updated {
                    notification: n.clone(),
                },
            )
            .await;

        match result {
            Ok(notification) => {
                debug!(user_id = %user_id, notification_id = %id, read, "notification updated");
                Ok(notification)
            }
            Err(e) => {
                warn!(user_id = %user_id, notification_id = %id, error = %e, "update rejected");
                Err(e)
            }
        }
    }

    /// Delete one of the user's notifications, then emit `Deleted`.
    pub async fn delete(self: &Arc<Self>, id: NotificationId, user_id: UserId) -> HeraldResult<()> {
        let result = self
            .run_sequence(
                user_id,
                move |this| async move {
                    this.store()
                        .delete(id, user_id)
                        .await
                        .map_err(HeraldError::from)
                },
                move |_: &()| ChangeEvent::Deleted { id, user_id },
            )
            .await;

        match result {
            Ok(()) => {
                debug!(user_id = %user_id, notification_id = %id, "notification deleted");
                Ok(())
            }
            Err(e) => {
                warn!(user_id = %user_id, notification_id = %id, error = %e, "delete rejected");
                Err(e)
            }
        }
    }

    /// Create the same notification for every recipient.
    ///
    /// The draft is validated once. Each recipient gets its own
    /// write → invalidate → publish sequence. A store failure stops the
    /// fan-out; notifications already created and published stand.
    pub async fn create_for_all(
        self: &Arc<Self>,
        recipients: &[UserId],
        draft: &NotificationDraft,
    ) -> HeraldResult<Vec<Notification>> {
        let valid = draft.validate()?;
        let mut created = Vec::with_capacity(recipients.len());

        for &user_id in recipients {
            let valid = valid.clone();
            let result = self
                .run_sequence(
                    user_id,
                    move |this| async move {
                        let record =
                            NewNotification::from_draft(user_id, valid, this.next_timestamp());
                        this.write_insert(record).await
                    },
                    |n: &Notification| ChangeEvent::Created {
                        notification: n.clone(),
                    },
                )
                .await;

            match result {
                Ok(notification) => created.push(notification),
                Err(e) => {
                    warn!(
                        user_id = %user_id,
                        completed = created.len(),
                        remaining = recipients.len() - created.len(),
                        error = %e,
                        "fan-out aborted"
                    );
                    return Err(e);
                }
            }
        }

        info!(recipients = created.len(), "fan-out notification created");
        Ok(created)
    }

    // ========================================================================
    // SEQUENCE STEPS
    // ========================================================================

    /// Run one write → invalidate → publish sequence under the user's lock.
    ///
    /// The sequence runs on its own task, so a caller that goes away after
    /// the write (a dropped request, a timeout) cannot stop the invalidate
    /// or the publish.
    async fn run_sequence<T, W, Fut, E>(
        self: &Arc<Self>,
        user_id: UserId,
        write: W,
        event: E,
    ) -> HeraldResult<T>
    where
        T: Send + 'static,
        W: FnOnce(Arc<Self>) -> Fut + Send + 'static,
        Fut: Future<Output = HeraldResult<T>> + Send,
        E: FnOnce(&T) -> ChangeEvent + Send + 'static,
    {
        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            let lock = this.user_lock(user_id);
            let result = {
                let _guard = lock.lock().await;
                match write(Arc::clone(&this)).await {
                    Ok(value) => {
                        this.invalidate(user_id).await;
                        this.publish(event(&value));
                        Ok(value)
                    }
                    Err(e) => Err(e),
                }
            };
            this.release_lock(user_id, lock);
            result
        });

        match task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(HeraldError::StoreUnavailable {
                reason: format!("change task cancelled: {}", e),
            }),
        }
    }

    async fn write_insert(&self, record: NewNotification) -> HeraldResult<Notification> {
        let user_id = record.user_id;
        self.store().insert(record).await.map_err(|e| {
            warn!(user_id = %user_id, error = %e, "store insert failed");
            e.into()
        })
    }

    /// Drop the user's cached snapshot. Never fails the operation.
    async fn invalidate(&self, user_id: UserId) {
        if let Err(e) = self.snapshots.invalidate(user_id).await {
            warn!(
                user_id = %user_id,
                error = %e,
                "cache invalidation failed, entry may be stale until TTL expiry"
            );
            with_metrics(|m| m.record_invalidation_failure());
        }
    }

    fn publish(&self, event: ChangeEvent) -> PublishReport {
        let event_type = event.event_type();
        let report = self.broadcast.publish(event);
        with_metrics(|m| m.record_change_event(event_type));
        report
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    /// Server-assigned creation time, strictly increasing across calls.
    fn next_timestamp(&self) -> Timestamp {
        let mut last = self
            .last_timestamp
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now();
        let next = match *last {
            Some(prev) if now <= prev => prev + chrono::Duration::microseconds(1),
            _ => now,
        };
        *last = Some(next);
        next
    }

    fn user_lock(&self, user_id: UserId) -> UserLock {
        self.user_locks.entry(user_id).or_default().clone()
    }

    /// Forget the user's lock when nobody else holds a handle to it.
    fn release_lock(&self, user_id: UserId, lock: UserLock) {
        drop(lock);
        self.user_locks
            .remove_if(&user_id, |_, l| Arc::strong_count(l) == 1);
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.user_locks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::ValidationError;
    use herald_storage::{CacheConfig, InMemoryNotificationStore, MemorySnapshotCache};

    fn processor() -> (Arc<ChangeProcessor>, Arc<BroadcastChannel>) {
        let broadcast = Arc::new(BroadcastChannel::new());
        let snapshots = ReadThroughSnapshots::new(
            Arc::new(InMemoryNotificationStore::new()),
            Arc::new(MemorySnapshotCache::new()),
            CacheConfig::default(),
        );
        (
            Arc::new(ChangeProcessor::new(snapshots, broadcast.clone())),
            broadcast,
        )
    }

    #[tokio::test]
    async fn test_create_publishes_created() {
        let (processor, broadcast) = processor();
        let mut sub = broadcast.attach();
        let user = UserId::now_v7();

        let n = processor
            .create(user, &NotificationDraft::new("A", "m1", "info"))
            .await
            .unwrap();

        let envelope = sub.try_recv().unwrap();
        assert_eq!(envelope.event, ChangeEvent::Created { notification: n });
        assert_eq!(processor.tracked_locks(), 0);
    }

    #[tokio::test]
    async fn test_invalid_draft_touches_nothing() {
        let (processor, broadcast) = processor();
        let mut sub = broadcast.attach();
        let user = UserId::now_v7();

        let err = processor
            .create(user, &NotificationDraft::new("", "m1", "info"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            HeraldError::Validation(ValidationError::RequiredFieldMissing {
                field: "title".to_string()
            })
        );
        assert!(sub.try_recv().is_none());
        assert!(processor.snapshot(user).await.unwrap().value().is_empty());
    }

    #[tokio::test]
    async fn test_timestamps_strictly_increase() {
        let (processor, _) = processor();
        let stamps: Vec<_> = (0..50).map(|_| processor.next_timestamp()).collect();
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_set_read_and_delete_scoped_to_owner() {
        let (processor, broadcast) = processor();
        let owner = UserId::now_v7();
        let n = processor
            .create(owner, &NotificationDraft::new("A", "m1", "alert"))
            .await
            .unwrap();
        let mut sub = broadcast.attach();

        let stranger = UserId::now_v7();
        assert!(matches!(
            processor.set_read(n.id, stranger, true).await,
            Err(HeraldError::NotFound { .. })
        ));
        assert!(matches!(
            processor.delete(n.id, stranger).await,
            Err(HeraldError::NotFound { .. })
        ));
        assert!(sub.try_recv().is_none());

        let updated = processor.set_read(n.id, owner, true).await.unwrap();
        assert!(updated.read);
        processor.delete(n.id, owner).await.unwrap();

        let events: Vec<_> = std::iter::from_fn(|| sub.try_recv())
            .map(|e| e.event.event_type())
            .collect();
        assert_eq!(events, vec!["updated", "deleted"]);
    }
}
