//! Herald Storage - Store Trait, In-Memory Store and Snapshot Cache
//!
//! Defines the durable store abstraction the change processor writes to and
//! the cache layer that sits in front of it for snapshot reads. The durable
//! store is authoritative; the cache is advisory.

pub mod cache;

pub use cache::{
    CacheConfig, CacheRead, CacheStats, CachedSnapshot, LmdbCacheError, LmdbSnapshotCache,
    MemorySnapshotCache, ReadThroughSnapshots, SnapshotCache,
};

use async_trait::async_trait;
use herald_core::{
    sort_newest_first, Category, Notification, NotificationId, NotificationPatch, Snapshot,
    StorageError, Timestamp, UserId, ValidDraft,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

// ============================================================================
// INSERT PAYLOAD
// ============================================================================

/// Record handed to [`NotificationStore::insert`]. The store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub user_id: UserId,
    pub title: String,
    pub message: String,
    pub category: Category,
    pub timestamp: Timestamp,
}

impl NewNotification {
    pub fn from_draft(user_id: UserId, draft: ValidDraft, timestamp: Timestamp) -> Self {
        Self {
            user_id,
            title: draft.title,
            message: draft.message,
            category: draft.category,
            timestamp,
        }
    }
}

// ============================================================================
// STORE TRAIT
// ============================================================================

/// Durable notification store.
///
/// Every mutating call is scoped to the owning user: a record owned by a
/// different user is reported as [`StorageError::NotFound`]. Each call is
/// assumed atomic with respect to the record it touches.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// All notifications owned by `user_id`, newest first.
    async fn find_by_user(&self, user_id: UserId) -> Result<Snapshot, StorageError>;

    /// Insert a record and return it with its assigned id.
    async fn insert(&self, record: NewNotification) -> Result<Notification, StorageError>;

    /// Apply `patch` to the record matching both `id` and `user_id`.
    async fn update_fields(
        &self,
        id: NotificationId,
        user_id: UserId,
        patch: NotificationPatch,
    ) -> Result<Notification, StorageError>;

    /// Remove the record matching both `id` and `user_id`.
    async fn delete(&self, id: NotificationId, user_id: UserId) -> Result<(), StorageError>;
}

#[async_trait]
impl<T: NotificationStore + ?Sized> NotificationStore for Arc<T> {
    async fn find_by_user(&self, user_id: UserId) -> Result<Snapshot, StorageError> {
        (**self).find_by_user(user_id).await
    }

    async fn insert(&self, record: NewNotification) -> Result<Notification, StorageError> {
        (**self).insert(record).await
    }

    async fn update_fields(
        &self,
        id: NotificationId,
        user_id: UserId,
        patch: NotificationPatch,
    ) -> Result<Notification, StorageError> {
        (**self).update_fields(id, user_id, patch).await
    }

    async fn delete(&self, id: NotificationId, user_id: UserId) -> Result<(), StorageError> {
        (**self).delete(id, user_id).await
    }
}

/// Lists the users a fan-out notification is delivered to.
#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    async fn all_recipients(&self) -> Result<Vec<UserId>, StorageError>;
}

/// Fixed recipient list, for tests and single-node deployments.
#[derive(Debug, Clone, Default)]
pub struct StaticRecipients {
    users: Vec<UserId>,
}

impl StaticRecipients {
    pub fn new(users: Vec<UserId>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl RecipientDirectory for StaticRecipients {
    async fn all_recipients(&self) -> Result<Vec<UserId>, StorageError> {
        Ok(self.users.clone())
    }
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

fn poisoned() -> StorageError {
    StorageError::Unavailable {
        reason: "storage lock poisoned".to_string(),
    }
}

/// In-memory notification store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryNotificationStore {
    notifications: Arc<RwLock<HashMap<NotificationId, Notification>>>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored notifications across all users.
    pub fn len(&self) -> usize {
        self.notifications.read().map(|n| n.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn find_by_user(&self, user_id: UserId) -> Result<Snapshot, StorageError> {
        let notifications = self.notifications.read().map_err(|_| poisoned())?;
        let mut snapshot: Snapshot = notifications
            .values()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        sort_newest_first(&mut snapshot);
        Ok(snapshot)
    }

    async fn insert(&self, record: NewNotification) -> Result<Notification, StorageError> {
        let mut notifications = self.notifications.write().map_err(|_| poisoned())?;
        let id = NotificationId::now_v7();
        if notifications.contains_key(&id) {
            return Err(StorageError::InsertFailed {
                reason: format!("id {} already exists", id),
            });
        }
        let notification = Notification {
            id,
            user_id: record.user_id,
            title: record.title,
            message: record.message,
            category: record.category,
            read: false,
            timestamp: record.timestamp,
        };
        notifications.insert(id, notification.clone());
        Ok(notification)
    }

    async fn update_fields(
        &self,
        id: NotificationId,
        user_id: UserId,
        patch: NotificationPatch,
    ) -> Result<Notification, StorageError> {
        let mut notifications = self.notifications.write().map_err(|_| poisoned())?;
        let notification = notifications
            .get_mut(&id)
            .filter(|n| n.user_id == user_id)
            .ok_or(StorageError::NotFound { id })?;
        patch.apply(notification);
        Ok(notification.clone())
    }

    async fn delete(&self, id: NotificationId, user_id: UserId) -> Result<(), StorageError> {
        let mut notifications = self.notifications.write().map_err(|_| poisoned())?;
        match notifications.get(&id) {
            Some(n) if n.user_id == user_id => {
                notifications.remove(&id);
                Ok(())
            }
            _ => Err(StorageError::NotFound { id }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn record(user_id: UserId, title: &str, offset_secs: i64) -> NewNotification {
        NewNotification {
            user_id,
            title: title.to_string(),
            message: "body".to_string(),
            category: Category::Info,
            timestamp: Utc::now() + Duration::seconds(offset_secs),
        }
    }

    #[tokio::test]
    async fn test_find_by_user_is_scoped_and_ordered() {
        let store = InMemoryNotificationStore::new();
        let alice = UserId::now_v7();
        let bob = UserId::now_v7();

        store.insert(record(alice, "older", -5)).await.unwrap();
        store.insert(record(alice, "newer", 5)).await.unwrap();
        store.insert(record(bob, "bob's", 0)).await.unwrap();

        let snapshot = store.find_by_user(alice).await.unwrap();
        let titles: Vec<_> = snapshot.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["newer", "older"]);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_insert_defaults_unread() {
        let store = InMemoryNotificationStore::new();
        let n = store.insert(record(UserId::now_v7(), "a", 0)).await.unwrap();
        assert!(!n.read);
    }

    #[tokio::test]
    async fn test_update_fields_requires_ownership() {
        let store = InMemoryNotificationStore::new();
        let owner = UserId::now_v7();
        let n = store.insert(record(owner, "a", 0)).await.unwrap();

        let err = store
            .update_fields(n.id, UserId::now_v7(), NotificationPatch::read(true))
            .await
            .unwrap_err();
        assert_eq!(err, StorageError::NotFound { id: n.id });

        let updated = store
            .update_fields(n.id, owner, NotificationPatch::read(true))
            .await
            .unwrap();
        assert!(updated.read);
        assert_eq!(updated.id, n.id);
        assert_eq!(updated.user_id, owner);
    }

    #[tokio::test]
    async fn test_delete_requires_ownership() {
        let store = InMemoryNotificationStore::new();
        let owner = UserId::now_v7();
        let n = store.insert(record(owner, "a", 0)).await.unwrap();

        assert!(store.delete(n.id, UserId::now_v7()).await.is_err());
        assert_eq!(store.len(), 1);

        store.delete(n.id, owner).await.unwrap();
        assert!(store.is_empty());
        assert_eq!(
            store.delete(n.id, owner).await,
            Err(StorageError::NotFound { id: n.id })
        );
    }

    #[tokio::test]
    async fn test_static_recipients() {
        let users = vec![UserId::now_v7(), UserId::now_v7()];
        let directory = StaticRecipients::new(users.clone());
        assert_eq!(directory.all_recipients().await.unwrap(), users);
    }
}

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
