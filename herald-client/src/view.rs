//! The client's local copy of one user's notifications.
//!
//! A [`ClientView`] starts in [`ViewStatus::Loading`], becomes `Ready` once a
//! snapshot is installed, and only then accepts change events. Applying an
//! event is idempotent: a duplicate `Created` replaces in place, and
//! `Updated`/`Deleted` for an absent id do nothing.

use herald_core::{Category, ChangeEvent, Notification, NotificationId, Snapshot, UserId};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewStatus {
    Loading,
    Ready,
    Failed { reason: String },
}

/// What applying one event did to the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Inserted,
    Replaced,
    Removed,
    /// Event for another user, an absent id, or a view that is not ready.
    Ignored,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientView {
    user_id: UserId,
    status: ViewStatus,
    items: Vec<Notification>,
}

impl ClientView {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            status: ViewStatus::Loading,
            items: Vec::new(),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn status(&self) -> &ViewStatus {
        &self.status
    }

    pub fn is_ready(&self) -> bool {
        self.status == ViewStatus::Ready
    }

    /// Notifications, newest first.
    pub fn items(&self) -> &[Notification] {
        &self.items
    }

    pub fn get(&self, id: NotificationId) -> Option<&Notification> {
        self.items.iter().find(|n| n.id == id)
    }

    /// Drop local state and wait for a fresh snapshot.
    pub fn begin_loading(&mut self) {
        self.status = ViewStatus::Loading;
        self.items.clear();
    }

    /// Replace local state with `snapshot` and become ready.
    pub fn install_snapshot(&mut self, mut snapshot: Snapshot) {
        snapshot.retain(|n| n.user_id == self.user_id);
        herald_core::sort_newest_first(&mut snapshot);
        self.items = snapshot;
        self.status = ViewStatus::Ready;
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = ViewStatus::Failed {
            reason: reason.into(),
        };
        self.items.clear();
    }

    /// Apply one change event. Only a ready view changes.
    pub fn apply(&mut self, event: &ChangeEvent) -> Applied {
        if !self.is_ready() || event.user_id() != self.user_id {
            return Applied::Ignored;
        }
        match event {
            ChangeEvent::Created { notification } => self.upsert(notification),
            ChangeEvent::Updated { notification } => match self.position(notification.id) {
                Some(index) => {
                    self.items.remove(index);
                    self.insert_ordered(notification.clone());
                    Applied::Replaced
                }
                None => Applied::Ignored,
            },
            ChangeEvent::Deleted { id, .. } => match self.position(*id) {
                Some(index) => {
                    self.items.remove(index);
                    Applied::Removed
                }
                None => Applied::Ignored,
            },
        }
    }

    fn upsert(&mut self, notification: &Notification) -> Applied {
        match self.position(notification.id) {
            Some(index) => {
                self.items.remove(index);
                self.insert_ordered(notification.clone());
                Applied::Replaced
            }
            None => {
                self.insert_ordered(notification.clone());
                Applied::Inserted
            }
        }
    }

    fn position(&self, id: NotificationId) -> Option<usize> {
        self.items.iter().position(|n| n.id == id)
    }

    /// Newest-first insert. With non-decreasing server timestamps this is a prepend.
    fn insert_ordered(&mut self, notification: Notification) {
        let index = self.items.partition_point(|existing| {
            Notification::newest_first(existing, &notification) == Ordering::Less
        });
        self.items.insert(index, notification);
    }

    // ========================================================================
    // DERIVED VIEWS
    // ========================================================================

    /// Items in one category, or all items.
    pub fn filtered(&self, category: Option<Category>) -> Vec<&Notification> {
        self.items
            .iter()
            .filter(|n| category.map_or(true, |c| n.category == c))
            .collect()
    }

    pub fn unread_count(&self) -> usize {
        self.items.iter().filter(|n| !n.read).count()
    }

    /// The read flag a toggle of `id` should send, if `id` is in view.
    pub fn toggled_read(&self, id: NotificationId) -> Option<bool> {
        self.get(id).map(|n| !n.read)
    }
}
