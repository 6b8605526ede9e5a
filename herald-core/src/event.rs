//! Change events and the frames that carry them to connected sessions.

use crate::{Notification, NotificationId, SessionId, UserId};
use serde::{Deserialize, Serialize};

/// A single create/update/delete, carrying enough state for any receiver
/// to update its local view without a follow-up fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    Created { notification: Notification },
    Updated { notification: Notification },
    Deleted { id: NotificationId, user_id: UserId },
}

impl ChangeEvent {
    /// Get the event type as a string for logging/metrics.
    pub fn event_type(&self) -> &'static str {
        match self {
            ChangeEvent::Created { .. } => "created",
            ChangeEvent::Updated { .. } => "updated",
            ChangeEvent::Deleted { .. } => "deleted",
        }
    }

    /// Owner of the affected notification. Receivers filter on this.
    pub fn user_id(&self) -> UserId {
        match self {
            ChangeEvent::Created { notification } | ChangeEvent::Updated { notification } => {
                notification.user_id
            }
            ChangeEvent::Deleted { user_id, .. } => *user_id,
        }
    }

    pub fn notification_id(&self) -> NotificationId {
        match self {
            ChangeEvent::Created { notification } | ChangeEvent::Updated { notification } => {
                notification.id
            }
            ChangeEvent::Deleted { id, .. } => *id,
        }
    }
}

/// What the broadcast channel hands to each session.
///
/// `seq` is assigned once per publish, so every session observes the same
/// sequence number for the same event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastEnvelope {
    pub seq: u64,
    pub event: ChangeEvent,
}

/// Frames sent from server to client over the push transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Sent once after the session is attached.
    Connected { session_id: SessionId },
    /// A change event.
    Event(BroadcastEnvelope),
    /// Transport-level problem; the session may be closed afterwards.
    Error { message: String },
}
