//! Herald Core - Entity Types
//!
//! Pure data structures shared by every Herald crate: identifiers, the
//! notification record, change events and the error taxonomy. This crate
//! contains no I/O.

pub mod error;
pub mod event;
pub mod identity;
pub mod notification;

pub use error::{CacheError, ConfigError, HeraldError, HeraldResult, StorageError, ValidationError};
pub use event::{BroadcastEnvelope, ChangeEvent, ServerFrame};
pub use identity::{NotificationId, SessionId, Timestamp, UserId};
pub use notification::{
    sort_newest_first, Category, Notification, NotificationDraft, NotificationPatch, ValidDraft,
};

/// Default cache time-to-live in seconds (one hour).
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

/// A full ordered sequence of one user's notifications, newest first.
pub type Snapshot = Vec<Notification>;
