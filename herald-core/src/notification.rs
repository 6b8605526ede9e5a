//! Notification entity and its input shapes.

use crate::{NotificationId, Timestamp, UserId, ValidationError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Notification category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Info,
    Alert,
    Message,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Info, Category::Alert, Category::Message];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Info => "info",
            Category::Alert => "alert",
            Category::Message => "message",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Category::Info),
            "alert" => Ok(Category::Alert),
            "message" => Ok(Category::Message),
            other => Err(ValidationError::InvalidValue {
                field: "category".to_string(),
                reason: format!("'{}' is not one of info, alert, message", other),
            }),
        }
    }
}

/// A stored notification.
///
/// `id` and `user_id` never change after creation. The remaining fields are
/// only mutated through the change processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub title: String,
    pub message: String,
    pub category: Category,
    #[serde(default)]
    pub read: bool,
    pub timestamp: Timestamp,
}

impl Notification {
    /// Ordering used for snapshots: newest first, ties broken by id.
    pub fn newest_first(a: &Notification, b: &Notification) -> Ordering {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| b.id.cmp(&a.id))
    }
}

/// Sort a sequence of notifications into snapshot order.
pub fn sort_newest_first(items: &mut [Notification]) {
    items.sort_by(Notification::newest_first);
}

/// Unvalidated input for creating a notification.
///
/// Category is kept as a raw string so an unknown value surfaces as a
/// validation error rather than a deserialization failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationDraft {
    pub title: String,
    pub message: String,
    pub category: String,
}

/// A draft that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidDraft {
    pub title: String,
    pub message: String,
    pub category: Category,
}

impl NotificationDraft {
    pub fn new(
        title: impl Into<String>,
        message: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            category: category.into(),
        }
    }

    /// Reject empty or whitespace-only text and unknown categories.
    pub fn validate(&self) -> Result<ValidDraft, ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "title".to_string(),
            });
        }
        if self.message.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "message".to_string(),
            });
        }
        let category = self.category.parse::<Category>()?;
        Ok(ValidDraft {
            title: self.title.clone(),
            message: self.message.clone(),
            category,
        })
    }
}

/// Mutable-field update applied by the store's `update_fields`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationPatch {
    pub read: Option<bool>,
}

impl NotificationPatch {
    pub fn read(read: bool) -> Self {
        Self { read: Some(read) }
    }

    pub fn apply(&self, notification: &mut Notification) {
        if let Some(read) = self.read {
            notification.read = read;
        }
    }
}
