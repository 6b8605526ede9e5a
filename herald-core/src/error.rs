//! Error types for Herald operations

use crate::NotificationId;
use thiserror::Error;

/// Input validation errors. Raised before any store access.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Durable store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// No record matched the id, or it is owned by another user.
    #[error("Notification not found: {id}")]
    NotFound { id: NotificationId },

    #[error("Insert failed: {reason}")]
    InsertFailed { reason: String },

    #[error("Store unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Cache layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Cache serialization error: {reason}")]
    Serialization { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for Herald operations.
///
/// The variants follow the failure taxonomy of the change path: validation
/// and not-found are caller errors, an unavailable store aborts the
/// operation, an unavailable cache is reported but never aborts a write.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HeraldError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Notification {id} not found")]
    NotFound { id: NotificationId },

    #[error("Store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    #[error("Cache unavailable: {reason}")]
    CacheUnavailable { reason: String },

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl From<StorageError> for HeraldError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { id } => HeraldError::NotFound { id },
            StorageError::InsertFailed { reason } | StorageError::Unavailable { reason } => {
                HeraldError::StoreUnavailable { reason }
            }
        }
    }
}

impl From<CacheError> for HeraldError {
    fn from(err: CacheError) -> Self {
        HeraldError::CacheUnavailable {
            reason: err.to_string(),
        }
    }
}

/// Result type alias for Herald operations.
pub type HeraldResult<T> = Result<T, HeraldError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_not_found_maps_to_not_found() {
        let id = NotificationId::nil();
        let err = HeraldError::from(StorageError::NotFound { id });
        assert_eq!(err, HeraldError::NotFound { id });
    }

    #[test]
    fn test_storage_failures_map_to_store_unavailable() {
        let err = HeraldError::from(StorageError::Unavailable {
            reason: "connection refused".to_string(),
        });
        assert!(matches!(err, HeraldError::StoreUnavailable { .. }));

        let err = HeraldError::from(StorageError::InsertFailed {
            reason: "duplicate".to_string(),
        });
        assert!(matches!(err, HeraldError::StoreUnavailable { .. }));
    }

    #[test]
    fn test_cache_error_maps_to_cache_unavailable() {
        let err = HeraldError::from(CacheError::Serialization {
            reason: "bad json".to_string(),
        });
        match err {
            HeraldError::CacheUnavailable { reason } => assert!(reason.contains("bad json")),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::RequiredFieldMissing {
            field: "title".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Required field missing"));
        assert!(msg.contains("title"));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "HERALD_CACHE_TTL_SECS".to_string(),
            value: "0".to_string(),
            reason: "must be > 0".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("HERALD_CACHE_TTL_SECS"));
        assert!(msg.contains("must be > 0"));
    }
}
