//! Typed error hierarchy for the SKU allocation engine.
//!
//! `SkuError` covers the whole engine. Application code (CLI, config
//! loading) stays on `anyhow` and converts at the edge.

use thiserror::Error;

/// Errors from configuring and running SKU allocation.
#[derive(Debug, Error)]
pub enum SkuError {
    /// Required schema/storage structure is missing or unresolvable.
    /// Blocks all allocation until fixed.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Item {id} not found")]
    ItemNotFound { id: i64 },

    #[error("Category {id} not found")]
    CategoryNotFound { id: i64 },

    /// A previously issued code could not be parsed for its sequence.
    /// Only ever used inside the resolver, where the code is skipped.
    #[error("Malformed code '{code}': {reason}")]
    Validation { code: String, reason: String },

    #[error("Failed to persist code: {0}")]
    Persistence(#[source] anyhow::Error),

    #[error("Code {code} is already assigned to another item")]
    DuplicateCode { code: String },

    #[error("Item {id} already has code {code} (use --force to reassign)")]
    AlreadyAssigned { id: i64, code: String },

    #[error("Backfill aborted after {committed} item(s) were committed: {source}")]
    PartialBackfill {
        committed: usize,
        #[source]
        source: Box<SkuError>,
    },

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<SkuError> },

    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,
}

impl SkuError {
    /// Errors worth retrying with a freshly resolved sequence.
    pub fn is_retryable(&self) -> bool {
        match self {
            SkuError::DuplicateCode { .. } => true,
            SkuError::Database(e) | SkuError::Persistence(e) => is_busy(e),
            _ => false,
        }
    }
}

fn is_busy(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<rusqlite::Error>(),
            Some(rusqlite::Error::SqliteFailure(e, _))
                if matches!(e.code, rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
        )
    })
}

impl From<rusqlite::Error> for SkuError {
    fn from(err: rusqlite::Error) -> Self {
        SkuError::Database(err.into())
    }
}

pub type SkuResult<T> = std::result::Result<T, SkuError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_not_found_carries_id() {
        let err = SkuError::ItemNotFound { id: 42 };
        match &err {
            SkuError::ItemNotFound { id } => assert_eq!(*id, 42),
            _ => panic!("Expected ItemNotFound"),
        }
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn duplicate_code_is_retryable() {
        let err = SkuError::DuplicateCode {
            code: "FER-0001".into(),
        };
        assert!(err.is_retryable());
        assert!(!SkuError::ItemNotFound { id: 1 }.is_retryable());
    }

    #[test]
    fn busy_database_is_retryable() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".into()),
        );
        let err: SkuError = busy.into();
        assert!(err.is_retryable());
    }

    #[test]
    fn partial_backfill_reports_committed_count() {
        let err = SkuError::PartialBackfill {
            committed: 3,
            source: Box::new(SkuError::Persistence(anyhow::anyhow!("disk full"))),
        };
        let msg = err.to_string();
        assert!(msg.contains("3 item(s)"));
        assert!(msg.contains("disk full"));
    }

    #[test]
    fn already_assigned_mentions_force() {
        let err = SkuError::AlreadyAssigned {
            id: 7,
            code: "VEG-0002".into(),
        };
        assert!(err.to_string().contains("--force"));
    }

    #[test]
    fn sku_error_implements_std_error() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&SkuError::LockPoisoned);
    }
}
