use thiserror::Error;

use crate::{AggregateId, Version};

/// Errors that can occur when interacting with the event store.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// A concurrency conflict occurred when appending events.
    /// The expected version did not match the actual version.
    #[error(
        "Concurrency conflict for aggregate {aggregate_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        aggregate_id: AggregateId,
        expected: Version,
        actual: Version,
    },

    /// The batch handed to `append` was rejected before touching storage.
    #[error("Invalid append: {0}")]
    InvalidAppend(String),

    /// The backing storage cannot be reached.
    #[error("Event store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EventStoreError {
    /// Returns true for a version mismatch on append.
    pub fn is_conflict(&self) -> bool {
        matches!(self, EventStoreError::ConcurrencyConflict { .. })
    }

    /// Returns true for I/O-level failures that are worth retrying later.
    pub fn is_unavailable(&self) -> bool {
        match self {
            EventStoreError::Unavailable(_) => true,
            EventStoreError::Database(err) => matches!(
                err,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
                    | sqlx::Error::Tls(_)
            ),
            _ => false,
        }
    }
}

/// Result type for event store operations.
pub type Result<T> = std::result::Result<T, EventStoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_conflicts_and_outages() {
        let conflict = EventStoreError::ConcurrencyConflict {
            aggregate_id: AggregateId::new("A1"),
            expected: Version::initial(),
            actual: Version::first(),
        };
        assert!(conflict.is_conflict());
        assert!(!conflict.is_unavailable());

        let outage = EventStoreError::Unavailable("connection refused".into());
        assert!(outage.is_unavailable());
        assert!(!outage.is_conflict());

        assert!(EventStoreError::Database(sqlx::Error::PoolTimedOut).is_unavailable());
        assert!(!EventStoreError::InvalidAppend("empty".into()).is_unavailable());
    }

    #[test]
    fn conflict_message_names_versions() {
        let err = EventStoreError::ConcurrencyConflict {
            aggregate_id: AggregateId::new("A1"),
            expected: Version::new(1),
            actual: Version::new(3),
        };
        assert_eq!(
            err.to_string(),
            "Concurrency conflict for aggregate A1: expected version 1, found 3"
        );
    }
}
