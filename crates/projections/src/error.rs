//! Projection, read model and query error types.

use std::time::Duration;

use event_store::{EventStoreError, Position};
use thiserror::Error;

/// Errors raised by a read model store backend.
#[derive(Debug, Error)]
pub enum ReadModelStoreError {
    /// The read model has never been initialized.
    #[error("Read model not found: {0}")]
    ReadModelNotFound(String),

    #[error("Table {table} not found in read model {read_model}")]
    TableNotFound { read_model: String, table: String },

    /// A definition, record or patch does not match the table schema.
    #[error("Schema violation in {table}: {reason}")]
    SchemaViolation { table: String, reason: String },

    /// The stored cursor is not the one the writer read. Another writer
    /// committed in between, or the read model was dropped.
    #[error("Cursor of {read_model} is {actual:?}, expected {expected:?}")]
    CursorConflict {
        read_model: String,
        expected: Option<Position>,
        actual: Option<Position>,
    },

    /// A commit would move the cursor backwards or leave it in place.
    #[error("Cursor of {read_model} cannot move from {current} to {proposed}")]
    CursorRegression {
        read_model: String,
        current: Position,
        proposed: Position,
    },

    /// The backing storage cannot be reached.
    #[error("Read model store unavailable: {0}")]
    Unavailable(String),
}

impl ReadModelStoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ReadModelStoreError::Unavailable(_))
    }
}

/// Errors that can occur during projection processing.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// An error occurred in the read model store.
    #[error("Read model store error: {0}")]
    Store(#[from] ReadModelStoreError),

    /// Failed to deserialize an event payload.
    #[error("Event deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// A projection-specific error.
    #[error("Projection error: {0}")]
    Projection(String),

    /// The engine stopped at an event it could not apply.
    #[error("Projection {read_model} halted before position {position}: {reason}")]
    Halted {
        read_model: String,
        position: Position,
        reason: String,
    },

    /// The engine task has exited.
    #[error("Projection {0} is not running")]
    Stopped(String),
}

impl ProjectionError {
    /// Outages that the engine waits out instead of failing the event.
    pub fn is_unavailable(&self) -> bool {
        match self {
            ProjectionError::EventStore(err) => err.is_unavailable(),
            ProjectionError::Store(err) => err.is_unavailable(),
            _ => false,
        }
    }
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;

/// Errors a resolver may return while reading.
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error(transparent)]
    Store(#[from] ReadModelStoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors that can occur while executing a query.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Read model not found: {0}")]
    ReadModelNotFound(String),

    #[error("Resolver {resolver} not found for read model {read_model}")]
    ResolverNotFound { read_model: String, resolver: String },

    #[error("Resolver {resolver} of {read_model} failed: {reason}")]
    ResolverExecution {
        read_model: String,
        resolver: String,
        reason: String,
    },

    #[error("View model not found: {0}")]
    ViewModelNotFound(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Query timed out after {0:?}")]
    Timeout(Duration),
}

impl QueryError {
    /// Stable reason code for callers.
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::ReadModelNotFound(_) => "read_model_not_found",
            QueryError::ResolverNotFound { .. } => "resolver_not_found",
            QueryError::ResolverExecution { .. } => "resolver_execution",
            QueryError::ViewModelNotFound(_) => "view_model_not_found",
            QueryError::StoreUnavailable(_) => "store_unavailable",
            QueryError::Timeout(_) => "timeout",
        }
    }

    /// Maps a failed fold of `view_model` to the query taxonomy.
    pub fn from_view_model(view_model: &str, err: ViewModelError) -> Self {
        match err {
            ViewModelError::NotFound(name) => QueryError::ViewModelNotFound(name),
            ViewModelError::EventStore(err) if err.is_unavailable() => {
                QueryError::StoreUnavailable(err.to_string())
            }
            other => QueryError::ResolverExecution {
                read_model: view_model.to_string(),
                resolver: String::new(),
                reason: other.to_string(),
            },
        }
    }
}

/// Errors raised while folding or following a view model.
#[derive(Debug, Error)]
pub enum ViewModelError {
    #[error("View model not found: {0}")]
    NotFound(String),

    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
