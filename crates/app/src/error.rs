//! Application-level error type.

use domain::CommandError;
use event_store::EventStoreError;
use projections::{ProjectionError, QueryError};
use thiserror::Error;

/// Errors surfaced by the application wiring.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Telemetry setup failed: {0}")]
    Telemetry(String),

    #[error(transparent)]
    EventStore(#[from] EventStoreError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("Read model {0} is not maintained by this application")]
    UnknownReadModel(String),
}

/// Result type for application operations.
pub type Result<T> = std::result::Result<T, AppError>;
