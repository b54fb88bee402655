use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;
use futures_util::TryStreamExt;

use crate::{AggregateId, EventEnvelope, EventStoreError, PendingEvent, Position, Result, Version};

/// A lazy, finite stream of stored events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventEnvelope>> + Send>>;

/// Outcome of a successful append.
#[derive(Debug, Clone)]
pub struct Appended {
    /// Version of the aggregate after the append.
    pub version: Version,

    /// The stored events with their assigned versions, positions and timestamps.
    pub events: Vec<EventEnvelope>,
}

/// Core trait for event store implementations.
///
/// An event store is an append-only log partitioned by aggregate. It is the
/// sole arbiter of versions and global positions.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends events to an aggregate's log.
    ///
    /// Events are appended atomically - either all succeed or none do. The
    /// events receive versions `expected_version + 1 ..` in order. Fails with
    /// `ConcurrencyConflict` if the aggregate's current version is not
    /// `expected_version`.
    async fn append(
        &self,
        aggregate_id: &AggregateId,
        expected_version: Version,
        events: Vec<PendingEvent>,
    ) -> Result<Appended>;

    /// Streams an aggregate's events with `version >= from_version`, oldest first.
    ///
    /// The stream is restartable: calling this again starts a fresh traversal.
    async fn load_events(
        &self,
        aggregate_id: &AggregateId,
        from_version: Version,
    ) -> Result<EventStream>;

    /// Reads up to `limit` events with position greater than `after`, in commit order.
    async fn read_all(&self, after: Position, limit: usize) -> Result<Vec<EventEnvelope>>;

    /// Streams every event with position greater than `after`, in commit order.
    async fn stream_all(&self, after: Position) -> Result<EventStream>;

    /// Gets the current version of an aggregate.
    ///
    /// Returns None if the aggregate doesn't exist.
    async fn aggregate_version(&self, aggregate_id: &AggregateId) -> Result<Option<Version>>;

    /// Position of the most recently appended event.
    async fn head_position(&self) -> Result<Position>;
}

/// Extension trait providing convenience methods for event stores.
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Collects an aggregate's full history.
    async fn load_all_events(&self, aggregate_id: &AggregateId) -> Result<Vec<EventEnvelope>> {
        self.load_events(aggregate_id, Version::initial())
            .await?
            .try_collect()
            .await
    }

    /// Checks if an aggregate exists (has any events).
    async fn aggregate_exists(&self, aggregate_id: &AggregateId) -> Result<bool> {
        Ok(self.aggregate_version(aggregate_id).await?.is_some())
    }
}

// Blanket implementation for all EventStore implementations
impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Validates a batch before appending.
pub fn validate_pending(events: &[PendingEvent]) -> Result<()> {
    let Some(first) = events.first() else {
        return Err(EventStoreError::InvalidAppend(
            "cannot append an empty event list".to_string(),
        ));
    };

    for event in events {
        if event.event_type.is_empty() {
            return Err(EventStoreError::InvalidAppend(
                "event type must not be empty".to_string(),
            ));
        }
        if event.aggregate_name != first.aggregate_name {
            return Err(EventStoreError::InvalidAppend(
                "all events must have the same aggregate name".to_string(),
            ));
        }
    }

    Ok(())
}
