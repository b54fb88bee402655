use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures_util::stream;
use tokio::sync::RwLock;

use crate::event::now_millis;
use crate::store::{Appended, EventStore, EventStream, validate_pending};
use crate::{AggregateId, EventEnvelope, EventStoreError, PendingEvent, Position, Result, Version};

#[derive(Default)]
struct Log {
    /// All events in commit order; position `p` lives at index `p - 1`.
    events: Vec<EventEnvelope>,
    /// Indexes into `events` per aggregate, in version order.
    streams: HashMap<AggregateId, Vec<usize>>,
}

impl Log {
    fn current_version(&self, aggregate_id: &AggregateId) -> Version {
        self.streams
            .get(aggregate_id)
            .and_then(|indexes| indexes.last())
            .map(|&index| self.events[index].version)
            .unwrap_or(Version::initial())
    }
}

/// In-memory event store implementation.
///
/// Provides the same guarantees as the PostgreSQL implementation: atomic
/// batches, per-aggregate optimistic concurrency and a global commit order.
/// Can be switched unavailable to exercise outage handling.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    log: Arc<RwLock<Log>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory event store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.log.read().await.events.len()
    }

    /// Simulates an outage: while unavailable every operation fails with
    /// `EventStoreError::Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(EventStoreError::Unavailable(
                "in-memory event store is offline".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(
        &self,
        aggregate_id: &AggregateId,
        expected_version: Version,
        events: Vec<PendingEvent>,
    ) -> Result<Appended> {
        self.ensure_available()?;
        validate_pending(&events)?;

        let mut log = self.log.write().await;

        let current_version = log.current_version(aggregate_id);
        if current_version != expected_version {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id: aggregate_id.clone(),
                expected: expected_version,
                actual: current_version,
            });
        }

        let timestamp = now_millis();
        let mut version = current_version;
        let mut appended = Vec::with_capacity(events.len());

        for pending in events {
            version = version.next();
            let index = log.events.len();
            let position = Position::new(index as i64 + 1);
            let envelope = pending.into_envelope(aggregate_id.clone(), version, position, timestamp);

            log.events.push(envelope.clone());
            log.streams
                .entry(aggregate_id.clone())
                .or_default()
                .push(index);
            appended.push(envelope);
        }

        metrics::counter!("events_appended_total").increment(appended.len() as u64);

        Ok(Appended {
            version,
            events: appended,
        })
    }

    async fn load_events(
        &self,
        aggregate_id: &AggregateId,
        from_version: Version,
    ) -> Result<EventStream> {
        self.ensure_available()?;

        let log = self.log.read().await;
        let events: Vec<_> = log
            .streams
            .get(aggregate_id)
            .map(|indexes| {
                indexes
                    .iter()
                    .map(|&index| &log.events[index])
                    .filter(|e| e.version >= from_version)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
    }

    async fn read_all(&self, after: Position, limit: usize) -> Result<Vec<EventEnvelope>> {
        self.ensure_available()?;

        let log = self.log.read().await;
        let start = after.as_i64().max(0) as usize;
        Ok(log.events.iter().skip(start).take(limit).cloned().collect())
    }

    async fn stream_all(&self, after: Position) -> Result<EventStream> {
        self.ensure_available()?;

        let log = self.log.read().await;
        let start = after.as_i64().max(0) as usize;
        let events: Vec<_> = log.events.iter().skip(start).cloned().collect();

        Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
    }

    async fn aggregate_version(&self, aggregate_id: &AggregateId) -> Result<Option<Version>> {
        self.ensure_available()?;

        let log = self.log.read().await;
        Ok(log
            .streams
            .contains_key(aggregate_id)
            .then(|| log.current_version(aggregate_id)))
    }

    async fn head_position(&self) -> Result<Position> {
        self.ensure_available()?;
        Ok(Position::new(self.log.read().await.events.len() as i64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventStoreExt;
    use futures_util::StreamExt;

    fn pending(event_type: &str) -> PendingEvent {
        PendingEvent::new("TestAggregate", event_type, serde_json::json!({"test": true}))
    }

    #[tokio::test]
    async fn append_single_event() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new("A1");

        let result = store
            .append(&aggregate_id, Version::initial(), vec![pending("TestEvent")])
            .await
            .unwrap();
        assert_eq!(result.version, Version::first());
        assert_eq!(result.events[0].position, Position::new(1));

        let events = store.load_all_events(&aggregate_id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].aggregate_name, "TestAggregate");
    }

    #[tokio::test]
    async fn append_multiple_events_assigns_consecutive_versions() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new("A1");

        let result = store
            .append(
                &aggregate_id,
                Version::initial(),
                vec![pending("Event1"), pending("Event2"), pending("Event3")],
            )
            .await
            .unwrap();
        assert_eq!(result.version, Version::new(3));

        let versions: Vec<_> = result.events.iter().map(|e| e.version.as_i64()).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        let timestamps: Vec<_> = result.events.iter().map(|e| e.timestamp).collect();
        assert!(timestamps.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn concurrency_conflict_on_wrong_version() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new("A1");

        store
            .append(&aggregate_id, Version::initial(), vec![pending("Event1")])
            .await
            .unwrap();

        let result = store
            .append(&aggregate_id, Version::initial(), vec![pending("Event2")])
            .await;

        assert!(matches!(
            result,
            Err(EventStoreError::ConcurrencyConflict { expected, actual, .. })
                if expected == Version::initial() && actual == Version::first()
        ));
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn invalid_batch_stores_nothing() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new("A1");

        let mixed = vec![
            pending("Event1"),
            PendingEvent::new("Other", "Event2", serde_json::json!({})),
        ];
        let result = store.append(&aggregate_id, Version::initial(), mixed).await;

        assert!(matches!(result, Err(EventStoreError::InvalidAppend(_))));
        assert_eq!(store.event_count().await, 0);
        assert_eq!(store.aggregate_version(&aggregate_id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn load_events_from_version() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new("A1");

        store
            .append(
                &aggregate_id,
                Version::initial(),
                vec![pending("Event1"), pending("Event2"), pending("Event3")],
            )
            .await
            .unwrap();

        let from_v2: Vec<_> = store
            .load_events(&aggregate_id, Version::new(2))
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(from_v2.len(), 2);
        assert_eq!(from_v2[0].as_ref().unwrap().version, Version::new(2));
        assert_eq!(from_v2[1].as_ref().unwrap().version, Version::new(3));
    }

    #[tokio::test]
    async fn stream_all_follows_commit_order_across_aggregates() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new("A");
        let b = AggregateId::new("B");

        store
            .append(&a, Version::initial(), vec![pending("A1")])
            .await
            .unwrap();
        store
            .append(&b, Version::initial(), vec![pending("B1")])
            .await
            .unwrap();
        store
            .append(&a, Version::first(), vec![pending("A2")])
            .await
            .unwrap();

        let all: Vec<_> = store
            .stream_all(Position::start())
            .await
            .unwrap()
            .map(|e| e.unwrap().event_type)
            .collect()
            .await;
        assert_eq!(all, vec!["A1", "B1", "A2"]);

        let tail = store.read_all(Position::new(1), 10).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].event_type, "B1");

        let page = store.read_all(Position::start(), 1).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(store.head_position().await.unwrap(), Position::new(3));
    }

    #[tokio::test]
    async fn aggregate_version_tracks_latest() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new("A1");

        assert!(store.aggregate_version(&aggregate_id).await.unwrap().is_none());

        store
            .append(
                &aggregate_id,
                Version::initial(),
                vec![pending("Event1"), pending("Event2")],
            )
            .await
            .unwrap();

        let version = store.aggregate_version(&aggregate_id).await.unwrap();
        assert_eq!(version, Some(Version::new(2)));
    }

    #[tokio::test]
    async fn unavailable_store_rejects_operations() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new("A1");
        store.set_available(false);

        let err = store
            .append(&aggregate_id, Version::initial(), vec![pending("Event1")])
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
        assert!(store.load_events(&aggregate_id, Version::initial()).await.is_err());

        store.set_available(true);
        assert!(
            store
                .append(&aggregate_id, Version::initial(), vec![pending("Event1")])
                .await
                .is_ok()
        );
    }
}
