//! Projection engine: feeds events to one projection and commits its read
//! model together with the cursor.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use event_store::{DEFAULT_PAGE_SIZE, EventBus, EventEnvelope, EventStore, Position};
use futures_util::StreamExt;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::{ProjectionError, ReadModelStoreError, Result};
use crate::projection::Projection;
use crate::store::{ReadModelStore, TableWriter};

/// What the engine does with an event its projection cannot apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProjectionErrorPolicy {
    /// Stop with the cursor before the failing event.
    #[default]
    Halt,
    /// Log the failure and move the cursor past the event without mutations.
    Skip,
}

#[derive(Debug, Error)]
#[error("unknown projection error policy `{0}`, expected `halt` or `skip`")]
pub struct UnknownPolicy(String);

impl FromStr for ProjectionErrorPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "halt" => Ok(ProjectionErrorPolicy::Halt),
            "skip" => Ok(ProjectionErrorPolicy::Skip),
            _ => Err(UnknownPolicy(s.to_string())),
        }
    }
}

/// Settings shared by all projection engines.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub error_policy: ProjectionErrorPolicy,

    /// First delay after a store outage, doubled on every further attempt.
    pub backoff_base: Duration,

    /// Upper bound for the outage delay.
    pub backoff_max: Duration,

    /// Events read from the event store per page during catch-up.
    pub page_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            error_policy: ProjectionErrorPolicy::Halt,
            backoff_base: Duration::from_millis(50),
            backoff_max: Duration::from_secs(5),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl EngineConfig {
    /// Delay before retry number `attempt` (starting at 1).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff_base.saturating_mul(factor).min(self.backoff_max)
    }
}

/// Lifecycle of a spawned projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectionStatus {
    Running,
    /// Waiting out a store outage.
    Retrying { attempt: u32 },
    /// Stopped at an event it could not apply; `position` is that event.
    Halted { position: Position, reason: String },
    Stopped,
}

/// Maintains exactly one read model.
///
/// Every event at a position after the cursor is handed to the projection;
/// the buffered mutations and the new cursor are committed in one call, so
/// redelivered events are skipped and a failed event never leaves partial
/// writes behind. Application is strictly sequential.
pub struct ProjectionEngine<S> {
    store: S,
    read_models: Arc<dyn ReadModelStore>,
    projection: Arc<dyn Projection>,
    config: EngineConfig,
}

impl<S> ProjectionEngine<S>
where
    S: EventStore + Clone + 'static,
{
    pub fn new(
        store: S,
        read_models: Arc<dyn ReadModelStore>,
        projection: Arc<dyn Projection>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            read_models,
            projection,
            config,
        }
    }

    /// Name of the maintained read model.
    pub fn read_model(&self) -> &'static str {
        self.projection.name()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the cursor, running the projection's `init` first if the read
    /// model has never been committed.
    #[tracing::instrument(skip(self), fields(read_model = self.read_model()))]
    pub async fn ensure_initialized(&self) -> Result<Position> {
        let name = self.read_model();
        if let Some(cursor) = self.read_models.cursor(name).await? {
            return Ok(cursor);
        }

        let mut writer = TableWriter::new();
        self.projection.init(&mut writer).await?;
        match self
            .read_models
            .commit(name, writer.into_ops(), None, Position::start())
            .await
        {
            Ok(()) => {
                tracing::info!("read model initialized");
                Ok(Position::start())
            }
            Err(ReadModelStoreError::CursorConflict {
                actual: Some(cursor), ..
            }) => {
                tracing::debug!(position = %cursor, "read model initialized by another writer");
                Ok(cursor)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Applies one event and returns the resulting cursor.
    ///
    /// Events at or before the stored cursor are skipped.
    pub async fn apply(&self, event: &EventEnvelope) -> Result<Position> {
        let cursor = self.ensure_initialized().await?;
        self.apply_at(cursor, event).await
    }

    /// Processes every stored event after the cursor and returns the final
    /// cursor.
    #[tracing::instrument(skip(self), fields(read_model = self.read_model()))]
    pub async fn catch_up(&self) -> Result<Position> {
        let mut cursor = self.ensure_initialized().await?;
        let mut applied = 0usize;

        loop {
            let page = self.store.read_all(cursor, self.config.page_size).await?;
            if page.is_empty() {
                break;
            }
            for event in &page {
                cursor = self.apply_at(cursor, event).await?;
                applied += 1;
            }
        }

        tracing::info!(position = %cursor, events = applied, "catch-up complete");
        Ok(cursor)
    }

    /// Drops the read model and replays the whole event log into it.
    ///
    /// A spawned engine still maintaining the same read model halts on its
    /// next commit, so stop it first.
    #[tracing::instrument(skip(self), fields(read_model = self.read_model()))]
    pub async fn rebuild(&self) -> Result<Position> {
        self.read_models.drop_read_model(self.read_model()).await?;
        tracing::info!("read model dropped for rebuild");
        self.catch_up().await
    }

    /// Applies `event` on top of `cursor`. When another writer moved the
    /// stored cursor in the meantime, continues from the stored one, so an
    /// event is never applied twice.
    async fn apply_at(&self, mut cursor: Position, event: &EventEnvelope) -> Result<Position> {
        loop {
            if event.position <= cursor {
                tracing::trace!(position = %event.position, cursor = %cursor, "duplicate delivery skipped");
                return Ok(cursor);
            }

            match self.try_apply(cursor, event).await {
                Err(ProjectionError::Store(ReadModelStoreError::CursorConflict {
                    actual: Some(stored),
                    ..
                })) => {
                    tracing::debug!(
                        read_model = self.read_model(),
                        cursor = %cursor,
                        stored = %stored,
                        "cursor moved by another writer"
                    );
                    cursor = stored;
                }
                other => return other,
            }
        }
    }

    async fn try_apply(&self, cursor: Position, event: &EventEnvelope) -> Result<Position> {
        let name = self.read_model();
        let mut writer = TableWriter::new();
        if let Err(err) = self.projection.handle(event, &mut writer).await {
            if err.is_unavailable() {
                return Err(err);
            }
            return self.on_failure(cursor, event, err).await;
        }

        match self
            .read_models
            .commit(name, writer.into_ops(), Some(cursor), event.position)
            .await
        {
            Ok(()) => {
                metrics::counter!("projections_events_processed", "read_model" => name).increment(1);
                Ok(event.position)
            }
            Err(err) if err.is_unavailable() => Err(err.into()),
            Err(
                err @ (ReadModelStoreError::SchemaViolation { .. }
                | ReadModelStoreError::TableNotFound { .. }),
            ) => self.on_failure(cursor, event, err.into()).await,
            Err(err) => Err(err.into()),
        }
    }

    async fn on_failure(
        &self,
        cursor: Position,
        event: &EventEnvelope,
        err: ProjectionError,
    ) -> Result<Position> {
        let name = self.read_model();
        metrics::counter!("projection_errors_total", "read_model" => name).increment(1);

        match self.config.error_policy {
            ProjectionErrorPolicy::Halt => {
                tracing::error!(
                    read_model = name,
                    position = %event.position,
                    event_type = %event.event_type,
                    error = %err,
                    "projection halted"
                );
                Err(ProjectionError::Halted {
                    read_model: name.to_string(),
                    position: event.position,
                    reason: err.to_string(),
                })
            }
            ProjectionErrorPolicy::Skip => {
                tracing::warn!(
                    read_model = name,
                    position = %event.position,
                    event_type = %event.event_type,
                    error = %err,
                    "projection failed, event skipped"
                );
                self.read_models
                    .commit(name, Vec::new(), Some(cursor), event.position)
                    .await?;
                Ok(event.position)
            }
        }
    }

    /// Runs the engine in its own task, following `bus` from the stored
    /// cursor. Dropping the returned handle stops the task.
    pub fn spawn(self, bus: EventBus<S>) -> ProjectionHandle {
        let read_model = self.read_model();
        let (cursor_tx, cursor_rx) = watch::channel(Position::start());
        let (status_tx, status_rx) = watch::channel(ProjectionStatus::Running);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let status = self.run(bus, cursor_tx, &status_tx, shutdown_rx).await;
            tracing::info!(read_model, status = ?status, "projection task finished");
            status_tx.send_replace(status);
        });

        ProjectionHandle {
            read_model,
            cursor: cursor_rx,
            status: status_rx,
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn run(
        self,
        bus: EventBus<S>,
        cursor_tx: watch::Sender<Position>,
        status_tx: &watch::Sender<ProjectionStatus>,
        mut shutdown: watch::Receiver<bool>,
    ) -> ProjectionStatus {
        let mut attempt = 0u32;

        let mut cursor = loop {
            match self.ensure_initialized().await {
                Ok(cursor) => break cursor,
                Err(err) if err.is_unavailable() => {
                    attempt += 1;
                    if !self.wait_out(attempt, &err, status_tx, &mut shutdown).await {
                        return ProjectionStatus::Stopped;
                    }
                }
                Err(err) => {
                    return ProjectionStatus::Halted {
                        position: Position::start(),
                        reason: err.to_string(),
                    };
                }
            }
        };
        cursor_tx.send_replace(cursor);
        status_tx.send_replace(ProjectionStatus::Running);
        tracing::info!(read_model = self.read_model(), position = %cursor, "projection started");

        'subscribe: loop {
            let mut events = bus.subscribe(cursor);

            loop {
                let next = tokio::select! {
                    _ = shutdown.changed() => return ProjectionStatus::Stopped,
                    next = events.next() => next,
                };

                let result = match next {
                    None => return ProjectionStatus::Stopped,
                    Some(Ok(event)) => self.apply_at(cursor, &event).await,
                    Some(Err(err)) => Err(err.into()),
                };

                match result {
                    Ok(position) => {
                        if attempt > 0 {
                            attempt = 0;
                            status_tx.send_replace(ProjectionStatus::Running);
                        }
                        cursor = position;
                        cursor_tx.send_replace(cursor);
                    }
                    Err(err) if err.is_unavailable() => {
                        attempt += 1;
                        if !self.wait_out(attempt, &err, status_tx, &mut shutdown).await {
                            return ProjectionStatus::Stopped;
                        }
                        // the failed event was consumed from the stream
                        continue 'subscribe;
                    }
                    Err(ProjectionError::Halted {
                        position, reason, ..
                    }) => return ProjectionStatus::Halted { position, reason },
                    Err(err) => {
                        tracing::error!(read_model = self.read_model(), error = %err, "projection failed");
                        return ProjectionStatus::Halted {
                            position: cursor.next(),
                            reason: err.to_string(),
                        };
                    }
                }
            }
        }
    }

    /// Sleeps through one backoff step. Returns `false` on shutdown.
    async fn wait_out(
        &self,
        attempt: u32,
        err: &ProjectionError,
        status_tx: &watch::Sender<ProjectionStatus>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        let delay = self.config.backoff(attempt);
        tracing::warn!(
            read_model = self.read_model(),
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "store unavailable, retrying"
        );
        status_tx.send_replace(ProjectionStatus::Retrying { attempt });

        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = shutdown.changed() => false,
        }
    }
}

/// Control over a spawned [`ProjectionEngine`].
#[derive(Debug)]
pub struct ProjectionHandle {
    read_model: &'static str,
    cursor: watch::Receiver<Position>,
    status: watch::Receiver<ProjectionStatus>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ProjectionHandle {
    pub fn read_model(&self) -> &'static str {
        self.read_model
    }

    /// Last committed position.
    pub fn cursor(&self) -> Position {
        *self.cursor.borrow()
    }

    pub fn status(&self) -> ProjectionStatus {
        self.status.borrow().clone()
    }

    /// Waits until the cursor reaches `position`.
    ///
    /// Fails with `Halted` or `Stopped` if the projection can no longer get
    /// there.
    pub async fn wait_for(&self, position: Position) -> Result<Position> {
        let mut cursor = self.cursor.clone();
        let mut status = self.status.clone();

        loop {
            let current = *cursor.borrow_and_update();
            if current >= position {
                return Ok(current);
            }
            let state = status.borrow_and_update().clone();
            if let Some(err) = self.terminal_error(&state) {
                return Err(err);
            }

            let alive = tokio::select! {
                changed = cursor.changed() => changed.is_ok(),
                changed = status.changed() => changed.is_ok(),
            };

            if !alive {
                let current = *cursor.borrow();
                if current >= position {
                    return Ok(current);
                }
                let state = status.borrow().clone();
                return Err(self
                    .terminal_error(&state)
                    .unwrap_or_else(|| ProjectionError::Stopped(self.read_model.to_string())));
            }
        }
    }

    /// Stops the task and waits for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            tracing::error!(read_model = self.read_model, error = %err, "projection task panicked");
        }
    }

    fn terminal_error(&self, status: &ProjectionStatus) -> Option<ProjectionError> {
        match status {
            ProjectionStatus::Halted { position, reason } => Some(ProjectionError::Halted {
                read_model: self.read_model.to_string(),
                position: *position,
                reason: reason.clone(),
            }),
            ProjectionStatus::Stopped => Some(ProjectionError::Stopped(self.read_model.to_string())),
            ProjectionStatus::Running | ProjectionStatus::Retrying { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use event_store::{AggregateId, InMemoryEventStore, PendingEvent, Version};
    use serde_json::json;

    use super::*;
    use crate::memory::InMemoryReadModelStore;
    use crate::store::{FieldType, Filter, Record, Sort, TableSchema, record};

    /// Records every `Tick` as a row; fails on `Poison`.
    struct TickProjection;

    #[async_trait]
    impl Projection for TickProjection {
        fn name(&self) -> &'static str {
            "Ticks"
        }

        async fn init(&self, writer: &mut TableWriter) -> Result<()> {
            writer.define_table(
                "ticks",
                TableSchema::new()
                    .field("position", FieldType::Integer)
                    .field("aggregateId", FieldType::String),
            );
            Ok(())
        }

        async fn handle(&self, event: &EventEnvelope, writer: &mut TableWriter) -> Result<()> {
            match event.event_type.as_str() {
                "Tick" => {
                    writer.insert(
                        "ticks",
                        record([
                            ("position", json!(event.position.as_i64())),
                            ("aggregateId", json!(event.aggregate_id.as_str())),
                        ]),
                    );
                    Ok(())
                }
                "Poison" => {
                    writer.insert("ticks", record([("position", json!(-1))]));
                    Err(ProjectionError::Projection("poisoned payload".into()))
                }
                "Mistyped" => {
                    writer.insert("ticks", record([("position", json!("not a number"))]));
                    Ok(())
                }
                _ => Ok(()),
            }
        }
    }

    struct Fixture {
        store: InMemoryEventStore,
        read_models: InMemoryReadModelStore,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: InMemoryEventStore::new(),
                read_models: InMemoryReadModelStore::new(),
            }
        }

        fn engine(&self, policy: ProjectionErrorPolicy) -> ProjectionEngine<InMemoryEventStore> {
            let config = EngineConfig {
                error_policy: policy,
                backoff_base: Duration::from_millis(5),
                backoff_max: Duration::from_millis(20),
                page_size: 2,
            };
            ProjectionEngine::new(
                self.store.clone(),
                Arc::new(self.read_models.clone()),
                Arc::new(TickProjection),
                config,
            )
        }

        async fn append(&self, id: &str, event_type: &str) -> EventEnvelope {
            let id = AggregateId::new(id);
            let version = self
                .store
                .aggregate_version(&id)
                .await
                .unwrap()
                .unwrap_or(Version::initial());
            self.store
                .append(
                    &id,
                    version,
                    vec![PendingEvent::new("Test", event_type, json!({}))],
                )
                .await
                .unwrap()
                .events
                .remove(0)
        }

        async fn ticks(&self) -> Vec<Record> {
            self.read_models
                .find("Ticks", "ticks", &Filter::all(), &[], &Sort::asc("position"))
                .await
                .unwrap()
        }
    }

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!("halt".parse::<ProjectionErrorPolicy>().unwrap(), ProjectionErrorPolicy::Halt);
        assert_eq!(" Skip ".parse::<ProjectionErrorPolicy>().unwrap(), ProjectionErrorPolicy::Skip);
        assert!("ignore".parse::<ProjectionErrorPolicy>().is_err());
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let config = EngineConfig::default();
        assert_eq!(config.backoff(1), Duration::from_millis(50));
        assert_eq!(config.backoff(2), Duration::from_millis(100));
        assert_eq!(config.backoff(4), Duration::from_millis(400));
        assert_eq!(config.backoff(20), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn init_runs_once() {
        let fixture = Fixture::new();
        let engine = fixture.engine(ProjectionErrorPolicy::Halt);

        assert_eq!(engine.ensure_initialized().await.unwrap(), Position::start());
        // a second define_table would be a schema violation
        assert_eq!(engine.ensure_initialized().await.unwrap(), Position::start());
    }

    #[tokio::test]
    async fn catch_up_pages_through_the_log() {
        let fixture = Fixture::new();
        for i in 0..5 {
            fixture.append(&format!("A{i}"), "Tick").await;
        }
        fixture.append("A0", "Unrelated").await;

        let cursor = fixture.engine(ProjectionErrorPolicy::Halt).catch_up().await.unwrap();

        assert_eq!(cursor, Position::new(6));
        assert_eq!(fixture.ticks().await.len(), 5);
        assert_eq!(fixture.read_models.cursor("Ticks").await.unwrap(), Some(Position::new(6)));
    }

    #[tokio::test]
    async fn redelivered_events_are_skipped() {
        let fixture = Fixture::new();
        let event = fixture.append("A1", "Tick").await;
        let engine = fixture.engine(ProjectionErrorPolicy::Halt);

        assert_eq!(engine.apply(&event).await.unwrap(), Position::new(1));
        assert_eq!(engine.apply(&event).await.unwrap(), Position::new(1));
        assert_eq!(fixture.ticks().await.len(), 1);
    }

    #[tokio::test]
    async fn stale_cursor_defers_to_the_stored_one() {
        let fixture = Fixture::new();
        let mut events = Vec::new();
        for id in ["A", "B", "C"] {
            events.push(fixture.append(id, "Tick").await);
        }
        let ahead = fixture.engine(ProjectionErrorPolicy::Halt);
        assert_eq!(ahead.catch_up().await.unwrap(), events[2].position);

        // a second writer that never saw the commits above
        let behind = fixture.engine(ProjectionErrorPolicy::Halt);
        let cursor = behind.apply_at(Position::start(), &events[0]).await.unwrap();

        assert_eq!(cursor, events[2].position);
        assert_eq!(fixture.ticks().await.len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_catch_ups_apply_each_event_once() {
        let fixture = Fixture::new();
        let mut last = Position::start();
        for i in 0..300 {
            last = fixture.append(&format!("A{i}"), "Tick").await.position;
        }

        let first = fixture.engine(ProjectionErrorPolicy::Halt);
        let second = fixture.engine(ProjectionErrorPolicy::Halt);
        let (a, b) = tokio::join!(
            tokio::spawn(async move { first.catch_up().await }),
            tokio::spawn(async move { second.catch_up().await }),
        );
        assert_eq!(a.unwrap().unwrap(), last);
        assert_eq!(b.unwrap().unwrap(), last);

        let ticks = fixture.ticks().await;
        assert_eq!(ticks.len(), 300);
        let mut positions: Vec<_> = ticks.iter().map(|row| row["position"].as_i64()).collect();
        positions.dedup();
        assert_eq!(positions.len(), 300);
        assert_eq!(fixture.read_models.cursor("Ticks").await.unwrap(), Some(last));
    }

    #[tokio::test]
    async fn rebuild_reproduces_the_same_state() {
        let fixture = Fixture::new();
        for _ in 0..3 {
            fixture.append("A1", "Tick").await;
        }
        let engine = fixture.engine(ProjectionErrorPolicy::Halt);
        engine.catch_up().await.unwrap();
        let before = fixture.ticks().await;

        assert_eq!(engine.rebuild().await.unwrap(), Position::new(3));
        assert_eq!(fixture.ticks().await, before);
    }

    #[tokio::test]
    async fn halt_keeps_cursor_before_failing_event() {
        let fixture = Fixture::new();
        fixture.append("A1", "Tick").await;
        fixture.append("A1", "Poison").await;
        fixture.append("A1", "Tick").await;

        let err = fixture.engine(ProjectionErrorPolicy::Halt).catch_up().await.unwrap_err();

        assert!(matches!(err, ProjectionError::Halted { position, .. } if position == Position::new(2)));
        assert_eq!(fixture.read_models.cursor("Ticks").await.unwrap(), Some(Position::new(1)));
        assert_eq!(fixture.ticks().await.len(), 1);
    }

    #[tokio::test]
    async fn skip_advances_without_partial_writes() {
        let fixture = Fixture::new();
        fixture.append("A1", "Tick").await;
        fixture.append("A1", "Poison").await;
        fixture.append("A1", "Mistyped").await;
        fixture.append("A1", "Tick").await;

        let cursor = fixture.engine(ProjectionErrorPolicy::Skip).catch_up().await.unwrap();

        assert_eq!(cursor, Position::new(4));
        let positions: Vec<_> = fixture.ticks().await.iter().map(|r| r["position"].clone()).collect();
        assert_eq!(positions, vec![json!(1), json!(4)]);
    }

    #[tokio::test]
    async fn spawned_engine_follows_the_bus() {
        let fixture = Fixture::new();
        let bus = EventBus::new(fixture.store.clone());
        fixture.append("A1", "Tick").await;

        let handle = fixture.engine(ProjectionErrorPolicy::Halt).spawn(bus.clone());
        handle.wait_for(Position::new(1)).await.unwrap();

        let event = fixture.append("A2", "Tick").await;
        bus.publish(std::slice::from_ref(&event));
        assert_eq!(handle.wait_for(event.position).await.unwrap(), Position::new(2));
        assert_eq!(handle.status(), ProjectionStatus::Running);

        handle.shutdown().await;
        assert_eq!(fixture.ticks().await.len(), 2);
    }

    #[tokio::test]
    async fn spawned_engine_waits_out_read_model_outage() {
        let fixture = Fixture::new();
        let bus = EventBus::new(fixture.store.clone());
        let handle = fixture.engine(ProjectionErrorPolicy::Halt).spawn(bus.clone());
        handle.wait_for(Position::start()).await.unwrap();

        fixture.read_models.set_available(false);
        let event = fixture.append("A1", "Tick").await;
        bus.publish(std::slice::from_ref(&event));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(matches!(handle.status(), ProjectionStatus::Retrying { .. }));
        assert_eq!(handle.cursor(), Position::start());

        fixture.read_models.set_available(true);
        handle.wait_for(event.position).await.unwrap();
        assert_eq!(fixture.ticks().await.len(), 1);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn wait_for_reports_halt() {
        let fixture = Fixture::new();
        let bus = EventBus::new(fixture.store.clone());
        fixture.append("A1", "Poison").await;

        let handle = fixture.engine(ProjectionErrorPolicy::Halt).spawn(bus);
        let err = handle.wait_for(Position::new(1)).await.unwrap_err();

        assert!(matches!(err, ProjectionError::Halted { .. }));
        assert!(matches!(handle.status(), ProjectionStatus::Halted { .. }));
    }
}
