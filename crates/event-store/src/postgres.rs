use async_trait::async_trait;
use futures_util::StreamExt;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::event::now_millis;
use crate::store::{Appended, EventStore, EventStream, validate_pending};
use crate::{
    AggregateId, EventEnvelope, EventId, EventStoreError, PendingEvent, Position, Result, Version,
};

/// Advisory lock key serializing position allocation between appends, so
/// that commit order and position order agree for subscribers.
const APPEND_LOCK_KEY: i64 = 0x6576_656e_7473;

const SELECT_EVENTS: &str = r#"
    SELECT position, event_id, aggregate_id, aggregate_name, event_type, version,
           schema_version, timestamp, payload, metadata
    FROM events
"#;

/// PostgreSQL-backed event store implementation.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Creates a new PostgreSQL event store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `database_url` with a default pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_event(row: PgRow) -> Result<EventEnvelope> {
        let metadata_json: serde_json::Value = row.try_get("metadata")?;
        let schema_version: i32 = row.try_get("schema_version")?;

        Ok(EventEnvelope {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("event_id")?),
            aggregate_id: AggregateId::new(row.try_get::<String, _>("aggregate_id")?),
            aggregate_name: row.try_get("aggregate_name")?,
            event_type: row.try_get("event_type")?,
            version: Version::new(row.try_get("version")?),
            position: Position::new(row.try_get("position")?),
            timestamp: row.try_get("timestamp")?,
            schema_version: schema_version.max(1) as u32,
            payload: row.try_get("payload")?,
            metadata: serde_json::from_value(metadata_json)?,
        })
    }

    fn rows_to_stream<S>(rows: S) -> EventStream
    where
        S: futures_core::Stream<Item = std::result::Result<PgRow, sqlx::Error>> + Send + 'static,
    {
        Box::pin(rows.map(|result| match result {
            Ok(row) => Self::row_to_event(row),
            Err(e) => Err(EventStoreError::Database(e)),
        }))
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn append(
        &self,
        aggregate_id: &AggregateId,
        expected_version: Version,
        events: Vec<PendingEvent>,
    ) -> Result<Appended> {
        validate_pending(&events)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(APPEND_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        let current_version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM events WHERE aggregate_id = $1")
                .bind(aggregate_id.as_str())
                .fetch_one(&mut *tx)
                .await?;

        let actual = Version::new(current_version.unwrap_or(0));
        if actual != expected_version {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id: aggregate_id.clone(),
                expected: expected_version,
                actual,
            });
        }

        let timestamp = now_millis();
        let mut version = actual;
        let mut appended = Vec::with_capacity(events.len());

        for pending in events {
            version = version.next();
            let metadata_json = serde_json::to_value(&pending.metadata)?;
            let event_id = EventId::new();

            let position: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO events (event_id, aggregate_id, aggregate_name, event_type, version,
                                    schema_version, timestamp, payload, metadata)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING position
                "#,
            )
            .bind(event_id.as_uuid())
            .bind(aggregate_id.as_str())
            .bind(&pending.aggregate_name)
            .bind(&pending.event_type)
            .bind(version.as_i64())
            .bind(pending.schema_version as i32)
            .bind(timestamp)
            .bind(&pending.payload)
            .bind(metadata_json)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                // Check if this is a unique constraint violation (concurrency conflict)
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("unique_aggregate_version")
                {
                    return EventStoreError::ConcurrencyConflict {
                        aggregate_id: aggregate_id.clone(),
                        expected: expected_version,
                        actual: version,
                    };
                }
                EventStoreError::Database(e)
            })?;

            let mut envelope = pending.into_envelope(
                aggregate_id.clone(),
                version,
                Position::new(position),
                timestamp,
            );
            envelope.event_id = event_id;
            appended.push(envelope);
        }

        tx.commit().await?;

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
        let rows = sqlx::query(&format!(
            "{SELECT_EVENTS} WHERE aggregate_id = $1 AND version >= $2 ORDER BY version ASC"
        ))
        .bind(aggregate_id.as_str().to_owned())
        .bind(from_version.as_i64())
        .fetch_all(&self.pool)
        .await?;

        let events: Vec<_> = rows.into_iter().map(Self::row_to_event).collect();
        Ok(Box::pin(futures_util::stream::iter(events)))
    }

    async fn read_all(&self, after: Position, limit: usize) -> Result<Vec<EventEnvelope>> {
        let rows = sqlx::query(&format!(
            "{SELECT_EVENTS} WHERE position > $1 ORDER BY position ASC LIMIT $2"
        ))
        .bind(after.as_i64())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn stream_all(&self, after: Position) -> Result<EventStream> {
        let rows = paged_rows(self.pool.clone(), after.as_i64());
        Ok(Self::rows_to_stream(rows))
    }

    async fn aggregate_version(&self, aggregate_id: &AggregateId) -> Result<Option<Version>> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM events WHERE aggregate_id = $1")
                .bind(aggregate_id.as_str())
                .fetch_one(&self.pool)
                .await?;

        Ok(version.map(Version::new))
    }

    async fn head_position(&self) -> Result<Position> {
        let position: Option<i64> = sqlx::query_scalar("SELECT MAX(position) FROM events")
            .fetch_one(&self.pool)
            .await?;

        Ok(Position::new(position.unwrap_or(0)))
    }
}

/// Pages through the global log in fixed-size chunks. The stream owns its
/// pool handle, so it outlives the store borrow.
fn paged_rows(
    pool: PgPool,
    after: i64,
) -> impl futures_core::Stream<Item = std::result::Result<PgRow, sqlx::Error>> + Send + 'static {
    const PAGE: i64 = 512;

    let paged_sql =
        format!("{SELECT_EVENTS} WHERE position > $1 ORDER BY position ASC LIMIT {PAGE}");

    futures_util::stream::unfold(
        (pool, paged_sql, after, false),
        |(pool, sql, cursor, done)| async move {
            if done {
                return None;
            }
            let result = sqlx::query(&sql).bind(cursor).fetch_all(&pool).await;
            match result {
                Ok(rows) => {
                    let last = rows
                        .last()
                        .and_then(|row| row.try_get::<i64, _>("position").ok())
                        .unwrap_or(cursor);
                    let finished = (rows.len() as i64) < PAGE;
                    let items: Vec<_> = rows.into_iter().map(Ok).collect();
                    Some((
                        futures_util::stream::iter(items),
                        (pool, sql, last, finished),
                    ))
                }
                Err(e) => Some((futures_util::stream::iter(vec![Err(e)]), (pool, sql, cursor, true))),
            }
        },
    )
    .flatten()
}
