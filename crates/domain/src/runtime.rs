//! Command execution against event-sourced aggregates.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use common::{AggregateId, Metadata};
use event_store::{EventBus, EventEnvelope, EventStore, PendingEvent, Version};
use futures_util::StreamExt;

use crate::aggregate::{Aggregate, DomainCommand, DomainEvent, EventContext, decode_event, encode_event};
use crate::error::{CommandError, Result};
use crate::upcast::Upcasters;

/// Metadata key carrying the command that produced an event.
pub const COMMAND_TYPE_KEY: &str = "commandType";

/// Retry and timeout settings for command execution.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// Attempts per command before giving up with `Contention`.
    pub max_attempts: u32,

    /// Base delay between attempts, multiplied by the attempt number.
    pub retry_backoff: Duration,

    /// How long a caller waits for a command before `Timeout`.
    pub command_timeout: Option<Duration>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_backoff: Duration::from_millis(5),
            command_timeout: None,
        }
    }
}

impl RuntimeConfig {
    /// Delay before retry `attempt` (1-based). Saturates instead of
    /// overflowing.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        self.retry_backoff.saturating_mul(attempt)
    }
}

/// Executes commands for one aggregate type.
///
/// For every command the runtime:
/// 1. Rebuilds the aggregate state by folding its upcast history
/// 2. Asks the aggregate to decide which events the command produces
/// 3. Appends them at the version it loaded, retrying the whole cycle on
///    a concurrency conflict
/// 4. Publishes the stored events on the bus
///
/// No state survives between invocations.
pub struct AggregateRuntime<S, A> {
    bus: EventBus<S>,
    config: RuntimeConfig,
    upcasters: Arc<Upcasters>,
    _aggregate: PhantomData<A>,
}

impl<S: Clone, A> Clone for AggregateRuntime<S, A> {
    fn clone(&self) -> Self {
        Self {
            bus: self.bus.clone(),
            config: self.config.clone(),
            upcasters: Arc::clone(&self.upcasters),
            _aggregate: PhantomData,
        }
    }
}

impl<S, A> AggregateRuntime<S, A>
where
    S: EventStore + Clone + 'static,
    A: Aggregate,
{
    pub fn new(bus: EventBus<S>, config: RuntimeConfig) -> Self {
        Self {
            bus,
            config,
            upcasters: Arc::new(A::upcasters()),
            _aggregate: PhantomData,
        }
    }

    /// Returns a reference to the bus events are published on.
    pub fn bus(&self) -> &EventBus<S> {
        &self.bus
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Folds an aggregate's history into its current state and version.
    ///
    /// A missing aggregate yields the default state at version 0.
    #[tracing::instrument(skip(self), fields(aggregate = A::NAME))]
    pub async fn load_state(&self, aggregate_id: &AggregateId) -> Result<(A, Version)> {
        let mut history = self
            .bus
            .store()
            .load_events(aggregate_id, Version::initial())
            .await?;

        let mut state = A::default();
        let mut version = Version::initial();

        while let Some(envelope) = history.next().await {
            let envelope = self.upcasters.upcast(envelope?);
            let event: A::Event = decode_event(&envelope.event_type, &envelope.payload)
                .map_err(|source| CommandError::CorruptEvent {
                    aggregate_id: aggregate_id.clone(),
                    event_type: envelope.event_type.clone(),
                    version: envelope.version,
                    source,
                })?;

            state.apply(event, &EventContext::from(&envelope));
            version = envelope.version;
        }

        Ok((state, version))
    }

    /// Executes a command and returns the events it appended.
    ///
    /// `meta` is copied into every produced event's metadata. A command that
    /// produces no events appends nothing and returns an empty list.
    #[tracing::instrument(
        skip(self, command, meta),
        fields(aggregate = A::NAME, command_type = command.command_type())
    )]
    pub async fn execute(
        &self,
        aggregate_id: &AggregateId,
        command: &A::Command,
        meta: &Metadata,
    ) -> Result<Vec<EventEnvelope>> {
        let result = match self.config.command_timeout {
            Some(timeout) => {
                match tokio::time::timeout(timeout, self.execute_with_retry(aggregate_id, command, meta))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(CommandError::Timeout {
                        aggregate_id: aggregate_id.clone(),
                        timeout,
                    }),
                }
            }
            None => self.execute_with_retry(aggregate_id, command, meta).await,
        };

        match &result {
            Ok(events) => {
                metrics::counter!("commands_executed_total", "aggregate" => A::NAME).increment(1);
                tracing::debug!(events = events.len(), "command executed");
            }
            Err(err) => {
                metrics::counter!("commands_rejected_total", "aggregate" => A::NAME, "code" => err.code())
                    .increment(1);
                if err.is_rule_violation() {
                    tracing::debug!(code = err.code(), "command rejected");
                } else {
                    tracing::warn!(error = %err, "command failed");
                }
            }
        }

        result
    }

    async fn execute_with_retry(
        &self,
        aggregate_id: &AggregateId,
        command: &A::Command,
        meta: &Metadata,
    ) -> Result<Vec<EventEnvelope>> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.execute_once(aggregate_id, command, meta).await {
                Err(CommandError::EventStore(err)) if err.is_conflict() => {
                    metrics::counter!("command_conflicts_total", "aggregate" => A::NAME).increment(1);

                    if attempt >= max_attempts {
                        return Err(CommandError::Contention {
                            aggregate_id: aggregate_id.clone(),
                            attempts: attempt,
                        });
                    }

                    tracing::debug!(attempt, error = %err, "concurrency conflict, retrying");
                    tokio::time::sleep(self.config.retry_delay(attempt)).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn execute_once(
        &self,
        aggregate_id: &AggregateId,
        command: &A::Command,
        meta: &Metadata,
    ) -> Result<Vec<EventEnvelope>> {
        let (state, version) = self.load_state(aggregate_id).await?;

        let events = state.handle(command).map_err(CommandError::rejected)?;
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let pending = events
            .iter()
            .map(|event| {
                Ok(PendingEvent::new(A::NAME, event.event_type(), encode_event(event)?)
                    .with_schema_version(event.schema_version())
                    .with_metadata_map(meta)
                    .with_metadata(COMMAND_TYPE_KEY, command.command_type().into()))
            })
            .collect::<Result<Vec<_>>>()?;

        let appended = self.bus.store().append(aggregate_id, version, pending).await?;
        self.bus.publish(&appended.events);

        Ok(appended.events)
    }
}
