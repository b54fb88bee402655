//! Dynamic command dispatch by aggregate name.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{AggregateId, Metadata};
use event_store::{EventEnvelope, EventStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::aggregate::{Aggregate, DomainCommand, decode_command};
use crate::error::{CommandError, Result};
use crate::runtime::AggregateRuntime;

/// A command as submitted by a caller.
///
/// Transient: commands are never persisted. `type` and `payload` decode into
/// the target aggregate's command enum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub aggregate_name: String,
    pub aggregate_id: AggregateId,
    #[serde(rename = "type")]
    pub command_type: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub meta: Metadata,
}

impl Command {
    pub fn new(
        aggregate_name: impl Into<String>,
        aggregate_id: impl Into<AggregateId>,
        command_type: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            aggregate_name: aggregate_name.into(),
            aggregate_id: aggregate_id.into(),
            command_type: command_type.into(),
            payload,
            meta: Metadata::new(),
        }
    }

    /// Adds a metadata entry copied into every produced event.
    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }
}

/// Type-erased command execution for one aggregate type.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    fn aggregate_name(&self) -> &'static str;

    async fn dispatch(&self, command: &Command) -> Result<Vec<EventEnvelope>>;
}

#[async_trait]
impl<S, A> CommandExecutor for AggregateRuntime<S, A>
where
    S: EventStore + Clone + 'static,
    A: Aggregate,
{
    fn aggregate_name(&self) -> &'static str {
        A::NAME
    }

    async fn dispatch(&self, command: &Command) -> Result<Vec<EventEnvelope>> {
        if !A::Command::TYPES.contains(&command.command_type.as_str()) {
            return Err(CommandError::UnknownCommand {
                aggregate_name: command.aggregate_name.clone(),
                command_type: command.command_type.clone(),
            });
        }

        let typed: A::Command = decode_command(&command.command_type, &command.payload)
            .map_err(|e| CommandError::InvalidPayload {
                command_type: command.command_type.clone(),
                reason: e.to_string(),
            })?;

        self.execute(&command.aggregate_id, &typed, &command.meta)
            .await
    }
}

/// Routes commands to the runtime registered for their aggregate name.
///
/// Built once at startup and shared behind an `Arc`.
#[derive(Clone, Default)]
pub struct CommandRegistry {
    executors: HashMap<&'static str, Arc<dyn CommandExecutor>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an executor, replacing any previous one for the same name.
    pub fn register<E: CommandExecutor + 'static>(mut self, executor: E) -> Self {
        self.executors
            .insert(executor.aggregate_name(), Arc::new(executor));
        self
    }

    pub fn aggregate_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.executors.keys().copied()
    }

    /// Executes a command and returns the events it appended.
    #[tracing::instrument(
        skip(self, command),
        fields(
            aggregate = %command.aggregate_name,
            aggregate_id = %command.aggregate_id,
            command_type = %command.command_type
        )
    )]
    pub async fn submit(&self, command: &Command) -> Result<Vec<EventEnvelope>> {
        let executor = self
            .executors
            .get(command.aggregate_name.as_str())
            .ok_or_else(|| CommandError::UnknownAggregate(command.aggregate_name.clone()))?;

        executor.dispatch(command).await
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("aggregates", &self.executors.keys().collect::<Vec<_>>())
            .finish()
    }
}
