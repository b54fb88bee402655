//! Command error types.

use std::time::Duration;

use common::AggregateId;
use event_store::{EventStoreError, Version};
use thiserror::Error;

use crate::aggregate::RuleViolation;

/// Errors that can occur while executing a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// No runtime is registered under the command's aggregate name.
    #[error("Unknown aggregate: {0}")]
    UnknownAggregate(String),

    /// The aggregate does not accept the command type.
    #[error("Unknown command {command_type} for aggregate {aggregate_name}")]
    UnknownCommand {
        aggregate_name: String,
        command_type: String,
    },

    /// The payload does not match the command's shape.
    #[error("Invalid payload for {command_type}: {reason}")]
    InvalidPayload {
        command_type: String,
        reason: String,
    },

    /// The aggregate rejected the command. Never retried.
    #[error("{reason}")]
    DomainRuleViolation { code: &'static str, reason: String },

    /// Every attempt lost the optimistic concurrency race.
    #[error("Aggregate {aggregate_id} is contended: gave up after {attempts} attempts")]
    Contention {
        aggregate_id: AggregateId,
        attempts: u32,
    },

    /// The caller stopped waiting. Nothing was appended.
    #[error("Command on {aggregate_id} timed out after {timeout:?}")]
    Timeout {
        aggregate_id: AggregateId,
        timeout: Duration,
    },

    /// A stored event no longer decodes into the aggregate's event type.
    #[error("Stored event {event_type} (version {version}) of {aggregate_id} cannot be decoded: {source}")]
    CorruptEvent {
        aggregate_id: AggregateId,
        event_type: String,
        version: Version,
        #[source]
        source: serde_json::Error,
    },

    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CommandError {
    pub(crate) fn rejected<E: RuleViolation>(err: E) -> Self {
        CommandError::DomainRuleViolation {
            code: err.code(),
            reason: err.to_string(),
        }
    }

    /// Stable reason code for callers.
    pub fn code(&self) -> &'static str {
        match self {
            CommandError::UnknownAggregate(_) => "unknown_aggregate",
            CommandError::UnknownCommand { .. } => "unknown_command",
            CommandError::InvalidPayload { .. } => "invalid_payload",
            CommandError::DomainRuleViolation { code, .. } => *code,
            CommandError::Contention { .. } => "contention",
            CommandError::Timeout { .. } => "timeout",
            CommandError::EventStore(err) if err.is_unavailable() => "store_unavailable",
            CommandError::CorruptEvent { .. }
            | CommandError::EventStore(_)
            | CommandError::Serialization(_) => "internal",
        }
    }

    /// Whether resubmitting the same command later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            CommandError::Contention { .. } | CommandError::Timeout { .. } => true,
            CommandError::EventStore(err) => err.is_unavailable(),
            _ => false,
        }
    }

    pub fn is_rule_violation(&self) -> bool {
        matches!(self, CommandError::DomainRuleViolation { .. })
    }
}

/// Result type for command execution.
pub type Result<T> = std::result::Result<T, CommandError>;
