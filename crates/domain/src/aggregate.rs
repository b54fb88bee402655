//! Core aggregate, command and domain event traits.

use chrono::{DateTime, Utc};
use common::AggregateId;
use event_store::{EventEnvelope, Version};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::upcast::Upcasters;

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense.
///
/// Implementations are closed enums serialized with
/// `#[serde(tag = "type", content = "payload")]`: the tag becomes the stored
/// event type and the content becomes the stored payload.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Every event type name this set contains.
    const TYPES: &'static [&'static str];

    /// Returns the event type name.
    fn event_type(&self) -> &'static str;

    /// Payload schema version written with new events of this type.
    fn schema_version(&self) -> u32 {
        1
    }
}

/// Trait for the closed set of commands one aggregate accepts.
///
/// Serialized the same way as [`DomainEvent`], so a dynamic
/// `{type, payload}` pair decodes into a variant.
pub trait DomainCommand: DeserializeOwned + Send + Sync {
    /// Every command type name this set accepts.
    const TYPES: &'static [&'static str];

    fn command_type(&self) -> &'static str;
}

/// A business rule rejection with a stable, machine-readable code.
///
/// The `Display` output is the human-readable reason and must not leak
/// system detail.
pub trait RuleViolation: std::error::Error + Send + Sync + 'static {
    fn code(&self) -> &'static str;
}

/// Store-assigned facts about the event being applied.
#[derive(Debug, Clone, PartialEq)]
pub struct EventContext {
    pub aggregate_id: AggregateId,
    pub version: Version,
    pub timestamp: DateTime<Utc>,
}

impl From<&EventEnvelope> for EventContext {
    fn from(envelope: &EventEnvelope) -> Self {
        Self {
            aggregate_id: envelope.aggregate_id.clone(),
            version: envelope.version,
            timestamp: envelope.timestamp,
        }
    }
}

/// Trait for aggregates in an event-sourced system.
///
/// The implementing type is the aggregate state. It is rebuilt for every
/// command by folding the aggregate's history through [`apply`](Self::apply)
/// starting from `Default`, and is never persisted or cached.
///
/// - [`handle`](Self::handle) is a pure decision function: no I/O, no side
///   effects. It validates a command against the current state and returns
///   zero or more events.
/// - [`apply`](Self::apply) must be pure, deterministic and infallible
///   (events represent facts that have happened).
pub trait Aggregate: Default + Send + Sync + Sized + 'static {
    /// The aggregate name commands are routed by (e.g. "ShoppingList").
    const NAME: &'static str;

    type Command: DomainCommand;

    type Event: DomainEvent;

    type Error: RuleViolation;

    /// Decides which events a command produces.
    ///
    /// Returns `Ok(vec![])` if the command is a no-op.
    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    /// Applies an event to the aggregate, updating its state.
    fn apply(&mut self, event: Self::Event, context: &EventContext);

    /// Payload migrations applied to stored events before decoding.
    fn upcasters() -> Upcasters {
        Upcasters::new()
    }
}

/// Serializes a domain event to the payload stored next to its type.
pub fn encode_event<E: DomainEvent>(event: &E) -> serde_json::Result<Value> {
    let mut tagged = serde_json::to_value(event)?;
    Ok(tagged
        .get_mut("payload")
        .map(Value::take)
        .unwrap_or_else(|| Value::Object(Default::default())))
}

/// Rebuilds a domain event from a stored type and payload.
pub fn decode_event<E: DomainEvent>(event_type: &str, payload: &Value) -> serde_json::Result<E> {
    serde_json::from_value(tagged(event_type, payload))
}

/// Rebuilds a command from a dynamic type and payload.
pub fn decode_command<C: DomainCommand>(
    command_type: &str,
    payload: &Value,
) -> serde_json::Result<C> {
    serde_json::from_value(tagged(command_type, payload))
}

fn tagged(tag: &str, payload: &Value) -> Value {
    // Commands without arguments may arrive with a null payload.
    let content = if payload.is_null() {
        Value::Object(Default::default())
    } else {
        payload.clone()
    };
    serde_json::json!({ "type": tag, "payload": content })
}
