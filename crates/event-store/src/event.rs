use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AggregateId, Metadata};

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an event ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Version number for an aggregate, used for optimistic concurrency control.
///
/// Versions start at 1 for the first event and increment by 1 for each
/// subsequent event on an aggregate. Version 0 means "no events yet".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the initial version (0) for a new aggregate.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the first version (1) for the first event.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Global position of an event in the store's commit order.
///
/// Positions start at 1. A cursor of `Position::start()` (0) means nothing
/// has been consumed yet.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Position(i64);

impl Position {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// The cursor before the first event.
    pub fn start() -> Self {
        Self(0)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn default_schema_version() -> u32 {
    1
}

/// An event as stored: immutable, versioned, positioned.
///
/// Serialized shape follows the storage contract: camelCase keys, `type`
/// for the event type and `timestamp` as epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    /// Unique identifier for this event.
    pub event_id: EventId,

    /// The aggregate this event belongs to.
    pub aggregate_id: AggregateId,

    /// The type of aggregate (e.g., "ShoppingList").
    pub aggregate_name: String,

    /// The type of the event (e.g., "ShoppingListCreated").
    #[serde(rename = "type")]
    pub event_type: String,

    /// The version of the aggregate after this event.
    pub version: Version,

    /// Global commit-order position assigned by the store.
    pub position: Position,

    /// When the event was appended.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    /// Schema version of `payload`, bumped when the payload shape changes.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// The event payload as JSON.
    pub payload: serde_json::Value,

    /// Additional metadata about the event.
    #[serde(default)]
    pub metadata: Metadata,
}

impl EventEnvelope {
    /// Deserializes the payload into a concrete type.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }

    /// Epoch milliseconds of the append time.
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

/// An event proposed for append. The store assigns id, version, position
/// and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEvent {
    pub aggregate_name: String,
    pub event_type: String,
    pub schema_version: u32,
    pub payload: serde_json::Value,
    pub metadata: Metadata,
}

impl PendingEvent {
    /// Creates a pending event from a raw JSON payload.
    pub fn new(
        aggregate_name: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            aggregate_name: aggregate_name.into(),
            event_type: event_type.into(),
            schema_version: default_schema_version(),
            payload,
            metadata: Metadata::new(),
        }
    }

    /// Creates a pending event from a serializable payload.
    pub fn from_payload<T: Serialize>(
        aggregate_name: impl Into<String>,
        event_type: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(
            aggregate_name,
            event_type,
            serde_json::to_value(payload)?,
        ))
    }

    pub fn with_schema_version(mut self, schema_version: u32) -> Self {
        self.schema_version = schema_version;
        self
    }

    /// Adds a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Merges a metadata map; existing keys are overwritten.
    pub fn with_metadata_map(mut self, metadata: &Metadata) -> Self {
        self.metadata
            .extend(metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Turns the pending event into a stored envelope.
    pub(crate) fn into_envelope(
        self,
        aggregate_id: AggregateId,
        version: Version,
        position: Position,
        timestamp: DateTime<Utc>,
    ) -> EventEnvelope {
        EventEnvelope {
            event_id: EventId::new(),
            aggregate_id,
            aggregate_name: self.aggregate_name,
            event_type: self.event_type,
            version,
            position,
            timestamp,
            schema_version: self.schema_version,
            payload: self.payload,
            metadata: self.metadata,
        }
    }
}

/// Current time truncated to the millisecond precision of the wire format.
pub(crate) fn now_millis() -> DateTime<Utc> {
    use chrono::SubsecRound;
    Utc::now().trunc_subsecs(3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_new_creates_unique_ids() {
        let id1 = EventId::new();
        let id2 = EventId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn version_ordering() {
        let v1 = Version::new(1);
        let v2 = Version::new(2);
        assert!(v1 < v2);
        assert_eq!(v1.next(), v2);
    }

    #[test]
    fn version_initial_and_first() {
        assert_eq!(Version::initial().as_i64(), 0);
        assert_eq!(Version::first().as_i64(), 1);
        assert_eq!(Version::initial().next(), Version::first());
    }

    #[test]
    fn pending_event_carries_metadata() {
        let mut meta = Metadata::new();
        meta.insert("correlationId".into(), serde_json::json!("c-1"));

        let pending = PendingEvent::new("ShoppingList", "ShoppingListCreated", serde_json::json!({}))
            .with_schema_version(2)
            .with_metadata_map(&meta)
            .with_metadata("commandType", serde_json::json!("createShoppingList"));

        assert_eq!(pending.schema_version, 2);
        assert_eq!(pending.metadata.len(), 2);
        assert_eq!(pending.metadata["correlationId"], "c-1");
    }

    #[test]
    fn envelope_wire_shape_uses_epoch_millis() {
        let timestamp = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        let envelope = PendingEvent::new(
            "ShoppingList",
            "ShoppingListCreated",
            serde_json::json!({"name": "Groceries"}),
        )
        .into_envelope(AggregateId::new("A1"), Version::first(), Position::new(1), timestamp);

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["aggregateId"], "A1");
        assert_eq!(json["aggregateName"], "ShoppingList");
        assert_eq!(json["type"], "ShoppingListCreated");
        assert_eq!(json["version"], 1);
        assert_eq!(json["timestamp"], 1_700_000_000_123_i64);
        assert_eq!(json["payload"]["name"], "Groceries");

        let back: EventEnvelope = serde_json::from_value(json).unwrap();
        assert_eq!(back, envelope);
    }

    #[test]
    fn now_millis_has_no_sub_millisecond_part() {
        let now = now_millis();
        assert_eq!(now.timestamp_subsec_nanos() % 1_000_000, 0);
    }
}
