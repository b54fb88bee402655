//! Payload schema migrations applied while replaying stored events.

use std::collections::{BTreeMap, HashMap};

use event_store::EventEnvelope;
use serde_json::Value;

type UpcastFn = Box<dyn Fn(Value) -> Value + Send + Sync>;

/// Chains of payload migrations keyed by event type and source schema version.
///
/// A step registered for `(event_type, n)` turns a version `n` payload into a
/// version `n + 1` payload. Stored events are never rewritten; upcasting
/// happens on every read.
#[derive(Default)]
pub struct Upcasters {
    steps: HashMap<String, BTreeMap<u32, UpcastFn>>,
}

impl Upcasters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the migration from `from_version` to `from_version + 1`.
    pub fn register<F>(mut self, event_type: impl Into<String>, from_version: u32, step: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.steps
            .entry(event_type.into())
            .or_default()
            .insert(from_version, Box::new(step));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Brings an envelope's payload to the newest registered schema version.
    pub fn upcast(&self, mut envelope: EventEnvelope) -> EventEnvelope {
        let Some(chain) = self.steps.get(&envelope.event_type) else {
            return envelope;
        };

        while let Some(step) = chain.get(&envelope.schema_version) {
            envelope.payload = step(envelope.payload);
            envelope.schema_version += 1;
        }
        envelope
    }
}

impl std::fmt::Debug for Upcasters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<(&str, &u32)> = self
            .steps
            .iter()
            .flat_map(|(event_type, chain)| chain.keys().map(move |v| (event_type.as_str(), v)))
            .collect();
        f.debug_struct("Upcasters").field("steps", &keys).finish()
    }
}

/// Moves a top-level field, leaving other fields untouched.
pub fn rename_field(mut payload: Value, from: &str, to: &str) -> Value {
    if let Some(object) = payload.as_object_mut()
        && let Some(value) = object.remove(from)
    {
        object.insert(to.to_string(), value);
    }
    payload
}
