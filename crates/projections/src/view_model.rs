//! In-memory, per-session view models.
//!
//! A view model folds the events of a handful of aggregates through a pure
//! reducer and pushes every new state to its session. Nothing is persisted:
//! a session rebuilds its state from the event store when opened and drops it
//! when closed.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use event_store::{AggregateId, EventBus, EventEnvelope, EventStore, EventStream, Position};
use futures_util::{StreamExt, TryStreamExt};
use serde::Serialize;
use serde_json::Value;

use crate::error::ViewModelError;

/// A pure reduction of events into client-facing state.
pub trait ViewModel: Send + Sync + 'static {
    type State: Serialize + Send + 'static;

    /// Name queries and sessions refer to.
    fn name(&self) -> &'static str;

    /// Empty state for a session over `aggregate_ids`.
    fn init(&self, aggregate_ids: &[AggregateId]) -> Self::State;

    /// Folds one event of a requested aggregate into the state.
    fn apply(&self, state: &mut Self::State, event: &EventEnvelope) -> Result<(), ViewModelError>;
}

/// Something that can answer view model queries with a one-off fold.
#[async_trait]
pub trait ViewModelSource: Send + Sync {
    async fn snapshot(&self, name: &str, aggregate_ids: &[AggregateId]) -> Result<Value, ViewModelError>;
}

trait SessionState: Send {
    fn apply(&mut self, event: &EventEnvelope) -> Result<(), ViewModelError>;

    fn to_json(&self) -> Result<Value, ViewModelError>;
}

struct Folding<V: ViewModel> {
    view: Arc<V>,
    state: V::State,
}

impl<V: ViewModel> SessionState for Folding<V> {
    fn apply(&mut self, event: &EventEnvelope) -> Result<(), ViewModelError> {
        self.view.apply(&mut self.state, event)
    }

    fn to_json(&self) -> Result<Value, ViewModelError> {
        Ok(serde_json::to_value(&self.state)?)
    }
}

trait ErasedViewModel: Send + Sync {
    fn fresh(&self, aggregate_ids: &[AggregateId]) -> Box<dyn SessionState>;
}

impl<V: ViewModel> ErasedViewModel for Arc<V> {
    fn fresh(&self, aggregate_ids: &[AggregateId]) -> Box<dyn SessionState> {
        Box::new(Folding {
            view: Arc::clone(self),
            state: self.init(aggregate_ids),
        })
    }
}

/// View models by name, following one event bus.
pub struct ViewModelRegistry<S> {
    bus: EventBus<S>,
    view_models: HashMap<&'static str, Box<dyn ErasedViewModel>>,
}

impl<S> ViewModelRegistry<S>
where
    S: EventStore + Clone + 'static,
{
    pub fn new(bus: EventBus<S>) -> Self {
        Self {
            bus,
            view_models: HashMap::new(),
        }
    }

    pub fn register<V: ViewModel>(mut self, view_model: V) -> Self {
        self.view_models
            .insert(view_model.name(), Box::new(Arc::new(view_model)));
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.view_models.keys().copied()
    }

    /// Opens a session over `aggregate_ids`.
    ///
    /// The first [`ViewModelSession::next`] yields the state after the stored
    /// history; every later call yields the state after the next event of one
    /// of the requested aggregates.
    #[tracing::instrument(skip(self, aggregate_ids), fields(aggregates = aggregate_ids.len()))]
    pub async fn open(&self, name: &str, aggregate_ids: &[AggregateId]) -> Result<ViewModelSession, ViewModelError> {
        let (state, head) = self.fold_history(name, aggregate_ids).await?;

        Ok(ViewModelSession {
            name: self.name_of(name)?,
            state,
            aggregate_ids: aggregate_ids.iter().cloned().collect(),
            events: self.bus.subscribe(head),
            replayed: false,
        })
    }

    /// Folds the stored history once and returns the resulting state.
    pub async fn fold(&self, name: &str, aggregate_ids: &[AggregateId]) -> Result<Value, ViewModelError> {
        let (state, _) = self.fold_history(name, aggregate_ids).await?;
        state.to_json()
    }

    fn name_of(&self, name: &str) -> Result<&'static str, ViewModelError> {
        self.view_models
            .get_key_value(name)
            .map(|(name, _)| *name)
            .ok_or_else(|| ViewModelError::NotFound(name.to_string()))
    }

    /// Folds every stored event of `aggregate_ids` up to the current head, in
    /// commit order. Events appended after the head is read are left to the
    /// live subscription.
    async fn fold_history(
        &self,
        name: &str,
        aggregate_ids: &[AggregateId],
    ) -> Result<(Box<dyn SessionState>, Position), ViewModelError> {
        let view_model = self
            .view_models
            .get(name)
            .ok_or_else(|| ViewModelError::NotFound(name.to_string()))?;

        let store = self.bus.store();
        let head = store.head_position().await?;

        let mut history = Vec::new();
        for aggregate_id in unique(aggregate_ids) {
            let events: Vec<EventEnvelope> = store
                .load_events(aggregate_id, event_store::Version::initial())
                .await?
                .try_collect()
                .await?;
            history.extend(events.into_iter().filter(|e| e.position <= head));
        }
        history.sort_by_key(|e| e.position);

        let mut state = view_model.fresh(aggregate_ids);
        for event in &history {
            state.apply(event)?;
        }

        tracing::debug!(view_model = name, events = history.len(), head = %head, "view model replayed");
        Ok((state, head))
    }
}

#[async_trait]
impl<S> ViewModelSource for ViewModelRegistry<S>
where
    S: EventStore + Clone + 'static,
{
    async fn snapshot(&self, name: &str, aggregate_ids: &[AggregateId]) -> Result<Value, ViewModelError> {
        self.fold(name, aggregate_ids).await
    }
}

fn unique(ids: &[AggregateId]) -> Vec<&AggregateId> {
    let mut seen = HashSet::new();
    ids.iter().filter(|id| seen.insert(*id)).collect()
}

/// One client's live view. Dropping the session discards its state.
pub struct ViewModelSession {
    name: &'static str,
    state: Box<dyn SessionState>,
    aggregate_ids: HashSet<AggregateId>,
    events: EventStream,
    replayed: bool,
}

impl ViewModelSession {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Current state without waiting for new events.
    pub fn state(&self) -> Result<Value, ViewModelError> {
        self.state.to_json()
    }

    /// Waits for the next state to push to the client.
    ///
    /// Returns `None` once the bus is gone.
    pub async fn next(&mut self) -> Option<Result<Value, ViewModelError>> {
        if !self.replayed {
            self.replayed = true;
            return Some(self.state.to_json());
        }

        loop {
            let event = match self.events.next().await? {
                Ok(event) => event,
                Err(err) => return Some(Err(err.into())),
            };
            if !self.aggregate_ids.contains(&event.aggregate_id) {
                continue;
            }

            return Some(
                self.state
                    .apply(&event)
                    .and_then(|()| self.state.to_json()),
            );
        }
    }
}

impl std::fmt::Debug for ViewModelSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewModelSession")
            .field("name", &self.name)
            .field("aggregate_ids", &self.aggregate_ids)
            .finish()
    }
}
