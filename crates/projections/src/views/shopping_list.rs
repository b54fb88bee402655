//! `shoppingList` view model: full list state, items included, per session.

use domain::{Aggregate, DomainEvent, EventContext, ShoppingList, ShoppingListEvent, Upcasters, decode_event};
use event_store::{AggregateId, EventEnvelope};
use serde::{Serialize, Serializer};

use crate::error::ViewModelError;
use crate::view_model::ViewModel;

/// Name of the view model.
pub const VIEW_MODEL: &str = "shoppingList";

/// One requested list as pushed to the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShoppingListEntry {
    id: AggregateId,
    #[serde(flatten)]
    list: ShoppingList,
}

/// Session state: the requested lists in request order. Lists that were
/// never created or have been removed are left out of the serialized form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShoppingListViews(Vec<ShoppingListEntry>);

impl Serialize for ShoppingListViews {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(
            self.0
                .iter()
                .filter(|entry| entry.list.exists() && !entry.list.is_removed()),
        )
    }
}

/// Folds shopping list events with the aggregate's own reducer.
pub struct ShoppingListViewModel {
    upcasters: Upcasters,
}

impl ShoppingListViewModel {
    pub fn new() -> Self {
        Self {
            upcasters: ShoppingList::upcasters(),
        }
    }
}

impl Default for ShoppingListViewModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewModel for ShoppingListViewModel {
    type State = ShoppingListViews;

    fn name(&self) -> &'static str {
        VIEW_MODEL
    }

    fn init(&self, aggregate_ids: &[AggregateId]) -> ShoppingListViews {
        let mut entries: Vec<ShoppingListEntry> = Vec::with_capacity(aggregate_ids.len());
        for id in aggregate_ids {
            if !entries.iter().any(|entry| &entry.id == id) {
                entries.push(ShoppingListEntry {
                    id: id.clone(),
                    list: ShoppingList::default(),
                });
            }
        }
        ShoppingListViews(entries)
    }

    fn apply(&self, state: &mut ShoppingListViews, event: &EventEnvelope) -> Result<(), ViewModelError> {
        if event.aggregate_name != ShoppingList::NAME
            || !ShoppingListEvent::TYPES.contains(&event.event_type.as_str())
        {
            return Ok(());
        }
        let Some(entry) = state.0.iter_mut().find(|entry| entry.id == event.aggregate_id) else {
            return Ok(());
        };

        let event = self.upcasters.upcast(event.clone());
        let decoded: ShoppingListEvent = decode_event(&event.event_type, &event.payload)?;
        entry.list.apply(decoded, &EventContext::from(&event));
        Ok(())
    }
}
