//! ShoppingLists read model: one row per live shopping list.

use async_trait::async_trait;
use domain::{Aggregate, DomainEvent, ShoppingList, ShoppingListEvent, Upcasters, decode_event};
use event_store::EventEnvelope;
use serde_json::{Value, json};

use crate::Result;
use crate::error::ResolverError;
use crate::projection::Projection;
use crate::query::{QueryRegistry, Resolver};
use crate::store::{FieldType, Filter, Sort, TableReader, TableSchema, TableWriter, record};

/// Name of the read model.
pub const READ_MODEL: &str = "ShoppingLists";

const LISTS: &str = "lists";

/// Projects shopping list events into the `lists` table
/// (`id`, `name`, `createdAt`). Removed lists are deleted.
pub struct ShoppingListsProjection {
    upcasters: Upcasters,
}

impl ShoppingListsProjection {
    pub fn new() -> Self {
        Self {
            upcasters: ShoppingList::upcasters(),
        }
    }
}

impl Default for ShoppingListsProjection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Projection for ShoppingListsProjection {
    fn name(&self) -> &'static str {
        READ_MODEL
    }

    async fn init(&self, writer: &mut TableWriter) -> Result<()> {
        writer.define_table(
            LISTS,
            TableSchema::new()
                .field("id", FieldType::String)
                .field("name", FieldType::String)
                .field("createdAt", FieldType::Timestamp),
        );
        Ok(())
    }

    async fn handle(&self, event: &EventEnvelope, writer: &mut TableWriter) -> Result<()> {
        if event.aggregate_name != ShoppingList::NAME
            || !ShoppingListEvent::TYPES.contains(&event.event_type.as_str())
        {
            return Ok(());
        }

        let event = self.upcasters.upcast(event.clone());
        let id = event.aggregate_id.as_str();

        match decode_event::<ShoppingListEvent>(&event.event_type, &event.payload)? {
            ShoppingListEvent::ShoppingListCreated { name } => writer.insert(
                LISTS,
                record([
                    ("id", json!(id)),
                    ("name", json!(name)),
                    ("createdAt", json!(event.timestamp_millis())),
                ]),
            ),
            ShoppingListEvent::ShoppingListRenamed { name } => {
                writer.update(LISTS, Filter::eq("id", id), record([("name", name)]));
            }
            ShoppingListEvent::ShoppingListRemoved {} => writer.delete(LISTS, Filter::eq("id", id)),
            ShoppingListEvent::ShoppingItemCreated { .. }
            | ShoppingListEvent::ShoppingItemToggled { .. }
            | ShoppingListEvent::ShoppingItemRemoved { .. } => {}
        }
        Ok(())
    }
}

/// `all`: every list, oldest first.
pub struct AllShoppingLists;

#[async_trait]
impl Resolver for AllShoppingLists {
    async fn resolve(&self, reader: &TableReader, _args: &Value) -> std::result::Result<Value, ResolverError> {
        let rows = reader
            .find(
                LISTS,
                &Filter::all(),
                &["id", "name", "createdAt"],
                &Sort::asc("createdAt").then_asc("id"),
            )
            .await?;
        Ok(serde_json::to_value(rows)?)
    }
}

/// `one {id}`: a single list, or `null`.
pub struct ShoppingListById;

#[async_trait]
impl Resolver for ShoppingListById {
    async fn resolve(&self, reader: &TableReader, args: &Value) -> std::result::Result<Value, ResolverError> {
        let id = args
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| ResolverError::InvalidArgs("`id` must be a string".to_string()))?;

        Ok(reader
            .find_one(LISTS, &Filter::eq("id", id))
            .await?
            .map(Value::Object)
            .unwrap_or(Value::Null))
    }
}

/// Adds the ShoppingLists resolvers to `registry`.
pub fn register_resolvers(registry: QueryRegistry) -> QueryRegistry {
    registry
        .with_resolver(READ_MODEL, "all", AllShoppingLists)
        .with_resolver(READ_MODEL, "one", ShoppingListById)
}
