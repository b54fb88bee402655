//! Shopping list aggregate implementation.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregate::{Aggregate, EventContext};
use crate::upcast::Upcasters;

use super::{ShoppingListCommand, ShoppingListError, ShoppingListEvent, events};

/// One entry on a shopping list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShoppingItem {
    pub id: String,
    pub text: String,
    pub checked: bool,
}

/// Shopping list aggregate root.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingList {
    /// Timestamp of the creating event; `None` until created.
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    created_at: Option<DateTime<Utc>>,

    name: String,

    removed: bool,

    /// Items in insertion order.
    items: Vec<ShoppingItem>,
}

impl Aggregate for ShoppingList {
    const NAME: &'static str = "ShoppingList";

    type Command = ShoppingListCommand;
    type Event = ShoppingListEvent;
    type Error = ShoppingListError;

    fn handle(&self, command: &ShoppingListCommand) -> Result<Vec<ShoppingListEvent>, ShoppingListError> {
        match command {
            ShoppingListCommand::CreateShoppingList { name } => self.create(name),
            ShoppingListCommand::RenameShoppingList { name } => self.rename(name),
            ShoppingListCommand::RemoveShoppingList {} => self.remove(),
            ShoppingListCommand::CreateShoppingItem { id, text } => self.create_item(id, text),
            ShoppingListCommand::ToggleShoppingItem { id } => self.toggle_item(id),
            ShoppingListCommand::RemoveShoppingItem { id } => self.remove_item(id),
        }
    }

    fn apply(&mut self, event: ShoppingListEvent, context: &EventContext) {
        match event {
            ShoppingListEvent::ShoppingListCreated { name } => {
                self.created_at = Some(context.timestamp);
                self.name = name;
            }
            ShoppingListEvent::ShoppingListRenamed { name } => self.name = name,
            ShoppingListEvent::ShoppingListRemoved {} => self.removed = true,
            ShoppingListEvent::ShoppingItemCreated { id, text } => {
                self.items.push(ShoppingItem {
                    id,
                    text,
                    checked: false,
                });
            }
            ShoppingListEvent::ShoppingItemToggled { id } => {
                if let Some(item) = self.items.iter_mut().find(|item| item.id == id) {
                    item.checked = !item.checked;
                }
            }
            ShoppingListEvent::ShoppingItemRemoved { id } => {
                self.items.retain(|item| item.id != id);
            }
        }
    }

    fn upcasters() -> Upcasters {
        events::upcasters()
    }
}

// Query methods
impl ShoppingList {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Returns true once created, even if removed since.
    pub fn exists(&self) -> bool {
        self.created_at.is_some()
    }

    pub fn items(&self) -> &[ShoppingItem] {
        &self.items
    }

    pub fn item(&self, id: &str) -> Option<&ShoppingItem> {
        self.items.iter().find(|item| item.id == id)
    }
}

// Command methods (return events)
impl ShoppingList {
    fn create(&self, name: &str) -> Result<Vec<ShoppingListEvent>, ShoppingListError> {
        if self.exists() {
            return Err(ShoppingListError::AlreadyExists);
        }
        let name = required(name).ok_or(ShoppingListError::NameRequired)?;

        Ok(vec![ShoppingListEvent::ShoppingListCreated { name }])
    }

    fn rename(&self, name: &str) -> Result<Vec<ShoppingListEvent>, ShoppingListError> {
        self.ensure_active()?;
        let name = required(name).ok_or(ShoppingListError::NameRequired)?;

        if name == self.name {
            return Ok(vec![]);
        }
        Ok(vec![ShoppingListEvent::ShoppingListRenamed { name }])
    }

    fn remove(&self) -> Result<Vec<ShoppingListEvent>, ShoppingListError> {
        self.ensure_active()?;
        Ok(vec![ShoppingListEvent::ShoppingListRemoved {}])
    }

    fn create_item(&self, id: &str, text: &str) -> Result<Vec<ShoppingListEvent>, ShoppingListError> {
        self.ensure_active()?;
        let id = required(id).ok_or(ShoppingListError::ItemIdRequired)?;
        let text = required(text).ok_or(ShoppingListError::TextRequired)?;

        if self.item(&id).is_some() {
            return Err(ShoppingListError::ItemExists { id });
        }
        Ok(vec![ShoppingListEvent::ShoppingItemCreated { id, text }])
    }

    fn toggle_item(&self, id: &str) -> Result<Vec<ShoppingListEvent>, ShoppingListError> {
        self.ensure_active()?;
        let id = self.existing_item(id)?;
        Ok(vec![ShoppingListEvent::ShoppingItemToggled { id }])
    }

    fn remove_item(&self, id: &str) -> Result<Vec<ShoppingListEvent>, ShoppingListError> {
        self.ensure_active()?;
        let id = self.existing_item(id)?;
        Ok(vec![ShoppingListEvent::ShoppingItemRemoved { id }])
    }

    fn ensure_active(&self) -> Result<(), ShoppingListError> {
        if !self.exists() || self.removed {
            return Err(ShoppingListError::NotFound);
        }
        Ok(())
    }

    fn existing_item(&self, id: &str) -> Result<String, ShoppingListError> {
        self.item(id)
            .map(|item| item.id.clone())
            .ok_or_else(|| ShoppingListError::ItemNotFound { id: id.to_string() })
    }
}

/// Trimmed value, or `None` when blank.
fn required(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
