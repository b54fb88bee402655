//! Shopping list commands.

use serde::{Deserialize, Serialize};

use crate::aggregate::DomainCommand;

/// Commands accepted by the shopping list aggregate.
///
/// Wire names are camelCase (`createShoppingList`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum ShoppingListCommand {
    CreateShoppingList { name: String },
    RenameShoppingList { name: String },
    RemoveShoppingList {},
    CreateShoppingItem { id: String, text: String },
    ToggleShoppingItem { id: String },
    RemoveShoppingItem { id: String },
}

impl DomainCommand for ShoppingListCommand {
    const TYPES: &'static [&'static str] = &[
        "createShoppingList",
        "renameShoppingList",
        "removeShoppingList",
        "createShoppingItem",
        "toggleShoppingItem",
        "removeShoppingItem",
    ];

    fn command_type(&self) -> &'static str {
        match self {
            ShoppingListCommand::CreateShoppingList { .. } => "createShoppingList",
            ShoppingListCommand::RenameShoppingList { .. } => "renameShoppingList",
            ShoppingListCommand::RemoveShoppingList {} => "removeShoppingList",
            ShoppingListCommand::CreateShoppingItem { .. } => "createShoppingItem",
            ShoppingListCommand::ToggleShoppingItem { .. } => "toggleShoppingItem",
            ShoppingListCommand::RemoveShoppingItem { .. } => "removeShoppingItem",
        }
    }
}

impl ShoppingListCommand {
    pub fn create(name: impl Into<String>) -> Self {
        Self::CreateShoppingList { name: name.into() }
    }

    pub fn rename(name: impl Into<String>) -> Self {
        Self::RenameShoppingList { name: name.into() }
    }

    pub fn remove() -> Self {
        Self::RemoveShoppingList {}
    }

    pub fn create_item(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::CreateShoppingItem {
            id: id.into(),
            text: text.into(),
        }
    }

    pub fn toggle_item(id: impl Into<String>) -> Self {
        Self::ToggleShoppingItem { id: id.into() }
    }

    pub fn remove_item(id: impl Into<String>) -> Self {
        Self::RemoveShoppingItem { id: id.into() }
    }
}
