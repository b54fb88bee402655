//! Shopping list aggregate and related types.

mod aggregate;
mod commands;
mod events;

pub use aggregate::{ShoppingItem, ShoppingList};
pub use commands::ShoppingListCommand;
pub use events::{ShoppingListEvent, upcasters};

use thiserror::Error;

use crate::aggregate::RuleViolation;

/// Rule violations raised by the shopping list aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShoppingListError {
    #[error("Shopping list already exists")]
    AlreadyExists,

    /// The list was never created, or has been removed.
    #[error("Shopping list does not exist")]
    NotFound,

    #[error("Shopping list name is required")]
    NameRequired,

    #[error("Item id is required")]
    ItemIdRequired,

    #[error("Item text is required")]
    TextRequired,

    #[error("Item {id} already exists")]
    ItemExists { id: String },

    #[error("Item {id} does not exist")]
    ItemNotFound { id: String },
}

impl RuleViolation for ShoppingListError {
    fn code(&self) -> &'static str {
        match self {
            ShoppingListError::AlreadyExists => "already_exists",
            ShoppingListError::NotFound => "not_found",
            ShoppingListError::NameRequired => "name_required",
            ShoppingListError::ItemIdRequired => "item_id_required",
            ShoppingListError::TextRequired => "text_required",
            ShoppingListError::ItemExists { .. } => "item_exists",
            ShoppingListError::ItemNotFound { .. } => "item_not_found",
        }
    }
}
