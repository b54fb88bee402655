//! Shopping list domain events.

use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::upcast::{Upcasters, rename_field};

/// Events that can occur on a shopping list aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ShoppingListEvent {
    /// List was created.
    ShoppingListCreated { name: String },

    /// List was given a new name.
    ShoppingListRenamed { name: String },

    /// List was removed. Its history is kept.
    ShoppingListRemoved {},

    /// Item was added to the list.
    ShoppingItemCreated { id: String, text: String },

    /// Item was checked or unchecked.
    ShoppingItemToggled { id: String },

    /// Item was removed from the list.
    ShoppingItemRemoved { id: String },
}

impl DomainEvent for ShoppingListEvent {
    const TYPES: &'static [&'static str] = &[
        "ShoppingListCreated",
        "ShoppingListRenamed",
        "ShoppingListRemoved",
        "ShoppingItemCreated",
        "ShoppingItemToggled",
        "ShoppingItemRemoved",
    ];

    fn event_type(&self) -> &'static str {
        match self {
            ShoppingListEvent::ShoppingListCreated { .. } => "ShoppingListCreated",
            ShoppingListEvent::ShoppingListRenamed { .. } => "ShoppingListRenamed",
            ShoppingListEvent::ShoppingListRemoved {} => "ShoppingListRemoved",
            ShoppingListEvent::ShoppingItemCreated { .. } => "ShoppingItemCreated",
            ShoppingListEvent::ShoppingItemToggled { .. } => "ShoppingItemToggled",
            ShoppingListEvent::ShoppingItemRemoved { .. } => "ShoppingItemRemoved",
        }
    }

    fn schema_version(&self) -> u32 {
        match self {
            // v1 named the field `title`
            ShoppingListEvent::ShoppingListCreated { .. } => 2,
            _ => 1,
        }
    }
}

/// Migrations for payloads written by older releases.
pub fn upcasters() -> Upcasters {
    Upcasters::new().register("ShoppingListCreated", 1, |payload| {
        rename_field(payload, "title", "name")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{decode_event, encode_event};

    #[test]
    fn created_is_written_at_schema_v2() {
        let event = ShoppingListEvent::ShoppingListCreated {
            name: "Groceries".into(),
        };
        assert_eq!(event.event_type(), "ShoppingListCreated");
        assert_eq!(event.schema_version(), 2);
        assert_eq!(
            encode_event(&event).unwrap(),
            serde_json::json!({"name": "Groceries"})
        );
    }

    #[test]
    fn removed_has_an_empty_payload() {
        let payload = encode_event(&ShoppingListEvent::ShoppingListRemoved {}).unwrap();
        assert_eq!(payload, serde_json::json!({}));

        let back: ShoppingListEvent = decode_event("ShoppingListRemoved", &payload).unwrap();
        assert_eq!(back, ShoppingListEvent::ShoppingListRemoved {});
    }
}
