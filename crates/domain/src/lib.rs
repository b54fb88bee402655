//! Domain layer for the event-sourcing system.
//!
//! This crate provides the write side of the CQRS pattern:
//! - [`Aggregate`], [`DomainCommand`] and [`DomainEvent`] traits
//! - [`Upcasters`] for migrating stored payloads during replay
//! - [`AggregateRuntime`] executing commands with optimistic concurrency
//! - [`CommandRegistry`] routing dynamic [`Command`] envelopes by aggregate name
//! - The shopping list bounded context

pub mod aggregate;
pub mod error;
pub mod registry;
pub mod runtime;
pub mod shopping_list;
pub mod upcast;

pub use aggregate::{
    Aggregate, DomainCommand, DomainEvent, EventContext, RuleViolation, decode_command,
    decode_event, encode_event,
};
pub use error::{CommandError, Result};
pub use registry::{Command, CommandExecutor, CommandRegistry};
pub use runtime::{AggregateRuntime, COMMAND_TYPE_KEY, RuntimeConfig};
pub use shopping_list::{
    ShoppingItem, ShoppingList, ShoppingListCommand, ShoppingListError, ShoppingListEvent,
};
pub use upcast::Upcasters;
