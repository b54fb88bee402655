//! Query side of the CQRS runtime.
//!
//! This crate provides:
//! - [`ReadModelStore`] with role-restricted [`TableWriter`] / [`TableReader`] access
//! - [`ProjectionEngine`] maintaining one read model from the event stream
//! - [`QueryRegistry`] resolving queries against read models and view models
//! - [`ViewModelRegistry`] for in-memory, per-session view models
//! - The shopping list read model and view model

pub mod engine;
pub mod error;
pub mod memory;
pub mod projection;
pub mod query;
pub mod store;
pub mod view_model;
pub mod views;

pub use engine::{EngineConfig, ProjectionEngine, ProjectionErrorPolicy, ProjectionHandle, ProjectionStatus};
pub use error::{ProjectionError, QueryError, ReadModelStoreError, ResolverError, Result, ViewModelError};
pub use memory::InMemoryReadModelStore;
pub use projection::Projection;
pub use query::{Query, QueryRegistry, QueryTarget, Resolver};
pub use store::{
    Direction, FieldType, Filter, ReadModelStore, Record, Sort, TableOp, TableReader, TableSchema,
    TableWriter, record,
};
pub use view_model::{ViewModel, ViewModelRegistry, ViewModelSession, ViewModelSource};
pub use views::{ShoppingListViewModel, ShoppingListsProjection};
