pub mod bus;
pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod store;

pub use bus::{DEFAULT_PAGE_SIZE, EventBus};
pub use common::{AggregateId, Metadata};
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventId, PendingEvent, Position, Version};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use store::{Appended, EventStore, EventStoreExt, EventStream};
