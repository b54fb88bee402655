//! Core projection trait.

use async_trait::async_trait;
use event_store::EventEnvelope;

use crate::Result;
use crate::store::TableWriter;

/// A projection that turns events into one read model.
///
/// Projections never touch storage directly: mutations go into the
/// [`TableWriter`] and the engine commits them together with the cursor.
/// Returning an error discards everything written for that event.
#[async_trait]
pub trait Projection: Send + Sync {
    /// Name of the read model this projection maintains.
    fn name(&self) -> &'static str;

    /// Defines the read model's tables. Runs once, before the first event.
    async fn init(&self, writer: &mut TableWriter) -> Result<()>;

    /// Projects a single event. Event types the projection does not know
    /// must be ignored.
    async fn handle(&self, event: &EventEnvelope, writer: &mut TableWriter) -> Result<()>;
}
