//! Application wiring for the CQRS runtime.
//!
//! [`App`] builds the registries once at startup and owns the running
//! projection engines: commands go through the [`CommandRegistry`], queries
//! through the [`QueryRegistry`], and every read model is maintained by its
//! own [`ProjectionEngine`] task following the event bus.

pub mod config;
pub mod error;
pub mod telemetry;

use std::sync::Arc;

use domain::{AggregateRuntime, Command, CommandRegistry, ShoppingList};
use event_store::{AggregateId, EventBus, EventEnvelope, EventStore, Position};
use projections::views::shopping_lists;
use projections::{
    EngineConfig, InMemoryReadModelStore, Projection, ProjectionEngine, ProjectionHandle, Query,
    QueryError, QueryRegistry, ReadModelStore, ShoppingListViewModel, ShoppingListsProjection,
    ViewModelRegistry, ViewModelSession,
};
use serde_json::Value;

pub use config::{AppConfig, LogFormat};
pub use error::{AppError, Result};

struct Maintained {
    projection: Arc<dyn Projection>,
    handle: ProjectionHandle,
}

/// A running application over one event store.
pub struct App<S> {
    store: S,
    bus: EventBus<S>,
    read_models: Arc<dyn ReadModelStore>,
    commands: CommandRegistry,
    queries: QueryRegistry,
    view_models: Arc<ViewModelRegistry<S>>,
    engine_config: EngineConfig,
    maintained: Vec<Maintained>,
}

impl<S> App<S>
where
    S: EventStore + Clone + 'static,
{
    /// Builds the registries and spawns one projection engine per read model.
    pub async fn start(store: S, config: &AppConfig) -> Result<Self> {
        let bus = EventBus::with_page_size(store.clone(), config.engine.page_size);
        let read_models: Arc<dyn ReadModelStore> = Arc::new(InMemoryReadModelStore::new());

        let commands = CommandRegistry::new().register(AggregateRuntime::<S, ShoppingList>::new(
            bus.clone(),
            config.runtime.clone(),
        ));

        let view_models =
            Arc::new(ViewModelRegistry::new(bus.clone()).register(ShoppingListViewModel::new()));

        let queries = shopping_lists::register_resolvers(QueryRegistry::new(Arc::clone(&read_models)))
            .with_view_models(view_models.clone())
            .with_timeout(config.query_timeout);

        let mut app = Self {
            store,
            bus,
            read_models,
            commands,
            queries,
            view_models,
            engine_config: config.engine.clone(),
            maintained: Vec::new(),
        };

        let projections: Vec<Arc<dyn Projection>> = vec![Arc::new(ShoppingListsProjection::new())];
        for projection in projections {
            let handle = app.engine(Arc::clone(&projection)).spawn(app.bus.clone());
            app.maintained.push(Maintained { projection, handle });
        }

        tracing::info!(
            aggregates = ?app.commands.aggregate_names().collect::<Vec<_>>(),
            read_models = app.maintained.len(),
            "application started"
        );
        Ok(app)
    }

    fn engine(&self, projection: Arc<dyn Projection>) -> ProjectionEngine<S> {
        ProjectionEngine::new(
            self.store.clone(),
            Arc::clone(&self.read_models),
            projection,
            self.engine_config.clone(),
        )
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &EventBus<S> {
        &self.bus
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    pub fn queries(&self) -> &QueryRegistry {
        &self.queries
    }

    /// Executes a command and returns the events it appended.
    pub async fn submit(&self, command: &Command) -> Result<Vec<EventEnvelope>> {
        Ok(self.commands.submit(command).await?)
    }

    /// Resolves a query against the current read model state.
    pub async fn query(&self, query: &Query) -> Result<Value> {
        Ok(self.queries.execute(query).await?)
    }

    /// Opens a live view model session.
    pub async fn open_view_model(&self, name: &str, aggregate_ids: &[AggregateId]) -> Result<ViewModelSession> {
        self.view_models
            .open(name, aggregate_ids)
            .await
            .map_err(|err| AppError::Query(QueryError::from_view_model(name, err)))
    }

    /// Waits until every read model has processed `position`.
    ///
    /// Pass the position of the last event returned by [`submit`](Self::submit)
    /// for read-after-write consistency.
    pub async fn wait_for_projections(&self, position: Position) -> Result<()> {
        for maintained in &self.maintained {
            maintained.handle.wait_for(position).await?;
        }
        Ok(())
    }

    /// Cursor of each maintained read model.
    pub fn projection_cursors(&self) -> Vec<(&'static str, Position)> {
        self.maintained
            .iter()
            .map(|m| (m.handle.read_model(), m.handle.cursor()))
            .collect()
    }

    /// Stops the engine of `read_model`, replays the full log into a fresh
    /// copy and starts following the bus again.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild(&mut self, read_model: &str) -> Result<Position> {
        let index = self
            .maintained
            .iter()
            .position(|m| m.handle.read_model() == read_model)
            .ok_or_else(|| AppError::UnknownReadModel(read_model.to_string()))?;

        let Maintained { projection, handle } = self.maintained.remove(index);
        handle.shutdown().await;

        let rebuilt = self.engine(Arc::clone(&projection)).rebuild().await;
        metrics::counter!("read_model_rebuilds_total", "read_model" => projection.name())
            .increment(1);
        let handle = self.engine(Arc::clone(&projection)).spawn(self.bus.clone());
        self.maintained.push(Maintained { projection, handle });

        Ok(rebuilt?)
    }

    /// Stops every projection engine.
    pub async fn shutdown(self) {
        for maintained in self.maintained {
            maintained.handle.shutdown().await;
        }
        tracing::info!("application stopped");
    }
}
