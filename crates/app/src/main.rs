//! Demo entry point: runs a shopping list session against the configured
//! event store and prints the resulting read model, view model and metrics.

use app::telemetry;
use app::{App, AppConfig, AppError};
use domain::Command;
use event_store::{AggregateId, EventStore, InMemoryEventStore, PostgresEventStore};
use projections::Query;
use projections::views::shopping_list::VIEW_MODEL;
use projections::views::shopping_lists::READ_MODEL;
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Load configuration and initialize tracing
    let config = AppConfig::from_env()?;
    telemetry::init_tracing(&config)?;

    // 2. Install Prometheus metrics recorder
    let metrics_handle = telemetry::init_metrics()?;

    // 3. Pick the event store
    match config.database_url.clone() {
        Some(url) => {
            tracing::info!("using PostgreSQL event store");
            let store = PostgresEventStore::connect(&url).await?;
            store.run_migrations().await?;
            run(App::start(store, &config).await?).await?;
        }
        None => {
            tracing::info!("using in-memory event store");
            run(App::start(InMemoryEventStore::new(), &config).await?).await?;
        }
    }

    println!("{}", metrics_handle.render());
    Ok(())
}

async fn run<S: EventStore + Clone + 'static>(app: App<S>) -> Result<(), AppError> {
    let list_id = AggregateId::random();
    let list = |command_type: &str, payload| {
        Command::new("ShoppingList", list_id.clone(), command_type, payload)
            .with_meta("correlationId", json!("demo"))
    };

    let mut last = None;
    for command in [
        list("createShoppingList", json!({"name": "Groceries"})),
        list("renameShoppingList", json!({"name": "Weekend"})),
        list("createShoppingItem", json!({"id": "milk", "text": "Milk"})),
        list("createShoppingItem", json!({"id": "eggs", "text": "Eggs"})),
        list("toggleShoppingItem", json!({"id": "milk"})),
    ] {
        let events = app.submit(&command).await?;
        for event in &events {
            tracing::info!(
                event_type = %event.event_type,
                version = %event.version,
                position = %event.position,
                "event appended"
            );
        }
        last = events.last().map(|e| e.position).or(last);
    }

    // a rejected command appends nothing
    let missing = Command::new("ShoppingList", "missing", "renameShoppingList", json!({"name": "x"}));
    if let Err(err) = app.submit(&missing).await {
        tracing::info!(error = %err, "command rejected as expected");
    }

    if let Some(position) = last {
        app.wait_for_projections(position).await?;
    }

    let lists = app
        .query(&Query::read_model(READ_MODEL, "all", serde_json::Value::Null))
        .await?;
    let view = app
        .query(&Query::view_model(VIEW_MODEL, [list_id.as_str()]))
        .await?;

    println!("read model {READ_MODEL}: {lists}");
    println!("view model {VIEW_MODEL}: {view}");

    app.shutdown().await;
    Ok(())
}
