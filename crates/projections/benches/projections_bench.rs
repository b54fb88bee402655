use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use event_store::{AggregateId, EventStore, InMemoryEventStore, PendingEvent, Version};
use projections::views::shopping_lists::{READ_MODEL, register_resolvers};
use projections::{
    EngineConfig, InMemoryReadModelStore, ProjectionEngine, Query, QueryRegistry,
    ShoppingListsProjection,
};

/// Populate a store with N lists, each having 3 events (created + renamed + item).
async fn populate_store(store: &InMemoryEventStore, n: usize) {
    for i in 0..n {
        let id = AggregateId::new(format!("list-{i}"));
        let events = vec![
            PendingEvent::new(
                "ShoppingList",
                "ShoppingListCreated",
                serde_json::json!({ "name": format!("List {i}") }),
            )
            .with_schema_version(2),
            PendingEvent::new(
                "ShoppingList",
                "ShoppingListRenamed",
                serde_json::json!({ "name": format!("Renamed {i}") }),
            ),
            PendingEvent::new(
                "ShoppingList",
                "ShoppingItemCreated",
                serde_json::json!({ "id": "i1", "text": "Milk" }),
            ),
        ];
        store.append(&id, Version::initial(), events).await.unwrap();
    }
}

fn engine(store: &InMemoryEventStore, read_models: &InMemoryReadModelStore) -> ProjectionEngine<InMemoryEventStore> {
    ProjectionEngine::new(
        store.clone(),
        Arc::new(read_models.clone()),
        Arc::new(ShoppingListsProjection::new()),
        EngineConfig::default(),
    )
}

fn bench_catch_up_100_lists(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();

    rt.block_on(populate_store(&store, 100));

    c.bench_function("projections/catch_up_300_events", |b| {
        b.iter(|| {
            rt.block_on(async {
                let read_models = InMemoryReadModelStore::new();
                engine(&store, &read_models).catch_up().await.unwrap();
            });
        });
    });
}

fn bench_catch_up_1000_lists(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();

    rt.block_on(populate_store(&store, 1000));

    c.bench_function("projections/catch_up_3000_events", |b| {
        b.iter(|| {
            rt.block_on(async {
                let read_models = InMemoryReadModelStore::new();
                engine(&store, &read_models).catch_up().await.unwrap();
            });
        });
    });
}

fn bench_query_all_lists(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    let read_models = InMemoryReadModelStore::new();

    rt.block_on(async {
        populate_store(&store, 100).await;
        engine(&store, &read_models).catch_up().await.unwrap();
    });
    let queries = register_resolvers(QueryRegistry::new(Arc::new(read_models)));
    let query = Query::read_model(READ_MODEL, "all", serde_json::Value::Null);

    c.bench_function("projections/query_all_100_lists", |b| {
        b.iter(|| {
            rt.block_on(async {
                queries.execute(&query).await.unwrap();
            });
        });
    });
}

fn bench_rebuild_100_lists(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    let read_models = InMemoryReadModelStore::new();

    rt.block_on(populate_store(&store, 100));
    let engine = engine(&store, &read_models);

    c.bench_function("projections/rebuild_300_events", |b| {
        b.iter(|| {
            rt.block_on(async {
                engine.rebuild().await.unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_catch_up_100_lists,
    bench_catch_up_1000_lists,
    bench_query_all_lists,
    bench_rebuild_100_lists,
);
criterion_main!(benches);
