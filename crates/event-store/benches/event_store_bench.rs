use common::AggregateId;
use criterion::{Criterion, criterion_group, criterion_main};
use event_store::{
    EventBus, EventStore, EventStoreExt, InMemoryEventStore, PendingEvent, Position, Version,
};
use futures_util::StreamExt;

fn make_event(name: &str) -> PendingEvent {
    PendingEvent::new(
        "ShoppingList",
        "ShoppingItemCreated",
        serde_json::json!({ "id": "item-1", "text": name }),
    )
}

async fn populate(store: &InMemoryEventStore, aggregates: usize, per_aggregate: usize) {
    for n in 0..aggregates {
        let id = AggregateId::new(format!("list-{n}"));
        let events = (0..per_aggregate).map(|_| make_event("Milk")).collect();
        store
            .append(&id, Version::initial(), events)
            .await
            .unwrap();
    }
}

fn bench_append_single_event(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("event_store/append_single_event", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryEventStore::new();
                store
                    .append(
                        &AggregateId::random(),
                        Version::initial(),
                        vec![make_event("Milk")],
                    )
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_append_batch_10(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("event_store/append_batch_10", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryEventStore::new();
                let events = (0..10).map(|_| make_event("Milk")).collect();
                store
                    .append(&AggregateId::random(), Version::initial(), events)
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_load_aggregate_100(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    rt.block_on(populate(&store, 1, 100));
    let id = AggregateId::new("list-0");

    c.bench_function("event_store/load_events_100", |b| {
        b.iter(|| {
            rt.block_on(async {
                let events = store.load_all_events(&id).await.unwrap();
                assert_eq!(events.len(), 100);
            });
        });
    });
}

fn bench_stream_all_events(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();

    // 1000 events across 10 aggregates
    rt.block_on(populate(&store, 10, 100));

    c.bench_function("event_store/stream_1000_events", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut stream = store.stream_all(Position::start()).await.unwrap();
                let mut count = 0;
                while let Some(result) = stream.next().await {
                    result.unwrap();
                    count += 1;
                }
                assert_eq!(count, 1000);
            });
        });
    });
}

fn bench_bus_replay_1000(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    rt.block_on(populate(&store, 10, 100));
    let bus = EventBus::new(store.clone());

    c.bench_function("event_bus/replay_1000_events", |b| {
        b.iter(|| {
            rt.block_on(async {
                let count = bus.subscribe(Position::start()).take(1000).count().await;
                assert_eq!(count, 1000);
            });
        });
    });
}

criterion_group!(
    benches,
    bench_append_single_event,
    bench_append_batch_10,
    bench_load_aggregate_100,
    bench_stream_all_events,
    bench_bus_replay_1000,
);
criterion_main!(benches);
