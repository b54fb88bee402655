use common::AggregateId;
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{AggregateRuntime, Command, CommandRegistry, RuntimeConfig, ShoppingList, ShoppingListCommand};
use event_store::{EventBus, InMemoryEventStore, Metadata};

fn runtime(store: InMemoryEventStore) -> AggregateRuntime<InMemoryEventStore, ShoppingList> {
    AggregateRuntime::new(EventBus::new(store), RuntimeConfig::default())
}

fn bench_create_list(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("domain/create_shopping_list", |b| {
        b.iter(|| {
            rt.block_on(async {
                let runtime = runtime(InMemoryEventStore::new());
                runtime
                    .execute(
                        &AggregateId::random(),
                        &ShoppingListCommand::create("Groceries"),
                        &Metadata::new(),
                    )
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_add_item_to_long_list(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let runtime = runtime(InMemoryEventStore::new());
    let id = AggregateId::new("bench-list");
    let meta = Metadata::new();

    // Every command replays the full history, so seed 100 items
    rt.block_on(async {
        runtime
            .execute(&id, &ShoppingListCommand::create("Groceries"), &meta)
            .await
            .unwrap();
        for n in 0..100 {
            runtime
                .execute(&id, &ShoppingListCommand::create_item(format!("seed-{n}"), "Item"), &meta)
                .await
                .unwrap();
        }
    });

    let mut counter = 0u64;
    c.bench_function("domain/toggle_item_after_100", |b| {
        b.iter(|| {
            counter += 1;
            rt.block_on(async {
                runtime
                    .execute(&id, &ShoppingListCommand::toggle_item(format!("seed-{}", counter % 100)), &meta)
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_registry_dispatch(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("domain/registry_create_and_item", |b| {
        b.iter(|| {
            rt.block_on(async {
                let registry = CommandRegistry::new().register(runtime(InMemoryEventStore::new()));
                let id = AggregateId::random();
                registry
                    .submit(&Command::new(
                        "ShoppingList",
                        id.clone(),
                        "createShoppingList",
                        serde_json::json!({"name": "Groceries"}),
                    ))
                    .await
                    .unwrap();
                registry
                    .submit(&Command::new(
                        "ShoppingList",
                        id,
                        "createShoppingItem",
                        serde_json::json!({"id": "i1", "text": "Milk"}),
                    ))
                    .await
                    .unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_create_list,
    bench_add_item_to_long_list,
    bench_registry_dispatch,
);
criterion_main!(benches);
