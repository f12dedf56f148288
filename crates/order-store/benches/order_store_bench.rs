use criterion::{Criterion, criterion_group, criterion_main};
use domain::{NewOrder, OrderItem, OrderStatus, OrderUpdate};
use order_store::{InMemoryOrderStore, OrderStore};

fn new_order() -> NewOrder {
    NewOrder::new("bench-client", vec![OrderItem::new("p1", 2, 10.0)], 20.0)
}

fn bench_create(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryOrderStore::new();

    c.bench_function("order_store/create", |b| {
        b.iter(|| {
            rt.block_on(async {
                store.create(new_order()).await.unwrap();
            });
        });
    });
}

fn bench_find_by_id_1000(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryOrderStore::new();
    let ids: Vec<_> = rt.block_on(async {
        let mut ids = Vec::with_capacity(1000);
        for _ in 0..1000 {
            ids.push(store.create(new_order()).await.unwrap().id);
        }
        ids
    });
    let target = ids[ids.len() / 2];

    c.bench_function("order_store/find_by_id_1000", |b| {
        b.iter(|| {
            rt.block_on(async {
                store.find_by_id(target).await.unwrap().unwrap();
            });
        });
    });
}

fn bench_update(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryOrderStore::new();
    let id = rt.block_on(async { store.create(new_order()).await.unwrap().id });

    c.bench_function("order_store/update_status", |b| {
        b.iter(|| {
            rt.block_on(async {
                store
                    .update(id, OrderUpdate::new().status(OrderStatus::Paid))
                    .await
                    .unwrap();
            });
        });
    });
}

criterion_group!(benches, bench_create, bench_find_by_id_1000, bench_update);
criterion_main!(benches);
