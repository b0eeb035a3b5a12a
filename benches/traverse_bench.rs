//! Benchmarks for table-traverse
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use std::time::Duration;
use table_traverse::config::{ConsumerConfig, ProducerConfig, TraversalConfig};
use table_traverse::store::{Item, MemoryStore, Page, TableSchema};
use table_traverse::traverse::{
    Cardinality, Dequeued, PageQueue, QueueCapacity, SharedCounter, TraversalCoordinator,
};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn benchmark_queue_operations(c: &mut Criterion) {
    let rt = runtime();

    c.bench_function("queue_put_get", |b| {
        let queue = PageQueue::new(QueueCapacity::Bounded(10_000));
        let sender = queue.sender();
        let receiver = queue.receiver();
        let page = Page::new(vec![Item::new(); 10], None);

        b.to_async(&rt).iter(|| {
            let sender = sender.clone();
            let receiver = receiver.clone();
            let page = page.clone();
            async move {
                sender.put(page).await.unwrap();
                match receiver.get(Duration::from_secs(1)).await {
                    Dequeued::Page(page) => black_box(page),
                    other => panic!("unexpected {:?}", other),
                };
            }
        })
    });
}

fn benchmark_counter(c: &mut Criterion) {
    c.bench_function("counter_increment", |b| {
        let counter = SharedCounter::new();
        b.iter(|| black_box(counter.increment()))
    });
}

fn benchmark_traversal(c: &mut Criterion) {
    let rt = runtime();
    let store = MemoryStore::new();
    store.create_table(TableSchema::new("bench", "id"));
    store.generate("bench", 20_000).unwrap();
    let store = Arc::new(store);

    let mut group = c.benchmark_group("traversal");
    group.sample_size(10);

    for segments in [1usize, 4, 16] {
        group.bench_function(format!("cardinality_{}_segments", segments), |b| {
            b.to_async(&rt).iter(|| {
                let store = Arc::clone(&store);
                async move {
                    let config = TraversalConfig::new(
                        ProducerConfig::scan("bench", segments).batch_size(200),
                        ConsumerConfig::new(8, Duration::from_secs(1)),
                        QueueCapacity::Bounded(32),
                    )
                    .unwrap();
                    let counter = SharedCounter::new();
                    TraversalCoordinator::new(store, config, Arc::new(Cardinality::new(counter.clone())))
                        .unwrap()
                        .run()
                        .await
                        .unwrap();
                    black_box(counter.get())
                }
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_queue_operations,
    benchmark_counter,
    benchmark_traversal,
);
criterion_main!(benches);
