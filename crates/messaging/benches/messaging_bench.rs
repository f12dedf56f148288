use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use messaging::{
    ConsumerConfig, InMemoryBroker, OrderIngestionConsumer, SignedEventPublisher, TokenIssuer,
    TokenVerifier,
};
use order_store::InMemoryOrderStore;

const SECRET: &str = "bench-secret-0123456789abcdef0123456789";

const BODY: &[u8] =
    br#"{"clientId":"c1","items":[{"productId":"p1","quantity":2,"price":10}],"total":20}"#;

fn bench_issue(c: &mut Criterion) {
    let issuer = TokenIssuer::new(SECRET);

    c.bench_function("token/issue", |b| {
        b.iter(|| issuer.issue().unwrap());
    });
}

fn bench_verify(c: &mut Criterion) {
    let token = TokenIssuer::new(SECRET).issue().unwrap();
    let verifier = TokenVerifier::new(SECRET);

    c.bench_function("token/verify", |b| {
        b.iter(|| verifier.verify(&token).unwrap());
    });
}

fn bench_process(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let broker = Arc::new(InMemoryBroker::new());
    let consumer = OrderIngestionConsumer::new(
        InMemoryOrderStore::new(),
        SignedEventPublisher::new(Arc::clone(&broker), TokenIssuer::new(SECRET)),
        broker,
        ConsumerConfig::default(),
    );

    c.bench_function("consumer/process_valid", |b| {
        b.iter(|| {
            rt.block_on(async {
                assert!(consumer.process(BODY).await.is_created());
            });
        });
    });

    c.bench_function("consumer/process_malformed", |b| {
        b.iter(|| {
            rt.block_on(async {
                assert!(!consumer.process(b"not-json").await.is_created());
            });
        });
    });
}

criterion_group!(benches, bench_issue, bench_verify, bench_process);
criterion_main!(benches);
