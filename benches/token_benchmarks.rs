use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use keyseal::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn manager<E: EncryptionEngine>(engine: E, max_history: usize) -> KeyManager<E> {
    KeyManager::new_issuer(
        KeyManagerConfig::new(Duration::from_secs(3600), Some(max_history)),
        Arc::new(InMemoryKeyStore::new()),
        engine,
    )
    .unwrap()
}

fn symmetric_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("symmetric");

    for size in [64usize, 1024, 16 * 1024].iter() {
        let manager = manager(SymmetricEngine::new(), 5);
        let payload = vec![0x5a; *size];
        let token = manager.encrypt(&payload, &EncryptOptions::new()).unwrap();

        group.bench_with_input(BenchmarkId::new("encrypt", size), size, |b, _| {
            b.iter(|| manager.encrypt(&payload, &EncryptOptions::new()))
        });
        group.bench_with_input(BenchmarkId::new("decrypt", size), size, |b, _| {
            b.iter(|| manager.decrypt(&token))
        });
    }

    // Worst case trial decryption: the token's key is the oldest retained one
    for depth in [1usize, 4, 16].iter() {
        let manager = manager(SymmetricEngine::new(), *depth);
        let token = manager.encrypt(b"old token", &EncryptOptions::new()).unwrap();
        for _ in 0..*depth {
            manager.rotate_key().unwrap();
        }

        group.bench_with_input(BenchmarkId::new("decrypt_history", depth), depth, |b, _| {
            b.iter(|| manager.decrypt(&token))
        });
    }

    group.finish();
}

fn asymmetric_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("asymmetric");
    let service = TokenService::new(Arc::new(manager(AsymmetricEngine::new(), 5)));
    let claims = Claims::new().with("sub", "bench-user").with("role", "reader");
    let token = service.issue(&claims, None).unwrap();

    group.bench_function("issue", |b| b.iter(|| service.issue(&claims, None)));
    group.bench_function("parse", |b| b.iter(|| service.parse(&token)));
    group.bench_function("rotate", |b| b.iter(|| service.manager().rotate_key()));

    group.finish();
}

criterion_group!(benches, symmetric_benchmarks, asymmetric_benchmarks);
criterion_main!(benches);
