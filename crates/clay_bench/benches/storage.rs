//! Key-value backend benchmarks.

use clay_bench::random_word;
use clay_storage::{glob_match, InMemoryBackend, KeyValueBackend};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

/// Benchmark atomic increments.
fn bench_increment(c: &mut Criterion) {
    let backend = InMemoryBackend::new();
    c.bench_function("inmemory_increment", |b| {
        b.iter(|| black_box(backend.increment("clay:User:count").unwrap()));
    });
}

/// Benchmark hash writes and reads.
fn bench_hash(c: &mut Criterion) {
    let backend = InMemoryBackend::new();
    let fields: Vec<(String, String)> = (0..8)
        .map(|i| (format!("field_{i}"), random_word(32)))
        .collect();

    c.bench_function("inmemory_hash_set", |b| {
        b.iter(|| backend.hash_set_fields("clay:User:id:1", black_box(&fields)).unwrap());
    });
    c.bench_function("inmemory_hash_get_all", |b| {
        b.iter(|| black_box(backend.hash_get_all("clay:User:id:1").unwrap()));
    });
}

/// Benchmark key pattern scans.
fn bench_keys_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("inmemory_keys_matching");

    for count in [100, 1000, 10_000].iter() {
        let backend = InMemoryBackend::new();
        for id in 1..=*count {
            backend.set(&format!("clay:User:id:{id}"), "x").unwrap();
        }
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, _| {
            b.iter(|| black_box(backend.keys_matching("clay:User:id:*").unwrap()));
        });
    }
    group.finish();
}

/// Benchmark the glob matcher alone.
fn bench_glob(c: &mut Criterion) {
    c.bench_function("glob_match", |b| {
        b.iter(|| {
            black_box(glob_match(
                black_box("clay:User:indexes:email:*"),
                black_box("clay:User:indexes:email:zach@yipit.com"),
            ))
        });
    });
}

criterion_group!(benches, bench_increment, bench_hash, bench_keys_matching, bench_glob);
criterion_main!(benches);
