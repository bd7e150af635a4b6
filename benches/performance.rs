//! Performance benchmarks for the merge buffer.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use stream_consumer::{MergeBuffer, Message};

fn messages(count: u64) -> Vec<Message> {
    // Interleave two halves so inserts land out of order.
    (0..count)
        .map(|i| {
            let offset = if i % 2 == 0 { i } else { count + i };
            Message::text(format!("m{}", i), offset, "alice", "bob", "payload")
        })
        .collect()
}

/// Benchmark one-at-a-time inserts with out-of-order offsets
fn bench_single_inserts(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_inserts");

    for size in [100u64, 1000, 5000] {
        let batch = messages(size);
        group.bench_with_input(BenchmarkId::new("messages", size), &batch, |b, batch| {
            b.iter(|| {
                let mut buffer = MergeBuffer::new();
                for message in batch.iter().cloned() {
                    buffer.insert(message);
                }
                black_box(buffer.len());
            });
        });
    }

    group.finish();
}

/// Benchmark batch inserts (one sort pass per batch)
fn bench_batch_inserts(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_inserts");

    for size in [100u64, 1000, 5000] {
        let batch = messages(size);
        group.bench_with_input(BenchmarkId::new("messages", size), &batch, |b, batch| {
            b.iter(|| {
                let mut buffer = MergeBuffer::new();
                buffer.insert_batch(batch.iter().cloned());
                black_box(buffer.len());
            });
        });
    }

    group.finish();
}

/// Benchmark re-polling a window that is mostly already buffered
fn bench_duplicate_polls(c: &mut Criterion) {
    let mut group = c.benchmark_group("duplicate_polls");

    for size in [100u64, 1000] {
        let batch = messages(size);
        let mut seeded = MergeBuffer::new();
        seeded.insert_batch(batch.iter().cloned());

        group.bench_with_input(BenchmarkId::new("messages", size), &batch, |b, batch| {
            b.iter(|| {
                let mut buffer = seeded.clone();
                black_box(buffer.insert_batch(batch.iter().cloned()));
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_single_inserts,
    bench_batch_inserts,
    bench_duplicate_polls
);
criterion_main!(benches);
