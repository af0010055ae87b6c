//! Benchmarks for bucketing, ingestion and iteration
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use linkbucket::*;
use std::sync::Arc;
use tempfile::tempdir;

fn create_test_events(count: usize) -> Vec<Event> {
    (0..count)
        .map(|i| Event::new(1_700_000_000 + i as i64 * 7, format!("link-{}", i % 1001)))
        .collect()
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");

    let lines: Vec<RawRecord> = create_test_events(10_000)
        .into_iter()
        .map(|e| RawRecord::Line(format!("{},{}", e.time, e.link)))
        .collect();
    let parser = Parser::new(300).unwrap();

    group.throughput(Throughput::Elements(lines.len() as u64));
    group.bench_function("parse_lines_10000", |b| {
        b.iter(|| {
            for raw in &lines {
                black_box(parser.parse(black_box(raw)).unwrap());
            }
        })
    });

    group.finish();
}

fn bench_ingest(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let width = BucketWidth::new(300).unwrap();

    let mut group = c.benchmark_group("ingest");

    for size in [1_000, 10_000] {
        let events = create_test_events(size);
        group.throughput(Throughput::Elements(size as u64));

        group.bench_function(format!("memory_{}", size), |b| {
            b.iter_custom(|iters| {
                rt.block_on(async {
                    let store = Arc::new(MemoryStore::new());
                    let pipeline = IngestPipeline::new(store, width);

                    let start = std::time::Instant::now();
                    for _ in 0..iters {
                        pipeline.ingest(events.clone()).await.unwrap();
                    }
                    start.elapsed()
                })
            });
        });

        group.bench_function(format!("sqlite_{}", size), |b| {
            b.iter_custom(|iters| {
                rt.block_on(async {
                    let dir = tempdir().unwrap();
                    let store = Arc::new(SqliteStore::open(dir.path().join("bench.db")).unwrap());
                    let pipeline = IngestPipeline::new(store, width);

                    let start = std::time::Instant::now();
                    for _ in 0..iters {
                        pipeline.ingest(events.clone()).await.unwrap();
                    }
                    start.elapsed()
                })
            });
        });
    }

    group.finish();
}

fn bench_iterate(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let width = BucketWidth::new(300).unwrap();

    let mut group = c.benchmark_group("iterate");

    group.bench_function("memory_overlap_50000", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let store = Arc::new(MemoryStore::new().with_page_size(50).with_overlap(10));
                IngestPipeline::new(store.clone(), width)
                    .ingest(create_test_events(50_000))
                    .await
                    .unwrap();
                let iterator = BucketIterator::new(store);

                let start = std::time::Instant::now();
                for _ in 0..iters {
                    let mut pairs = 0usize;
                    iterator.iterate(|_, _| pairs += 1).await.unwrap();
                    black_box(pairs);
                }
                start.elapsed()
            })
        });
    });

    group.finish();
}

criterion_group!(benches, bench_parse, bench_ingest, bench_iterate);
criterion_main!(benches);
