//! Benchmarks for the tracedex indexes and merge engine
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use tempfile::tempdir;
use tracedex::index::{IndexConfig, Indexes};
use tracedex::query::{generic_counts, Conjunction};
use tracedex::storage::*;

const EVENTS: u64 = 50_000;

fn bench_config() -> IndexConfig {
    IndexConfig {
        page_size: 4096,
        page_buffer_size: 4096 * 256,
        page_cache_pages: 256,
        task_size: 1024,
        use_threshold: 10,
        worker_threads: 4,
        behavior_count: 1024,
    }
}

/// Each event lands on thread `id % 4` and depth `id % 7`
fn populate(indexes: &Indexes, events: u64) {
    for id in 0..events {
        let event_id = indexes.register_timestamp(id * 10).unwrap();
        indexes.index_thread((id % 4) as u32, event_id).unwrap();
        indexes.index_depth((id % 7) as u32, event_id).unwrap();
    }
    indexes.flush_tasks().unwrap();
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");
    let tuples: Vec<PlainTuple> = (0..500u64).map(|i| PlainTuple::from_parts(i * 3, None)).collect();
    group.throughput(Throughput::Elements(tuples.len() as u64));

    group.bench_function("encode_500", |b| b.iter(|| encode_page(black_box(&tuples)).unwrap()));

    let encoded = encode_page(&tuples).unwrap();
    group.bench_function("decode_500", |b| {
        b.iter(|| decode_page::<PlainTuple>(black_box(&encoded)).unwrap())
    });

    group.finish();
}

fn bench_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest");
    group.sample_size(10);
    group.throughput(Throughput::Elements(EVENTS));

    group.bench_function("two_dimensions_50k", |b| {
        b.iter_custom(|iters| {
            let mut total = std::time::Duration::ZERO;
            for _ in 0..iters {
                let dir = tempdir().unwrap();
                let indexes = Indexes::open(dir.path(), bench_config()).unwrap();
                let start = std::time::Instant::now();
                populate(&indexes, EVENTS);
                total += start.elapsed();
                indexes.dispose().unwrap();
            }
            total
        })
    });

    group.finish();
}

fn bench_merge(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let indexes = Indexes::open(dir.path(), bench_config()).unwrap();
    populate(&indexes, EVENTS);

    let thread = indexes.get_thread_index(1).unwrap();
    let depth = indexes.get_depth_index(3).unwrap();

    let mut group = c.benchmark_group("merge");

    group.bench_function("conjunction_walk", |b| {
        b.iter(|| {
            let heads = vec![thread.cursor_first(), depth.cursor_first()];
            let mut merged = Conjunction::new(heads, false).unwrap();
            let mut hits = 0u64;
            while merged.next().unwrap().is_some() {
                hits += 1;
            }
            black_box(hits)
        })
    });

    group.bench_function("conjunction_seek", |b| {
        let heads = vec![thread.cursor_first(), depth.cursor_first()];
        let mut merged = Conjunction::new(heads, false).unwrap();
        let mut target = 0u64;
        b.iter(|| {
            target = (target + 7_919) % EVENTS;
            merged.seek(black_box(target)).unwrap();
            black_box(merged.peek_next().unwrap())
        })
    });

    group.finish();
}

fn bench_histogram(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let indexes = Indexes::open(dir.path(), bench_config()).unwrap();
    populate(&indexes, EVENTS);

    let thread = indexes.get_thread_index(2).unwrap();
    let (t1, t2) = (0, EVENTS * 10);

    let mut group = c.benchmark_group("histogram");

    group.bench_function("fast_256", |b| {
        b.iter(|| indexes.fast_counts(black_box(&thread), t1, t2, 256).unwrap())
    });

    group.bench_function("generic_256", |b| {
        b.iter(|| {
            let mut cursor = thread.cursor_first();
            generic_counts(&indexes, &mut cursor, t1, t2, 256).unwrap()
        })
    });

    group.finish();
}

criterion_group!(benches, bench_codec, bench_ingest, bench_merge, bench_histogram);
criterion_main!(benches);
