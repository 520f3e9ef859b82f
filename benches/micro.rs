//! Micro-benchmarks for blobcask core operations.
//!
//! Uses Criterion for statistically rigorous measurement with regression
//! detection and HTML reports.
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench micro              # run all micro-benchmarks
//! cargo bench --bench micro -- put       # filter by name
//! ```
//!
//! Reports are generated in `target/criterion/report/index.html`.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use blobcask::{Store, StoreConfig, open};
use tempfile::TempDir;

// ------------------------------------------------------------------------------------------------
// Helpers
// ------------------------------------------------------------------------------------------------

/// Default value payload (128 bytes).
const VALUE_128B: &[u8; 128] = &[0xAB; 128];

/// Larger value payload (64 KiB), closer to a columnar chunk.
const VALUE_64K: &[u8; 65536] = &[0xCD; 65536];

/// Format a zero-padded key.
fn make_key(i: u64) -> Vec<u8> {
    format!("key-{i:012}").into_bytes()
}

/// Open a fresh store with a large write buffer so nothing rotates during
/// measurement.
fn open_memtable_only(dir: &std::path::Path) -> Box<dyn Store> {
    open(
        dir,
        true,
        StoreConfig {
            write_buffer_size: 256 * 1024 * 1024,
            ..StoreConfig::default()
        },
    )
    .expect("open")
}

/// Open a fresh store with a small write buffer so rotations and
/// background flushes happen continuously.
fn open_small_buffer(dir: &std::path::Path) -> Box<dyn Store> {
    open(
        dir,
        true,
        StoreConfig {
            write_buffer_size: 256 * 1024,
            file_pool_size: 4,
            ..StoreConfig::default()
        },
    )
    .expect("open")
}

/// Pre-populate a store with `count` sequential keys, barrier, and close,
/// so tables exist on disk.
fn prepopulate(dir: &std::path::Path, count: u64, value: &[u8]) {
    let store = open_small_buffer(dir);
    for i in 0..count {
        store.put(&make_key(i), value, false).unwrap();
    }
    store.write_barrier().unwrap();
    store.close().unwrap();
}

// ================================================================================================
// Write benchmarks
// ================================================================================================

/// Raw `put` cost into the active memtable, no rotations, two payload
/// sizes. This is the hot path of the intended workload.
fn bench_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("put");

    for (label, value) in [("128B", VALUE_128B.as_slice()), ("64K", VALUE_64K.as_slice())] {
        group.throughput(Throughput::Bytes(value.len() as u64));
        group.bench_function(BenchmarkId::new("memtable_only", label), |b| {
            let dir = TempDir::new().unwrap();
            let store = open_memtable_only(dir.path());
            let mut i = 0u64;
            b.iter(|| {
                store.put(&make_key(i), black_box(value), false).unwrap();
                i += 1;
            });
            store.close().unwrap();
        });
    }

    // Sustained writes through rotations, backpressure, and background
    // flushes.
    group.throughput(Throughput::Bytes(VALUE_128B.len() as u64));
    group.bench_function("sequential_with_flush", |b| {
        let dir = TempDir::new().unwrap();
        let store = open_small_buffer(dir.path());
        let mut i = 0u64;
        b.iter(|| {
            store
                .put(&make_key(i), black_box(VALUE_128B.as_slice()), false)
                .unwrap();
            i += 1;
        });
        store.close().unwrap();
    });

    group.finish();
}

/// Cost of the durability point itself: one small write followed by a
/// write barrier.
fn bench_write_barrier(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_barrier");
    group.sample_size(20);

    group.bench_function("put_and_barrier", |b| {
        let dir = TempDir::new().unwrap();
        let store = open_small_buffer(dir.path());
        let mut i = 0u64;
        b.iter(|| {
            store.put(&make_key(i), VALUE_128B, false).unwrap();
            store.write_barrier().unwrap();
            i += 1;
        });
        store.close().unwrap();
    });

    group.finish();
}

// ================================================================================================
// Read benchmarks
// ================================================================================================

/// Point lookups against data that lives on disk: binary search in the
/// per-table index plus one positioned read per hit.
fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");

    group.bench_function("hit_from_tables", |b| {
        let dir = TempDir::new().unwrap();
        prepopulate(dir.path(), 10_000, VALUE_128B);
        let store = open(dir.path(), false, StoreConfig::default()).unwrap();
        let mut i = 0u64;
        b.iter(|| {
            let key = make_key(i % 10_000);
            black_box(store.get(&key).unwrap());
            i += 1;
        });
        store.close().unwrap();
    });

    group.bench_function("miss", |b| {
        let dir = TempDir::new().unwrap();
        prepopulate(dir.path(), 10_000, VALUE_128B);
        let store = open(dir.path(), false, StoreConfig::default()).unwrap();
        b.iter(|| {
            black_box(store.get(b"absent-key").unwrap());
        });
        store.close().unwrap();
    });

    group.bench_function("hit_from_memtable", |b| {
        let dir = TempDir::new().unwrap();
        let store = open_memtable_only(dir.path());
        for i in 0..1_000 {
            store.put(&make_key(i), VALUE_128B, false).unwrap();
        }
        let mut i = 0u64;
        b.iter(|| {
            let key = make_key(i % 1_000);
            black_box(store.get(&key).unwrap());
            i += 1;
        });
        store.close().unwrap();
    });

    group.finish();
}

/// Prefix scans over a keyspace split into a few hundred groups.
fn bench_get_prefix(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_prefix");
    group.sample_size(20);

    group.bench_function("group_of_100", |b| {
        let dir = TempDir::new().unwrap();
        {
            let store = open_small_buffer(dir.path());
            for g in 0..100u64 {
                for i in 0..100u64 {
                    let key = format!("group-{g:04}/item-{i:04}");
                    store.put(key.as_bytes(), VALUE_128B, false).unwrap();
                }
            }
            store.write_barrier().unwrap();
            store.close().unwrap();
        }
        let store = open(dir.path(), false, StoreConfig::default()).unwrap();
        let mut g = 0u64;
        b.iter(|| {
            let prefix = format!("group-{:04}/", g % 100);
            black_box(store.get_prefix(prefix.as_bytes()).unwrap());
            g += 1;
        });
        store.close().unwrap();
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_put,
    bench_write_barrier,
    bench_get,
    bench_get_prefix
);
criterion_main!(benches);
