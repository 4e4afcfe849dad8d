use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use quadcache::{BatchConfig, BatchingCache, Envelope, IndexConfig, MemorySink, Result, SpatialIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;

fn point_index(max_depth: u8) -> SpatialIndex<u64, (f64, f64), Envelope> {
    SpatialIndex::with_config(
        IndexConfig::default().with_max_depth(max_depth),
        |p: &(f64, f64)| -> Result<Envelope> { Ok(Envelope::from_point(p.0, p.1)) },
    )
    .unwrap()
}

fn random_points(count: usize, seed: u64) -> Vec<(f64, f64)> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| (rng.random_range(-180.0..180.0), rng.random_range(-90.0..90.0)))
        .collect()
}

fn benchmark_index_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_operations");

    let index = point_index(16);
    let points = random_points(10_000, 1);

    // Benchmark upsert of fresh keys
    group.bench_function("upsert", |b| {
        let mut counter = 0u64;
        b.iter(|| {
            let point = points[(counter % 10_000) as usize];
            counter += 1;
            index.upsert(black_box(counter), black_box(&point)).unwrap()
        })
    });

    // Benchmark moving an existing key
    index.upsert(u64::MAX, &(0.0, 0.0)).unwrap();
    group.bench_function("upsert_move", |b| {
        let mut counter = 0usize;
        b.iter(|| {
            let point = points[counter % 10_000];
            counter += 1;
            index.upsert(u64::MAX, black_box(&point)).unwrap()
        })
    });

    group.bench_function("remove_reinsert", |b| {
        b.iter(|| {
            index.remove(black_box(&u64::MAX));
            index.upsert(u64::MAX, &(1.0, 1.0)).unwrap()
        })
    });

    group.finish();
}

fn benchmark_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");

    for size in [1_000usize, 10_000, 100_000] {
        let index = point_index(16);
        for (i, point) in random_points(size, 2).iter().enumerate() {
            index.upsert(i as u64, point).unwrap();
        }

        let city = Envelope::new(-74.5, -73.5, 40.2, 41.2);
        group.bench_with_input(BenchmarkId::new("small_region", size), &size, |b, _| {
            b.iter(|| index.query(black_box(&city)).unwrap())
        });

        let continent = Envelope::new(-130.0, -60.0, 20.0, 55.0);
        group.bench_with_input(BenchmarkId::new("large_region", size), &size, |b, _| {
            b.iter(|| index.query(black_box(&continent)).unwrap())
        });
    }

    group.finish();
}

fn benchmark_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("depth");
    let points = random_points(10_000, 3);
    let region = Envelope::new(-10.0, 10.0, -10.0, 10.0);

    for depth in [4u8, 8, 16, 24] {
        let index = point_index(depth);
        for (i, point) in points.iter().enumerate() {
            index.upsert(i as u64, point).unwrap();
        }

        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| index.query(black_box(&region)).unwrap())
        });
    }

    group.finish();
}

fn benchmark_cache_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_operations");

    for async_mode in [false, true] {
        let label = if async_mode { "async" } else { "sync" };
        let config = BatchConfig::default()
            .with_flush_interval(Duration::ZERO)
            .with_async_mode(async_mode);
        let cache = BatchingCache::new(Arc::new(MemorySink::<u64, u64>::new()), config).unwrap();

        group.bench_function(BenchmarkId::new("put", label), |b| {
            let mut counter = 0u64;
            b.iter(|| {
                counter += 1;
                cache.put(black_box(counter), black_box(counter)).unwrap()
            })
        });

        group.bench_function(BenchmarkId::new("get_staged", label), |b| {
            cache.put(u64::MAX, 1).unwrap();
            b.iter(|| cache.get(black_box(&u64::MAX)).unwrap())
        });
    }

    // Single writes straight to the sink, for comparison with batched puts
    let sink = MemorySink::<u64, u64>::new();
    group.bench_function("sink_direct_put", |b| {
        use quadcache::BackingSink;
        let mut counter = 0u64;
        b.iter(|| {
            counter += 1;
            sink.put(black_box(counter), black_box(counter)).unwrap()
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_index_operations,
    benchmark_query,
    benchmark_depth,
    benchmark_cache_operations
);
criterion_main!(benches);
