use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tsflux_core::series::{CreateOptions, Series};
use tsflux_core::DuplicatePolicy;

const SAMPLES: u64 = 10_000;

fn options(uncompressed: bool) -> CreateOptions {
    let options = CreateOptions::default();
    if uncompressed {
        options.uncompressed()
    } else {
        options
    }
}

fn filled(uncompressed: bool) -> Series {
    let mut series = Series::new("bench", options(uncompressed));
    for ts in 0..SAMPLES {
        series.add_sample(ts * 1000, (ts % 100) as f64).unwrap();
    }
    series
}

fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");
    group.throughput(Throughput::Elements(SAMPLES));
    for uncompressed in [false, true] {
        let name = if uncompressed { "uncompressed" } else { "compressed" };
        group.bench_function(BenchmarkId::from_parameter(name), |b| {
            b.iter(|| black_box(filled(uncompressed)));
        });
    }
    group.finish();
}

fn bench_backfill(c: &mut Criterion) {
    let mut stamps: Vec<u64> = (0..SAMPLES / 10).map(|i| i * 1000 + 500).collect();
    stamps.shuffle(&mut StdRng::seed_from_u64(42));

    let mut group = c.benchmark_group("backfill_upsert");
    group.throughput(Throughput::Elements(stamps.len() as u64));
    for uncompressed in [false, true] {
        let name = if uncompressed { "uncompressed" } else { "compressed" };
        group.bench_function(BenchmarkId::from_parameter(name), |b| {
            b.iter_batched(
                || filled(uncompressed),
                |mut series| {
                    for ts in &stamps {
                        series
                            .upsert_sample(*ts, 1.0, DuplicatePolicy::Last, DuplicatePolicy::Block)
                            .unwrap();
                    }
                    series
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_range(c: &mut Criterion) {
    let mut group = c.benchmark_group("range_scan");
    group.throughput(Throughput::Elements(SAMPLES));
    for uncompressed in [false, true] {
        let series = filled(uncompressed);
        let name = if uncompressed { "uncompressed" } else { "compressed" };
        group.bench_function(BenchmarkId::from_parameter(name), |b| {
            b.iter(|| black_box(series.range(0, u64::MAX, false).unwrap().len()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_append, bench_backfill, bench_range);
criterion_main!(benches);
