use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use resumable_sampler::sampler::{PretrainingRandomSampler, PretrainingSampler, Sampler};
use resumable_sampler::{RankAssignment, SizeBatchLimits, SizeBatching, TokenBudgetBatcher};

/// Benchmarks for building and draining one rank's share of an epoch.
///
/// This measures:
/// 1. Natural vs shuffled order: the cost of the per-epoch permutation
/// 2. Resumption: draining the rest of an epoch from its midpoint
/// 3. Size-aware batching: ordering plus token-budget grouping
///
/// To run these, use:
/// ```bash
/// cargo bench -p resumable_sampler
/// ```

/// All benchmarks sweep across dataset sizes from 10K to 1M samples.
const SIZES: [usize; 3] = [10_000, 100_000, 1_000_000];
const MICRO_BATCH_SIZE: usize = 32;
const WORLD_SIZE: usize = 8;

fn assignment() -> RankAssignment {
    RankAssignment::new(3, WORLD_SIZE).unwrap()
}

fn bench_epoch(c: &mut Criterion) {
    let mut group = c.benchmark_group("Epoch");

    for &size in &SIZES {
        group.throughput(Throughput::Elements((size / WORLD_SIZE) as u64));

        group.bench_with_input(BenchmarkId::new("single", size), &size, |b, &size| {
            b.iter(|| {
                let sampler = PretrainingSampler::new(size, 0, MICRO_BATCH_SIZE, assignment())
                    .unwrap();
                black_box(sampler.iter().map(|batch| batch.len()).sum::<usize>())
            })
        });

        group.bench_with_input(BenchmarkId::new("random", size), &size, |b, &size| {
            b.iter(|| {
                let sampler =
                    PretrainingRandomSampler::new(size, 0, MICRO_BATCH_SIZE, assignment(), 7)
                        .unwrap();
                black_box(sampler.iter().map(|batch| batch.len()).sum::<usize>())
            })
        });

        group.bench_with_input(BenchmarkId::new("random+resume", size), &size, |b, &size| {
            let consumed = (size / 2) as u64;
            b.iter(|| {
                let sampler =
                    PretrainingRandomSampler::new(size, consumed, MICRO_BATCH_SIZE, assignment(), 7)
                        .unwrap();
                black_box(sampler.iter().count())
            })
        });
    }
    group.finish();
}

fn bench_size_batching(c: &mut Criterion) {
    let mut group = c.benchmark_group("Size Batching");
    let limits = SizeBatchLimits::new(4096, MICRO_BATCH_SIZE, 8).unwrap();

    for &size in &SIZES {
        let batcher = TokenBudgetBatcher::new((0..size).map(|i| 16 + (i * 31) % 496).collect());
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("batch_by_size", size), &batcher, |b, batcher| {
            b.iter(|| {
                let indices = batcher.ordered_indices();
                black_box(batcher.batch_by_size(&indices, &limits).unwrap().len())
            })
        });
    }
    group.finish();
}

criterion_group!(
    name = benches;
    config = Criterion::default()
        .warm_up_time(std::time::Duration::from_secs(2))
        .measurement_time(std::time::Duration::from_secs(5))
        .sample_size(50);
    targets = bench_epoch, bench_size_batching
);
criterion_main!(benches);
