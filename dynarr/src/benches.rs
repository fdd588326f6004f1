#![cfg(feature = "benchmarks")]

use crate::{ContextOptions, DynArr, Head, Pool, RegionContext, Step};
use criterion::{BatchSize, BenchmarkId, Criterion};
use rand::Rng;
use std::sync::Arc;

pub fn dynarr_benchmark(c: &mut Criterion) {
    set_benchmark(c);
    get_benchmark(c);
    release_benchmark(c);
}

fn pool() -> Pool {
    Pool::new(0, Arc::new(RegionContext::new(ContextOptions::new())))
}

fn release(pool: &Pool, head: &mut Head) {
    let mut arr = DynArr::new(pool, head);
    let mut iter = arr.release_iter();
    while !arr.trim(0, &mut iter).is_done() {}
}

fn set_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("set");
    let pool = pool();

    for n in [1_000u32, 100_000] {
        group.bench_function(BenchmarkId::new("sequential", n), |b| {
            b.iter(|| {
                let mut head = Head::new();
                let mut arr = DynArr::new(&pool, &mut head);
                for pos in 0..n {
                    *arr.set(pos).unwrap() = pos;
                }
                release(&pool, &mut head);
            })
        });

        group.bench_function(BenchmarkId::new("random", n), |b| {
            let mut rand = rand::thread_rng();
            b.iter_batched(
                || (0..n).map(|_| rand.gen_range(0..1 << 24)).collect::<Vec<u32>>(),
                |positions| {
                    let mut head = Head::new();
                    let mut arr = DynArr::new(&pool, &mut head);
                    for pos in positions {
                        *arr.set(pos).unwrap() = pos;
                    }
                    release(&pool, &mut head);
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn get_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");
    let mut rand = rand::thread_rng();
    let pool = pool();

    // one array per depth.
    for top in [200u32, 60_000, 16_000_000, 1 << 31] {
        let mut head = Head::new();
        let mut arr = DynArr::new(&pool, &mut head);
        for _ in 0..1000 {
            let pos = rand.gen_range(0..top);
            *arr.set(pos).unwrap() = pos;
        }
        let levels = arr.head().levels();

        group.bench_function(BenchmarkId::new("levels", levels), |b| {
            b.iter_batched(
                || rand.gen_range(0..top),
                |pos| arr.get(pos).copied(),
                BatchSize::SmallInput,
            )
        });
        release(&pool, &mut head);
    }

    group.finish();
}

fn release_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("release");
    let pool = pool();

    for n in [1_000u32, 100_000] {
        group.bench_function(BenchmarkId::new("surfacing", n), |b| {
            b.iter_batched(
                || {
                    let mut head = Head::new();
                    let mut arr = DynArr::new(&pool, &mut head);
                    for pos in 0..n {
                        *arr.set(pos).unwrap() = pos;
                    }
                    head
                },
                |mut head| {
                    let mut arr = DynArr::new(&pool, &mut head);
                    let mut iter = arr.release_iter();
                    let mut out = 0;
                    while arr.release(&mut iter, &mut out) != Step::Done {}
                    head
                },
                BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}
