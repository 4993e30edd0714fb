use std::sync::Arc;
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use accrete::prelude::*;

const OPS: usize = 1_000;

/// Spawn `threads` threads, each executing `f(tid)`
fn run_threads<F>(threads: usize, f: F)
where
    F: Fn(usize) + Send + Sync + 'static,
{
    let f = Arc::new(f);
    let mut handles = Vec::with_capacity(threads);

    for tid in 0..threads {
        let f = Arc::clone(&f);
        handles.push(thread::spawn(move || f(tid)));
    }

    for h in handles {
        h.join().unwrap();
    }
}

fn push_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("push");

    for &threads in &[1, 2, 4, 8] {
        group.bench_with_input(BenchmarkId::new("flip", threads), &threads, |b, &t| {
            b.iter(|| {
                let vec = Arc::new(FlipVec::<u32>::new(64));
                let handle = Arc::clone(&vec);
                run_threads(t, move |tid| {
                    for _ in 0..OPS {
                        handle.push(tid as u32 + 1);
                    }
                });
                black_box(vec.size());
            });
        });

        group.bench_with_input(BenchmarkId::new("hazard", threads), &threads, |b, &t| {
            b.iter(|| {
                let vec = Arc::new(HazardVec::<u32, 8>::new(64));
                let handle = Arc::clone(&vec);
                run_threads(t, move |tid| {
                    for _ in 0..OPS {
                        handle.push(tid as u32 + 1);
                    }
                });
                black_box(vec.size());
            });
        });

        group.bench_with_input(BenchmarkId::new("paged", threads), &threads, |b, &t| {
            b.iter(|| {
                let vec = Arc::new(PagedVec::<u32, 1024>::new());
                let handle = Arc::clone(&vec);
                run_threads(t, move |tid| {
                    for _ in 0..OPS {
                        handle.push(tid as u32 + 1);
                    }
                });
                black_box(vec.size());
            });
        });

        // ------------------------------------------------------------
        // Baselines: a mutex-guarded Vec and an RCU snapshot vector
        // ------------------------------------------------------------
        group.bench_with_input(BenchmarkId::new("mutex-vec", threads), &threads, |b, &t| {
            b.iter(|| {
                let vec = Arc::new(Mutex::new(Vec::<u32>::with_capacity(64)));
                let handle = Arc::clone(&vec);
                run_threads(t, move |tid| {
                    for _ in 0..OPS {
                        handle.lock().push(tid as u32 + 1);
                    }
                });
                black_box(vec.lock().len());
            });
        });

        group.bench_with_input(
            BenchmarkId::new("arc-swap-rcu", threads),
            &threads,
            |b, &t| {
                b.iter(|| {
                    let vec = Arc::new(ArcSwap::from_pointee(Vec::<u32>::new()));
                    let handle = Arc::clone(&vec);
                    run_threads(t, move |tid| {
                        for _ in 0..OPS {
                            handle.rcu(|current| {
                                let mut next: Vec<u32> = current.iter().copied().collect();
                                next.push(tid as u32 + 1);
                                next
                            });
                        }
                    });
                    black_box(vec.load().len());
                });
            },
        );
    }

    group.finish();
}

fn iter_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("iterate");

    let flip = FlipVec::<u32>::new(64);
    let hazard = HazardVec::<u32, 8>::new(64);
    let paged = PagedVec::<u32, 1024>::new();
    for value in 1..=100_000u32 {
        flip.push(value);
        hazard.push(value);
        paged.push(value);
    }

    group.bench_function("flip", |b| {
        b.iter(|| black_box(flip.iter().map(u64::from).sum::<u64>()));
    });
    group.bench_function("hazard", |b| {
        b.iter(|| black_box(hazard.iter(0).map(u64::from).sum::<u64>()));
    });
    group.bench_function("paged", |b| {
        b.iter(|| black_box(paged.iter().map(u64::from).sum::<u64>()));
    });

    group.finish();
}

criterion_group!(benches, push_bench, iter_bench);
criterion_main!(benches);
