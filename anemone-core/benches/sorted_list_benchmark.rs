//! Benchmark comparing the lock-free sorted list against:
//! - a Mutex-wrapped std BinaryHeap
//! - crossbeam-skiplist's SkipMap (insert + pop_front)
//! - the sequential Heap (uncontended baseline)
//!
//! Run with: cargo bench --package anemone-core --bench sorted_list_benchmark

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex};
use std::thread;

use criterion::black_box;
use criterion::criterion_group;
use criterion::criterion_main;
use criterion::BenchmarkId;
use criterion::Criterion;
use crossbeam_skiplist::SkipMap;
use mimalloc::MiMalloc;

use anemone_core::{Heap, SortedList};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const OPS_PER_THREAD: usize = 10_000;

/// Deterministic key sequence shared by all contenders.
fn key(thread: usize, i: usize) -> u64 {
    let x = (thread * OPS_PER_THREAD + i) as u64;
    x.wrapping_mul(0x9e37_79b9_7f4a_7c15).rotate_left(17)
}

// ============================================================================
// Sequential insert + drain
// ============================================================================

fn bench_sequential_insert_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequential_insert_drain");

    group.bench_function("sorted_list", |b| {
        b.iter(|| {
            let list: SortedList<u64, u64> = SortedList::new();
            for i in 0..OPS_PER_THREAD {
                list.insert(key(0, i), i as u64);
            }
            while let Some(v) = list.try_pop() {
                black_box(v);
            }
        })
    });

    group.bench_function("heap", |b| {
        b.iter(|| {
            let mut heap: Heap<u64, u64> = Heap::new();
            for i in 0..OPS_PER_THREAD {
                heap.push(key(0, i), i as u64);
            }
            while let Some(v) = heap.try_pop() {
                black_box(v);
            }
        })
    });

    group.bench_function("mutex_binary_heap", |b| {
        b.iter(|| {
            let heap: Mutex<BinaryHeap<Reverse<(u64, u64)>>> = Mutex::new(BinaryHeap::new());
            for i in 0..OPS_PER_THREAD {
                heap.lock().unwrap().push(Reverse((key(0, i), i as u64)));
            }
            while let Some(Reverse(v)) = heap.lock().unwrap().pop() {
                black_box(v);
            }
        })
    });

    group.finish();
}

// ============================================================================
// Contended producers + consumers
// ============================================================================

fn run_sorted_list(threads: usize) {
    let list: Arc<SortedList<u64, u64>> = Arc::new(SortedList::new());
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let list = Arc::clone(&list);
            thread::spawn(move || {
                for i in 0..OPS_PER_THREAD {
                    list.insert(key(t, i), i as u64);
                }
                for _ in 0..OPS_PER_THREAD {
                    black_box(list.try_pop());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

fn run_mutex_heap(threads: usize) {
    let heap: Arc<Mutex<BinaryHeap<Reverse<(u64, u64)>>>> = Arc::new(Mutex::new(BinaryHeap::new()));
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let heap = Arc::clone(&heap);
            thread::spawn(move || {
                for i in 0..OPS_PER_THREAD {
                    heap.lock().unwrap().push(Reverse((key(t, i), i as u64)));
                }
                for _ in 0..OPS_PER_THREAD {
                    black_box(heap.lock().unwrap().pop());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

fn run_skip_map(threads: usize) {
    let map: Arc<SkipMap<u64, u64>> = Arc::new(SkipMap::new());
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let map = Arc::clone(&map);
            thread::spawn(move || {
                for i in 0..OPS_PER_THREAD {
                    map.insert(key(t, i), i as u64);
                }
                for _ in 0..OPS_PER_THREAD {
                    black_box(map.pop_front());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

fn bench_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_insert_pop");
    group.sample_size(10);

    for threads in [2, 4, 8] {
        group.bench_with_input(
            BenchmarkId::new("sorted_list", threads),
            &threads,
            |b, &threads| b.iter(|| run_sorted_list(threads)),
        );
        group.bench_with_input(
            BenchmarkId::new("mutex_binary_heap", threads),
            &threads,
            |b, &threads| b.iter(|| run_mutex_heap(threads)),
        );
        group.bench_with_input(
            BenchmarkId::new("skip_map", threads),
            &threads,
            |b, &threads| b.iter(|| run_skip_map(threads)),
        );
    }

    group.finish();
}

criterion_group!(benches, bench_sequential_insert_drain, bench_contended);
criterion_main!(benches);
