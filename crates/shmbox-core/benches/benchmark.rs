//! Performance benchmarks for shmbox
//!
//! Run with: cargo bench --package shmbox-core

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use shmbox_core::{MailboxArray, SegmentManager, SegmentName, MESSAGE_CAPACITY, SLOT_SIZE};
use tempfile::TempDir;

/// Fresh segment names under `dir`, one per call
fn names_in(dir: &TempDir) -> impl FnMut() -> SegmentName + '_ {
    let mut next = 0u64;
    move || {
        next += 1;
        SegmentName::new(dir.path().join(format!("bench_{}.shm", next))).unwrap()
    }
}

fn bench_anonymous_create_destroy(c: &mut Criterion) {
    let manager = SegmentManager::new();
    let mut group = c.benchmark_group("anonymous_create_destroy");

    for size in [SLOT_SIZE, 8 * SLOT_SIZE, 1048576].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let shm = manager.create_anonymous(size).unwrap();
                manager.destroy(black_box(shm)).unwrap();
            });
        });
    }
    group.finish();
}

fn bench_named_create_destroy(c: &mut Criterion) {
    let manager = SegmentManager::new();
    let dir = TempDir::new().unwrap();
    let mut next_name = names_in(&dir);
    c.bench_function("named_create_destroy", |b| {
        b.iter_batched(
            &mut next_name,
            |name| {
                let shm = manager.create_named(8 * SLOT_SIZE, &name).unwrap();
                manager.destroy(black_box(shm)).unwrap();
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

fn bench_named_attach(c: &mut Criterion) {
    let manager = SegmentManager::new();
    let dir = TempDir::new().unwrap();
    let name = SegmentName::new(dir.path().join("attach.shm")).unwrap();
    let owner = manager.create_named(8 * SLOT_SIZE, &name).unwrap();

    c.bench_function("named_attach", |b| {
        b.iter(|| {
            let shm = manager.attach(&name).unwrap();
            manager.detach(black_box(shm)).unwrap();
        });
    });

    manager.destroy(owner).unwrap();
}

fn bench_put_take(c: &mut Criterion) {
    let manager = SegmentManager::new();
    let shm = manager.create_anonymous(8 * SLOT_SIZE).unwrap();
    let boxes = MailboxArray::new(&shm, 8).unwrap();

    let mut group = c.benchmark_group("put_take");
    for len in [22, 256, MESSAGE_CAPACITY].iter() {
        let msg = "m".repeat(*len);
        group.throughput(Throughput::Bytes(*len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &msg, |b, msg| {
            b.iter(|| {
                boxes.put(3, msg).unwrap();
                black_box(boxes.try_take(3).unwrap());
            });
        });
    }
    group.finish();

    c.bench_function("empty_sweep", |b| {
        b.iter(|| {
            for i in 0..boxes.len() {
                black_box(boxes.try_take(i).unwrap());
            }
        });
    });

    drop(boxes);
    manager.destroy(shm).unwrap();
}

criterion_group!(
    benches,
    bench_anonymous_create_destroy,
    bench_named_create_destroy,
    bench_named_attach,
    bench_put_take
);
criterion_main!(benches);
