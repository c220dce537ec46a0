//! Buffer pool benchmarks
//!
//! Benchmarks the directory hit path and the miss/eviction path across
//! different pool sizes.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use tempfile::tempdir;

use ferro_common::types::PageNo;
use ferro_storage::{BufferPool, DiskFile, PageFile};

fn setup(dir: &tempfile::TempDir, num_pages: usize) -> (Arc<dyn PageFile>, Vec<PageNo>) {
    let file = Arc::new(DiskFile::create(dir.path().join("bench.db")).unwrap());
    let pages = (0..num_pages)
        .map(|_| file.allocate_page().unwrap().page_no())
        .collect();
    (file, pages)
}

fn read_hit(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let (file, pages) = setup(&dir, 8);
    let pool = BufferPool::new(16);

    // Warm the pool so every read below is a directory hit.
    for &p in &pages {
        pool.read_page(&file, p).unwrap();
        pool.unpin_page(&file, p, false).unwrap();
    }

    c.bench_function("read_hit", |b| {
        b.iter(|| {
            for &p in &pages {
                let handle = pool.read_page(&file, p).unwrap();
                criterion::black_box(handle.read().data()[0]);
                pool.unpin_page(&file, p, false).unwrap();
            }
        })
    });
}

fn miss_with_eviction(c: &mut Criterion) {
    let mut group = c.benchmark_group("miss_with_eviction");

    for num_frames in [4, 16, 64] {
        let dir = tempdir().unwrap();
        let (file, pages) = setup(&dir, num_frames * 2);
        let pool = BufferPool::new(num_frames);

        group.bench_with_input(
            BenchmarkId::from_parameter(num_frames),
            &num_frames,
            |b, _| {
                // Twice as many pages as frames: every sweep through the
                // page set turns the whole pool over.
                b.iter(|| {
                    for &p in &pages {
                        pool.read_page(&file, p).unwrap();
                        pool.unpin_page(&file, p, false).unwrap();
                    }
                })
            },
        );
    }

    group.finish();
}

fn dirty_write_back(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let (file, pages) = setup(&dir, 8);
    let pool = BufferPool::new(4);

    c.bench_function("dirty_write_back", |b| {
        b.iter(|| {
            for &p in &pages {
                let handle = pool.read_page(&file, p).unwrap();
                handle.write().data_mut()[0] ^= 1;
                drop(handle);
                pool.unpin_page(&file, p, true).unwrap();
            }
        })
    });
}

criterion_group!(benches, read_hit, miss_with_eviction, dirty_write_back);
criterion_main!(benches);
