//! Many threads sharing one engine and one cache directory.

mod common;

use std::fs;
use std::sync::Barrier;
use std::thread;

use common::{FakeRuntime, Harness, device};
use progcache_core::{BinaryStore, CacheEntry, CacheError, FileSystemStore};

const THREADS: usize = 8;

#[test]
fn test_racing_misses_leave_one_valid_entry() {
    let h = Harness::new();
    let barrier = Barrier::new(THREADS);
    let devices = [device("D0"), device("D1")];

    let programs: Vec<_> = thread::scope(|s| {
        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    h.engine.get(h.handle, "K1", &devices, &())
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    for program in &programs {
        let program = program.as_ref().unwrap();
        assert_eq!(
            program.binaries[0],
            FakeRuntime::binary_for(&device("D0"), "", "K1")
        );
    }

    let compiles = h.runtime().compiles();
    assert!((1..=THREADS).contains(&compiles));

    let files = h.files_in("derived");
    assert_eq!(files.len(), 1, "unexpected files: {files:?}");
    assert!(files[0].ends_with(".clbin"));
    let bytes = fs::read(h.dir.path().join("derived").join(&files[0])).unwrap();
    assert!(CacheEntry::decode(&bytes).is_ok());
}

#[test]
fn test_parallel_distinct_kernels() {
    let h = Harness::new();
    let devices = [device("D0")];

    thread::scope(|s| {
        for i in 0..THREADS {
            let (h, devices) = (&h, &devices);
            s.spawn(move || {
                let source = format!("kernel_{i}");
                h.engine.get(h.handle, &source, devices, &()).unwrap();
                h.engine.get(h.handle, &source, devices, &()).unwrap();
            });
        }
    });

    assert_eq!(h.runtime().compiles(), THREADS);
    assert_eq!(h.engine.stats().hits, THREADS as u64);
    assert_eq!(h.files_in("derived").len(), THREADS);
}

#[test]
fn test_concurrent_tag_writers_and_readers() {
    let h = Harness::new();
    let devices = [device("D0")];
    let program = h.engine.get(h.handle, "K1", &devices, &()).unwrap();
    h.engine
        .put_with_tag(h.handle, "hot", &devices, &program)
        .unwrap();

    thread::scope(|s| {
        for i in 0..THREADS {
            let (h, devices, program) = (&h, &devices, &program);
            s.spawn(move || {
                for _ in 0..20 {
                    if i % 2 == 0 {
                        h.engine
                            .put_with_tag(h.handle, "hot", devices, program)
                            .unwrap();
                    } else {
                        // Readers see a whole entry, never a partial one.
                        match h.engine.get_with_tag(h.handle, "hot", devices, &()) {
                            Ok(loaded) => assert_eq!(loaded.binaries, program.binaries),
                            Err(e @ CacheError::CorruptEntry { .. }) => {
                                panic!("read a partial entry: {e}")
                            }
                            Err(e) => panic!("unexpected error: {e}"),
                        }
                    }
                }
            });
        }
    });

    let store = FileSystemStore::open(h.dir.path()).unwrap();
    assert_eq!(store.keys().unwrap().len(), 2);
    assert_eq!(h.files_in("tagged").len(), 1);
}
