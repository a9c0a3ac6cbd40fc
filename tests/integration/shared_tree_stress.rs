//! Many threads hammering one `SharedTree`.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use arbor::{ArborError, AtomicRwLock, Locking, Result, SharedTree, Tree};

const NUM_WRITERS: usize = 4;
const NUM_READERS: usize = 4;
const KEYS_PER_WRITER: u32 = 500;

fn record(value: u32) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[..4].copy_from_slice(&value.to_be_bytes());
    out[4..].copy_from_slice(&value.rotate_left(7).to_le_bytes());
    out
}

fn scan(tree: &SharedTree) -> Result<Vec<u32>> {
    let guard = tree.read();
    let mut keys = Vec::with_capacity(guard.len() as usize);
    for payload in guard.iter() {
        let key = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
        assert_eq!(payload, &record(key), "torn payload for key {key}");
        keys.push(key);
    }
    Ok(keys)
}

#[test]
fn writers_and_readers_share_one_tree() -> Result<()> {
    let capacity = NUM_WRITERS as u32 * KEYS_PER_WRITER;
    let tree = Arc::new(SharedTree::new(
        Tree::create(capacity, 8, 4, false)?,
        Locking::Internal,
    ));
    let barrier = Arc::new(Barrier::new(NUM_WRITERS + NUM_READERS));
    let done = Arc::new(AtomicBool::new(false));

    let mut writers = Vec::new();
    for writer in 0..NUM_WRITERS as u32 {
        let tree = Arc::clone(&tree);
        let barrier = Arc::clone(&barrier);
        writers.push(thread::spawn(move || -> Result<()> {
            barrier.wait();
            // Interleaved key spaces so writers contend on the same subtrees.
            for i in 0..KEYS_PER_WRITER {
                tree.insert(&record(i * NUM_WRITERS as u32 + writer))?;
            }
            for i in (0..KEYS_PER_WRITER).filter(|i| i % 2 == 1) {
                tree.remove(&(i * NUM_WRITERS as u32 + writer).to_be_bytes())?;
            }
            Ok(())
        }));
    }

    let mut readers = Vec::new();
    for _ in 0..NUM_READERS {
        let tree = Arc::clone(&tree);
        let barrier = Arc::clone(&barrier);
        let done = Arc::clone(&done);
        readers.push(thread::spawn(move || -> Result<usize> {
            barrier.wait();
            let mut scans = 0;
            while !done.load(Ordering::Acquire) {
                let keys = scan(&tree)?;
                assert!(keys.windows(2).all(|pair| pair[0] < pair[1]));
                match tree.first() {
                    Ok(first) => assert_eq!(first.len(), 8),
                    Err(ArborError::EmptyTree) => {}
                    Err(err) => return Err(err),
                }
                scans += 1;
            }
            Ok(scans)
        }));
    }

    for handle in writers {
        handle.join().expect("writer panicked")?;
    }
    done.store(true, Ordering::Release);
    for handle in readers {
        handle.join().expect("reader panicked")?;
    }

    let expected: BTreeSet<u32> = (0..NUM_WRITERS as u32)
        .flat_map(|writer| {
            (0..KEYS_PER_WRITER)
                .filter(|i| i % 2 == 0)
                .map(move |i| i * NUM_WRITERS as u32 + writer)
        })
        .collect();
    assert_eq!(scan(&tree)?, expected.into_iter().collect::<Vec<_>>());

    let report = tree.verify();
    assert!(report.success, "{:?}", report.findings);
    let counters = tree.counters().snapshot();
    assert_eq!(counters.inserts, u64::from(capacity));
    assert_eq!(counters.removes, u64::from(capacity / 2));
    assert_eq!(tree.lock().snapshot().holders, 0);
    Ok(())
}

#[test]
fn external_lock_serializes_two_trees() -> Result<()> {
    let lock = Arc::new(AtomicRwLock::new());
    let left = Arc::new(SharedTree::new(
        Tree::create(1_000, 8, 4, false)?,
        Locking::External(Arc::clone(&lock)),
    ));
    let right = Arc::new(SharedTree::new(
        Tree::create(1_000, 8, 4, false)?,
        Locking::External(Arc::clone(&lock)),
    ));
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = [Arc::clone(&left), Arc::clone(&right)]
        .into_iter()
        .map(|tree| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || -> Result<()> {
                barrier.wait();
                for value in 0..1_000u32 {
                    tree.insert(&record(value))?;
                }
                Ok(())
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("writer panicked")?;
    }

    assert_eq!(left.stats().live_count, 1_000);
    assert_eq!(right.stats().live_count, 1_000);
    let snapshot = lock.snapshot();
    assert_eq!(snapshot.holders, 0);
    assert!(!snapshot.writer);
    Ok(())
}

#[test]
fn guard_spans_a_compound_read() -> Result<()> {
    let tree = SharedTree::new(Tree::create(16, 8, 4, false)?, Locking::Internal);
    for value in [10u32, 20, 30] {
        tree.insert(&record(value))?;
    }
    let guard = tree.read();
    assert!(tree.try_write().is_none());
    let first = guard.first()?.to_vec();
    let second = guard.next(&first[..4])?;
    assert_eq!(second, &record(20));
    drop(guard);
    assert!(tree.try_write().is_some());
    Ok(())
}
