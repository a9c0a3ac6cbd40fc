use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use serde::Serialize;

/// Live record count and memory footprint of a tree.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TreeStats {
    /// Number of records currently stored.
    pub live_count: u32,
    /// Bytes of physically committed node storage.
    pub physical_bytes: usize,
    /// Bytes of reserved address space.
    pub virtual_bytes: usize,
}

/// Snapshot of tree operation counters at a point in time.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CountersSnapshot {
    /// Successful inserts
    pub inserts: u64,
    /// Successful removals
    pub removes: u64,
    /// Single left or right rotations
    pub single_rotations: u64,
    /// Left-right and right-left double rotations
    pub double_rotations: u64,
    /// Removals that moved the last slot into a vacated one
    pub relocations: u64,
}

/// Thread-safe operation counters, readable without holding the tree lock.
#[derive(Default, Debug)]
pub struct TreeCounters {
    inserts: AtomicU64,
    removes: AtomicU64,
    single_rotations: AtomicU64,
    double_rotations: AtomicU64,
    relocations: AtomicU64,
}

impl TreeCounters {
    /// Returns the number of successful inserts.
    pub fn inserts(&self) -> u64 {
        self.inserts.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of successful removals.
    pub fn removes(&self) -> u64 {
        self.removes.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of single rotations performed.
    pub fn single_rotations(&self) -> u64 {
        self.single_rotations.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of double rotations performed.
    pub fn double_rotations(&self) -> u64 {
        self.double_rotations.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of slot relocations performed by removals.
    pub fn relocations(&self) -> u64 {
        self.relocations.load(AtomicOrdering::Relaxed)
    }

    pub(crate) fn inc_inserts(&self) {
        self.inserts.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_removes(&self) {
        self.removes.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_single_rotations(&self) {
        self.single_rotations.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_double_rotations(&self) {
        self.double_rotations.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_relocations(&self) {
        self.relocations.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Creates a snapshot of all current counters.
    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            inserts: self.inserts(),
            removes: self.removes(),
            single_rotations: self.single_rotations(),
            double_rotations: self.double_rotations(),
            relocations: self.relocations(),
        }
    }

    /// Emits current counters to the tracing infrastructure.
    pub fn emit_tracing(&self) {
        let snapshot = self.snapshot();
        tracing::info!(
            target: "arbor::avl::stats",
            inserts = snapshot.inserts,
            removes = snapshot.removes,
            single_rotations = snapshot.single_rotations,
            double_rotations = snapshot.double_rotations,
            relocations = snapshot.relocations,
            "avl counters snapshot"
        );
    }
}
