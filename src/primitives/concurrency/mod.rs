//! Reader/writer lock packed into a single atomic word.
//!
//! The word holds a holder count in its low 29 bits, a writer-owns flag, a
//! waiter-present flag and a writer-queued flag. A writer that has to wait
//! sets the queued flag first, which turns new readers away until that writer
//! gets in, so a writer behind a stream of readers is not starved. Blocked
//! threads spin for a bounded number of yields and then park. The release
//! that drops the holder count to zero clears the waiter flag and wakes all
//! parked threads, which re-race for the word.
//!
//! A thread holding the lock must not acquire it again (shared or exclusive).
//! This is not detected and deadlocks.

use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;

use parking_lot::{Condvar, Mutex};
use serde::Serialize;

const OWNED: u32 = 1 << 31;
const WAITING: u32 = 1 << 30;
const WRITER_QUEUED: u32 = 1 << 29;
const COUNT_MASK: u32 = WRITER_QUEUED - 1;
const SPIN_LIMIT: u32 = 64;

/// Reader/writer lock built on one [`AtomicU32`].
#[derive(Default)]
pub struct AtomicRwLock {
    state: AtomicU32,
    parking: Mutex<()>,
    wakeup: Condvar,
}

/// Snapshot of lock state for observability.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LockSnapshot {
    /// Number of holders (readers, or one writer).
    pub holders: u32,
    /// Whether a writer owns the lock.
    pub writer: bool,
    /// Whether at least one thread is parked or about to park.
    pub waiting: bool,
    /// Whether a blocked writer is holding new readers back.
    pub writer_queued: bool,
}

/// Guard representing a held shared lock.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ReadGuard<'a> {
    lock: &'a AtomicRwLock,
}

/// Guard representing a held exclusive lock.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct WriteGuard<'a> {
    lock: &'a AtomicRwLock,
}

#[derive(Clone, Copy)]
enum Mode {
    Shared,
    Exclusive,
}

impl AtomicRwLock {
    /// Creates an unlocked lock.
    pub fn new() -> Self {
        Self {
            state: AtomicU32::new(0),
            parking: Mutex::new(()),
            wakeup: Condvar::new(),
        }
    }

    /// Acquires shared access, blocking while a writer owns or waits for the lock.
    pub fn read(&self) -> ReadGuard<'_> {
        loop {
            if self.try_acquire_shared() {
                return ReadGuard { lock: self };
            }
            self.wait(Mode::Shared);
        }
    }

    /// Acquires exclusive access, blocking until every other holder is gone.
    pub fn write(&self) -> WriteGuard<'_> {
        loop {
            if self.try_acquire_exclusive() {
                return WriteGuard { lock: self };
            }
            self.wait(Mode::Exclusive);
        }
    }

    /// Acquires shared access if that is possible without blocking.
    pub fn try_read(&self) -> Option<ReadGuard<'_>> {
        self.try_acquire_shared().then(|| ReadGuard { lock: self })
    }

    /// Acquires exclusive access if that is possible without blocking.
    pub fn try_write(&self) -> Option<WriteGuard<'_>> {
        self.try_acquire_exclusive()
            .then(|| WriteGuard { lock: self })
    }

    /// Returns a snapshot of the current lock word.
    pub fn snapshot(&self) -> LockSnapshot {
        let state = self.state.load(Ordering::Relaxed);
        LockSnapshot {
            holders: state & COUNT_MASK,
            writer: state & OWNED != 0,
            waiting: state & WAITING != 0,
            writer_queued: state & WRITER_QUEUED != 0,
        }
    }

    fn try_acquire_shared(&self) -> bool {
        let prev = self.state.fetch_add(1, Ordering::Acquire);
        debug_assert!(prev & COUNT_MASK != COUNT_MASK, "reader count overflow");
        if prev & (OWNED | WAITING | WRITER_QUEUED) == 0 {
            return true;
        }
        // Leaves the flags alone unless this increment was the last hold, in
        // which case a waiter may have parked on it and must be woken.
        self.release_shared();
        false
    }

    /// Takes the word once no one holds it, clearing the writer-queued flag.
    /// A set waiter flag is kept so the wake-up already under way still
    /// reaches parked threads.
    fn try_acquire_exclusive(&self) -> bool {
        let mut state = self.state.load(Ordering::Relaxed);
        loop {
            if state & (OWNED | COUNT_MASK) != 0 {
                return false;
            }
            match self.state.compare_exchange_weak(
                state,
                (state & WAITING) | OWNED | 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => state = actual,
            }
        }
    }

    fn release_shared(&self) {
        let prev = self.state.fetch_sub(1, Ordering::Release);
        debug_assert!(prev & COUNT_MASK != 0, "shared release without holders");
        self.wake_if_last(prev);
    }

    fn release_exclusive(&self) {
        let prev = self
            .state
            .fetch_update(Ordering::Release, Ordering::Relaxed, |state| {
                Some((state & !OWNED) - 1)
            })
            .unwrap_or_else(|state| state);
        debug_assert!(prev & OWNED != 0, "exclusive release without owner");
        self.wake_if_last(prev);
    }

    /// `prev` is the word before a release took one hold away.
    fn wake_if_last(&self, prev: u32) {
        if prev & WAITING != 0 && prev & COUNT_MASK == 1 {
            self.wake_all();
        }
    }

    fn blocked(state: u32, mode: Mode) -> bool {
        match mode {
            Mode::Shared => state & (OWNED | WAITING | WRITER_QUEUED) != 0,
            Mode::Exclusive => state & (OWNED | COUNT_MASK) != 0,
        }
    }

    /// Spins, then announces itself and parks until a release wakes it.
    /// Returns when the caller should retry its acquire.
    fn wait(&self, mode: Mode) {
        let exclusive = matches!(mode, Mode::Exclusive);
        if exclusive {
            self.state.fetch_or(WRITER_QUEUED, Ordering::Relaxed);
        }
        for _ in 0..SPIN_LIMIT {
            let state = self.state.load(Ordering::Relaxed);
            if !Self::blocked(state, mode) {
                return;
            }
            // Another writer's acquire clears the flag; keep readers out.
            if exclusive && state & WRITER_QUEUED == 0 {
                self.state.fetch_or(WRITER_QUEUED, Ordering::Relaxed);
            }
            thread::yield_now();
        }

        let mut state = self.state.load(Ordering::Relaxed);
        loop {
            if !Self::blocked(state, mode) {
                return;
            }
            if state & WAITING != 0 {
                break;
            }
            // Only a word that still has holders may carry the flag, so the
            // release that empties it is guaranteed to clear it.
            if state & (OWNED | COUNT_MASK) == 0 {
                return;
            }
            match self.state.compare_exchange_weak(
                state,
                state | WAITING,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => state = actual,
            }
        }

        let mut parked = self.parking.lock();
        // A release clears the flag before taking the parking mutex, so
        // checking it under the mutex cannot miss the notification.
        if self.state.load(Ordering::Relaxed) & WAITING != 0 {
            self.wakeup.wait(&mut parked);
        }
    }

    fn wake_all(&self) {
        self.state.fetch_and(!WAITING, Ordering::Relaxed);
        let _parked = self.parking.lock();
        self.wakeup.notify_all();
    }
}

impl std::fmt::Debug for AtomicRwLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomicRwLock")
            .field("state", &self.snapshot())
            .finish()
    }
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.lock.release_shared();
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.lock.release_exclusive();
    }
}
