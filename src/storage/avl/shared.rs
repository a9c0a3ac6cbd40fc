#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::primitives::concurrency::{AtomicRwLock, ReadGuard, WriteGuard};
use crate::types::Result;

use super::options::{ByteOrder, KeyOrder};
use super::stats::{TreeCounters, TreeStats};
use super::tree::Tree;
use super::verify::VerifyReport;

/// Where the lock guarding a [`SharedTree`] lives.
#[derive(Clone, Debug, Default)]
pub enum Locking {
    /// The tree owns a fresh lock.
    #[default]
    Internal,
    /// The caller supplies the lock, possibly shared with other structures.
    External(Arc<AtomicRwLock>),
}

/// A [`Tree`] guarded by an [`AtomicRwLock`].
pub struct SharedTree<C: KeyOrder = ByteOrder> {
    tree: UnsafeCell<Tree<C>>,
    lock: Arc<AtomicRwLock>,
    counters: Arc<TreeCounters>,
}

// SAFETY: the tree is only reached through guards that hold the lock: shared
// references under a read lock, a unique reference under the write lock.
unsafe impl<C: KeyOrder + Send> Send for SharedTree<C> {}
unsafe impl<C: KeyOrder + Send + Sync> Sync for SharedTree<C> {}

impl<C: KeyOrder> SharedTree<C> {
    /// Wraps `tree` with the chosen lock.
    pub fn new(tree: Tree<C>, locking: Locking) -> Self {
        let lock = match locking {
            Locking::Internal => Arc::new(AtomicRwLock::new()),
            Locking::External(lock) => lock,
        };
        Self {
            counters: Arc::clone(tree.counters()),
            tree: UnsafeCell::new(tree),
            lock,
        }
    }

    /// Blocks until a shared lock is held.
    pub fn read(&self) -> TreeReadGuard<'_, C> {
        let guard = self.lock.read();
        // SAFETY: the read lock excludes writers for the guard's lifetime.
        let tree = unsafe { &*self.tree.get() };
        TreeReadGuard {
            _guard: guard,
            tree,
        }
    }

    /// Blocks until the exclusive lock is held.
    pub fn write(&self) -> TreeWriteGuard<'_, C> {
        let guard = self.lock.write();
        // SAFETY: the write lock excludes every other guard.
        let tree = unsafe { &mut *self.tree.get() };
        TreeWriteGuard {
            _guard: guard,
            tree,
        }
    }

    /// Takes a shared lock if no writer owns or awaits it.
    pub fn try_read(&self) -> Option<TreeReadGuard<'_, C>> {
        let guard = self.lock.try_read()?;
        // SAFETY: as in `read`.
        let tree = unsafe { &*self.tree.get() };
        Some(TreeReadGuard {
            _guard: guard,
            tree,
        })
    }

    /// Takes the exclusive lock if it is free.
    pub fn try_write(&self) -> Option<TreeWriteGuard<'_, C>> {
        let guard = self.lock.try_write()?;
        // SAFETY: as in `write`.
        let tree = unsafe { &mut *self.tree.get() };
        Some(TreeWriteGuard {
            _guard: guard,
            tree,
        })
    }

    /// See [`Tree::insert`].
    pub fn insert(&self, record: &[u8]) -> Result<()> {
        self.write().insert(record)
    }

    /// See [`Tree::remove`].
    pub fn remove(&self, key: &[u8]) -> Result<()> {
        self.write().remove(key)
    }

    /// See [`Tree::first_into`].
    pub fn first_into(&self, out: &mut [u8]) -> Result<()> {
        self.read().first_into(out)
    }

    /// See [`Tree::next_into`].
    pub fn next_into(&self, key: &[u8], out: &mut [u8]) -> Result<()> {
        self.read().next_into(key, out)
    }

    /// Copy of the smallest record.
    pub fn first(&self) -> Result<Vec<u8>> {
        self.read().first().map(<[u8]>::to_vec)
    }

    /// Copy of the successor of `key`.
    pub fn next(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.read().next(key).map(<[u8]>::to_vec)
    }

    /// See [`Tree::stats`].
    pub fn stats(&self) -> TreeStats {
        self.read().stats()
    }

    /// See [`Tree::verify`].
    pub fn verify(&self) -> VerifyReport {
        self.read().verify()
    }

    /// Counters of the wrapped tree; readable without taking the lock.
    pub fn counters(&self) -> &Arc<TreeCounters> {
        &self.counters
    }

    /// The lock guarding this tree.
    pub fn lock(&self) -> &Arc<AtomicRwLock> {
        &self.lock
    }

    /// Unwraps the tree.
    pub fn into_inner(self) -> Tree<C> {
        self.tree.into_inner()
    }
}

impl<C: KeyOrder> fmt::Debug for SharedTree<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedTree")
            .field("lock", &self.lock)
            .finish_non_exhaustive()
    }
}

/// Shared access to a [`SharedTree`]'s tree.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct TreeReadGuard<'a, C: KeyOrder> {
    _guard: ReadGuard<'a>,
    tree: &'a Tree<C>,
}

impl<C: KeyOrder> Deref for TreeReadGuard<'_, C> {
    type Target = Tree<C>;

    fn deref(&self) -> &Tree<C> {
        self.tree
    }
}

/// Exclusive access to a [`SharedTree`]'s tree.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct TreeWriteGuard<'a, C: KeyOrder> {
    _guard: WriteGuard<'a>,
    tree: &'a mut Tree<C>,
}

impl<C: KeyOrder> Deref for TreeWriteGuard<'_, C> {
    type Target = Tree<C>;

    fn deref(&self) -> &Tree<C> {
        self.tree
    }
}

impl<C: KeyOrder> DerefMut for TreeWriteGuard<'_, C> {
    fn deref_mut(&mut self) -> &mut Tree<C> {
        self.tree
    }
}
