//! Arena-backed AVL tree for fixed-size records.
//!
//! [`Tree`] stores records of a fixed byte length, ordered by a key prefix or
//! a caller-supplied [`KeyOrder`], in a virtual-memory arena whose physical
//! footprint follows the number of live records. [`SharedTree`] guards a tree
//! with an [`AtomicRwLock`] for use across threads.

#![warn(missing_docs)]

pub mod primitives;
pub mod storage;
pub mod types;

pub use primitives::arena::{Arena, ArenaStats};
pub use primitives::concurrency::{AtomicRwLock, LockSnapshot, ReadGuard, WriteGuard};
pub use storage::avl::{
    ByteOrder, CountersSnapshot, KeyOrder, Locking, SharedTree, Tree, TreeCounters, TreeOptions,
    TreeStats, VerifyFinding, VerifyReport,
};
pub use types::{ArborError, Result, SlotId};
