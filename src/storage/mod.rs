//! Ordered in-memory storage structures.

/// Arena-backed AVL tree and its thread-safe wrapper.
pub mod avl;

pub use avl::{
    ByteOrder, KeyOrder, Locking, SharedTree, Tree, TreeOptions, TreeStats, VerifyReport,
};
