//! AVL tree of fixed-size records kept in an [`Arena`](crate::primitives::arena::Arena).
//!
//! Each node is a 16-byte link header (parent, left, right, height) followed
//! by a caller-defined payload whose leading `key_size` bytes order the tree.
//! Live nodes always occupy the dense prefix `0..len` of the arena: removing
//! a node moves the last one into its slot before the arena shrinks.

mod cursor;
mod node;
mod options;
mod rebalance;
mod shared;
mod stats;
mod tree;
mod verify;

pub use cursor::Iter;
pub use node::{header, HEADER_LEN};
pub use options::{ByteOrder, KeyOrder, TreeOptions};
pub use shared::{Locking, SharedTree, TreeReadGuard, TreeWriteGuard};
pub use stats::{CountersSnapshot, TreeCounters, TreeStats};
pub use tree::Tree;
pub use verify::{VerifyFinding, VerifyReport};
