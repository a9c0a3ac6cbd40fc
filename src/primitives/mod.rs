//! Low-level primitives the tree is built on.

/// Page-committed slot allocator over a reserved address range.
///
/// Slots are handed out and returned in stack order so that physical memory
/// tracks the number of live slots.
pub mod arena;

/// Concurrency primitives and synchronization.
///
/// A reader/writer lock packed into a single atomic word.
pub mod concurrency;
