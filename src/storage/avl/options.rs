use std::cmp::Ordering;

use crate::types::{ArborError, Result};

/// Ordering strategy applied to node payloads.
///
/// `probe` is the caller's buffer (a full record on insert, at least
/// `key_size` bytes on lookups), `stored` is a node's whole payload.
pub trait KeyOrder {
    /// Compares the probe against a stored payload.
    fn compare(&self, probe: &[u8], stored: &[u8], key_size: usize) -> Ordering;
}

/// Lexicographic comparison of the first `key_size` bytes.
#[derive(Copy, Clone, Debug, Default)]
pub struct ByteOrder;

impl KeyOrder for ByteOrder {
    fn compare(&self, probe: &[u8], stored: &[u8], key_size: usize) -> Ordering {
        probe[..key_size].cmp(&stored[..key_size])
    }
}

/// Closures receive the full probe and the full stored payload and may place
/// the key anywhere inside them.
impl<F> KeyOrder for F
where
    F: Fn(&[u8], &[u8]) -> Ordering,
{
    fn compare(&self, probe: &[u8], stored: &[u8], _key_size: usize) -> Ordering {
        self(probe, stored)
    }
}

/// Configuration knobs for an AVL tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeOptions {
    /// Maximum number of live records.
    pub max_nodes: u32,
    /// Payload bytes per record.
    pub node_size: u32,
    /// Leading payload bytes compared by [`ByteOrder`].
    pub key_size: u32,
    /// Commit all memory at construction and never release it.
    pub preallocate: bool,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            max_nodes: 1024,
            node_size: 16,
            key_size: 8,
            preallocate: false,
        }
    }
}

impl TreeOptions {
    /// Options for `max_nodes` records of `node_size` bytes keyed on the first
    /// `key_size` bytes, with lazily committed memory.
    pub fn new(max_nodes: u32, node_size: u32, key_size: u32) -> Self {
        Self {
            max_nodes,
            node_size,
            key_size,
            preallocate: false,
        }
    }

    /// Sets the maximum number of live records.
    pub fn max_nodes(mut self, max_nodes: u32) -> Self {
        self.max_nodes = max_nodes;
        self
    }

    /// Sets payload and key sizes.
    pub fn layout(mut self, node_size: u32, key_size: u32) -> Self {
        self.node_size = node_size;
        self.key_size = key_size;
        self
    }

    /// Chooses between up-front and lazy physical memory.
    pub fn preallocate(mut self, preallocate: bool) -> Self {
        self.preallocate = preallocate;
        self
    }

    /// Checks the options, reporting the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.max_nodes == 0 {
            return Err(ArborError::Config("max_nodes must be non-zero"));
        }
        if self.max_nodes == u32::MAX {
            return Err(ArborError::Config("max_nodes must be below u32::MAX"));
        }
        if self.node_size == 0 {
            return Err(ArborError::Config("node_size must be non-zero"));
        }
        if self.key_size == 0 {
            return Err(ArborError::Config("key_size must be non-zero"));
        }
        if self.key_size > self.node_size {
            return Err(ArborError::Config("key_size must not exceed node_size"));
        }
        Ok(())
    }
}
