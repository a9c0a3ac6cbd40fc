use std::cmp::Ordering;
use std::sync::Arc;

use tracing::{debug, info, trace};

use crate::primitives::arena::{Arena, ArenaStats};
use crate::types::{ArborError, Result, SlotId};

use super::cursor::Iter;
use super::node::{self, Link, NodeHeader, HEADER_LEN};
use super::options::{ByteOrder, KeyOrder, TreeOptions};
use super::stats::{TreeCounters, TreeStats};

/// AVL tree of fixed-size records stored in an [`Arena`].
///
/// Mutating operations take `&mut self`; wrap the tree in a
/// [`SharedTree`](super::SharedTree) to share it between threads.
pub struct Tree<C: KeyOrder = ByteOrder> {
    pub(super) arena: Arena,
    pub(super) root: Option<SlotId>,
    pub(super) num_nodes: u32,
    pub(super) max_nodes: u32,
    pub(super) node_size: usize,
    pub(super) key_size: usize,
    pub(super) order: C,
    pub(super) counters: Arc<TreeCounters>,
}

impl Tree<ByteOrder> {
    /// Creates a tree ordered by the first `key_size` payload bytes.
    pub fn create(max_nodes: u32, node_size: u32, key_size: u32, preallocate: bool) -> Result<Self> {
        let options = TreeOptions::new(max_nodes, node_size, key_size).preallocate(preallocate);
        Self::with_options(options, ByteOrder)
    }
}

impl<C: KeyOrder> Tree<C> {
    /// Creates a tree with an explicit comparator.
    pub fn with_options(options: TreeOptions, order: C) -> Result<Self> {
        options.validate()?;
        let node_size = options.node_size as usize;
        let arena = Arena::new(HEADER_LEN + node_size, options.max_nodes, options.preallocate)?;
        info!(
            max_nodes = options.max_nodes,
            node_size = options.node_size,
            key_size = options.key_size,
            preallocate = options.preallocate,
            virtual_bytes = arena.virtual_bytes(),
            "avl.create"
        );
        Ok(Self {
            arena,
            root: None,
            num_nodes: 0,
            max_nodes: options.max_nodes,
            node_size,
            key_size: options.key_size as usize,
            order,
            counters: Arc::new(TreeCounters::default()),
        })
    }

    /// Inserts a record of exactly `node_size` bytes.
    pub fn insert(&mut self, record: &[u8]) -> Result<()> {
        if record.len() != self.node_size {
            return Err(ArborError::InvalidArgument("record length must equal node_size"));
        }
        let mut parent = None;
        let mut went_left = false;
        let mut cursor = self.root;
        while let Some(slot) = cursor {
            parent = Some(slot);
            match self.compare(record, slot) {
                Ordering::Equal => return Err(ArborError::DuplicateKey),
                Ordering::Less => {
                    went_left = true;
                    cursor = self.link(slot, Link::Left);
                }
                Ordering::Greater => {
                    went_left = false;
                    cursor = self.link(slot, Link::Right);
                }
            }
        }
        if self.num_nodes == self.max_nodes {
            debug!(max_nodes = self.max_nodes, "avl.insert.capacity_exceeded");
            return Err(ArborError::CapacityExceeded);
        }

        let slot = self.arena.allocate().map_err(|err| match err {
            ArborError::ArenaFull => ArborError::CapacityExceeded,
            other => other,
        })?;
        let bytes = self.arena.slot_mut(slot);
        NodeHeader::leaf(parent).encode(bytes);
        node::payload_mut(bytes).copy_from_slice(record);

        match parent {
            None => self.root = Some(slot),
            Some(parent) if went_left => self.set_link(parent, Link::Left, Some(slot)),
            Some(parent) => self.set_link(parent, Link::Right, Some(slot)),
        }
        self.num_nodes += 1;
        self.counters.inc_inserts();
        if let Some(parent) = parent {
            self.rebalance_from(parent);
        }
        Ok(())
    }

    /// Removes the record whose key matches `key` (at least `key_size` bytes).
    pub fn remove(&mut self, key: &[u8]) -> Result<()> {
        self.check_probe(key)?;
        if self.num_nodes == 0 {
            return Err(ArborError::EmptyTree);
        }
        let target = self.find(key).ok_or(ArborError::NotFound)?;

        // A node with two children takes over its successor's payload and the
        // successor, which has no left child, is unlinked instead.
        let header = self.header(target);
        let victim = match (header.left, header.right) {
            (Some(_), Some(right)) => {
                let successor = self.leftmost(right);
                self.arena
                    .copy_slot_range(successor, target, HEADER_LEN..HEADER_LEN + self.node_size);
                successor
            }
            _ => target,
        };

        let unlinked = self.header(victim);
        let child = unlinked.left.or(unlinked.right);
        if let Some(child) = child {
            self.set_link(child, Link::Parent, unlinked.parent);
        }
        self.replace_child(unlinked.parent, victim, child);
        if let Some(parent) = unlinked.parent {
            self.rebalance_from(parent);
        }

        self.release_slot(victim)?;
        self.num_nodes -= 1;
        self.counters.inc_removes();
        debug_assert_eq!(self.num_nodes, self.arena.len());
        Ok(())
    }

    /// Payload of the smallest record.
    pub fn first(&self) -> Result<&[u8]> {
        let root = self.root.ok_or(ArborError::EmptyTree)?;
        Ok(self.payload(self.leftmost(root)))
    }

    /// Payload of the largest record.
    pub fn last(&self) -> Result<&[u8]> {
        let root = self.root.ok_or(ArborError::EmptyTree)?;
        Ok(self.payload(self.rightmost(root)))
    }

    /// Payload of the smallest record whose key is strictly greater than `key`.
    /// `key` itself does not have to be present.
    pub fn next(&self, key: &[u8]) -> Result<&[u8]> {
        self.check_probe(key)?;
        let mut candidate = None;
        let mut cursor = self.root;
        while let Some(slot) = cursor {
            if self.compare(key, slot) == Ordering::Less {
                candidate = Some(slot);
                cursor = self.link(slot, Link::Left);
            } else {
                cursor = self.link(slot, Link::Right);
            }
        }
        candidate
            .map(|slot| self.payload(slot))
            .ok_or(ArborError::NotFound)
    }

    /// Payload of the largest record whose key is strictly less than `key`.
    pub fn prev(&self, key: &[u8]) -> Result<&[u8]> {
        self.check_probe(key)?;
        let mut candidate = None;
        let mut cursor = self.root;
        while let Some(slot) = cursor {
            if self.compare(key, slot) == Ordering::Greater {
                candidate = Some(slot);
                cursor = self.link(slot, Link::Right);
            } else {
                cursor = self.link(slot, Link::Left);
            }
        }
        candidate
            .map(|slot| self.payload(slot))
            .ok_or(ArborError::NotFound)
    }

    /// Payload of the record whose key equals `key`.
    pub fn get(&self, key: &[u8]) -> Result<&[u8]> {
        self.check_probe(key)?;
        self.find(key)
            .map(|slot| self.payload(slot))
            .ok_or(ArborError::NotFound)
    }

    /// Returns `true` if a record with this key is stored.
    pub fn contains(&self, key: &[u8]) -> bool {
        key.len() >= self.key_size && self.find(key).is_some()
    }

    /// Copies the smallest record into `out`, which must hold `node_size` bytes.
    pub fn first_into(&self, out: &mut [u8]) -> Result<()> {
        let out = self.output_buffer(out)?;
        out.copy_from_slice(self.first()?);
        Ok(())
    }

    /// Copies the successor of `key` into `out`, which must hold `node_size` bytes.
    pub fn next_into(&self, key: &[u8], out: &mut [u8]) -> Result<()> {
        let out = self.output_buffer(out)?;
        out.copy_from_slice(self.next(key)?);
        Ok(())
    }

    /// In-order iterator over record payloads.
    pub fn iter(&self) -> Iter<'_, C> {
        Iter::new(self, self.root.map(|root| self.leftmost(root)))
    }

    /// Number of stored records.
    pub fn len(&self) -> u32 {
        self.num_nodes
    }

    /// Returns `true` when the tree holds no records.
    pub fn is_empty(&self) -> bool {
        self.num_nodes == 0
    }

    /// Maximum number of records.
    pub fn capacity(&self) -> u32 {
        self.max_nodes
    }

    /// Payload bytes per record.
    pub fn node_size(&self) -> usize {
        self.node_size
    }

    /// Key bytes compared by the default ordering.
    pub fn key_size(&self) -> usize {
        self.key_size
    }

    /// Height of the root (a single node has height 0), or `None` when empty.
    pub fn height(&self) -> Option<u32> {
        self.root.map(|root| self.header(root).height as u32)
    }

    /// Live count and memory usage.
    pub fn stats(&self) -> TreeStats {
        TreeStats {
            live_count: self.num_nodes,
            physical_bytes: self.arena.physical_bytes(),
            virtual_bytes: self.arena.virtual_bytes(),
        }
    }

    /// Page-level statistics of the backing arena.
    pub fn arena_stats(&self) -> ArenaStats {
        self.arena.stats()
    }

    /// Operation counters shared with any clone of the returned `Arc`.
    pub fn counters(&self) -> &Arc<TreeCounters> {
        &self.counters
    }

    pub(super) fn compare(&self, probe: &[u8], slot: SlotId) -> Ordering {
        self.order
            .compare(probe, self.payload(slot), self.key_size)
    }

    pub(super) fn find(&self, key: &[u8]) -> Option<SlotId> {
        let mut cursor = self.root;
        while let Some(slot) = cursor {
            cursor = match self.compare(key, slot) {
                Ordering::Equal => return Some(slot),
                Ordering::Less => self.link(slot, Link::Left),
                Ordering::Greater => self.link(slot, Link::Right),
            };
        }
        None
    }

    pub(super) fn leftmost(&self, mut slot: SlotId) -> SlotId {
        while let Some(left) = self.link(slot, Link::Left) {
            slot = left;
        }
        slot
    }

    pub(super) fn rightmost(&self, mut slot: SlotId) -> SlotId {
        while let Some(right) = self.link(slot, Link::Right) {
            slot = right;
        }
        slot
    }

    /// In-order successor of a live node, found through parent links.
    pub(super) fn successor(&self, slot: SlotId) -> Option<SlotId> {
        if let Some(right) = self.link(slot, Link::Right) {
            return Some(self.leftmost(right));
        }
        let mut child = slot;
        let mut parent = self.link(slot, Link::Parent);
        while let Some(current) = parent {
            if self.link(current, Link::Left) == Some(child) {
                return Some(current);
            }
            child = current;
            parent = self.link(current, Link::Parent);
        }
        None
    }

    pub(super) fn header(&self, slot: SlotId) -> NodeHeader {
        NodeHeader::decode(self.arena.slot(slot))
    }

    pub(super) fn link(&self, slot: SlotId, link: Link) -> Option<SlotId> {
        node::read_link(self.arena.slot(slot), link)
    }

    pub(super) fn set_link(&mut self, slot: SlotId, link: Link, target: Option<SlotId>) {
        node::write_link(self.arena.slot_mut(slot), link, target);
    }

    pub(super) fn payload(&self, slot: SlotId) -> &[u8] {
        node::payload(self.arena.slot(slot))
    }

    /// Points whatever referenced `old` from above (a parent or the root) at `new`.
    pub(super) fn replace_child(
        &mut self,
        parent: Option<SlotId>,
        old: SlotId,
        new: Option<SlotId>,
    ) {
        match parent {
            None => self.root = new,
            Some(parent) => {
                if self.link(parent, Link::Left) == Some(old) {
                    self.set_link(parent, Link::Left, new);
                } else {
                    debug_assert_eq!(self.link(parent, Link::Right), Some(old));
                    self.set_link(parent, Link::Right, new);
                }
            }
        }
    }

    /// Frees an unlinked node's slot. The arena only releases its last slot,
    /// so the last node moves into the vacated one first.
    fn release_slot(&mut self, vacated: SlotId) -> Result<()> {
        let last = self.arena.last_allocated().ok_or(ArborError::ArenaEmpty)?;
        if last != vacated {
            self.arena.copy_slot(last, vacated);
            let moved = self.header(vacated);
            self.replace_child(moved.parent, last, Some(vacated));
            if let Some(left) = moved.left {
                self.set_link(left, Link::Parent, Some(vacated));
            }
            if let Some(right) = moved.right {
                self.set_link(right, Link::Parent, Some(vacated));
            }
            trace!(from = last.0, to = vacated.0, "avl.relocate");
            self.counters.inc_relocations();
        }
        self.arena.free()
    }

    fn check_probe(&self, key: &[u8]) -> Result<()> {
        if key.len() < self.key_size {
            return Err(ArborError::InvalidArgument("key shorter than key_size"));
        }
        Ok(())
    }

    fn output_buffer<'o>(&self, out: &'o mut [u8]) -> Result<&'o mut [u8]> {
        if out.len() < self.node_size {
            return Err(ArborError::InvalidArgument("output buffer shorter than node_size"));
        }
        Ok(&mut out[..self.node_size])
    }
}

impl<C: KeyOrder> Drop for Tree<C> {
    fn drop(&mut self) {
        info!(
            live_count = self.num_nodes,
            physical_bytes = self.arena.physical_bytes(),
            "avl.drop"
        );
    }
}

impl<'a, C: KeyOrder> IntoIterator for &'a Tree<C> {
    type Item = &'a [u8];
    type IntoIter = Iter<'a, C>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
