use tracing::{error, trace};

use crate::types::SlotId;

use super::node::{self, Link};
use super::options::KeyOrder;
use super::tree::Tree;

impl<C: KeyOrder> Tree<C> {
    /// Restores heights and balance on the path from `start` to the root.
    pub(super) fn rebalance_from(&mut self, start: SlotId) {
        let mut cursor = Some(start);
        while let Some(slot) = cursor {
            self.update_height(slot);
            let subtree_root = match self.balance(slot) {
                -1..=1 => slot,
                -2 => {
                    let left = self.child_or_corrupt(slot, Link::Left);
                    if self.balance(left) <= 0 {
                        self.counters.inc_single_rotations();
                        self.rotate_right(slot)
                    } else {
                        self.counters.inc_double_rotations();
                        self.rotate_left(left);
                        self.rotate_right(slot)
                    }
                }
                2 => {
                    let right = self.child_or_corrupt(slot, Link::Right);
                    if self.balance(right) >= 0 {
                        self.counters.inc_single_rotations();
                        self.rotate_left(slot)
                    } else {
                        self.counters.inc_double_rotations();
                        self.rotate_right(right);
                        self.rotate_left(slot)
                    }
                }
                factor => structural_corruption(slot, factor),
            };
            cursor = self.link(subtree_root, Link::Parent);
        }
    }

    /// Height a child adds to its parent: 0 when absent, `height + 1` otherwise.
    pub(super) fn contribution(&self, child: Option<SlotId>) -> i32 {
        child.map_or(0, |child| node::read_height(self.arena.slot(child)) + 1)
    }

    /// Right contribution minus left contribution, from cached heights.
    pub(super) fn balance(&self, slot: SlotId) -> i32 {
        let header = self.header(slot);
        self.contribution(header.right) - self.contribution(header.left)
    }

    fn update_height(&mut self, slot: SlotId) {
        let header = self.header(slot);
        let height = self
            .contribution(header.left)
            .max(self.contribution(header.right));
        node::write_height(self.arena.slot_mut(slot), height);
    }

    /// Lifts the left child of `slot` above it and returns the new subtree root.
    fn rotate_right(&mut self, slot: SlotId) -> SlotId {
        let parent = self.link(slot, Link::Parent);
        let pivot = self.child_or_corrupt(slot, Link::Left);
        let inner = self.link(pivot, Link::Right);

        self.set_link(slot, Link::Left, inner);
        if let Some(inner) = inner {
            self.set_link(inner, Link::Parent, Some(slot));
        }
        self.set_link(pivot, Link::Right, Some(slot));
        self.set_link(slot, Link::Parent, Some(pivot));
        self.set_link(pivot, Link::Parent, parent);
        self.replace_child(parent, slot, Some(pivot));

        self.update_height(slot);
        self.update_height(pivot);
        trace!(slot = slot.0, pivot = pivot.0, "avl.rotate_right");
        pivot
    }

    /// Lifts the right child of `slot` above it and returns the new subtree root.
    fn rotate_left(&mut self, slot: SlotId) -> SlotId {
        let parent = self.link(slot, Link::Parent);
        let pivot = self.child_or_corrupt(slot, Link::Right);
        let inner = self.link(pivot, Link::Left);

        self.set_link(slot, Link::Right, inner);
        if let Some(inner) = inner {
            self.set_link(inner, Link::Parent, Some(slot));
        }
        self.set_link(pivot, Link::Left, Some(slot));
        self.set_link(slot, Link::Parent, Some(pivot));
        self.set_link(pivot, Link::Parent, parent);
        self.replace_child(parent, slot, Some(pivot));

        self.update_height(slot);
        self.update_height(pivot);
        trace!(slot = slot.0, pivot = pivot.0, "avl.rotate_left");
        pivot
    }

    fn child_or_corrupt(&self, slot: SlotId, link: Link) -> SlotId {
        match self.link(slot, link) {
            Some(child) => child,
            None => {
                let factor = self.balance(slot);
                structural_corruption(slot, factor)
            }
        }
    }
}

/// The cached heights no longer describe an AVL tree. Nothing built on top
/// of this tree can be trusted, so this never returns.
#[cold]
#[inline(never)]
fn structural_corruption(slot: SlotId, factor: i32) -> ! {
    error!(slot = slot.0, balance = factor, "avl.structural_corruption");
    panic!("AVL structural corruption at slot {slot}: balance factor {factor}");
}
