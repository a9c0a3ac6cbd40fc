use std::iter::FusedIterator;

use crate::types::SlotId;

use super::options::KeyOrder;
use super::tree::Tree;

/// In-order iterator over the payloads of a [`Tree`].
///
/// Walks parent links instead of keeping a stack. The walk is bounded by the
/// tree's node count, so a damaged tree cannot make it loop forever.
pub struct Iter<'a, C: KeyOrder> {
    tree: &'a Tree<C>,
    next: Option<SlotId>,
    remaining: u32,
}

impl<'a, C: KeyOrder> Iter<'a, C> {
    pub(super) fn new(tree: &'a Tree<C>, start: Option<SlotId>) -> Self {
        Self {
            tree,
            next: start,
            remaining: tree.len(),
        }
    }
}

impl<'a, C: KeyOrder> Iterator for Iter<'a, C> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let slot = self.next?;
        self.remaining -= 1;
        self.next = self.tree.successor(slot);
        Some(self.tree.payload(slot))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.next.is_none() {
            return (0, Some(0));
        }
        (1, Some(self.remaining as usize))
    }
}

impl<C: KeyOrder> FusedIterator for Iter<'_, C> {}
