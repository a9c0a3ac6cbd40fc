//! In-slot node layout: a fixed control header followed by the payload.

use crate::types::SlotId;

/// Length of the control header preceding every payload.
pub const HEADER_LEN: usize = 16;

pub mod header {
    //! Byte offsets for fixed header fields.
    use core::ops::Range;

    /// Parent slot, `u32::MAX` for the root.
    pub const PARENT: Range<usize> = 0..4;
    /// Left child slot.
    pub const LEFT: Range<usize> = 4..8;
    /// Right child slot.
    pub const RIGHT: Range<usize> = 8..12;
    /// Cached subtree height, zero for a leaf.
    pub const HEIGHT: Range<usize> = 12..16;
}

/// One of the three slot references a node carries.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Link {
    Parent,
    Left,
    Right,
}

impl Link {
    fn range(self) -> core::ops::Range<usize> {
        match self {
            Link::Parent => header::PARENT,
            Link::Left => header::LEFT,
            Link::Right => header::RIGHT,
        }
    }
}

/// Decoded control header.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct NodeHeader {
    pub parent: Option<SlotId>,
    pub left: Option<SlotId>,
    pub right: Option<SlotId>,
    /// Zero for a leaf.
    pub height: i32,
}

impl NodeHeader {
    pub fn leaf(parent: Option<SlotId>) -> Self {
        Self {
            parent,
            left: None,
            right: None,
            height: 0,
        }
    }

    pub fn decode(node: &[u8]) -> Self {
        Self {
            parent: read_link(node, Link::Parent),
            left: read_link(node, Link::Left),
            right: read_link(node, Link::Right),
            height: read_height(node),
        }
    }

    pub fn encode(&self, node: &mut [u8]) {
        write_link(node, Link::Parent, self.parent);
        write_link(node, Link::Left, self.left);
        write_link(node, Link::Right, self.right);
        write_height(node, self.height);
    }
}

pub(crate) fn read_link(node: &[u8], link: Link) -> Option<SlotId> {
    SlotId::from_raw(read_u32(node, link.range()))
}

pub(crate) fn write_link(node: &mut [u8], link: Link, slot: Option<SlotId>) {
    node[link.range()].copy_from_slice(&SlotId::to_raw(slot).to_ne_bytes());
}

pub(crate) fn read_height(node: &[u8]) -> i32 {
    read_u32(node, header::HEIGHT) as i32
}

pub(crate) fn write_height(node: &mut [u8], height: i32) {
    node[header::HEIGHT].copy_from_slice(&height.to_ne_bytes());
}

pub(crate) fn payload(node: &[u8]) -> &[u8] {
    &node[HEADER_LEN..]
}

pub(crate) fn payload_mut(node: &mut [u8]) -> &mut [u8] {
    &mut node[HEADER_LEN..]
}

fn read_u32(node: &[u8], range: core::ops::Range<usize>) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&node[range]);
    u32::from_ne_bytes(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips_through_bytes() {
        let mut node = vec![0u8; HEADER_LEN + 4];
        let header = NodeHeader {
            parent: None,
            left: Some(SlotId(3)),
            right: Some(SlotId(0)),
            height: 2,
        };
        header.encode(&mut node);
        assert_eq!(NodeHeader::decode(&node), header);
        payload_mut(&mut node).copy_from_slice(b"key!");
        assert_eq!(payload(&node), b"key!");
        assert_eq!(NodeHeader::decode(&node), header);
    }

    #[test]
    fn single_link_updates_leave_other_fields_alone() {
        let mut node = vec![0u8; HEADER_LEN];
        NodeHeader::leaf(Some(SlotId(9))).encode(&mut node);
        write_link(&mut node, Link::Right, Some(SlotId(4)));
        write_height(&mut node, 1);
        let header = NodeHeader::decode(&node);
        assert_eq!(header.parent, Some(SlotId(9)));
        assert_eq!(header.left, None);
        assert_eq!(header.right, Some(SlotId(4)));
        assert_eq!(header.height, 1);
    }
}
