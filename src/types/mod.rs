//! Shared identifiers and the crate-wide error type.

use std::fmt;

/// Logical slot number inside an [`Arena`](crate::primitives::arena::Arena).
///
/// A slot id is not an address; it stays meaningful only while the slot is
/// allocated.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct SlotId(pub u32);

impl SlotId {
    /// Raw encoding used for "no slot" inside node headers.
    pub const NIL_RAW: u32 = u32::MAX;

    /// Slot number as a `usize` index.
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Decodes a raw header field, mapping [`SlotId::NIL_RAW`] to `None`.
    pub const fn from_raw(raw: u32) -> Option<SlotId> {
        if raw == Self::NIL_RAW {
            None
        } else {
            Some(SlotId(raw))
        }
    }

    /// Encodes an optional slot for a header field.
    pub const fn to_raw(slot: Option<SlotId>) -> u32 {
        match slot {
            Some(SlotId(raw)) => raw,
            None => Self::NIL_RAW,
        }
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SlotId {
    fn from(value: u32) -> Self {
        SlotId(value)
    }
}

impl From<SlotId> for u32 {
    fn from(value: SlotId) -> Self {
        value.0
    }
}

/// Errors reported by the arena, the tree and its constructors.
///
/// Structural corruption has no variant: a tree that reaches an
/// impossible rebalancing state panics instead of returning.
#[derive(thiserror::Error, Debug)]
pub enum ArborError {
    /// Construction arguments were rejected.
    #[error("invalid configuration: {0}")]
    Config(&'static str),
    /// Reserving or releasing address space failed.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// The tree already holds `max_nodes` records.
    #[error("tree capacity exceeded")]
    CapacityExceeded,
    /// A record with an equal key is already present.
    #[error("duplicate key")]
    DuplicateKey,
    /// No record matched the probe.
    #[error("not found")]
    NotFound,
    /// The tree holds no records.
    #[error("tree is empty")]
    EmptyTree,
    /// A caller-supplied buffer had the wrong length.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// Every arena slot is allocated.
    #[error("arena is full")]
    ArenaFull,
    /// No arena slot is allocated.
    #[error("arena is empty")]
    ArenaEmpty,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ArborError>;
