//! Slab arena handing out fixed-size slots from one reserved address range.
//!
//! Slots are numbered densely from zero. Only the most recently allocated
//! slot can be freed, which keeps both operations O(1) and lets the arena
//! release physical memory page by page as the high-water mark recedes.
//! Callers that need to drop an arbitrary slot must first move the contents
//! of [`Arena::last_allocated`] into it and then call [`Arena::free`].

mod region;

use std::ops::Range;

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::types::{ArborError, Result, SlotId};
use region::Region;

/// Returns the OS page size the arena commits and releases memory in.
pub fn page_size() -> usize {
    region::page_size()
}

/// Point-in-time view of an arena's memory usage.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArenaStats {
    /// Number of live slots.
    pub slots: u32,
    /// Bytes currently physically committed.
    pub physical_bytes: usize,
    /// Bytes of reserved address space.
    pub virtual_bytes: usize,
    /// Pages committed since creation.
    pub page_commits: u64,
    /// Pages handed back to the OS since creation.
    pub page_releases: u64,
}

/// Fixed-capacity slot allocator over a reserved, page-aligned region.
pub struct Arena {
    region: Region,
    element_size: usize,
    max_elements: u32,
    len: u32,
    page_size: usize,
    committed_pages: usize,
    preallocate: bool,
    page_commits: u64,
    page_releases: u64,
}

impl Arena {
    /// Reserves room for `max_elements` slots of `element_size` bytes.
    ///
    /// With `preallocate` the whole region is committed and zero-filled now
    /// and is never released before drop. Otherwise pages are committed as
    /// allocation reaches them.
    pub fn new(element_size: usize, max_elements: u32, preallocate: bool) -> Result<Self> {
        if element_size == 0 {
            return Err(ArborError::Config("arena element size must be non-zero"));
        }
        if max_elements == 0 {
            return Err(ArborError::Config("arena capacity must be non-zero"));
        }
        let page_size = page_size();
        let virtual_bytes = element_size
            .checked_mul(max_elements as usize)
            .and_then(|bytes| round_up(bytes, page_size))
            .ok_or(ArborError::Config("arena size overflows the address space"))?;
        let mut region = Region::reserve(virtual_bytes)?;
        let committed_pages = if preallocate {
            region.prefault()?;
            virtual_bytes / page_size
        } else {
            0
        };
        debug!(
            element_size,
            max_elements,
            virtual_bytes,
            preallocate,
            "arena.reserve"
        );
        Ok(Self {
            region,
            element_size,
            max_elements,
            len: 0,
            page_size,
            committed_pages,
            preallocate,
            page_commits: committed_pages as u64,
            page_releases: 0,
        })
    }

    /// Hands out the next slot, committing any page it newly reaches.
    pub fn allocate(&mut self) -> Result<SlotId> {
        if self.len == self.max_elements {
            return Err(ArborError::ArenaFull);
        }
        let needed = self.pages_for(self.len as usize + 1);
        while self.committed_pages < needed {
            let offset = self.committed_pages * self.page_size;
            self.region.commit(offset, self.page_size)?;
            trace!(page = self.committed_pages, "arena.commit_page");
            self.committed_pages += 1;
            self.page_commits += 1;
        }
        let slot = SlotId(self.len);
        self.len += 1;
        self.slot_mut(slot).fill(0);
        Ok(slot)
    }

    /// Releases the most recently allocated slot.
    ///
    /// Whatever the slot held is gone afterwards; copy out anything that must
    /// survive before calling this.
    ///
    /// Handing pages back to the OS is best effort. If a decommit fails the
    /// error is logged as `arena.release_page_failed`, the page stays counted
    /// as committed and the slot is still freed, so `physical_bytes` in
    /// [`Arena::stats`] may not drop after a successful call.
    pub fn free(&mut self) -> Result<()> {
        if self.len == 0 {
            return Err(ArborError::ArenaEmpty);
        }
        self.len -= 1;
        if self.preallocate {
            return Ok(());
        }
        let needed = self.pages_for(self.len as usize);
        while self.committed_pages > needed {
            let page = self.committed_pages - 1;
            if let Err(err) = self.region.decommit(page * self.page_size, self.page_size) {
                warn!(page, error = %err, "arena.release_page_failed");
                break;
            }
            trace!(page, "arena.release_page");
            self.committed_pages = page;
            self.page_releases += 1;
        }
        Ok(())
    }

    /// The slot [`Arena::free`] would release next, if any.
    pub fn last_allocated(&self) -> Option<SlotId> {
        self.len.checked_sub(1).map(SlotId)
    }

    /// Storage of a live slot.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is not currently allocated.
    pub fn slot(&self, slot: SlotId) -> &[u8] {
        self.assert_live(slot);
        self.region
            .bytes(slot.index() * self.element_size, self.element_size)
    }

    /// Mutable storage of a live slot.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is not currently allocated.
    pub fn slot_mut(&mut self, slot: SlotId) -> &mut [u8] {
        self.assert_live(slot);
        self.region
            .bytes_mut(slot.index() * self.element_size, self.element_size)
    }

    /// Copies the whole element stored in `src` over `dst`.
    pub fn copy_slot(&mut self, src: SlotId, dst: SlotId) {
        self.copy_slot_range(src, dst, 0..self.element_size);
    }

    /// Copies bytes `range` of the element in `src` to the same range of `dst`.
    pub fn copy_slot_range(&mut self, src: SlotId, dst: SlotId, range: Range<usize>) {
        self.assert_live(src);
        self.assert_live(dst);
        assert!(
            range.start <= range.end && range.end <= self.element_size,
            "range {range:?} exceeds element size {}",
            self.element_size
        );
        if src == dst || range.is_empty() {
            return;
        }
        self.region.copy_within(
            src.index() * self.element_size + range.start,
            dst.index() * self.element_size + range.start,
            range.len(),
        );
    }

    /// Number of live slots.
    pub fn len(&self) -> u32 {
        self.len
    }

    /// Returns `true` when no slot is allocated.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Maximum number of slots.
    pub fn capacity(&self) -> u32 {
        self.max_elements
    }

    /// Bytes per slot.
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    /// Page size used for commit accounting.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Whether every page was committed up front.
    pub fn is_preallocated(&self) -> bool {
        self.preallocate
    }

    /// Bytes currently committed.
    pub fn physical_bytes(&self) -> usize {
        self.committed_pages * self.page_size
    }

    /// Bytes of reserved address space.
    pub fn virtual_bytes(&self) -> usize {
        self.region.len()
    }

    /// Snapshot of the arena's memory usage.
    pub fn stats(&self) -> ArenaStats {
        ArenaStats {
            slots: self.len,
            physical_bytes: self.physical_bytes(),
            virtual_bytes: self.virtual_bytes(),
            page_commits: self.page_commits,
            page_releases: self.page_releases,
        }
    }

    fn pages_for(&self, slots: usize) -> usize {
        (slots * self.element_size).div_ceil(self.page_size)
    }

    fn assert_live(&self, slot: SlotId) {
        assert!(
            slot.0 < self.len,
            "slot {slot} is not allocated (live slots: {})",
            self.len
        );
    }
}

fn round_up(bytes: usize, page_size: usize) -> Option<usize> {
    bytes
        .checked_add(page_size - 1)
        .map(|padded| padded / page_size * page_size)
}
