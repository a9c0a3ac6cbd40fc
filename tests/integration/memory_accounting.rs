//! Physical memory follows the live record count in lazy mode.

use arbor::primitives::arena::page_size;
use arbor::storage::avl::HEADER_LEN;
use arbor::{Result, Tree};

const NODE_SIZE: u32 = 24;

fn record(value: u32) -> [u8; NODE_SIZE as usize] {
    let mut out = [0u8; NODE_SIZE as usize];
    out[..4].copy_from_slice(&value.to_be_bytes());
    out
}

fn rounded_to_pages(records: usize) -> usize {
    let page = page_size();
    (records * (HEADER_LEN + NODE_SIZE as usize)).div_ceil(page) * page
}

#[test]
fn lazy_tree_grows_and_shrinks_with_records() -> Result<()> {
    let mut tree = Tree::create(10_000, NODE_SIZE, 4, false)?;
    let baseline = tree.stats().physical_bytes;

    let mut high_water = baseline;
    for value in 0..5_000u32 {
        tree.insert(&record(value))?;
        let physical = tree.stats().physical_bytes;
        assert!(physical >= rounded_to_pages(value as usize + 1));
        high_water = high_water.max(physical);
    }
    assert!(high_water >= rounded_to_pages(5_000));
    assert!(tree.stats().virtual_bytes >= rounded_to_pages(10_000));

    // Remove in an order unrelated to slot order so relocation is exercised.
    for value in (0..5_000u32).rev().step_by(2).chain((0..5_000u32).step_by(2)) {
        tree.remove(&value.to_be_bytes())?;
    }
    assert_eq!(tree.stats().live_count, 0);
    assert_eq!(tree.stats().physical_bytes, baseline);

    let arena = tree.arena_stats();
    assert_eq!(arena.slots, 0);
    assert_eq!(arena.page_commits, arena.page_releases);
    assert!(tree.counters().relocations() > 0);
    Ok(())
}

#[test]
fn partial_removal_releases_trailing_pages() -> Result<()> {
    let mut tree = Tree::create(4_096, NODE_SIZE, 4, false)?;
    for value in 0..2_000u32 {
        tree.insert(&record(value))?;
    }
    let full = tree.stats().physical_bytes;
    for value in 0..1_500u32 {
        tree.remove(&value.to_be_bytes())?;
    }
    let after = tree.stats().physical_bytes;
    assert!(after < full);
    assert!(after >= rounded_to_pages(500));
    assert_eq!(after, rounded_to_pages(500));
    Ok(())
}

#[test]
fn preallocated_tree_keeps_its_footprint() -> Result<()> {
    let mut tree = Tree::create(1_000, NODE_SIZE, 4, true)?;
    let reserved = tree.stats().physical_bytes;
    assert!(reserved >= rounded_to_pages(1_000));
    for value in 0..1_000u32 {
        tree.insert(&record(value))?;
    }
    for value in 0..1_000u32 {
        tree.remove(&value.to_be_bytes())?;
    }
    assert_eq!(tree.stats().physical_bytes, reserved);
    assert_eq!(tree.arena_stats().page_releases, 0);
    Ok(())
}
