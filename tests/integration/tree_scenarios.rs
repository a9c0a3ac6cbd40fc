//! End-to-end scenarios against the public tree API.

use arbor::{ArborError, Result, Tree, TreeOptions};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn key(value: u32) -> [u8; 4] {
    value.to_be_bytes()
}

/// Four-byte key followed by a four-byte tag.
fn row(value: u32, tag: &[u8; 4]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[..4].copy_from_slice(&key(value));
    out[4..].copy_from_slice(tag);
    out
}

fn walk(tree: &Tree) -> Result<Vec<u32>> {
    let mut seen = Vec::new();
    let mut out = [0u8; 8];
    match tree.first_into(&mut out) {
        Ok(()) => {}
        Err(ArborError::EmptyTree) => return Ok(seen),
        Err(err) => return Err(err),
    }
    loop {
        seen.push(u32::from_be_bytes([out[0], out[1], out[2], out[3]]));
        let probe = out;
        match tree.next_into(&probe[..4], &mut out) {
            Ok(()) => {}
            Err(ArborError::NotFound) => return Ok(seen),
            Err(err) => return Err(err),
        }
    }
}

#[test]
fn build_scan_and_remove() -> Result<()> {
    init_tracing();
    let mut tree = Tree::create(16, 8, 4, false)?;
    for value in [5, 3, 8, 1, 4, 7, 9, 2, 6] {
        tree.insert(&row(value, b"data"))?;
    }
    assert_eq!(walk(&tree)?, (1..=9).collect::<Vec<_>>());

    tree.remove(&key(5))?;
    assert_eq!(walk(&tree)?, vec![1, 2, 3, 4, 6, 7, 8, 9]);
    let report = tree.verify();
    assert!(report.success, "{:?}", report.findings);
    assert_eq!(tree.stats().live_count, 8);
    Ok(())
}

#[test]
fn payload_beyond_key_is_preserved() -> Result<()> {
    init_tracing();
    let mut tree = Tree::create(8, 8, 4, false)?;
    tree.insert(&row(2, b"beta"))?;
    tree.insert(&row(1, b"alfa"))?;
    tree.insert(&row(3, b"gama"))?;
    tree.remove(&key(1))?;

    let mut out = [0u8; 8];
    tree.first_into(&mut out)?;
    assert_eq!(&out[4..], b"beta");
    tree.next_into(&key(2), &mut out)?;
    assert_eq!(&out[4..], b"gama");
    Ok(())
}

#[test]
fn oversized_output_buffer_is_filled_up_to_node_size() -> Result<()> {
    let mut tree = Tree::create(4, 8, 4, false)?;
    tree.insert(&row(9, b"nine"))?;
    let mut out = [0xEEu8; 12];
    tree.first_into(&mut out)?;
    assert_eq!(&out[..8], &row(9, b"nine"));
    assert_eq!(&out[8..], &[0xEE; 4]);
    Ok(())
}

#[test]
fn capacity_is_enforced_and_recovers() -> Result<()> {
    let mut tree = Tree::with_options(
        TreeOptions::default().max_nodes(3).layout(8, 4),
        arbor::ByteOrder,
    )?;
    for value in 0..3 {
        tree.insert(&row(value, b"fill"))?;
    }
    assert!(matches!(
        tree.insert(&row(3, b"over")),
        Err(ArborError::CapacityExceeded)
    ));
    tree.remove(&key(0))?;
    tree.insert(&row(3, b"over"))?;
    assert_eq!(walk(&tree)?, vec![1, 2, 3]);
    Ok(())
}

#[test]
fn configuration_errors() {
    assert!(matches!(
        Tree::create(1, 8, 0, false),
        Err(ArborError::Config(_))
    ));
    assert!(matches!(
        Tree::create(0, 8, 4, false),
        Err(ArborError::Config(_))
    ));
    assert!(matches!(
        Tree::create(1, 4, 5, true),
        Err(ArborError::Config(_))
    ));
}

#[test]
fn reports_serialize_to_json() -> Result<()> {
    let mut tree = Tree::create(8, 8, 4, false)?;
    for value in [3, 1, 2] {
        tree.insert(&row(value, b"json"))?;
    }
    tree.counters().emit_tracing();

    let stats = serde_json::to_value(tree.stats()).expect("stats json");
    assert_eq!(stats["live_count"], 3);
    let counters = serde_json::to_value(tree.counters().snapshot()).expect("counters json");
    assert_eq!(counters["inserts"], 3);
    assert_eq!(counters["double_rotations"], 1);
    let report = serde_json::to_value(tree.verify()).expect("report json");
    assert_eq!(report["success"], true);
    assert_eq!(report["height"], 1);
    Ok(())
}
