use std::cmp::Ordering;

use serde::Serialize;

use crate::types::SlotId;

use super::options::KeyOrder;
use super::tree::Tree;

const MAX_FINDINGS: usize = 32;

/// A single issue discovered during verification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VerifyFinding {
    /// Slot the issue was found at, when it concerns one node.
    pub slot: Option<u32>,
    /// Human-readable description of the issue.
    pub message: String,
}

/// Complete report of a structural verification pass.
#[derive(Clone, Debug, Default, Serialize)]
pub struct VerifyReport {
    /// Whether verification passed without finding any issues.
    pub success: bool,
    /// Number of nodes reached from the root.
    pub nodes_reached: u32,
    /// Height of the root as recomputed from the leaves, `-1` when empty.
    pub height: i32,
    /// Issues discovered, capped at a fixed number.
    pub findings: Vec<VerifyFinding>,
    /// Whether findings were dropped because of the cap.
    pub truncated: bool,
}

struct Walk {
    reached: u32,
    previous: Option<SlotId>,
    findings: Vec<VerifyFinding>,
    truncated: bool,
}

impl Walk {
    fn push(&mut self, slot: Option<SlotId>, message: impl Into<String>) {
        if self.findings.len() >= MAX_FINDINGS {
            self.truncated = true;
            return;
        }
        self.findings.push(VerifyFinding {
            slot: slot.map(|slot| slot.0),
            message: message.into(),
        });
    }
}

impl<C: KeyOrder> Tree<C> {
    /// Checks every structural invariant of the tree.
    ///
    /// Parent back-references, cached heights, balance factors, strict key
    /// order, the dense slot prefix and the node count are all examined. The
    /// tree is not modified.
    pub fn verify(&self) -> VerifyReport {
        let mut walk = Walk {
            reached: 0,
            previous: None,
            findings: Vec::new(),
            truncated: false,
        };
        if self.num_nodes != self.arena.len() {
            walk.push(
                None,
                format!(
                    "node count {} differs from live arena slots {}",
                    self.num_nodes,
                    self.arena.len()
                ),
            );
        }
        let height = match self.root {
            Some(root) => self.verify_subtree(root, None, &mut walk) - 1,
            None => -1,
        };
        if walk.reached != self.num_nodes {
            walk.push(
                None,
                format!(
                    "reached {} nodes from the root, expected {}",
                    walk.reached, self.num_nodes
                ),
            );
        }
        VerifyReport {
            success: walk.findings.is_empty() && !walk.truncated,
            nodes_reached: walk.reached,
            height,
            findings: walk.findings,
            truncated: walk.truncated,
        }
    }

    /// Returns the contribution of `slot` to its parent (`height + 1`).
    fn verify_subtree(&self, slot: SlotId, parent: Option<SlotId>, walk: &mut Walk) -> i32 {
        if slot.0 >= self.arena.len() {
            walk.push(Some(slot), "link points outside the live slot prefix");
            return 0;
        }
        if walk.reached >= self.num_nodes {
            walk.push(Some(slot), "more nodes reachable than stored; cycle suspected");
            return 0;
        }
        walk.reached += 1;

        let header = self.header(slot);
        if header.parent != parent {
            walk.push(
                Some(slot),
                format!(
                    "parent link {:?} does not match actual parent {:?}",
                    header.parent, parent
                ),
            );
        }

        let left = header
            .left
            .map_or(0, |left| self.verify_subtree(left, Some(slot), walk));

        if let Some(previous) = walk.previous {
            if self.compare(self.payload(previous), slot) != Ordering::Less {
                walk.push(Some(slot), format!("key not greater than slot {previous}"));
            }
        }
        walk.previous = Some(slot);

        let right = header
            .right
            .map_or(0, |right| self.verify_subtree(right, Some(slot), walk));

        let height = left.max(right);
        if header.height != height {
            walk.push(
                Some(slot),
                format!("cached height {} but subtree height {}", header.height, height),
            );
        }
        let balance = right - left;
        if !(-1..=1).contains(&balance) {
            walk.push(Some(slot), format!("balance factor {balance} out of range"));
        }
        height + 1
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::avl::node::{self, Link};
    use crate::storage::avl::Tree;
    use crate::types::Result;

    fn filled(keys: &[u8]) -> Result<Tree> {
        let mut tree = Tree::create(32, 1, 1, false)?;
        for key in keys {
            tree.insert(&[*key])?;
        }
        Ok(tree)
    }

    #[test]
    fn healthy_tree_passes() -> Result<()> {
        let tree = filled(&[8, 4, 12, 2, 6, 10, 14, 1])?;
        let report = tree.verify();
        assert!(report.success, "{:?}", report.findings);
        assert_eq!(report.nodes_reached, 8);
        assert_eq!(report.height, 3);
        assert_eq!(Some(report.height as u32), tree.height());
        Ok(())
    }

    #[test]
    fn empty_tree_passes() -> Result<()> {
        let report = filled(&[])?.verify();
        assert!(report.success);
        assert_eq!(report.height, -1);
        Ok(())
    }

    #[test]
    fn detects_stale_height() -> Result<()> {
        let mut tree = filled(&[2, 1, 3])?;
        let root = tree.root.unwrap();
        node::write_height(tree.arena.slot_mut(root), 4);
        let report = tree.verify();
        assert!(!report.success);
        assert!(report
            .findings
            .iter()
            .any(|finding| finding.message.contains("cached height")));
        Ok(())
    }

    #[test]
    fn detects_broken_parent_link_and_order() -> Result<()> {
        let mut tree = filled(&[2, 1, 3])?;
        let root = tree.root.unwrap();
        let left = tree.link(root, Link::Left).unwrap();
        tree.set_link(left, Link::Parent, None);
        node::payload_mut(tree.arena.slot_mut(left))[0] = 9;
        let report = tree.verify();
        let messages: Vec<_> = report.findings.iter().map(|f| f.message.as_str()).collect();
        assert!(messages.iter().any(|m| m.contains("parent link")));
        assert!(messages.iter().any(|m| m.contains("not greater")));
        Ok(())
    }
}
