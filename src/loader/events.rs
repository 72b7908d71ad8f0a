//! Branch nodes handed to loader sinks.

use crate::data::NibblePath;
use crate::merkle::Hash;

/// A retained branch node, emitted once all of its children are final.
///
/// Bit `i` of each mask refers to the child at nibble `i`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BranchNodeEvent {
    /// Full nibble prefix of the branch, including any retain prefix of the
    /// trie it belongs to. Storage branches start with the nibbles of
    /// `account_key ++ incarnation`.
    pub prefix: NibblePath,
    /// Children that exist.
    pub state_mask: u16,
    /// Children whose subtree contains an emitted branch.
    pub tree_mask: u16,
    /// Children referenced by a 32-byte hash rather than inline.
    pub hash_mask: u16,
    /// Hashes of the `hash_mask` children, in nibble order.
    pub child_hashes: Vec<Hash>,
    /// Keccak-256 of the branch encoding.
    pub node_hash: Hash,
}

impl BranchNodeEvent {
    /// Returns true if the branch has a child at `nibble`.
    pub fn has_child(&self, nibble: u8) -> bool {
        self.state_mask & (1 << nibble) != 0
    }

    /// Number of children.
    pub fn child_count(&self) -> u32 {
        self.state_mask.count_ones()
    }

    /// Returns the hash of the child at `nibble` if it is hash-referenced.
    pub fn child_hash(&self, nibble: u8) -> Option<&Hash> {
        let bit = 1u16 << nibble;
        if self.hash_mask & bit == 0 {
            return None;
        }
        let index = (self.hash_mask & (bit - 1)).count_ones() as usize;
        self.child_hashes.get(index)
    }
}
