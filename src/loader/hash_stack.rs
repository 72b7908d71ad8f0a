//! HashStack - streaming trie hashing over sorted keys.
//!
//! Keys arrive in strictly ascending order. The stack holds one frame per
//! open branch on the path of the last key, so memory is bounded by the key
//! length rather than the number of keys.
//!
//! ## Algorithm
//!
//! For every new key:
//! 1. Compute the common prefix length `cp` with the previous key.
//! 2. Close every frame deeper than `cp`: encode the branch, hash it, emit it
//!    if retained, and fold the result into its parent as a `ChildRef`.
//! 3. Open a frame at depth `cp` if there is none and fold the previous key
//!    into it.
//! 4. Keep the new key as the pending leaf.
//!
//! `finish` closes the remaining frames. The last folded subtree is the
//! root, behind a leading extension if the top branch is deeper than zero.

use tracing::trace;

use super::events::BranchNodeEvent;
use crate::data::{common_prefix_len, NibblePath};
use crate::error::TrieError;
use crate::merkle::{ChildRef, Hash, KeccakCodec, NodeCodec, TrieNode};
use crate::retain::RetainDecider;

/// An open branch.
#[derive(Clone, Debug, Default)]
struct StackFrame {
    /// Nibble depth of the branch (0 = root).
    depth: usize,
    children: [Option<ChildRef>; 16],
    /// Value of a key ending exactly at this branch.
    value: Option<Vec<u8>>,
    tree_mask: u16,
}

impl StackFrame {
    fn branch(depth: usize) -> Self {
        Self {
            depth,
            ..Default::default()
        }
    }
}

/// The subtree of the previous key that is not yet part of any frame.
#[derive(Debug)]
enum Pending {
    /// The previous key itself.
    Leaf { value: Vec<u8> },
    /// A closed branch on the path of the previous key.
    Branch {
        depth: usize,
        branch_ref: ChildRef,
        retained: bool,
    },
}

/// Streaming root computation with retained-node events.
pub struct HashStack<'d, C = KeccakCodec> {
    codec: C,
    decider: &'d dyn RetainDecider,
    /// Nibbles prepended to every prefix passed to the decider.
    retain_prefix: Vec<u8>,
    stack: Vec<StackFrame>,
    pending: Option<Pending>,
    prev_key: Vec<u8>,
    events: Vec<BranchNodeEvent>,
    entry_count: usize,
    trace: bool,
}

impl<'d> HashStack<'d, KeccakCodec> {
    /// Creates a stack with the Ethereum codec.
    pub fn new(decider: &'d dyn RetainDecider) -> Self {
        Self::with_codec(KeccakCodec, decider)
    }
}

impl<'d, C: NodeCodec> HashStack<'d, C> {
    /// Creates a stack with a custom node codec.
    pub fn with_codec(codec: C, decider: &'d dyn RetainDecider) -> Self {
        Self {
            codec,
            decider,
            retain_prefix: Vec::new(),
            stack: Vec::with_capacity(64),
            pending: None,
            prev_key: Vec::new(),
            events: Vec::new(),
            entry_count: 0,
            trace: false,
        }
    }

    /// Sets the prefix the decider and the events see in front of every
    /// branch prefix (for a storage trie: the account key and incarnation).
    pub fn with_retain_prefix(mut self, prefix: NibblePath) -> Self {
        self.retain_prefix = prefix.to_nibbles();
        self
    }

    /// Logs every closed branch at `trace` level.
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// Number of keys added.
    pub fn len(&self) -> usize {
        self.entry_count
    }

    /// Returns true if no key was added.
    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    /// Takes the events emitted so far.
    pub fn take_events(&mut self) -> Vec<BranchNodeEvent> {
        std::mem::take(&mut self.events)
    }

    /// Adds a key (as nibbles) with its leaf value.
    ///
    /// Keys must be strictly ascending.
    pub fn add_leaf(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), TrieError> {
        if self.pending.is_none() {
            self.pending = Some(Pending::Leaf { value });
            self.prev_key = key.to_vec();
            self.entry_count = 1;
            return Ok(());
        }
        if key <= self.prev_key.as_slice() {
            return Err(TrieError::UnsortedKeys {
                previous: NibblePath::from_nibbles(&self.prev_key),
                current: NibblePath::from_nibbles(key),
            });
        }

        let cp = common_prefix_len(&self.prev_key, key);
        self.collapse_to_depth(cp);

        if self.stack.last().map_or(true, |top| top.depth < cp) {
            self.stack.push(StackFrame::branch(cp));
        }
        self.fold_pending();

        self.pending = Some(Pending::Leaf { value });
        self.prev_key = key.to_vec();
        self.entry_count += 1;
        Ok(())
    }

    /// Closes all frames and returns the root hash.
    pub fn finish(&mut self) -> Hash {
        if self.pending.is_none() {
            return self.codec.empty_root();
        }
        while !self.stack.is_empty() {
            self.fold_pending();
            self.close_top();
        }

        let root = match self.pending.take() {
            Some(Pending::Leaf { value }) => {
                let leaf = TrieNode::leaf(NibblePath::from_nibbles(&self.prev_key), value);
                self.codec.hash(&self.codec.encode(&leaf))
            }
            Some(Pending::Branch {
                depth, branch_ref, ..
            }) if depth > 0 => {
                let ext = TrieNode::extension(
                    NibblePath::from_nibbles(&self.prev_key[..depth]),
                    branch_ref,
                );
                self.codec.hash(&self.codec.encode(&ext))
            }
            Some(Pending::Branch {
                branch_ref: ChildRef::Hash(hash),
                ..
            }) => hash,
            Some(Pending::Branch {
                branch_ref: ChildRef::Inline(encoded),
                ..
            }) => self.codec.hash(&encoded),
            None => self.codec.empty_root(),
        };
        self.entry_count = 0;
        self.prev_key.clear();
        root
    }

    /// Closes every frame deeper than `depth`.
    fn collapse_to_depth(&mut self, depth: usize) {
        while self.stack.last().is_some_and(|top| top.depth > depth) {
            self.fold_pending();
            self.close_top();
        }
    }

    /// Moves the pending subtree into the top frame.
    fn fold_pending(&mut self) {
        let Some(parent) = self.stack.last_mut() else {
            return;
        };
        let Some(pending) = self.pending.take() else {
            return;
        };
        let parent_depth = parent.depth;

        if self.prev_key.len() == parent_depth {
            // The previous key ends at this branch.
            if let Pending::Leaf { value } = pending {
                parent.value = Some(value);
            }
            return;
        }

        let slot = self.prev_key[parent_depth] as usize;
        let rest = &self.prev_key[parent_depth + 1..];
        let (child, retained) = match pending {
            Pending::Leaf { value } => {
                let leaf = TrieNode::leaf(NibblePath::from_nibbles(rest), value);
                (self.codec.child_ref(self.codec.encode(&leaf)), false)
            }
            Pending::Branch {
                depth,
                branch_ref,
                retained,
            } => {
                if depth == parent_depth + 1 {
                    (branch_ref, retained)
                } else {
                    let ext = TrieNode::extension(
                        NibblePath::from_nibbles(&self.prev_key[parent_depth + 1..depth]),
                        branch_ref,
                    );
                    (self.codec.child_ref(self.codec.encode(&ext)), retained)
                }
            }
        };

        parent.children[slot] = Some(child);
        if retained {
            parent.tree_mask |= 1 << slot;
        }
    }

    /// Pops the top frame, emits it if retained and makes it the pending
    /// subtree.
    fn close_top(&mut self) {
        let Some(frame) = self.stack.pop() else {
            return;
        };

        let mut state_mask = 0u16;
        let mut hash_mask = 0u16;
        let mut child_hashes = Vec::new();
        for (i, child) in frame.children.iter().enumerate() {
            match child {
                Some(ChildRef::Hash(hash)) => {
                    state_mask |= 1 << i;
                    hash_mask |= 1 << i;
                    child_hashes.push(*hash);
                }
                Some(ChildRef::Inline(_)) => state_mask |= 1 << i,
                None => {}
            }
        }

        let node = TrieNode::Branch {
            children: Box::new(frame.children),
            value: frame.value,
        };
        let encoded = self.codec.encode(&node);

        let mut prefix = self.retain_prefix.clone();
        prefix.extend_from_slice(&self.prev_key[..frame.depth]);
        let prefix = NibblePath::from_nibbles(&prefix);
        let retained = self.decider.should_retain(&prefix);

        if self.trace {
            trace!(
                target: "trie::loader",
                prefix = %prefix,
                state_mask,
                tree_mask = frame.tree_mask,
                retained,
                "closed branch"
            );
        }

        if retained {
            self.events.push(BranchNodeEvent {
                prefix,
                state_mask,
                tree_mask: frame.tree_mask,
                hash_mask,
                child_hashes,
                node_hash: self.codec.hash(&encoded),
            });
        }

        self.pending = Some(Pending::Branch {
            depth: frame.depth,
            branch_ref: self.codec.child_ref(encoded),
            retained: retained || frame.tree_mask != 0,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitment::{CommitmentContext, CommitmentEngine, Update};
    use crate::config::EngineConfig;
    use crate::merkle::{keccak256, EMPTY_ROOT};
    use crate::retain::{RetainAll, RetainNone};

    fn nibbles(bytes: &[u8]) -> Vec<u8> {
        NibblePath::from_bytes(bytes).to_nibbles()
    }

    fn engine_root(pairs: &[(Vec<u8>, Vec<u8>)]) -> Hash {
        let mut ctx = CommitmentContext::new();
        let batch = pairs
            .iter()
            .map(|(k, v)| Update::put(k.clone(), v.clone()))
            .collect();
        CommitmentEngine::new(EngineConfig::default())
            .process(&mut ctx, batch, "check")
            .unwrap()
    }

    fn stack_root(pairs: &[(Vec<u8>, Vec<u8>)], decider: &dyn RetainDecider) -> (Hash, Vec<BranchNodeEvent>) {
        let mut stack = HashStack::new(decider);
        for (k, v) in pairs {
            stack.add_leaf(&nibbles(k), v.clone()).unwrap();
        }
        let root = stack.finish();
        (root, stack.take_events())
    }

    #[test]
    fn test_empty() {
        let mut stack = HashStack::new(&RetainAll);
        assert!(stack.is_empty());
        assert_eq!(stack.finish(), EMPTY_ROOT);
        assert!(stack.take_events().is_empty());
    }

    #[test]
    fn test_single_key_no_branch() {
        let pairs = vec![(vec![0x01], vec![0xaa])];
        let (root, events) = stack_root(&pairs, &RetainAll);
        let leaf = TrieNode::leaf(NibblePath::from_bytes(&[0x01]), vec![0xaa]);
        assert_eq!(root, keccak256(&leaf.encode()));
        assert!(events.is_empty());
    }

    #[test]
    fn test_two_keys_branch_at_depth_one() {
        let pairs = vec![(vec![0x01], vec![0xaa]), (vec![0x02], vec![0xbb])];
        let (root, events) = stack_root(&pairs, &RetainAll);
        assert_eq!(root, engine_root(&pairs));

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.prefix.as_slice(), &[0]);
        assert_eq!(event.state_mask, 0b110);
        assert_eq!(event.hash_mask, 0);
        assert_eq!(event.tree_mask, 0);
        assert!(event.child_hashes.is_empty());
    }

    #[test]
    fn test_matches_engine_on_hashed_keys() {
        let pairs: Vec<(Vec<u8>, Vec<u8>)> = {
            let mut pairs: Vec<_> = (0u32..300)
                .map(|i| (keccak256(&i.to_le_bytes()).to_vec(), vec![0x80 | (i as u8 & 0x7f); 20]))
                .collect();
            pairs.sort();
            pairs
        };
        let (root, events) = stack_root(&pairs, &RetainNone);
        assert_eq!(root, engine_root(&pairs));
        assert!(events.is_empty());
    }

    #[test]
    fn test_prefix_key_becomes_branch_value() {
        let pairs = vec![
            (vec![0xab], vec![1]),
            (vec![0xab, 0xcd], vec![2]),
            (vec![0xab, 0xce], vec![3]),
        ];
        let (root, _) = stack_root(&pairs, &RetainNone);
        assert_eq!(root, engine_root(&pairs));
    }

    #[test]
    fn test_children_emitted_before_parent() {
        let pairs: Vec<(Vec<u8>, Vec<u8>)> = [[0x10, 0x01], [0x10, 0x02], [0x20, 0x01], [0x20, 0x02]]
            .iter()
            .map(|k| (k.to_vec(), vec![0x55; 40]))
            .collect();
        let (root, events) = stack_root(&pairs, &RetainAll);
        assert_eq!(root, engine_root(&pairs));

        let prefixes: Vec<Vec<u8>> = events.iter().map(|e| e.prefix.as_slice().to_vec()).collect();
        assert_eq!(prefixes, vec![vec![1, 0, 0], vec![2, 0, 0], vec![]]);

        let root_event = &events[2];
        assert_eq!(root_event.state_mask, 0b110);
        assert_eq!(root_event.tree_mask, 0b110);
        assert_eq!(root_event.node_hash, root);
    }

    #[test]
    fn test_unsorted_keys_rejected() {
        let mut stack = HashStack::new(&RetainNone);
        stack.add_leaf(&[2, 0], vec![1]).unwrap();
        let err = stack.add_leaf(&[1, 0], vec![1]).unwrap_err();
        assert!(matches!(err, TrieError::UnsortedKeys { .. }));
        let err = stack.add_leaf(&[2, 0], vec![1]).unwrap_err();
        assert!(matches!(err, TrieError::UnsortedKeys { .. }));
    }

    #[test]
    fn test_retain_prefix_is_prepended() {
        let pairs = vec![(vec![0x01], vec![0xaa]), (vec![0x02], vec![0xbb])];
        let decider = |prefix: &NibblePath| prefix.as_slice() == [0xf, 0xf, 0];
        let mut stack = HashStack::new(&decider).with_retain_prefix(NibblePath::from_bytes(&[0xff]));
        for (k, v) in &pairs {
            stack.add_leaf(&nibbles(k), v.clone()).unwrap();
        }
        stack.finish();
        let events = stack.take_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].prefix.as_slice(), &[0xf, 0xf, 0]);
    }
}
