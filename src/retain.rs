//! Retain deciders: which trie nodes a load hands out to its sinks.
//!
//! A load visits every branch node of the trie. Nodes nobody asked for are
//! collapsed to their hash; nodes whose prefix the decider retains are
//! emitted as `BranchNodeEvent`s.

use crate::data::NibblePath;
use crate::store::storage_prefix;

/// Decides whether the node at a nibble prefix is retained.
///
/// Must be a pure function of the prefix. A parent and its children are
/// decided independently.
pub trait RetainDecider {
    fn should_retain(&self, prefix: &NibblePath) -> bool;
}

impl<F> RetainDecider for F
where
    F: Fn(&NibblePath) -> bool,
{
    fn should_retain(&self, prefix: &NibblePath) -> bool {
        self(prefix)
    }
}

/// Retains every node.
#[derive(Clone, Copy, Debug, Default)]
pub struct RetainAll;

impl RetainDecider for RetainAll {
    fn should_retain(&self, _prefix: &NibblePath) -> bool {
        true
    }
}

/// Retains nothing; only the root hash is produced.
#[derive(Clone, Copy, Debug, Default)]
pub struct RetainNone;

impl RetainDecider for RetainNone {
    fn should_retain(&self, _prefix: &NibblePath) -> bool {
        false
    }
}

/// A sorted set of nibble patterns.
///
/// An exact pattern `p` retains every prefix of `p`, i.e. the nodes on the
/// path from the root to `p`. A wildcard pattern additionally retains every
/// prefix extending it, i.e. the whole subtree below `p`.
///
/// An empty list retains nothing.
#[derive(Clone, Debug, Default)]
pub struct RetainList {
    exact: Vec<NibblePath>,
    wildcards: Vec<NibblePath>,
}

impl RetainList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a key given as bytes.
    pub fn add_key(&mut self, key: &[u8]) {
        self.add_hex(NibblePath::from_bytes(key));
    }

    /// Adds a key given as nibbles.
    pub fn add_hex(&mut self, path: NibblePath) {
        if let Err(pos) = self.exact.binary_search(&path) {
            self.exact.insert(pos, path);
        }
    }

    /// Adds a pattern that retains the whole subtree below `path`.
    pub fn add_wildcard(&mut self, path: NibblePath) {
        if let Err(pos) = self.wildcards.binary_search(&path) {
            self.wildcards.insert(pos, path);
        }
    }

    /// Adds a storage slot of an account generation.
    pub fn add_storage_key(&mut self, account_key: &[u8], incarnation: u64, slot: &[u8]) {
        let mut key = storage_prefix(account_key, incarnation);
        key.extend_from_slice(slot);
        self.add_key(&key);
    }

    /// Number of patterns.
    pub fn len(&self) -> usize {
        self.exact.len() + self.wildcards.len()
    }

    /// Returns true if the list holds no pattern.
    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.wildcards.is_empty()
    }
}

impl RetainDecider for RetainList {
    fn should_retain(&self, prefix: &NibblePath) -> bool {
        // Exact keys are sorted, so the first key >= prefix is the only
        // candidate that can extend it.
        let pos = self.exact.partition_point(|key| key < prefix);
        if self.exact.get(pos).is_some_and(|key| key.starts_with(prefix)) {
            return true;
        }
        self.wildcards
            .iter()
            .any(|w| prefix.starts_with(w) || w.starts_with(prefix))
    }
}
