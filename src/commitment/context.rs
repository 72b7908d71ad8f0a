//! Commitment context: the node encodings an incremental engine reuses.

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::{Mutex, MutexGuard};
use rustc_hash::FxBuildHasher;

use super::engine::CommitmentEngine;
use super::update::Update;
use crate::error::TrieError;
use crate::merkle::{Hash, NodeCodec, EMPTY_ROOT};

/// Type alias for our fast HashMap with FxHash.
type FastHashMap<K, V> = HashMap<K, V, FxBuildHasher>;

/// Maps the nibble prefix of every hash-referenced node to its canonical
/// encoding.
///
/// The root encoding is always kept at the empty prefix, even when it is
/// shorter than a hash. Nodes embedded inline in their parent are not
/// stored on their own.
#[derive(Clone, Debug, Default)]
pub struct CommitmentContext {
    nodes: FastHashMap<Vec<u8>, Vec<u8>>,
    root: Option<Hash>,
}

impl CommitmentContext {
    /// Creates the context of an empty trie.
    pub fn new() -> Self {
        Self {
            nodes: FastHashMap::with_hasher(FxBuildHasher),
            root: None,
        }
    }

    /// Returns the current root hash, `EMPTY_ROOT` for an empty trie.
    pub fn root_hash(&self) -> Hash {
        self.root.unwrap_or(EMPTY_ROOT)
    }

    /// Returns true if the trie holds no key.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Number of stored node encodings.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the encoding stored at a nibble prefix.
    pub fn node(&self, prefix: &[u8]) -> Option<&[u8]> {
        self.nodes.get(prefix).map(Vec::as_slice)
    }

    pub(crate) fn root(&self) -> Option<Hash> {
        self.root
    }

    /// Replaces the encodings of a finished batch.
    ///
    /// Every prefix in `evicted` is dropped before `written` is inserted,
    /// so a rebuilt node may reuse the prefix of the node it replaced.
    pub(crate) fn apply(
        &mut self,
        evicted: Vec<Vec<u8>>,
        written: Vec<(Vec<u8>, Vec<u8>)>,
        root: Option<Hash>,
    ) {
        if root.is_none() {
            self.nodes.clear();
            self.root = None;
            return;
        }
        for prefix in &evicted {
            self.nodes.remove(prefix);
        }
        self.nodes.extend(written);
        self.root = root;
    }

    #[cfg(test)]
    pub(crate) fn insert_raw(&mut self, prefix: Vec<u8>, encoded: Vec<u8>) {
        self.nodes.insert(prefix, encoded);
    }
}

/// A commitment context shared between threads.
///
/// Batches are serialized by the mutex; a batch that fails leaves the
/// context as the last successful batch left it.
#[derive(Clone, Debug, Default)]
pub struct SharedCommitmentContext {
    inner: Arc<Mutex<CommitmentContext>>,
}

impl SharedCommitmentContext {
    /// Wraps an existing context.
    pub fn new(ctx: CommitmentContext) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ctx)),
        }
    }

    /// Locks the context for direct access.
    pub fn lock(&self) -> MutexGuard<'_, CommitmentContext> {
        self.inner.lock()
    }

    /// Returns the current root hash.
    pub fn root_hash(&self) -> Hash {
        self.inner.lock().root_hash()
    }

    /// Applies a batch under the lock.
    pub fn process<C: NodeCodec>(
        &self,
        engine: &CommitmentEngine<C>,
        batch: Vec<Update>,
        label: &str,
    ) -> Result<Hash, TrieError> {
        let mut ctx = self.inner.lock();
        engine.process(&mut ctx, batch, label)
    }
}
