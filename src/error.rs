//! Error types shared by the commitment engine and the flat trie loader.

use thiserror::Error;

use crate::data::NibblePath;

/// Errors raised by the key-value store collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store backend error: {0}")]
    Backend(String),
    #[error("Table not found")]
    NotFound,
}

/// Trie errors.
///
/// Data-integrity errors (`CorruptNode`, `CorruptValue`) are fatal: the
/// stored state is authoritative and a decode failure means it was damaged
/// upstream. Nothing in this crate retries.
#[derive(Error, Debug)]
pub enum TrieError {
    #[error("Duplicate key in update batch: 0x{}", hex::encode(.0))]
    DuplicateKey(Vec<u8>),
    #[error("Corrupt trie node at prefix [{prefix}]: {reason}")]
    CorruptNode { prefix: NibblePath, reason: String },
    #[error("Corrupt value for key 0x{}: {reason}", hex::encode(.key))]
    CorruptValue { key: Vec<u8>, reason: String },
    #[error("Store iteration failed: {0}")]
    Iteration(#[from] StoreError),
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Keys out of order: [{current}] after [{previous}]")]
    UnsortedKeys { previous: NibblePath, current: NibblePath },
    #[error("Node sink failed: {0}")]
    Sink(String),
}

impl TrieError {
    /// Returns true if re-running the same computation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TrieError::Cancelled | TrieError::Iteration(_))
    }

    pub(crate) fn corrupt_node(prefix: &[u8], reason: impl Into<String>) -> Self {
        TrieError::CorruptNode {
            prefix: NibblePath::from(prefix.to_vec()),
            reason: reason.into(),
        }
    }

    pub(crate) fn corrupt_value(key: &[u8], reason: impl Into<String>) -> Self {
        TrieError::CorruptValue {
            key: key.to_vec(),
            reason: reason.into(),
        }
    }
}
