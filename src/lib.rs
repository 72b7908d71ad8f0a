//! # ethrex_commitment
//!
//! Ethereum state commitment: Merkle Patricia Trie roots over a flat
//! key-value state store.
//!
//! ## Architecture
//!
//! The library computes roots in two complementary ways:
//!
//! 1. **CommitmentEngine** - Incremental: applies batches of key updates and
//!    re-hashes only the touched paths, reusing node encodings kept in a
//!    `CommitmentContext`.
//! 2. **FlatTrieLoader** - Streaming: scans the accounts and storage tables
//!    in key order with a depth-bounded `HashStack`, emitting the branch
//!    nodes a `RetainDecider` asks for.
//!
//! ## Modules
//!
//! - `data` - Nibble paths
//! - `merkle` - Node model, RLP encoding and Keccak hashing
//! - `store` - Flat store interface and account encoding
//! - `retain` - Retain deciders
//! - `commitment` - Incremental commitment engine
//! - `loader` - Streaming root computation
//! - `error`, `config`, `cancel` - Shared plumbing

pub mod cancel;
pub mod commitment;
pub mod config;
pub mod data;
pub mod error;
pub mod loader;
pub mod merkle;
pub mod retain;
pub mod store;

pub use cancel::CancellationToken;
pub use commitment::{CommitmentContext, CommitmentEngine, SharedCommitmentContext, Update};
pub use config::{EngineConfig, LoaderConfig};
pub use data::NibblePath;
pub use error::{StoreError, TrieError};
pub use loader::{calc_root_sorted, BranchNodeEvent, FlatTrieLoader, HashStack};
pub use merkle::{keccak256, ChildRef, Hash, KeccakCodec, NodeCodec, TrieNode, EMPTY_ROOT};
pub use retain::{RetainAll, RetainDecider, RetainList, RetainNone};
pub use store::{Account, KvReader, MemoryKv, Table};
