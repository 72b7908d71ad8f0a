//! Incremental state commitment.
//!
//! The engine applies batches of key updates to a trie whose nodes live in a
//! `CommitmentContext`, re-hashing only the paths the batch touches.

mod context;
mod engine;
mod update;


pub use context::{CommitmentContext, SharedCommitmentContext};
pub use engine::CommitmentEngine;
pub use update::Update;
