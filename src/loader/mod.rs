//! Streaming root computation over sorted flat data.
//!
//! `HashStack` turns a sorted key sequence into a root hash with memory
//! bounded by the key length. `FlatTrieLoader` drives it over the accounts
//! and storage tables of a `KvReader`, handing retained branch nodes to
//! optional sinks.

mod events;
mod flat_loader;
mod hash_stack;


pub use events::BranchNodeEvent;
pub use flat_loader::{calc_root_sorted, AccountSink, FlatTrieLoader, StorageSink};
pub use hash_stack::HashStack;
