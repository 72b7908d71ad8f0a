//! Core data structures for trie navigation.

mod nibble_path;

pub use nibble_path::{NibbleIterator, NibblePath};
pub(crate) use nibble_path::common_prefix_len;

#[cfg(test)]
mod tests;
