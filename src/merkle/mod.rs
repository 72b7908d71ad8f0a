//! Merkle Patricia Trie node encoding.
//!
//! This module holds the node model shared by the commitment engine and the
//! flat trie loader, together with RLP encoding/decoding and Keccak hashing.

mod node;
mod rlp_decode;
mod rlp_encode;


pub use node::{
    keccak256, ChildRef, Hash, KeccakCodec, NodeCodec, NodeType, TrieNode, EMPTY_ROOT, HASH_SIZE,
};
pub use rlp_decode::{decode_hex_prefix, decode_list, decode_node, RlpDecoder, RlpError, RlpItem};
pub use rlp_encode::RlpEncoder;
pub(crate) use rlp_encode::hex_prefix;
