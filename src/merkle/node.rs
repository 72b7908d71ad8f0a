//! Merkle trie node types and the node codec.

use tiny_keccak::{Hasher, Keccak};

use super::rlp_decode::{decode_node, RlpError};
use super::rlp_encode::RlpEncoder;
use crate::data::NibblePath;

/// Hash size (Keccak-256).
pub const HASH_SIZE: usize = 32;

/// A Keccak-256 digest.
pub type Hash = [u8; HASH_SIZE];

/// Node type in the Merkle trie.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeType {
    Leaf,
    Extension,
    Branch,
    HashOnly,
}

/// How a parent node refers to one of its children.
///
/// Encodings of 32 bytes or more are referenced by their hash, shorter ones
/// are embedded verbatim in the parent.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChildRef {
    /// Keccak-256 of the child's encoding.
    Hash(Hash),
    /// The child's complete encoding.
    Inline(Vec<u8>),
}

impl ChildRef {
    /// Builds the reference for an encoded node.
    pub fn from_encoded(encoded: Vec<u8>) -> Self {
        if encoded.len() >= HASH_SIZE {
            ChildRef::Hash(keccak256(&encoded))
        } else {
            ChildRef::Inline(encoded)
        }
    }

    /// Returns true if this is a full hash (not inline).
    pub fn is_hash(&self) -> bool {
        matches!(self, ChildRef::Hash(_))
    }

    /// Returns the hash of the referenced node, hashing inline encodings.
    pub fn as_hash(&self) -> Hash {
        match self {
            ChildRef::Hash(h) => *h,
            ChildRef::Inline(data) => keccak256(data),
        }
    }
}

/// A node in the Merkle Patricia Trie.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrieNode {
    /// Leaf node: the remainder of the key and the value.
    Leaf {
        path: NibblePath,
        value: Vec<u8>,
    },

    /// Extension node: a shared path prefix and a single child.
    Extension {
        path: NibblePath,
        child: ChildRef,
    },

    /// Branch node: up to 16 children and an optional value for a key
    /// ending exactly here.
    Branch {
        children: Box<[Option<ChildRef>; 16]>,
        value: Option<Vec<u8>>,
    },

    /// A collapsed subtree known only by its hash.
    HashOnly(Hash),
}

impl TrieNode {
    /// Creates a leaf node.
    pub fn leaf(path: NibblePath, value: Vec<u8>) -> Self {
        TrieNode::Leaf { path, value }
    }

    /// Creates an extension node.
    pub fn extension(path: NibblePath, child: ChildRef) -> Self {
        TrieNode::Extension { path, child }
    }

    /// Creates an empty branch node.
    pub fn branch() -> Self {
        TrieNode::Branch {
            children: Box::default(),
            value: None,
        }
    }

    /// Returns the node type.
    pub fn node_type(&self) -> NodeType {
        match self {
            TrieNode::Leaf { .. } => NodeType::Leaf,
            TrieNode::Extension { .. } => NodeType::Extension,
            TrieNode::Branch { .. } => NodeType::Branch,
            TrieNode::HashOnly(_) => NodeType::HashOnly,
        }
    }

    /// RLP encodes the node.
    ///
    /// A `HashOnly` node encodes as its 32-byte reference string.
    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = RlpEncoder::with_capacity(64);
        self.encode_to(&mut encoder);
        encoder.into_bytes()
    }

    /// RLP encodes the node to the given encoder.
    pub fn encode_to(&self, encoder: &mut RlpEncoder) {
        match self {
            TrieNode::Leaf { path, value } => {
                encoder.encode_list(|e| {
                    e.encode_nibbles(path.as_slice(), true);
                    e.encode_bytes(value);
                });
            }
            TrieNode::Extension { path, child } => {
                encoder.encode_list(|e| {
                    e.encode_nibbles(path.as_slice(), false);
                    e.encode_child(Some(child));
                });
            }
            TrieNode::Branch { children, value } => {
                encoder.encode_list(|e| {
                    for child in children.iter() {
                        e.encode_child(child.as_ref());
                    }
                    match value {
                        Some(v) => e.encode_bytes(v),
                        None => e.encode_empty(),
                    }
                });
            }
            TrieNode::HashOnly(hash) => encoder.encode_bytes(hash),
        }
    }

    /// Computes the Keccak-256 hash of the node (always returns a hash).
    pub fn keccak(&self) -> Hash {
        match self {
            TrieNode::HashOnly(hash) => *hash,
            _ => keccak256(&self.encode()),
        }
    }

    /// Returns how a parent references this node.
    pub fn child_ref(&self) -> ChildRef {
        match self {
            TrieNode::HashOnly(hash) => ChildRef::Hash(*hash),
            _ => ChildRef::from_encoded(self.encode()),
        }
    }
}

/// Encoding and hashing of trie nodes.
///
/// Implementations must be canonical: semantically identical nodes encode to
/// identical bytes.
pub trait NodeCodec {
    /// Encodes a node.
    fn encode(&self, node: &TrieNode) -> Vec<u8>;

    /// Decodes a node previously produced by `encode`.
    fn decode(&self, encoded: &[u8]) -> Result<TrieNode, RlpError>;

    /// Hashes an encoding.
    fn hash(&self, encoded: &[u8]) -> Hash;

    /// Builds the parent reference for an encoding.
    fn child_ref(&self, encoded: Vec<u8>) -> ChildRef {
        if encoded.len() >= HASH_SIZE {
            ChildRef::Hash(self.hash(&encoded))
        } else {
            ChildRef::Inline(encoded)
        }
    }

    /// Root hash of the empty trie.
    fn empty_root(&self) -> Hash;
}

/// Ethereum node codec: RLP with hex-prefix paths, hashed with Keccak-256.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeccakCodec;

impl NodeCodec for KeccakCodec {
    fn encode(&self, node: &TrieNode) -> Vec<u8> {
        node.encode()
    }

    fn decode(&self, encoded: &[u8]) -> Result<TrieNode, RlpError> {
        decode_node(encoded)
    }

    fn hash(&self, encoded: &[u8]) -> Hash {
        keccak256(encoded)
    }

    fn empty_root(&self) -> Hash {
        EMPTY_ROOT
    }
}

/// Computes Keccak-256 hash of data.
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut hash = [0u8; HASH_SIZE];
    hasher.finalize(&mut hash);
    hash
}

/// The empty trie root hash (keccak of RLP empty string).
pub const EMPTY_ROOT: Hash = [
    0x56, 0xe8, 0x1f, 0x17, 0x1b, 0xcc, 0x55, 0xa6,
    0xff, 0x83, 0x45, 0xe6, 0x92, 0xc0, 0xf8, 0x6e,
    0x5b, 0x48, 0xe0, 0x1b, 0x99, 0x6c, 0xad, 0xc0,
    0x01, 0x62, 0x2f, 0xb5, 0xe3, 0x63, 0xb4, 0x21,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_root_hash() {
        // Empty trie root is keccak256(RLP(""))
        assert_eq!(keccak256(&[0x80]), EMPTY_ROOT);
        assert_eq!(KeccakCodec.empty_root(), EMPTY_ROOT);
    }

    #[test]
    fn test_small_leaf_is_inline() {
        let node = TrieNode::leaf(NibblePath::from_nibbles(&[1, 2, 3]), vec![0xAB, 0xCD]);
        assert_eq!(node.node_type(), NodeType::Leaf);
        match node.child_ref() {
            ChildRef::Inline(bytes) => assert_eq!(bytes, node.encode()),
            other => panic!("expected inline child, got {:?}", other),
        }
    }

    #[test]
    fn test_large_leaf_is_hashed() {
        let node = TrieNode::leaf(NibblePath::from_nibbles(&[1, 2, 3, 4]), vec![0u8; 100]);
        let child = node.child_ref();
        assert!(child.is_hash());
        assert_eq!(child.as_hash(), node.keccak());
    }

    #[test]
    fn test_branch_roundtrip() {
        let mut node = TrieNode::branch();
        if let TrieNode::Branch { children, value } = &mut node {
            children[0] = Some(ChildRef::Hash([7u8; 32]));
            children[5] = Some(ChildRef::Inline(vec![0xc2, 0x20, 0x01]));
            *value = Some(vec![0x42]);
        }
        let encoded = KeccakCodec.encode(&node);
        assert_eq!(KeccakCodec.decode(&encoded).unwrap(), node);
    }

    #[test]
    fn test_extension_roundtrip() {
        let node = TrieNode::extension(
            NibblePath::from_nibbles(&[0xa, 0xb, 0xc]),
            ChildRef::Hash([0x33; 32]),
        );
        let encoded = node.encode();
        assert_eq!(decode_node(&encoded).unwrap(), node);
    }

    #[test]
    fn test_hash_only() {
        let node = TrieNode::HashOnly([9u8; 32]);
        assert_eq!(node.keccak(), [9u8; 32]);
        assert_eq!(node.child_ref(), ChildRef::Hash([9u8; 32]));
        assert_eq!(node.encode().len(), 33);
    }
}
