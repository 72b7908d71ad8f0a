//! RLP (Recursive Length Prefix) encoding for Ethereum.
//!
//! RLP is the canonical node encoding of the Merkle Patricia Trie: two nodes
//! with the same content always produce the same bytes, and therefore the
//! same hash.

use primitive_types::U256;

use super::node::ChildRef;

/// RLP encoder for building RLP-encoded data.
#[derive(Clone, Debug, Default)]
pub struct RlpEncoder {
    buffer: Vec<u8>,
}

impl RlpEncoder {
    /// Creates a new empty encoder.
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Creates an encoder with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Returns the encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the encoder and returns the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Clears the encoder.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Encodes a byte slice as a string.
    pub fn encode_bytes(&mut self, bytes: &[u8]) {
        if bytes.len() == 1 && bytes[0] < 0x80 {
            self.buffer.push(bytes[0]);
        } else if bytes.len() < 56 {
            self.buffer.push(0x80 + bytes.len() as u8);
            self.buffer.extend_from_slice(bytes);
        } else {
            let len_bytes = Self::encode_length(bytes.len());
            self.buffer.push(0xb7 + len_bytes.len() as u8);
            self.buffer.extend_from_slice(&len_bytes);
            self.buffer.extend_from_slice(bytes);
        }
    }

    /// Encodes an empty string.
    pub fn encode_empty(&mut self) {
        self.buffer.push(0x80);
    }

    /// Appends already encoded RLP data verbatim.
    pub fn encode_raw(&mut self, encoded: &[u8]) {
        self.buffer.extend_from_slice(encoded);
    }

    /// Encodes a reference to a child node.
    ///
    /// Hashed children are written as a 32-byte string, inline children are
    /// embedded as their own encoding.
    pub fn encode_child(&mut self, child: Option<&ChildRef>) {
        match child {
            Some(ChildRef::Hash(hash)) => self.encode_bytes(hash),
            Some(ChildRef::Inline(encoded)) => self.encode_raw(encoded),
            None => self.encode_empty(),
        }
    }

    /// Starts encoding a list, returns the position to write length later.
    pub fn start_list(&mut self) -> usize {
        let pos = self.buffer.len();
        self.buffer.push(0);
        pos
    }

    /// Finishes encoding a list started at the given position.
    pub fn finish_list(&mut self, start_pos: usize) {
        let content_len = self.buffer.len() - start_pos - 1;

        if content_len < 56 {
            self.buffer[start_pos] = 0xc0 + content_len as u8;
        } else {
            let len_bytes = Self::encode_length(content_len);
            let header_len = 1 + len_bytes.len();

            // Shift the payload right to make room for the long header.
            let extra = header_len - 1;
            let old_len = self.buffer.len();
            self.buffer.resize(old_len + extra, 0);
            self.buffer.copy_within(start_pos + 1..old_len, start_pos + header_len);

            self.buffer[start_pos] = 0xf7 + len_bytes.len() as u8;
            self.buffer[start_pos + 1..start_pos + header_len].copy_from_slice(&len_bytes);
        }
    }

    /// Encodes a list of items.
    pub fn encode_list<F>(&mut self, encode_items: F)
    where
        F: FnOnce(&mut Self),
    {
        let start = self.start_list();
        encode_items(self);
        self.finish_list(start);
    }

    /// Encodes the length as big-endian bytes without leading zeros.
    fn encode_length(len: usize) -> Vec<u8> {
        let bytes = (len as u64).to_be_bytes();
        let skip = bytes.iter().take_while(|&&b| b == 0).count().min(7);
        bytes[skip..].to_vec()
    }

    /// Encodes a u64 value as a minimal big-endian integer.
    pub fn encode_u64(&mut self, value: u64) {
        let bytes = value.to_be_bytes();
        let skip = bytes.iter().take_while(|&&b| b == 0).count();
        self.encode_bytes(&bytes[skip..]);
    }

    /// Encodes a 256-bit value as a minimal big-endian integer.
    pub fn encode_u256(&mut self, value: &U256) {
        let bytes = value.to_big_endian();
        let skip = bytes.iter().take_while(|&&b| b == 0).count();
        self.encode_bytes(&bytes[skip..]);
    }

    /// Encodes compact nibbles (for leaf/extension nodes).
    ///
    /// HP (Hex-Prefix) encoding:
    /// - First nibble: flags (0=extension even, 1=extension odd, 2=leaf even, 3=leaf odd)
    /// - Remaining nibbles: path
    pub fn encode_nibbles(&mut self, nibbles: &[u8], is_leaf: bool) {
        self.encode_bytes(&hex_prefix(nibbles, is_leaf));
    }
}

/// Packs nibbles with the hex-prefix flag nibble.
pub(crate) fn hex_prefix(nibbles: &[u8], is_leaf: bool) -> Vec<u8> {
    let odd = nibbles.len() % 2 == 1;
    let flag = match (is_leaf, odd) {
        (false, false) => 0x0,
        (false, true) => 0x1,
        (true, false) => 0x2,
        (true, true) => 0x3,
    };

    let mut encoded = Vec::with_capacity(nibbles.len() / 2 + 1);
    let rest = if odd {
        encoded.push((flag << 4) | nibbles[0]);
        &nibbles[1..]
    } else {
        encoded.push(flag << 4);
        nibbles
    };
    for pair in rest.chunks(2) {
        encoded.push((pair[0] << 4) | pair[1]);
    }
    encoded
}
