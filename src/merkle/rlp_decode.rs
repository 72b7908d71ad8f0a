//! RLP decoding of trie nodes.
//!
//! The decoder only understands the shapes that appear in the Merkle Patricia
//! Trie: 17-item branch lists and 2-item leaf/extension lists. Anything else
//! is rejected, since cached encodings are authoritative and must round-trip.

use thiserror::Error;

use super::node::{ChildRef, TrieNode, HASH_SIZE};
use crate::data::NibblePath;

/// RLP decoding errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RlpError {
    #[error("Unexpected end of input")]
    UnexpectedEnd,
    #[error("Trailing bytes after item")]
    TrailingBytes,
    #[error("Expected a list")]
    ExpectedList,
    #[error("Expected a string")]
    ExpectedString,
    #[error("Non-canonical encoding")]
    NonCanonical,
    #[error("Invalid hex-prefix path")]
    InvalidPath,
    #[error("Unexpected item count: {0}")]
    ItemCount(usize),
    #[error("Invalid child reference of {0} bytes")]
    InvalidChild(usize),
}

/// A single RLP item borrowed from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RlpItem<'a> {
    /// String payload.
    String(&'a [u8]),
    /// List payload together with the complete raw encoding.
    List { payload: &'a [u8], raw: &'a [u8] },
}

/// Streaming RLP item reader over a byte slice.
pub struct RlpDecoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> RlpDecoder<'a> {
    /// Creates a decoder over the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Returns true when all input was consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Reads the next item.
    pub fn next_item(&mut self) -> Result<RlpItem<'a>, RlpError> {
        let start = self.pos;
        let prefix = *self.data.get(start).ok_or(RlpError::UnexpectedEnd)?;

        let (is_list, header_len, payload_len) = match prefix {
            0x00..=0x7f => (false, 0, 1),
            0x80..=0xb7 => (false, 1, (prefix - 0x80) as usize),
            0xb8..=0xbf => {
                let len_of_len = (prefix - 0xb7) as usize;
                (false, 1 + len_of_len, self.read_length(start + 1, len_of_len)?)
            }
            0xc0..=0xf7 => (true, 1, (prefix - 0xc0) as usize),
            0xf8..=0xff => {
                let len_of_len = (prefix - 0xf7) as usize;
                (true, 1 + len_of_len, self.read_length(start + 1, len_of_len)?)
            }
        };

        let payload_start = start + header_len;
        let end = payload_start
            .checked_add(payload_len)
            .ok_or(RlpError::UnexpectedEnd)?;
        if end > self.data.len() {
            return Err(RlpError::UnexpectedEnd);
        }
        self.pos = end;

        let payload = &self.data[payload_start..end];
        if is_list {
            return Ok(RlpItem::List {
                payload,
                raw: &self.data[start..end],
            });
        }
        // A single byte below 0x80 must be encoded as itself.
        if header_len == 1 && payload_len == 1 && payload[0] < 0x80 {
            return Err(RlpError::NonCanonical);
        }
        if header_len == 0 {
            return Ok(RlpItem::String(&self.data[start..end]));
        }
        Ok(RlpItem::String(payload))
    }

    /// Reads the next item, which must be a string.
    pub fn next_string(&mut self) -> Result<&'a [u8], RlpError> {
        match self.next_item()? {
            RlpItem::String(bytes) => Ok(bytes),
            RlpItem::List { .. } => Err(RlpError::ExpectedString),
        }
    }

    fn read_length(&self, at: usize, len_of_len: usize) -> Result<usize, RlpError> {
        let bytes = self
            .data
            .get(at..at + len_of_len)
            .ok_or(RlpError::UnexpectedEnd)?;
        if bytes[0] == 0 || len_of_len > 8 {
            return Err(RlpError::NonCanonical);
        }
        let len = bytes.iter().fold(0usize, |acc, &b| (acc << 8) | b as usize);
        if len < 56 {
            return Err(RlpError::NonCanonical);
        }
        Ok(len)
    }
}

/// Decodes a complete list and returns its items.
pub fn decode_list(data: &[u8]) -> Result<Vec<RlpItem<'_>>, RlpError> {
    let mut outer = RlpDecoder::new(data);
    let payload = match outer.next_item()? {
        RlpItem::List { payload, .. } => payload,
        RlpItem::String(_) => return Err(RlpError::ExpectedList),
    };
    if !outer.is_empty() {
        return Err(RlpError::TrailingBytes);
    }

    let mut inner = RlpDecoder::new(payload);
    let mut items = Vec::with_capacity(17);
    while !inner.is_empty() {
        items.push(inner.next_item()?);
    }
    Ok(items)
}

/// Unpacks a hex-prefix encoded path. Returns the nibbles and the leaf flag.
pub fn decode_hex_prefix(encoded: &[u8]) -> Result<(Vec<u8>, bool), RlpError> {
    let first = *encoded.first().ok_or(RlpError::InvalidPath)?;
    let flag = first >> 4;
    if flag > 3 {
        return Err(RlpError::InvalidPath);
    }
    let is_leaf = flag & 0x2 != 0;
    let odd = flag & 0x1 != 0;
    if !odd && first & 0x0f != 0 {
        return Err(RlpError::InvalidPath);
    }

    let mut nibbles = Vec::with_capacity(encoded.len() * 2);
    if odd {
        nibbles.push(first & 0x0f);
    }
    for byte in &encoded[1..] {
        nibbles.push(byte >> 4);
        nibbles.push(byte & 0x0f);
    }
    Ok((nibbles, is_leaf))
}

fn decode_child(item: RlpItem<'_>) -> Result<Option<ChildRef>, RlpError> {
    match item {
        RlpItem::String([]) => Ok(None),
        RlpItem::String(bytes) if bytes.len() == HASH_SIZE => {
            let mut hash = [0u8; HASH_SIZE];
            hash.copy_from_slice(bytes);
            Ok(Some(ChildRef::Hash(hash)))
        }
        RlpItem::String(bytes) => Err(RlpError::InvalidChild(bytes.len())),
        RlpItem::List { raw, .. } if raw.len() < HASH_SIZE => {
            Ok(Some(ChildRef::Inline(raw.to_vec())))
        }
        RlpItem::List { raw, .. } => Err(RlpError::InvalidChild(raw.len())),
    }
}

/// Decodes a node from its canonical RLP encoding.
pub fn decode_node(data: &[u8]) -> Result<TrieNode, RlpError> {
    let items = decode_list(data)?;
    match items.len() {
        17 => {
            let mut children: [Option<ChildRef>; 16] = Default::default();
            for (slot, item) in children.iter_mut().zip(items.iter()) {
                *slot = decode_child(*item)?;
            }
            let value = match items[16] {
                RlpItem::String([]) => None,
                RlpItem::String(bytes) => Some(bytes.to_vec()),
                RlpItem::List { .. } => return Err(RlpError::ExpectedString),
            };
            Ok(TrieNode::Branch {
                children: Box::new(children),
                value,
            })
        }
        2 => {
            let path = match items[0] {
                RlpItem::String(bytes) => bytes,
                RlpItem::List { .. } => return Err(RlpError::ExpectedString),
            };
            let (nibbles, is_leaf) = decode_hex_prefix(path)?;
            if is_leaf {
                match items[1] {
                    RlpItem::String(value) => Ok(TrieNode::Leaf {
                        path: NibblePath::from_nibbles(&nibbles),
                        value: value.to_vec(),
                    }),
                    RlpItem::List { .. } => Err(RlpError::ExpectedString),
                }
            } else {
                if nibbles.is_empty() {
                    return Err(RlpError::InvalidPath);
                }
                let child = decode_child(items[1])?.ok_or(RlpError::InvalidChild(0))?;
                Ok(TrieNode::Extension {
                    path: NibblePath::from_nibbles(&nibbles),
                    child,
                })
            }
        }
        n => Err(RlpError::ItemCount(n)),
    }
}
