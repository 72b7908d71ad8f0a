//! Account records as kept in the flat store and as hashed into the trie.

use primitive_types::{H256, U256};

use crate::merkle::{Hash, RlpEncoder};

/// Size of the flat account encoding.
pub const ACCOUNT_FLAT_SIZE: usize = 80;

/// Keccak-256 of empty code.
pub const EMPTY_CODE_HASH: H256 = H256([
    0xc5, 0xd2, 0x46, 0x01, 0x86, 0xf7, 0x23, 0x3c,
    0x92, 0x7e, 0x7d, 0xb2, 0xdc, 0xc7, 0x03, 0xc0,
    0xe5, 0x00, 0xb6, 0x53, 0xca, 0x82, 0x27, 0x3b,
    0x7b, 0xfa, 0xd8, 0x04, 0x5d, 0x85, 0xa4, 0x70,
]);

/// An Ethereum account as stored in the accounts table.
///
/// The storage root is not part of the flat record; it is derived from the
/// storage table when the account leaf is built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    /// Account nonce.
    pub nonce: u64,
    /// Account balance.
    pub balance: U256,
    /// Code hash (keccak256 of code, or `EMPTY_CODE_HASH` if no code).
    pub code_hash: H256,
    /// Storage generation. Storage slots of an account are keyed by it, so
    /// re-creating a contract starts from an empty storage trie.
    pub incarnation: u64,
}

impl Default for Account {
    fn default() -> Self {
        Self {
            nonce: 0,
            balance: U256::zero(),
            code_hash: EMPTY_CODE_HASH,
            incarnation: 0,
        }
    }
}

impl Account {
    /// Creates an account with the given balance.
    pub fn with_balance(balance: U256) -> Self {
        Self {
            balance,
            ..Default::default()
        }
    }

    /// Encodes the account for the flat store.
    ///
    /// Format: [nonce (8 LE)] [balance (32 LE)] [code_hash (32)] [incarnation (8 LE)]
    pub fn encode_flat(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(ACCOUNT_FLAT_SIZE);
        buf.extend_from_slice(&self.nonce.to_le_bytes());
        buf.extend_from_slice(&self.balance.to_little_endian());
        buf.extend_from_slice(self.code_hash.as_bytes());
        buf.extend_from_slice(&self.incarnation.to_le_bytes());
        buf
    }

    /// Decodes an account from its flat encoding.
    pub fn decode_flat(data: &[u8]) -> Result<Self, &'static str> {
        if data.len() != ACCOUNT_FLAT_SIZE {
            return Err("account record must be 80 bytes");
        }

        let mut word = [0u8; 8];
        word.copy_from_slice(&data[0..8]);
        let nonce = u64::from_le_bytes(word);
        let balance = U256::from_little_endian(&data[8..40]);
        let code_hash = H256::from_slice(&data[40..72]);
        word.copy_from_slice(&data[72..80]);
        let incarnation = u64::from_le_bytes(word);

        Ok(Self {
            nonce,
            balance,
            code_hash,
            incarnation,
        })
    }

    /// Encodes the trie leaf value: `rlp([nonce, balance, storage_root, code_hash])`.
    pub fn trie_value(&self, storage_root: &Hash) -> Vec<u8> {
        let mut encoder = RlpEncoder::with_capacity(112);
        encoder.encode_list(|e| {
            e.encode_u64(self.nonce);
            e.encode_u256(&self.balance);
            e.encode_bytes(storage_root);
            e.encode_bytes(self.code_hash.as_bytes());
        });
        encoder.into_bytes()
    }

    /// Builds the storage table key prefix: `account_key ++ incarnation (8 BE)`.
    pub fn storage_prefix(&self, account_key: &[u8]) -> Vec<u8> {
        storage_prefix(account_key, self.incarnation)
    }
}

/// Storage key prefix of an account generation.
pub fn storage_prefix(account_key: &[u8], incarnation: u64) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(account_key.len() + 8);
    prefix.extend_from_slice(account_key);
    prefix.extend_from_slice(&incarnation.to_be_bytes());
    prefix
}
