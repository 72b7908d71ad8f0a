//! Flat state storage.
//!
//! Accounts and storage slots are kept as plain key-value pairs, with no
//! trie structure on disk. Roots are computed from them by the flat trie
//! loader; this module only defines how they are read and encoded.

mod account;
mod kv;
mod memory;

pub use account::{storage_prefix, Account, ACCOUNT_FLAT_SIZE, EMPTY_CODE_HASH};
pub use kv::{KvIter, KvReader, Table};
pub use memory::MemoryKv;
