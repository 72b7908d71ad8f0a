//! In-memory flat store.

use std::collections::BTreeMap;
use std::ops::Bound;

use super::account::{storage_prefix, Account};
use super::kv::{KvIter, KvReader, Table};
use crate::error::StoreError;

/// BTreeMap-backed `KvReader`.
///
/// Storage is duplicate-sorted: each `account_key ++ incarnation` holds a
/// sorted set of `slot -> value` entries, yielded as `slot ++ value`.
#[derive(Clone, Debug, Default)]
pub struct MemoryKv {
    accounts: BTreeMap<Vec<u8>, Vec<u8>>,
    storage: BTreeMap<Vec<u8>, BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryKv {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a raw account record.
    pub fn put_account_raw(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.accounts.insert(key, value);
    }

    /// Writes an account in its flat encoding.
    pub fn put_account(&mut self, key: &[u8], account: &Account) {
        self.accounts.insert(key.to_vec(), account.encode_flat());
    }

    /// Removes an account. Its storage stays in place.
    pub fn remove_account(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        self.accounts.remove(key)
    }

    /// Writes a storage slot. The value is kept as given; an existing entry
    /// for the same slot is replaced.
    pub fn put_storage(&mut self, account_key: &[u8], incarnation: u64, slot: &[u8], value: &[u8]) {
        self.storage
            .entry(storage_prefix(account_key, incarnation))
            .or_default()
            .insert(slot.to_vec(), value.to_vec());
    }

    /// Removes a storage slot.
    pub fn remove_storage(&mut self, account_key: &[u8], incarnation: u64, slot: &[u8]) {
        let prefix = storage_prefix(account_key, incarnation);
        if let Some(slots) = self.storage.get_mut(&prefix) {
            slots.remove(slot);
            if slots.is_empty() {
                self.storage.remove(&prefix);
            }
        }
    }

    /// Number of accounts.
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }
}

fn bounds(from: &[u8], to: Option<&[u8]>) -> Option<(Bound<Vec<u8>>, Bound<Vec<u8>>)> {
    match to {
        Some(to) if to <= from => None,
        Some(to) => Some((Bound::Included(from.to_vec()), Bound::Excluded(to.to_vec()))),
        None => Some((Bound::Included(from.to_vec()), Bound::Unbounded)),
    }
}

impl KvReader for MemoryKv {
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        match table {
            Table::Accounts => Ok(self.accounts.get(key).cloned()),
            // First duplicate, like a cursor positioned on the key.
            Table::Storage => Ok(self.storage.get(key).and_then(|slots| {
                slots.iter().next().map(|(slot, value)| [slot.as_slice(), value.as_slice()].concat())
            })),
        }
    }

    fn range<'a>(&'a self, table: Table, from: &[u8], to: Option<&[u8]>) -> KvIter<'a> {
        let Some(range) = bounds(from, to) else {
            return Box::new(std::iter::empty());
        };
        match table {
            Table::Accounts => Box::new(
                self.accounts
                    .range(range)
                    .map(|(k, v)| Ok((k.clone(), v.clone()))),
            ),
            Table::Storage => Box::new(self.storage.range(range).flat_map(|(k, slots)| {
                slots
                    .iter()
                    .map(move |(slot, value)| Ok((k.clone(), [slot.as_slice(), value.as_slice()].concat())))
            })),
        }
    }

    fn range_dup_sort<'a>(
        &'a self,
        table: Table,
        key: &[u8],
        from_sub: &[u8],
        to_sub: Option<&[u8]>,
    ) -> KvIter<'a> {
        if table != Table::Storage {
            return Box::new(std::iter::once(Err(StoreError::NotFound)));
        }
        let (Some(slots), Some(range)) = (self.storage.get(key), bounds(from_sub, to_sub)) else {
            return Box::new(std::iter::empty());
        };
        let key = key.to_vec();
        Box::new(slots.range(range).map(move |(slot, value)| {
            Ok((key.clone(), [slot.as_slice(), value.as_slice()].concat()))
        }))
    }
}
