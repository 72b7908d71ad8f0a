//! Read-only access to the flat key-value store.

use crate::error::StoreError;

/// Tables the trie is computed from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    /// `account_key -> flat account record`
    Accounts,
    /// `account_key ++ incarnation -> [slot ++ value]` (duplicate-sorted)
    Storage,
}

impl Table {
    /// Table name as used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Table::Accounts => "accounts",
            Table::Storage => "storage",
        }
    }
}

/// Lazily evaluated, ascending `(key, value)` sequence.
pub type KvIter<'a> = Box<dyn Iterator<Item = Result<(Vec<u8>, Vec<u8>), StoreError>> + 'a>;

/// A consistent read-only snapshot of the flat store.
///
/// Every call starts a fresh iteration, so ranges can be restarted freely.
pub trait KvReader {
    /// Returns the value stored under `key`.
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Iterates `table` in ascending key order over `[from, to)`.
    /// `to = None` iterates to the end of the table.
    fn range<'a>(&'a self, table: Table, from: &[u8], to: Option<&[u8]>) -> KvIter<'a>;

    /// Iterates the duplicate values stored under `key` whose sub-key falls
    /// in `[from_sub, to_sub)`, ascending. Yielded pairs are `(key, value)`
    /// where `value` still starts with the sub-key.
    fn range_dup_sort<'a>(
        &'a self,
        table: Table,
        key: &[u8],
        from_sub: &[u8],
        to_sub: Option<&[u8]>,
    ) -> KvIter<'a>;
}

impl<T: KvReader + ?Sized> KvReader for &T {
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(table, key)
    }

    fn range<'a>(&'a self, table: Table, from: &[u8], to: Option<&[u8]>) -> KvIter<'a> {
        (**self).range(table, from, to)
    }

    fn range_dup_sort<'a>(
        &'a self,
        table: Table,
        key: &[u8],
        from_sub: &[u8],
        to_sub: Option<&[u8]>,
    ) -> KvIter<'a> {
        (**self).range_dup_sort(table, key, from_sub, to_sub)
    }
}
