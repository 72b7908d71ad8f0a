//! Update batches fed to the commitment engine.

/// A single key change.
///
/// `None` or an empty value deletes the key: the trie cannot hold empty
/// values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Update {
    pub key: Vec<u8>,
    pub value: Option<Vec<u8>>,
}

impl Update {
    /// Inserts or replaces `key`.
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    /// Deletes `key`.
    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    /// Returns true if applying this update removes the key.
    pub fn is_delete(&self) -> bool {
        self.value.as_ref().map_or(true, |v| v.is_empty())
    }
}
