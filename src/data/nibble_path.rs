//! NibblePath - Path representation for trie traversal.
//!
//! A nibble is a half-byte (4 bits), representing values 0-15.
//! Every trie operation in this crate navigates by nibbles, never by raw bytes.

use std::fmt;

/// Represents a path of nibbles for trie navigation.
///
/// Nibbles are kept unpacked (one per byte) so that slicing at odd offsets
/// and prefix comparison are plain slice operations. The derived ordering is
/// lexicographic over nibbles, which matches the byte order of the keys the
/// paths were built from.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NibblePath {
    nibbles: Vec<u8>,
}

impl NibblePath {
    /// Creates a new empty NibblePath.
    pub fn new() -> Self {
        Self { nibbles: Vec::new() }
    }

    /// Creates a NibblePath from a byte slice.
    ///
    /// Each byte contributes two nibbles: high nibble (bits 4-7) first, then
    /// the low nibble (bits 0-3).
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut nibbles = Vec::with_capacity(bytes.len() * 2);
        for byte in bytes {
            nibbles.push(byte >> 4);
            nibbles.push(byte & 0x0F);
        }
        Self { nibbles }
    }

    /// Creates a NibblePath from already unpacked nibbles.
    ///
    /// # Panics
    /// Panics if any element is greater than 15.
    pub fn from_nibbles(nibbles: &[u8]) -> Self {
        assert!(nibbles.iter().all(|&n| n < 16), "nibble out of range");
        Self { nibbles: nibbles.to_vec() }
    }

    /// Returns the number of nibbles in the path.
    pub fn len(&self) -> usize {
        self.nibbles.len()
    }

    /// Returns true if the path is empty.
    pub fn is_empty(&self) -> bool {
        self.nibbles.is_empty()
    }

    /// Gets the nibble at the given index.
    ///
    /// # Panics
    /// Panics if index >= len.
    pub fn get(&self, index: usize) -> u8 {
        assert!(index < self.nibbles.len(), "nibble index out of bounds");
        self.nibbles[index]
    }

    /// Returns a slice of this path starting at the given nibble index.
    pub fn slice_from(&self, start: usize) -> Self {
        if start >= self.nibbles.len() {
            return Self::new();
        }
        Self { nibbles: self.nibbles[start..].to_vec() }
    }

    /// Returns a slice of the first `count` nibbles.
    pub fn slice_to(&self, count: usize) -> Self {
        if count >= self.nibbles.len() {
            return self.clone();
        }
        Self { nibbles: self.nibbles[..count].to_vec() }
    }

    /// Returns the common prefix length with another path.
    pub fn common_prefix_len(&self, other: &Self) -> usize {
        common_prefix_len(&self.nibbles, &other.nibbles)
    }

    /// Returns true if `prefix` is a prefix of this path (or equal to it).
    pub fn starts_with(&self, prefix: &Self) -> bool {
        self.nibbles.starts_with(&prefix.nibbles)
    }

    /// Appends a nibble.
    ///
    /// # Panics
    /// Panics if `nibble` is greater than 15.
    pub fn push(&mut self, nibble: u8) {
        assert!(nibble < 16, "nibble out of range");
        self.nibbles.push(nibble);
    }

    /// Returns a new path made of this path followed by `other`.
    pub fn join(&self, other: &Self) -> Self {
        let mut nibbles = Vec::with_capacity(self.len() + other.len());
        nibbles.extend_from_slice(&self.nibbles);
        nibbles.extend_from_slice(&other.nibbles);
        Self { nibbles }
    }

    /// Returns the unpacked nibbles.
    pub fn as_slice(&self) -> &[u8] {
        &self.nibbles
    }

    /// Consumes the path and returns the unpacked nibbles.
    pub fn to_nibbles(self) -> Vec<u8> {
        self.nibbles
    }

    /// Returns an iterator over the nibbles.
    pub fn iter(&self) -> NibbleIterator<'_> {
        NibbleIterator {
            path: self,
            index: 0,
        }
    }
}

impl From<Vec<u8>> for NibblePath {
    /// Wraps unpacked nibbles. Values are masked to the low four bits.
    fn from(mut nibbles: Vec<u8>) -> Self {
        for n in nibbles.iter_mut() {
            *n &= 0x0F;
        }
        Self { nibbles }
    }
}

impl fmt::Display for NibblePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for n in &self.nibbles {
            write!(f, "{:x}", n)?;
        }
        Ok(())
    }
}

/// Returns the length of the common prefix of two nibble slices.
#[inline]
pub(crate) fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

/// Iterator over nibbles in a NibblePath.
pub struct NibbleIterator<'a> {
    path: &'a NibblePath,
    index: usize,
}

impl<'a> Iterator for NibbleIterator<'a> {
    type Item = u8;

    fn next(&mut self) -> Option<Self::Item> {
        let nibble = self.path.nibbles.get(self.index).copied()?;
        self.index += 1;
        Some(nibble)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.path.len() - self.index;
        (remaining, Some(remaining))
    }
}

impl<'a> ExactSizeIterator for NibbleIterator<'a> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bytes() {
        let path = NibblePath::from_bytes(&[0xAB, 0xCD]);
        assert_eq!(path.len(), 4);
        assert_eq!(path.get(0), 0xA);
        assert_eq!(path.get(1), 0xB);
        assert_eq!(path.get(2), 0xC);
        assert_eq!(path.get(3), 0xD);
    }

    #[test]
    fn test_slice_from() {
        let path = NibblePath::from_bytes(&[0xAB, 0xCD]);
        let sliced = path.slice_from(1);
        assert_eq!(sliced.as_slice(), &[0xB, 0xC, 0xD]);
        assert!(path.slice_from(9).is_empty());
    }

    #[test]
    fn test_slice_to() {
        let path = NibblePath::from_bytes(&[0xAB, 0xCD]);
        assert_eq!(path.slice_to(3).as_slice(), &[0xA, 0xB, 0xC]);
        assert_eq!(path.slice_to(10), path);
    }

    #[test]
    fn test_common_prefix() {
        let path1 = NibblePath::from_bytes(&[0xAB, 0xCD]);
        let path2 = NibblePath::from_bytes(&[0xAB, 0xEF]);
        assert_eq!(path1.common_prefix_len(&path2), 2);
        assert_eq!(path1.common_prefix_len(&path1.slice_to(3)), 3);
    }

    #[test]
    fn test_starts_with_and_join() {
        let path = NibblePath::from_bytes(&[0x12, 0x34]);
        let head = NibblePath::from_nibbles(&[1, 2]);
        let tail = NibblePath::from_nibbles(&[3, 4]);
        assert!(path.starts_with(&head));
        assert!(!head.starts_with(&path));
        assert_eq!(head.join(&tail), path);
    }

    #[test]
    fn test_ordering_matches_bytes() {
        let short = NibblePath::from_bytes(b"do");
        let long = NibblePath::from_bytes(b"dog");
        let other = NibblePath::from_bytes(b"e");
        assert!(short < long);
        assert!(long < other);
    }

    #[test]
    fn test_display() {
        let path = NibblePath::from_nibbles(&[0x0, 0xA, 0x3]);
        assert_eq!(path.to_string(), "0a3");
    }

    #[test]
    fn test_iterator() {
        let path = NibblePath::from_bytes(&[0xAB]);
        let nibbles: Vec<u8> = path.iter().collect();
        assert_eq!(nibbles, vec![0xA, 0xB]);
        assert_eq!(path.iter().len(), 2);
    }

    #[test]
    #[should_panic(expected = "nibble out of range")]
    fn test_push_rejects_wide_value() {
        let mut path = NibblePath::new();
        path.push(16);
    }
}
