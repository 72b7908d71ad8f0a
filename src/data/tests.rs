//! Property-based tests for data structures.

#[cfg(test)]
mod proptest_tests {
    use proptest::prelude::*;
    use crate::data::NibblePath;

    proptest! {
        #[test]
        fn nibble_path_from_bytes_roundtrip(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let path = NibblePath::from_bytes(&bytes);
            assert_eq!(path.len(), bytes.len() * 2);

            for (i, byte) in bytes.iter().enumerate() {
                assert_eq!(path.get(i * 2), byte >> 4);
                assert_eq!(path.get(i * 2 + 1), byte & 0x0F);
            }
        }

        #[test]
        fn nibble_path_slice_from(bytes in proptest::collection::vec(any::<u8>(), 1..32), start in 0usize..64) {
            let path = NibblePath::from_bytes(&bytes);
            let start = start % path.len().max(1);

            let sliced = path.slice_from(start);
            assert_eq!(sliced.len(), path.len() - start);
            assert_eq!(path.slice_to(start).join(&sliced), path);
        }

        #[test]
        fn nibble_path_common_prefix_symmetric(
            bytes1 in proptest::collection::vec(any::<u8>(), 0..32),
            bytes2 in proptest::collection::vec(any::<u8>(), 0..32)
        ) {
            let path1 = NibblePath::from_bytes(&bytes1);
            let path2 = NibblePath::from_bytes(&bytes2);
            let cp = path1.common_prefix_len(&path2);

            prop_assert_eq!(cp, path2.common_prefix_len(&path1));
            prop_assert!(path1.starts_with(&path2.slice_to(cp)));
        }

        #[test]
        fn nibble_path_order_matches_byte_order(
            bytes1 in proptest::collection::vec(any::<u8>(), 0..16),
            bytes2 in proptest::collection::vec(any::<u8>(), 0..16)
        ) {
            let path1 = NibblePath::from_bytes(&bytes1);
            let path2 = NibblePath::from_bytes(&bytes2);
            prop_assert_eq!(path1.cmp(&path2), bytes1.cmp(&bytes2));
        }
    }
}
