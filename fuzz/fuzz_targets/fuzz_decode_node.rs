#![no_main]

use ethrex_commitment::merkle::decode_node;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Whatever decodes must encode back to the same bytes.
    if let Ok(node) = decode_node(data) {
        assert_eq!(node.encode(), data);
    }
});
