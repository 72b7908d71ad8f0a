#![no_main]

use std::collections::BTreeMap;

use arbitrary::Arbitrary;
use ethrex_commitment::{
    calc_root_sorted, CommitmentContext, CommitmentEngine, EngineConfig, RetainNone, Update,
};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
enum Op {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
    Commit,
}

fuzz_target!(|ops: Vec<Op>| {
    // Limit input size
    if ops.len() > 200 {
        return;
    }

    let engine = CommitmentEngine::new(EngineConfig::default());
    let mut ctx = CommitmentContext::new();
    let mut batch: BTreeMap<Vec<u8>, Option<Vec<u8>>> = BTreeMap::new();
    let mut expected: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();

    let mut commit = |batch: &mut BTreeMap<Vec<u8>, Option<Vec<u8>>>,
                      expected: &BTreeMap<Vec<u8>, Vec<u8>>| {
        let updates = std::mem::take(batch)
            .into_iter()
            .map(|(key, value)| Update { key, value })
            .collect();
        let root = engine.process(&mut ctx, updates, "fuzz").unwrap();
        let streamed = calc_root_sorted(
            expected.iter().map(|(k, v)| (k, v.clone())),
            &RetainNone,
            |_| Ok(()),
        )
        .unwrap();
        assert_eq!(root, streamed);
    };

    for op in ops {
        match op {
            Op::Put(key, value) => {
                if key.is_empty() || key.len() > 64 {
                    continue;
                }
                if value.is_empty() {
                    expected.remove(&key);
                } else {
                    expected.insert(key.clone(), value.clone());
                }
                batch.insert(key, Some(value));
            }
            Op::Delete(key) => {
                if key.is_empty() || key.len() > 64 {
                    continue;
                }
                expected.remove(&key);
                batch.insert(key, None);
            }
            Op::Commit => commit(&mut batch, &expected),
        }
    }
    commit(&mut batch, &expected);
});
