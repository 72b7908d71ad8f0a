//! End-to-end tests: flat state in a `MemoryKv`, roots from the loader and
//! from the incremental engine.

use std::collections::BTreeMap;

use ethrex_commitment::merkle::{keccak256, RlpEncoder, EMPTY_ROOT};
use ethrex_commitment::{
    Account, BranchNodeEvent, CommitmentContext, CommitmentEngine, EngineConfig, FlatTrieLoader,
    Hash, LoaderConfig, MemoryKv, NibblePath, RetainAll, RetainList, RetainNone,
    SharedCommitmentContext, Update,
};
use primitive_types::U256;

fn address_key(i: u64) -> Hash {
    keccak256(&i.to_be_bytes())
}

fn slot_key(i: u64) -> Hash {
    keccak256(&[b"slot".as_slice(), &i.to_be_bytes()].concat())
}

fn word(value: u64) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[24..].copy_from_slice(&value.to_be_bytes());
    out
}

/// Leaf value of a storage slot: the RLP string of the trimmed value.
fn storage_leaf(value: &[u8]) -> Vec<u8> {
    let skip = value.iter().take_while(|&&b| b == 0).count();
    let mut enc = RlpEncoder::new();
    enc.encode_bytes(&value[skip..]);
    enc.into_bytes()
}

/// Mirror of the flat state, committed with the engine.
#[derive(Default)]
struct Mirror {
    accounts: BTreeMap<Hash, Account>,
    storage: BTreeMap<Hash, BTreeMap<Hash, [u8; 32]>>,
}

impl Mirror {
    fn set_account(&mut self, kv: &mut MemoryKv, key: Hash, account: Account) {
        kv.put_account(&key, &account);
        self.accounts.insert(key, account);
    }

    fn set_slot(&mut self, kv: &mut MemoryKv, key: Hash, slot: Hash, value: [u8; 32]) {
        let incarnation = self.accounts[&key].incarnation;
        kv.put_storage(&key, incarnation, &slot, &value);
        self.storage.entry(key).or_default().insert(slot, value);
    }

    fn storage_root(&self, engine: &CommitmentEngine, key: &Hash) -> Hash {
        let Some(slots) = self.storage.get(key) else {
            return EMPTY_ROOT;
        };
        let mut ctx = CommitmentContext::new();
        let batch = slots
            .iter()
            .map(|(slot, value)| Update::put(*slot, storage_leaf(value)))
            .collect();
        engine.process(&mut ctx, batch, "storage").unwrap()
    }

    fn account_updates(&self, engine: &CommitmentEngine, keys: &[Hash]) -> Vec<Update> {
        keys.iter()
            .map(|key| match self.accounts.get(key) {
                Some(account) => {
                    Update::put(*key, account.trie_value(&self.storage_root(engine, key)))
                }
                None => Update::delete(*key),
            })
            .collect()
    }
}

fn populate(kv: &mut MemoryKv, mirror: &mut Mirror, accounts: u64) {
    for i in 0..accounts {
        let key = address_key(i);
        let account = Account {
            nonce: i,
            ..Account::with_balance(U256::from(1_000 + i))
        };
        mirror.set_account(kv, key, account);
        if i % 3 == 0 {
            for s in 0..(i % 7 + 1) {
                mirror.set_slot(kv, key, slot_key(s), word(i * 100 + s + 1));
            }
        }
    }
}

#[test]
fn test_loader_matches_engine_state_root() {
    let engine = CommitmentEngine::new(EngineConfig::default());
    let mut kv = MemoryKv::new();
    let mut mirror = Mirror::default();
    populate(&mut kv, &mut mirror, 64);

    let keys: Vec<Hash> = mirror.accounts.keys().copied().collect();
    let mut ctx = CommitmentContext::new();
    let engine_root = engine
        .process(&mut ctx, mirror.account_updates(&engine, &keys), "genesis")
        .unwrap();

    let mut loader = FlatTrieLoader::new(LoaderConfig::default(), RetainNone);
    assert_eq!(loader.calc_trie_root(&kv).unwrap(), engine_root);
    assert_ne!(engine_root, EMPTY_ROOT);
}

#[test]
fn test_block_by_block_commitment() {
    let engine = CommitmentEngine::new(EngineConfig::default());
    let mut kv = MemoryKv::new();
    let mut mirror = Mirror::default();
    populate(&mut kv, &mut mirror, 40);

    let all: Vec<Hash> = mirror.accounts.keys().copied().collect();
    let mut ctx = CommitmentContext::new();
    engine
        .process(&mut ctx, mirror.account_updates(&engine, &all), "block 0")
        .unwrap();

    for block in 1..=5u64 {
        let mut touched = Vec::new();

        // Transfers between existing accounts.
        for i in (block..40).step_by(7) {
            let key = address_key(i);
            let Some(mut account) = mirror.accounts.get(&key).cloned() else {
                continue;
            };
            account.nonce += 1;
            account.balance += U256::from(block);
            mirror.set_account(&mut kv, key, account);
            touched.push(key);
        }

        // A new contract with storage.
        let created = address_key(1_000 + block);
        mirror.set_account(&mut kv, created, Account::with_balance(U256::from(block)));
        for s in 0..block {
            mirror.set_slot(&mut kv, created, slot_key(s), word(s + 7));
        }
        touched.push(created);

        // Storage write on an existing contract.
        let contract = address_key(3);
        mirror.set_slot(&mut kv, contract, slot_key(100 + block), word(block));
        touched.push(contract);

        // A self-destruct.
        let destroyed = address_key(block * 5);
        kv.remove_account(&destroyed);
        mirror.accounts.remove(&destroyed);
        mirror.storage.remove(&destroyed);
        touched.push(destroyed);

        touched.sort();
        touched.dedup();
        let label = format!("block {block}");
        let root = engine
            .process(&mut ctx, mirror.account_updates(&engine, &touched), &label)
            .unwrap();

        let mut loader = FlatTrieLoader::new(LoaderConfig::with_log_prefix(label), RetainNone);
        assert_eq!(loader.calc_trie_root(&kv).unwrap(), root, "block {block}");
    }
}

#[test]
fn test_contract_recreation_resets_storage() {
    let mut kv = MemoryKv::new();
    let key = address_key(9);
    let mut account = Account::with_balance(U256::from(5));
    kv.put_account(&key, &account);
    kv.put_storage(&key, 0, &slot_key(0), &word(1));

    let mut loader = FlatTrieLoader::new(LoaderConfig::default(), RetainNone);
    assert_ne!(loader.storage_root(&kv, &key).unwrap(), EMPTY_ROOT);

    account.incarnation = 1;
    kv.put_account(&key, &account);
    assert_eq!(loader.storage_root(&kv, &key).unwrap(), EMPTY_ROOT);

    let mut expected = CommitmentContext::new();
    let engine = CommitmentEngine::new(EngineConfig::default());
    let root = engine
        .process(
            &mut expected,
            vec![Update::put(key, account.trie_value(&EMPTY_ROOT))],
            "recreated",
        )
        .unwrap();
    assert_eq!(loader.calc_trie_root(&kv).unwrap(), root);
}

#[test]
fn test_retained_branches_match_engine_nodes() {
    let engine = CommitmentEngine::new(EngineConfig::default());
    let mut kv = MemoryKv::new();
    let mut mirror = Mirror::default();
    populate(&mut kv, &mut mirror, 48);

    let keys: Vec<Hash> = mirror.accounts.keys().copied().collect();
    let mut ctx = CommitmentContext::new();
    engine
        .process(&mut ctx, mirror.account_updates(&engine, &keys), "genesis")
        .unwrap();

    let mut events: Vec<BranchNodeEvent> = Vec::new();
    let root = {
        let mut loader = FlatTrieLoader::new(LoaderConfig::default(), RetainAll).on_account_node(
            |event| {
                events.push(event.clone());
                Ok(())
            },
        );
        loader.calc_trie_root(&kv).unwrap()
    };

    assert_eq!(root, ctx.root_hash());
    assert!(!events.is_empty());

    // Children close before their parents.
    assert!(events.last().is_some_and(|event| event.prefix.is_empty()));
    assert_eq!(events.last().map(|event| event.node_hash), Some(root));

    for event in &events {
        let stored = ctx
            .node(event.prefix.as_slice())
            .unwrap_or_else(|| panic!("no stored node at {}", event.prefix));
        assert_eq!(keccak256(stored), event.node_hash, "prefix {}", event.prefix);
        assert_eq!(event.child_hashes.len(), event.hash_mask.count_ones() as usize);
        assert_eq!(event.hash_mask & !event.state_mask, 0);
    }
}

#[test]
fn test_storage_retain_list() {
    let mut kv = MemoryKv::new();
    let mut mirror = Mirror::default();
    populate(&mut kv, &mut mirror, 12);

    let contract = address_key(6);
    let incarnation = mirror.accounts[&contract].incarnation;
    let mut retain = RetainList::new();
    retain.add_storage_key(&contract, incarnation, &slot_key(2));

    let mut owners: Vec<Vec<u8>> = Vec::new();
    let mut account_events = 0usize;
    {
        let mut loader = FlatTrieLoader::new(LoaderConfig::default(), retain)
            .on_account_node(|_| {
                account_events += 1;
                Ok(())
            })
            .on_storage_node(|owner, event| {
                assert!(event.prefix.len() >= (owner.len() * 2));
                owners.push(owner.to_vec());
                Ok(())
            });
        loader.calc_trie_root(&kv).unwrap();
    }

    let mut owner_prefix = contract.to_vec();
    owner_prefix.extend_from_slice(&incarnation.to_be_bytes());
    assert!(!owners.is_empty());
    assert!(owners.iter().all(|owner| *owner == owner_prefix));
    // The account path leading to the slot is retained as well.
    assert!(account_events > 0);
}

#[test]
fn test_shared_context_across_threads() {
    let engine = CommitmentEngine::new(EngineConfig::default());
    let shared = SharedCommitmentContext::default();

    std::thread::scope(|scope| {
        for t in 0..4u64 {
            let shared = shared.clone();
            let engine = &engine;
            scope.spawn(move || {
                for i in 0..10u64 {
                    let key = address_key(t * 100 + i);
                    shared
                        .process(engine, vec![Update::put(key, word(i + 1).to_vec())], "thread")
                        .unwrap();
                }
            });
        }
    });

    let mut bulk = CommitmentContext::new();
    let batch = (0..4u64)
        .flat_map(|t| (0..10u64).map(move |i| (t, i)))
        .map(|(t, i)| Update::put(address_key(t * 100 + i), word(i + 1).to_vec()))
        .collect();
    let expected = engine.process(&mut bulk, batch, "bulk").unwrap();

    assert_eq!(shared.root_hash(), expected);
    assert_eq!(shared.lock().node_count(), bulk.node_count());
}

#[test]
fn test_config_from_toml_with_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("trie=trace")
        .with_test_writer()
        .try_init();

    let loader_config: LoaderConfig = toml::from_str(
        r#"
        log_prefix = "integration"
        trace = true
        "#,
    )
    .unwrap();
    let engine_config: EngineConfig = toml::from_str("trace = true").unwrap();
    assert_eq!(loader_config.log_prefix, "integration");

    let mut kv = MemoryKv::new();
    let mut mirror = Mirror::default();
    populate(&mut kv, &mut mirror, 16);

    let engine = CommitmentEngine::new(engine_config);
    let keys: Vec<Hash> = mirror.accounts.keys().copied().collect();
    let mut ctx = CommitmentContext::new();
    let root = engine
        .process(&mut ctx, mirror.account_updates(&engine, &keys), "traced")
        .unwrap();

    let mut loader = FlatTrieLoader::new(loader_config, RetainNone);
    assert_eq!(loader.calc_trie_root(&kv).unwrap(), root);
}

#[test]
fn test_retain_wildcard_subtree() {
    let mut kv = MemoryKv::new();
    let mut mirror = Mirror::default();
    populate(&mut kv, &mut mirror, 300);

    let mut retain = RetainList::new();
    retain.add_wildcard(NibblePath::from_nibbles(&[0xa]));

    let mut prefixes = Vec::new();
    {
        let mut loader = FlatTrieLoader::new(LoaderConfig::default(), retain).on_account_node(
            |event| {
                prefixes.push(event.prefix.clone());
                Ok(())
            },
        );
        loader.calc_trie_root(&kv).unwrap();
    }

    let wildcard = NibblePath::from_nibbles(&[0xa]);
    assert!(prefixes.contains(&NibblePath::new()));
    assert!(prefixes.contains(&wildcard));
    for prefix in &prefixes {
        assert!(prefix.is_empty() || prefix.starts_with(&wildcard), "unexpected {prefix}");
    }
}
