//! Flat trie loader: the state root straight from the flat tables.
//!
//! One forward pass over the accounts table. Each account's storage root is
//! computed first with a nested `HashStack` over its storage slots, then the
//! account leaf is added to the account `HashStack`.

use tracing::{debug, trace, warn};

use super::events::BranchNodeEvent;
use super::hash_stack::HashStack;
use crate::cancel::CancellationToken;
use crate::config::LoaderConfig;
use crate::data::NibblePath;
use crate::error::TrieError;
use crate::merkle::{Hash, KeccakCodec, NodeCodec, RlpEncoder, HASH_SIZE};
use crate::retain::RetainDecider;
use crate::store::{storage_prefix, Account, KvReader, Table};

/// Receives retained branches of the account trie.
pub type AccountSink<'a> = Box<dyn FnMut(&BranchNodeEvent) -> Result<(), TrieError> + 'a>;

/// Receives retained branches of a storage trie, together with the
/// `account_key ++ incarnation` the trie belongs to.
///
/// `event.prefix` is absolute: it starts with the nibbles of that owner key,
/// followed by the branch position inside the storage trie. Use
/// `event.prefix.slice_from(2 * owner.len())` for the storage-relative path.
pub type StorageSink<'a> = Box<dyn FnMut(&[u8], &BranchNodeEvent) -> Result<(), TrieError> + 'a>;

type StorageSinkRef<'s, 'a> = Option<&'s mut (dyn FnMut(&[u8], &BranchNodeEvent) -> Result<(), TrieError> + 'a)>;

/// Computes state and storage roots from a `KvReader` snapshot.
pub struct FlatTrieLoader<'a, C = KeccakCodec> {
    config: LoaderConfig,
    decider: Box<dyn RetainDecider + 'a>,
    codec: C,
    cancel: CancellationToken,
    on_account: Option<AccountSink<'a>>,
    on_storage: Option<StorageSink<'a>>,
}

impl<'a> FlatTrieLoader<'a, KeccakCodec> {
    /// Creates a loader with the Ethereum codec.
    pub fn new(config: LoaderConfig, decider: impl RetainDecider + 'a) -> Self {
        Self::with_codec(KeccakCodec, config, decider)
    }
}

impl<'a, C: NodeCodec + Clone> FlatTrieLoader<'a, C> {
    /// Creates a loader with a custom node codec.
    pub fn with_codec(codec: C, config: LoaderConfig, decider: impl RetainDecider + 'a) -> Self {
        Self {
            config,
            decider: Box::new(decider),
            codec,
            cancel: CancellationToken::new(),
            on_account: None,
            on_storage: None,
        }
    }

    /// Attaches a cancellation token, polled between keys.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Sets the sink for retained account-trie branches.
    pub fn on_account_node(
        mut self,
        sink: impl FnMut(&BranchNodeEvent) -> Result<(), TrieError> + 'a,
    ) -> Self {
        self.on_account = Some(Box::new(sink));
        self
    }

    /// Sets the sink for retained storage-trie branches.
    pub fn on_storage_node(
        mut self,
        sink: impl FnMut(&[u8], &BranchNodeEvent) -> Result<(), TrieError> + 'a,
    ) -> Self {
        self.on_storage = Some(Box::new(sink));
        self
    }

    /// Computes the state root of the snapshot.
    pub fn calc_trie_root(&mut self, store: &impl KvReader) -> Result<Hash, TrieError> {
        let Self {
            config,
            decider,
            codec,
            cancel,
            on_account,
            on_storage,
        } = self;
        let decider: &dyn RetainDecider = &**decider;

        debug!(target: "trie::loader", "[{}] computing state root", config.log_prefix);

        let mut accounts = HashStack::with_codec(codec.clone(), decider).with_trace(config.trace);
        let mut with_storage = 0usize;

        for item in store.range(Table::Accounts, &[], None) {
            cancel.check()?;
            let (key, value) = item?;
            let account =
                Account::decode_flat(&value).map_err(|reason| TrieError::corrupt_value(&key, reason))?;

            let storage_root = storage_trie_root(
                store,
                codec,
                decider,
                cancel,
                on_storage.as_deref_mut(),
                &key,
                account.incarnation,
                config.trace,
            )?;
            if storage_root != codec.empty_root() {
                with_storage += 1;
            }

            let path = NibblePath::from_bytes(&key).to_nibbles();
            accounts.add_leaf(&path, account.trie_value(&storage_root))?;
            forward_account_events(&mut accounts, on_account.as_deref_mut())?;
        }

        let count = accounts.len();
        let root = accounts.finish();
        forward_account_events(&mut accounts, on_account.as_deref_mut())?;

        debug!(
            target: "trie::loader",
            accounts = count,
            with_storage,
            root = %hex::encode(root),
            "[{}] state root computed",
            config.log_prefix
        );
        Ok(root)
    }

    /// Computes the storage root of a single account.
    ///
    /// A missing account has the empty root.
    pub fn storage_root(&mut self, store: &impl KvReader, account_key: &[u8]) -> Result<Hash, TrieError> {
        let Some(raw) = store.get(Table::Accounts, account_key)? else {
            return Ok(self.codec.empty_root());
        };
        let account =
            Account::decode_flat(&raw).map_err(|reason| TrieError::corrupt_value(account_key, reason))?;

        storage_trie_root(
            store,
            &self.codec,
            &*self.decider,
            &self.cancel,
            self.on_storage.as_deref_mut(),
            account_key,
            account.incarnation,
            self.config.trace,
        )
    }
}

fn forward_account_events<C: NodeCodec>(
    stack: &mut HashStack<'_, C>,
    sink: Option<&mut (dyn FnMut(&BranchNodeEvent) -> Result<(), TrieError> + '_)>,
) -> Result<(), TrieError> {
    let events = stack.take_events();
    if let Some(sink) = sink {
        for event in &events {
            sink(event)?;
        }
    }
    Ok(())
}

/// Storage root of one account generation.
#[allow(clippy::too_many_arguments)]
fn storage_trie_root<C: NodeCodec + Clone>(
    store: &impl KvReader,
    codec: &C,
    decider: &dyn RetainDecider,
    cancel: &CancellationToken,
    mut sink: StorageSinkRef<'_, '_>,
    account_key: &[u8],
    incarnation: u64,
    trace_enabled: bool,
) -> Result<Hash, TrieError> {
    let acc_with_inc = storage_prefix(account_key, incarnation);
    let mut stack = HashStack::with_codec(codec.clone(), decider)
        .with_retain_prefix(NibblePath::from_bytes(&acc_with_inc))
        .with_trace(trace_enabled);

    for item in store.range_dup_sort(Table::Storage, &acc_with_inc, &[], None) {
        cancel.check()?;
        let (_, entry) = item?;
        if entry.len() < HASH_SIZE {
            return Err(TrieError::corrupt_value(
                &acc_with_inc,
                "storage entry shorter than slot key",
            ));
        }
        let (slot, raw) = entry.split_at(HASH_SIZE);
        let skip = raw.iter().take_while(|&&b| b == 0).count();
        let value = &raw[skip..];
        if value.is_empty() {
            warn!(
                target: "trie::storage_root",
                account = %hex::encode(account_key),
                slot = %hex::encode(slot),
                "skipping empty storage value"
            );
            continue;
        }
        if value.len() > HASH_SIZE {
            return Err(TrieError::corrupt_value(
                &[acc_with_inc.as_slice(), slot].concat(),
                "storage value longer than 32 bytes",
            ));
        }

        let mut encoder = RlpEncoder::with_capacity(HASH_SIZE + 1);
        encoder.encode_bytes(value);
        stack.add_leaf(&NibblePath::from_bytes(slot).to_nibbles(), encoder.into_bytes())?;

        let events = stack.take_events();
        if let Some(sink) = sink.as_deref_mut() {
            for event in &events {
                sink(&acc_with_inc, event)?;
            }
        }
    }

    let slots = stack.len();
    let root = stack.finish();
    let events = stack.take_events();
    if let Some(sink) = sink.as_deref_mut() {
        for event in &events {
            sink(&acc_with_inc, event)?;
        }
    }

    if slots > 0 {
        trace!(
            target: "trie::storage_root",
            account = %hex::encode(account_key),
            incarnation,
            slots,
            root = %hex::encode(root),
            "storage root computed"
        );
    }
    Ok(root)
}

/// Computes the root of any sorted `(key, value)` sequence.
///
/// Empty values are skipped, since the trie cannot hold them. Retained
/// branches are passed to `sink`.
pub fn calc_root_sorted<I, K, V>(
    entries: I,
    decider: &dyn RetainDecider,
    mut sink: impl FnMut(&BranchNodeEvent) -> Result<(), TrieError>,
) -> Result<Hash, TrieError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<[u8]>,
    V: Into<Vec<u8>>,
{
    let mut stack = HashStack::new(decider);
    for (key, value) in entries {
        let value = value.into();
        if value.is_empty() {
            continue;
        }
        stack.add_leaf(&NibblePath::from_bytes(key.as_ref()).to_nibbles(), value)?;
        for event in stack.take_events() {
            sink(&event)?;
        }
    }
    let root = stack.finish();
    for event in stack.take_events() {
        sink(&event)?;
    }
    Ok(root)
}
