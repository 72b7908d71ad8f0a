//! Incremental commitment engine.
//!
//! A batch is applied to a partially expanded copy of the trie: only nodes
//! on the paths of the updated keys are decoded from the context, every
//! other subtree stays a `ChildRef`. Re-hashing walks the expanded part
//! bottom-up, so the cost of a batch is proportional to the number of
//! touched paths, not to the size of the trie.

use tracing::{debug, trace};

use super::context::CommitmentContext;
use super::update::Update;
use crate::cancel::CancellationToken;
use crate::config::EngineConfig;
use crate::data::{common_prefix_len, NibblePath};
use crate::error::TrieError;
use crate::merkle::{ChildRef, Hash, KeccakCodec, NodeCodec, TrieNode};

/// A node of the trie being rebuilt.
#[derive(Debug, Default)]
enum WorkNode {
    #[default]
    Empty,
    /// Unresolved subtree, kept as its parent referenced it.
    Ref(ChildRef),
    Leaf {
        path: Vec<u8>,
        value: Vec<u8>,
    },
    Extension {
        path: Vec<u8>,
        child: Box<WorkNode>,
    },
    Branch {
        children: Box<[WorkNode; 16]>,
        value: Option<Vec<u8>>,
    },
}

impl WorkNode {
    fn empty_branch() -> Box<[WorkNode; 16]> {
        Box::new(std::array::from_fn(|_| WorkNode::Empty))
    }
}

impl From<TrieNode> for WorkNode {
    fn from(node: TrieNode) -> Self {
        match node {
            TrieNode::Leaf { path, value } => WorkNode::Leaf {
                path: path.to_nibbles(),
                value,
            },
            TrieNode::Extension { path, child } => WorkNode::Extension {
                path: path.to_nibbles(),
                child: Box::new(WorkNode::Ref(child)),
            },
            TrieNode::Branch { children, value } => {
                let mut work = WorkNode::empty_branch();
                let children = *children;
                for (slot, child) in work.iter_mut().zip(children) {
                    if let Some(child) = child {
                        *slot = WorkNode::Ref(child);
                    }
                }
                WorkNode::Branch {
                    children: work,
                    value,
                }
            }
            TrieNode::HashOnly(hash) => WorkNode::Ref(ChildRef::Hash(hash)),
        }
    }
}

/// Wraps `node` in an extension over `path`, unless `path` is empty.
fn wrap_extension(path: &[u8], node: WorkNode) -> WorkNode {
    if path.is_empty() {
        node
    } else {
        WorkNode::Extension {
            path: path.to_vec(),
            child: Box::new(node),
        }
    }
}

/// Moves `node` up by `prefix` nibbles, merging it into a leaf or extension
/// when possible.
fn prepend(prefix: &[u8], node: WorkNode) -> WorkNode {
    match node {
        WorkNode::Empty => WorkNode::Empty,
        WorkNode::Leaf { path, value } => WorkNode::Leaf {
            path: [prefix, path.as_slice()].concat(),
            value,
        },
        WorkNode::Extension { path, child } => WorkNode::Extension {
            path: [prefix, path.as_slice()].concat(),
            child,
        },
        branch @ (WorkNode::Branch { .. } | WorkNode::Ref(_)) => wrap_extension(prefix, branch),
    }
}

/// Loads the node a parent at `prefix` refers to.
fn load_node<C: NodeCodec>(
    codec: &C,
    ctx: &CommitmentContext,
    child: &ChildRef,
    prefix: &[u8],
) -> Result<TrieNode, TrieError> {
    let decoded = match child {
        ChildRef::Hash(hash) => {
            let encoded = ctx
                .node(prefix)
                .ok_or_else(|| TrieError::corrupt_node(prefix, "missing node"))?;
            if codec.hash(encoded) != *hash {
                return Err(TrieError::corrupt_node(prefix, "hash mismatch"));
            }
            codec.decode(encoded)
        }
        ChildRef::Inline(encoded) => codec.decode(encoded),
    };
    decoded.map_err(|e| TrieError::corrupt_node(prefix, e.to_string()))
}

/// State of one batch: the context it reads from and every stored node it
/// decoded.
struct BatchState<'a, C> {
    codec: &'a C,
    ctx: &'a CommitmentContext,
    touched: Vec<Vec<u8>>,
    written: Vec<(Vec<u8>, Vec<u8>)>,
    trace: bool,
}

impl<'a, C: NodeCodec> BatchState<'a, C> {
    fn resolve(&mut self, node: WorkNode, pos: &[u8]) -> Result<WorkNode, TrieError> {
        let WorkNode::Ref(child) = node else {
            return Ok(node);
        };
        let decoded = load_node(self.codec, self.ctx, &child, pos)?;
        if child.is_hash() {
            self.touched.push(pos.to_vec());
        }
        Ok(decoded.into())
    }

    fn insert(
        &mut self,
        node: WorkNode,
        pos: &mut Vec<u8>,
        key: &[u8],
        value: Vec<u8>,
    ) -> Result<WorkNode, TrieError> {
        let node = self.resolve(node, pos)?;
        let updated = match node {
            WorkNode::Empty => WorkNode::Leaf {
                path: key.to_vec(),
                value,
            },
            WorkNode::Leaf { path, value: old } => {
                if path == key {
                    return Ok(WorkNode::Leaf { path, value });
                }
                let cp = common_prefix_len(&path, key);
                let mut children = WorkNode::empty_branch();
                let mut branch_value = None;

                if cp == path.len() {
                    branch_value = Some(old);
                } else {
                    children[path[cp] as usize] = WorkNode::Leaf {
                        path: path[cp + 1..].to_vec(),
                        value: old,
                    };
                }
                if cp == key.len() {
                    branch_value = Some(value);
                } else {
                    children[key[cp] as usize] = WorkNode::Leaf {
                        path: key[cp + 1..].to_vec(),
                        value,
                    };
                }

                let branch = WorkNode::Branch {
                    children,
                    value: branch_value,
                };
                wrap_extension(&key[..cp], branch)
            }
            WorkNode::Extension { path, child } => {
                let cp = common_prefix_len(&path, key);
                if cp == path.len() {
                    let len = pos.len();
                    pos.extend_from_slice(&path);
                    let child = self.insert(*child, pos, &key[cp..], value);
                    pos.truncate(len);
                    return Ok(WorkNode::Extension {
                        path,
                        child: Box::new(child?),
                    });
                }

                // Split: the extension diverges from the key at `cp`.
                let mut children = WorkNode::empty_branch();
                let mut branch_value = None;
                let ext_rest = &path[cp + 1..];
                children[path[cp] as usize] = wrap_extension(ext_rest, *child);
                if cp == key.len() {
                    branch_value = Some(value);
                } else {
                    children[key[cp] as usize] = WorkNode::Leaf {
                        path: key[cp + 1..].to_vec(),
                        value,
                    };
                }

                let branch = WorkNode::Branch {
                    children,
                    value: branch_value,
                };
                wrap_extension(&path[..cp], branch)
            }
            WorkNode::Branch {
                mut children,
                value: branch_value,
            } => {
                if key.is_empty() {
                    return Ok(WorkNode::Branch {
                        children,
                        value: Some(value),
                    });
                }
                let idx = key[0] as usize;
                let child = std::mem::take(&mut children[idx]);
                pos.push(key[0]);
                let child = self.insert(child, pos, &key[1..], value);
                pos.pop();
                children[idx] = child?;
                WorkNode::Branch {
                    children,
                    value: branch_value,
                }
            }
            WorkNode::Ref(_) => return Err(TrieError::corrupt_node(pos, "unresolved node")),
        };
        Ok(updated)
    }

    /// Removes `key` below `node`. The flag reports whether anything changed.
    fn delete(
        &mut self,
        node: WorkNode,
        pos: &mut Vec<u8>,
        key: &[u8],
    ) -> Result<(WorkNode, bool), TrieError> {
        let node = self.resolve(node, pos)?;
        match node {
            WorkNode::Empty => Ok((WorkNode::Empty, false)),
            WorkNode::Leaf { path, value } => {
                if path == key {
                    Ok((WorkNode::Empty, true))
                } else {
                    Ok((WorkNode::Leaf { path, value }, false))
                }
            }
            WorkNode::Extension { path, child } => {
                if !key.starts_with(&path) {
                    return Ok((WorkNode::Extension { path, child }, false));
                }
                let len = pos.len();
                pos.extend_from_slice(&path);
                let result = self.delete(*child, pos, &key[path.len()..]);
                let (child, changed) = match result {
                    Ok(done) => done,
                    Err(e) => {
                        pos.truncate(len);
                        return Err(e);
                    }
                };
                if !changed {
                    pos.truncate(len);
                    return Ok((
                        WorkNode::Extension {
                            path,
                            child: Box::new(child),
                        },
                        false,
                    ));
                }
                // The child may have shrunk to a leaf or extension: merge.
                let child = self.resolve(child, pos);
                pos.truncate(len);
                Ok((prepend(&path, child?), true))
            }
            WorkNode::Branch {
                mut children,
                mut value,
            } => {
                if key.is_empty() {
                    if value.take().is_none() {
                        return Ok((WorkNode::Branch { children, value }, false));
                    }
                } else {
                    let idx = key[0] as usize;
                    let child = std::mem::take(&mut children[idx]);
                    pos.push(key[0]);
                    let result = self.delete(child, pos, &key[1..]);
                    pos.pop();
                    let (child, changed) = result?;
                    children[idx] = child;
                    if !changed {
                        return Ok((WorkNode::Branch { children, value }, false));
                    }
                }
                Ok((self.normalize_branch(children, value, pos)?, true))
            }
            WorkNode::Ref(_) => Err(TrieError::corrupt_node(pos, "unresolved node")),
        }
    }

    /// Collapses a branch left with fewer than two entries.
    fn normalize_branch(
        &mut self,
        mut children: Box<[WorkNode; 16]>,
        value: Option<Vec<u8>>,
        pos: &mut Vec<u8>,
    ) -> Result<WorkNode, TrieError> {
        let mut present = children
            .iter()
            .enumerate()
            .filter(|(_, c)| !matches!(c, WorkNode::Empty))
            .map(|(i, _)| i);
        let first = present.next();
        let more = present.next().is_some();

        match (first, more, value) {
            (None, _, None) => Ok(WorkNode::Empty),
            (None, _, Some(value)) => Ok(WorkNode::Leaf {
                path: Vec::new(),
                value,
            }),
            (Some(idx), false, None) => {
                let child = std::mem::take(&mut children[idx]);
                pos.push(idx as u8);
                let child = self.resolve(child, pos);
                pos.pop();
                Ok(prepend(&[idx as u8], child?))
            }
            (_, _, value) => Ok(WorkNode::Branch { children, value }),
        }
    }

    /// Encodes the expanded part of the trie bottom-up and returns the
    /// reference of `node`. Hash-referenced encodings are queued for writing.
    fn commit(&mut self, node: WorkNode, pos: &mut Vec<u8>) -> Result<Option<ChildRef>, TrieError> {
        let trie_node = match node {
            WorkNode::Empty => return Ok(None),
            WorkNode::Ref(child) => return Ok(Some(child)),
            WorkNode::Leaf { path, value } => TrieNode::Leaf {
                path: NibblePath::from_nibbles(&path),
                value,
            },
            WorkNode::Extension { path, child } => {
                let len = pos.len();
                pos.extend_from_slice(&path);
                let child = self.commit(*child, pos);
                pos.truncate(len);
                let Some(child) = child? else {
                    return Err(TrieError::corrupt_node(pos, "extension without child"));
                };
                TrieNode::Extension {
                    path: NibblePath::from_nibbles(&path),
                    child,
                }
            }
            WorkNode::Branch { children, value } => {
                let mut refs: [Option<ChildRef>; 16] = Default::default();
                let children = *children;
                for (idx, child) in children.into_iter().enumerate() {
                    pos.push(idx as u8);
                    let child = self.commit(child, pos);
                    pos.pop();
                    refs[idx] = child?;
                }
                TrieNode::Branch {
                    children: Box::new(refs),
                    value,
                }
            }
        };

        let encoded = self.codec.encode(&trie_node);
        let child = self.codec.child_ref(encoded.clone());
        if child.is_hash() {
            if self.trace {
                trace!(
                    target: "trie::commitment",
                    prefix = %NibblePath::from_nibbles(pos),
                    kind = ?trie_node.node_type(),
                    len = encoded.len(),
                    "rebuilt node"
                );
            }
            self.written.push((pos.clone(), encoded));
        } else if pos.is_empty() {
            // The root is stored even when it is small enough to inline.
            self.written.push((Vec::new(), encoded));
        }
        Ok(Some(child))
    }
}

/// Incremental Merkle root computation over a `CommitmentContext`.
#[derive(Clone, Debug, Default)]
pub struct CommitmentEngine<C = KeccakCodec> {
    codec: C,
    config: EngineConfig,
    cancel: CancellationToken,
}

impl CommitmentEngine<KeccakCodec> {
    /// Creates an engine with the Ethereum codec.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_codec(KeccakCodec, config)
    }
}

impl<C: NodeCodec> CommitmentEngine<C> {
    /// Creates an engine with a custom node codec.
    pub fn with_codec(codec: C, config: EngineConfig) -> Self {
        Self {
            codec,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Attaches a cancellation token, polled between updates.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Applies `batch` to the trie described by `ctx` and returns the new
    /// root hash.
    ///
    /// The context is modified only if the whole batch succeeds.
    pub fn process(
        &self,
        ctx: &mut CommitmentContext,
        mut batch: Vec<Update>,
        label: &str,
    ) -> Result<Hash, TrieError> {
        if batch.is_empty() {
            return Ok(ctx.root_hash());
        }

        batch.sort_by(|a, b| a.key.cmp(&b.key));
        if let Some(pair) = batch.windows(2).find(|pair| pair[0].key == pair[1].key) {
            return Err(TrieError::DuplicateKey(pair[0].key.clone()));
        }

        debug!(
            target: "trie::commitment",
            label,
            updates = batch.len(),
            stored = ctx.node_count(),
            "processing batch"
        );

        let mut state = BatchState {
            codec: &self.codec,
            ctx: &*ctx,
            touched: Vec::new(),
            written: Vec::new(),
            trace: self.config.trace,
        };
        let mut root = match state.ctx.root() {
            Some(hash) => WorkNode::Ref(ChildRef::Hash(hash)),
            None => WorkNode::Empty,
        };

        let mut pos = Vec::with_capacity(64);
        for update in batch {
            self.cancel.check()?;
            let key = NibblePath::from_bytes(&update.key).to_nibbles();
            let is_delete = update.is_delete();
            root = match update.value {
                Some(value) if !is_delete => state.insert(root, &mut pos, &key, value)?,
                _ => state.delete(root, &mut pos, &key)?.0,
            };
        }

        let root_ref = state.commit(root, &mut pos)?;
        let new_root = root_ref.map(|child| match child {
            ChildRef::Hash(hash) => hash,
            ChildRef::Inline(encoded) => self.codec.hash(&encoded),
        });

        let BatchState {
            touched, written, ..
        } = state;
        let (evicted, rebuilt) = (touched.len(), written.len());
        ctx.apply(touched, written, new_root);

        let root_hash = ctx.root_hash();
        debug!(
            target: "trie::commitment",
            label,
            evicted,
            rebuilt,
            root = %hex::encode(root_hash),
            "batch committed"
        );
        Ok(root_hash)
    }

    /// Looks up the value stored under `key`.
    pub fn get(&self, ctx: &CommitmentContext, key: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        let Some(root) = ctx.root() else {
            return Ok(None);
        };
        let key = NibblePath::from_bytes(key).to_nibbles();
        let mut pos = Vec::with_capacity(key.len());
        let mut node = load_node(&self.codec, ctx, &ChildRef::Hash(root), &pos)?;
        let mut rest = key.as_slice();

        loop {
            match node {
                TrieNode::Leaf { path, value } => {
                    return Ok((path.as_slice() == rest).then_some(value));
                }
                TrieNode::Extension { path, child } => {
                    if !rest.starts_with(path.as_slice()) {
                        return Ok(None);
                    }
                    pos.extend_from_slice(path.as_slice());
                    rest = &rest[path.len()..];
                    node = load_node(&self.codec, ctx, &child, &pos)?;
                }
                TrieNode::Branch { children, value } => {
                    let Some((&idx, tail)) = rest.split_first() else {
                        return Ok(value);
                    };
                    let Some(child) = &children[idx as usize] else {
                        return Ok(None);
                    };
                    pos.push(idx);
                    rest = tail;
                    node = load_node(&self.codec, ctx, child, &pos)?;
                }
                TrieNode::HashOnly(_) => {
                    return Err(TrieError::corrupt_node(&pos, "unexpected hash-only node"));
                }
            }
        }
    }
}
