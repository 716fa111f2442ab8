//! Merkle proofs of inclusion and exclusion.
//!
//! A proof for a key is the list of stored node encodings a lookup of that key
//! passes through, starting at the root. Anyone who trusts a root digest can
//! replay the lookup over those nodes without access to the store, checking
//! every node against the digest its parent references it by.

use std::{iter::Peekable, sync::Arc};

use ethereum_types::H256;
use log::{debug, trace};

use crate::{
    codec::{decode_node, encode_node},
    db::{DbOp, MemoryDb},
    hasher::Hasher,
    nibbles::Nibbles,
    node::{Node, WrappedNode},
    special_query::path_for_query,
    trie::{Trie, TrieOpts},
    trie_ops::{TrieOpError, TrieOpResult},
};

/// Node encodings in root-to-leaf order.
pub type Proof = Vec<Vec<u8>>;

impl Trie {
    /// Creates a proof for `key`.
    ///
    /// The proof shows that `key` maps to its current value, or that it is
    /// absent. An empty trie has an empty proof.
    pub fn create_proof(&self, key: &[u8]) -> TrieOpResult<Proof> {
        let proof = path_for_query(self, key)
            .filter_map(|res| res.map(|node| node.encoding).transpose())
            .collect::<TrieOpResult<Proof>>()?;

        trace!("Created proof with {} nodes", proof.len());
        Ok(proof)
    }

    /// Checks `proof` for `key` against `root` and returns the value it proves
    /// (`None` for a proof of absence).
    ///
    /// Only the digest function and key transformation of this trie are used.
    /// Its store and root are not touched.
    pub fn verify_proof(
        &self,
        root: H256,
        key: &[u8],
        proof: &[Vec<u8>],
    ) -> TrieOpResult<Option<Vec<u8>>> {
        verify_proof(self.hasher.as_ref(), root, self.key_nibbles(key), proof)
    }

    /// Creates a trie on a fresh in-memory store that holds just the nodes of
    /// `proof`, rooted at its first node. `opts.root` is ignored.
    ///
    /// The result is a partial trie: queries for keys the proof covers work,
    /// others fail with [`TrieOpError::MissingNode`].
    pub fn from_proof(proof: &[Vec<u8>], opts: TrieOpts) -> TrieOpResult<Trie> {
        let opts = TrieOpts { root: None, ..opts };
        let mut trie = Trie::new(Arc::new(MemoryDb::new()), opts)?;

        if let Some(root) = trie.update_from_proof(proof, false)? {
            trie.set_root(root)?;
        }

        Ok(trie)
    }

    /// Stores the nodes of `proof` so that they can be used by this trie.
    /// Returns the digest of the first node, which is the root the proof
    /// belongs to.
    ///
    /// With `should_verify_root` the proof must belong to the current root.
    pub fn update_from_proof(
        &mut self,
        proof: &[Vec<u8>],
        should_verify_root: bool,
    ) -> TrieOpResult<Option<H256>> {
        let ops: Vec<_> = proof
            .iter()
            .map(|node| DbOp::Put {
                key: self.hasher.hash(node).as_bytes().to_vec(),
                value: node.clone(),
            })
            .collect();

        let proof_root = proof.first().map(|node| self.hasher.hash(node));
        if should_verify_root {
            if let Some(proof_root) = proof_root.filter(|r| *r != self.root) {
                return Err(TrieOpError::ProofVerification(format!(
                    "The provided proof does not have the expected trie root (expected {:x}, got {:x})",
                    self.root, proof_root
                )));
            }
        }

        debug!("Storing {} proof nodes", ops.len());
        self.db.batch(ops)?;

        Ok(proof_root)
    }
}

/// Checks `proof` for the key path `key` against `root`, using `hasher` for
/// node digests, and returns the proven value (`None` for a proof of absence).
///
/// Fails with [`TrieOpError::ProofVerification`] if a node does not match the
/// digest it is referenced by, if the proof ends before the lookup does, or if
/// there are nodes left over once it is done. Entries that are not nodes fail
/// with [`TrieOpError::MalformedNode`].
pub fn verify_proof(
    hasher: &dyn Hasher,
    root: H256,
    key: Nibbles,
    proof: &[Vec<u8>],
) -> TrieOpResult<Option<Vec<u8>>> {
    let mut entries = proof.iter().enumerate().peekable();
    let mut curr_key = key;
    let mut curr_node: WrappedNode = match root == hasher.hash(&rlp::NULL_RLP) {
        // The empty trie has nothing to prove, but may still come with its
        // (empty) root node.
        true if proof.is_empty() => return Ok(None),
        _ => Node::Hash(root).into(),
    };

    let value = loop {
        match curr_node.as_ref() {
            Node::Empty => break None,
            Node::Hash(h) => {
                let (idx, bytes) = entries.next().ok_or_else(|| {
                    TrieOpError::ProofVerification(format!(
                        "Proof ended but node {:x} is still needed",
                        h
                    ))
                })?;

                let entry_hash = hasher.hash(bytes);
                if entry_hash != *h {
                    return Err(TrieOpError::ProofVerification(format!(
                        "Proof node {} hashes to {:x}, but {:x} was expected",
                        idx, entry_hash, h
                    )));
                }

                curr_node = decode_node(bytes)?.into();
            }
            Node::Branch { children, value } => {
                if curr_key.is_empty() {
                    break (!value.is_empty()).then(|| value.clone());
                }

                let nib = curr_key.pop_next_nibble_front();
                curr_node = children[nib as usize].clone();
                skip_inline_entry(hasher, &curr_node, &mut entries);
            }
            Node::Extension { nibbles, child } => {
                if !curr_key.starts_with(nibbles) {
                    break None;
                }

                curr_key = curr_key.truncate_n_nibbles_front(nibbles.count());
                curr_node = child.clone();
                skip_inline_entry(hasher, &curr_node, &mut entries);
            }
            Node::Leaf { nibbles, value } => {
                break (*nibbles == curr_key).then(|| value.clone());
            }
        }
    };

    if let Some((idx, _)) = entries.next() {
        return Err(TrieOpError::ProofVerification(format!(
            "Proof has {} extraneous nodes starting at node {}",
            proof.len() - idx,
            idx
        )));
    }

    Ok(value)
}

/// Some implementations also list nodes embedded in their parent as proof
/// entries of their own. Such an entry carries nothing new, so it is skipped
/// if it matches the embedded node exactly.
fn skip_inline_entry<'a, I>(hasher: &dyn Hasher, node: &Node, entries: &mut Peekable<I>)
where
    I: Iterator<Item = (usize, &'a Vec<u8>)>,
{
    if matches!(node, Node::Empty | Node::Hash(_)) {
        return;
    }

    let encoded = encode_node(node, hasher);
    if let Some((idx, _)) = entries.next_if(|(_, bytes)| **bytes == encoded) {
        trace!("Skipped proof node {} (embedded in its parent)", idx);
    }
}
