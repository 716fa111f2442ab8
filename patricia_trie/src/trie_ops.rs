//! Defines the lookup, insert, delete and iteration logic of a [`Trie`].
//!
//! All operations work on an in-memory node graph whose unloaded parts are
//! [`Node::Hash`] references. These are resolved through the
//! [`CheckpointDb`] the first time a traversal needs them. Mutations never
//! modify existing nodes; they rebuild the touched path and return the new
//! root node.
//!
//! [`Trie`]: crate::trie::Trie

use ethereum_types::H256;
use log::trace;
use thiserror::Error;

use crate::{
    checkpoint::CheckpointDb,
    codec::{decode_node, NodeDecodeError},
    db::DbError,
    nibbles::{Nibble, Nibbles},
    node::{
        branch, extension, get_num_non_empty_children, get_single_non_empty_child, leaf,
        new_branch_child_arr, Node, WrappedNode,
    },
    utils::TrieNodeType,
};

/// Stores the result of trie operations. Returns a [TrieOpError] upon
/// failure.
pub type TrieOpResult<T> = Result<T, TrieOpError>;

/// An error type for trie operation.
#[derive(Debug, Error)]
pub enum TrieOpError {
    /// The caller tried to write the key the root is persisted under.
    #[error("Attempted to set '__root__' key but it is not allowed.")]
    InvalidKey,

    /// Bytes read from the store (or given in a proof) are not a node.
    #[error("Malformed trie node: {0}")]
    MalformedNode(#[from] NodeDecodeError),

    /// A proof did not check out against the root it was verified against.
    #[error("Proof verification failed: {0}")]
    ProofVerification(String),

    /// `commit` or `revert` was called without an active checkpoint.
    #[error("No active checkpoint to commit or revert")]
    NoCheckpoint,

    /// A node that is referenced by digest is not in the store.
    #[error("Trie node {0:x} is referenced but missing from the store")]
    MissingNode(H256),

    /// A root was set that has no node in the store.
    #[error("Missing root node for root {0:x}")]
    MissingRoot(H256),

    /// The backing store failed.
    #[error("Backend store error: {0}")]
    Backend(#[from] DbError),
}

/// A entry to be inserted into a trie.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
struct InsertEntry {
    nibbles: Nibbles,
    v: Vec<u8>,
}

impl InsertEntry {
    fn truncate_n_nibbles(&mut self, n: usize) {
        self.nibbles = self.nibbles.truncate_n_nibbles_front(n);
    }
}

/// prefix/postfix info when comparing two `Nibbles`.
#[derive(Debug)]
struct ExistingAndNewNodePreAndPost {
    common_prefix: Nibbles,
    existing_postfix: Nibbles,
    new_postfix: Nibbles,
}

/// When splitting a leaf/extension node after an insert, there is a chance that
/// we may place one of the nodes right into the value node of the branch. This
/// enum just indicates whether or not a value needs to go into the branch node.
#[derive(Debug)]
enum ExistingOrNewBranchValuePlacement {
    BranchValue(Vec<u8>, (Nibble, WrappedNode)),
    BothBranchChildren((Nibble, WrappedNode), (Nibble, WrappedNode)),
}

/// Loads the node stored under `hash`.
pub(crate) fn load_node(db: &CheckpointDb, hash: H256) -> TrieOpResult<WrappedNode> {
    let bytes = db
        .get(hash.as_bytes())?
        .ok_or(TrieOpError::MissingNode(hash))?;
    trace!("Loaded node {:x} ({} bytes)", hash, bytes.len());

    Ok(decode_node(&bytes)?.into())
}

/// Replaces a [`Node::Hash`] with the node it references. Any other node is
/// returned as is.
pub(crate) fn resolve(db: &CheckpointDb, node: &WrappedNode) -> TrieOpResult<WrappedNode> {
    match node.as_ref() {
        Node::Hash(h) => load_node(db, *h),
        _ => Ok(node.clone()),
    }
}

pub(crate) fn trie_get(
    db: &CheckpointDb,
    root: &WrappedNode,
    k: Nibbles,
) -> TrieOpResult<Option<Vec<u8>>> {
    let mut curr_nibbles = k;
    let mut curr_node = root.clone();

    loop {
        match curr_node.as_ref() {
            Node::Empty => {
                trace!("Get traversed Empty");
                return Ok(None);
            }
            Node::Hash(h) => {
                trace!("Get traversed Hash ({:x})", h);
                curr_node = load_node(db, *h)?;
            }
            Node::Branch { children, value } => {
                // Check against branch value.
                if curr_nibbles.is_empty() {
                    return Ok((!value.is_empty()).then(|| value.clone()));
                }

                let nib = curr_nibbles.pop_next_nibble_front();
                trace!("Get traversed Branch (nibble: {:x})", nib);
                curr_node = children[nib as usize].clone();
            }
            Node::Extension { nibbles, child } => {
                trace!("Get traversed Extension (nibbles: {:?})", nibbles);
                if !curr_nibbles.starts_with(nibbles) {
                    return Ok(None);
                }

                curr_nibbles = curr_nibbles.truncate_n_nibbles_front(nibbles.count());
                curr_node = child.clone();
            }
            Node::Leaf { nibbles, value } => {
                trace!("Get traversed Leaf (nibbles: {:?})", nibbles);
                return Ok((*nibbles == curr_nibbles).then(|| value.clone()));
            }
        }
    }
}

/// Inserts `v` under `k` and returns the new root node. `v` must not be empty
/// since an empty value means "no value".
pub(crate) fn trie_insert(
    db: &CheckpointDb,
    root: &WrappedNode,
    k: Nibbles,
    v: Vec<u8>,
) -> TrieOpResult<WrappedNode> {
    debug_assert!(!v.is_empty());

    let ins_entry = InsertEntry { nibbles: k, v };
    trace!("Inserting new node {:?}...", ins_entry);

    insert_into_trie_rec(db, root, ins_entry)
}

/// Removes `k`. Returns the new root node and the removed value, or `None` if
/// `k` was not in the trie.
pub(crate) fn trie_delete(
    db: &CheckpointDb,
    root: &WrappedNode,
    k: Nibbles,
) -> TrieOpResult<Option<(WrappedNode, Vec<u8>)>> {
    trace!("Deleting a leaf node with key {} if it exists", k);

    delete_intern(db, root, k)
}

fn insert_into_trie_rec(
    db: &CheckpointDb,
    node: &WrappedNode,
    mut new_node: InsertEntry,
) -> TrieOpResult<WrappedNode> {
    match node.as_ref() {
        Node::Empty => {
            trace!("Insert traversed Empty");
            Ok(leaf(new_node.nibbles, new_node.v))
        }
        Node::Hash(h) => {
            trace!("Insert traversed Hash ({:x})", h);
            insert_into_trie_rec(db, &load_node(db, *h)?, new_node)
        }
        Node::Branch { children, value } => {
            if new_node.nibbles.is_empty() {
                trace!("Insert traversed branch and placed value in node");
                return Ok(branch(children.clone(), new_node.v));
            }

            let nibble = new_node.nibbles.pop_next_nibble_front();
            trace!("Insert traversed Branch (nibble: {:x})", nibble);

            let updated_child = insert_into_trie_rec(db, &children[nibble as usize], new_node)?;
            let mut updated_children = children.clone();
            updated_children[nibble as usize] = updated_child;

            Ok(branch(updated_children, value.clone()))
        }
        Node::Extension { nibbles, child } => {
            trace!("Insert traversed Extension (nibbles: {:?})", nibbles);

            // Note: Child is guaranteed to be either a `Branch` or a `Hash` node.
            if new_node.nibbles.starts_with(nibbles) {
                new_node.truncate_n_nibbles(nibbles.count());
                let updated_child = insert_into_trie_rec(db, child, new_node)?;

                return Ok(extension(nibbles.clone(), updated_child));
            }

            let info = get_pre_and_postfixes_for_existing_and_new_nodes(nibbles, &new_node.nibbles);

            // Drop one since branch will cover one nibble.
            // Also note that the postfix is always >= 1.
            let existing_postfix_adjusted_for_branch =
                info.existing_postfix.truncate_n_nibbles_front(1);

            // If we split an extension node, we may need to place an extension node after
            // the branch.
            let updated_existing_node = match existing_postfix_adjusted_for_branch.count() {
                0 => child.clone(),
                _ => extension(existing_postfix_adjusted_for_branch, child.clone()),
            };

            Ok(place_branch_and_potentially_ext_prefix(
                &info,
                updated_existing_node,
                new_node,
            ))
        }
        Node::Leaf { nibbles, value } => {
            trace!("Insert traversed Leaf (nibbles: {:?})", nibbles);

            // Update existing node value if already present.
            if *nibbles == new_node.nibbles {
                return Ok(leaf(nibbles.clone(), new_node.v));
            }

            let info = get_pre_and_postfixes_for_existing_and_new_nodes(nibbles, &new_node.nibbles);

            // This existing leaf is going in a branch, so we need to truncate the first
            // nibble since it's going to be represented by the branch.
            let existing_node_truncated = leaf(
                nibbles.truncate_n_nibbles_front(info.common_prefix.count() + 1),
                value.clone(),
            );

            Ok(place_branch_and_potentially_ext_prefix(
                &info,
                existing_node_truncated,
                new_node,
            ))
        }
    }
}

fn delete_intern(
    db: &CheckpointDb,
    node: &WrappedNode,
    mut curr_k: Nibbles,
) -> TrieOpResult<Option<(WrappedNode, Vec<u8>)>> {
    match node.as_ref() {
        Node::Empty => {
            trace!("Delete traversed Empty");
            Ok(None)
        }
        Node::Hash(h) => {
            trace!("Delete traversed Hash ({:x})", h);
            delete_intern(db, &load_node(db, *h)?, curr_k)
        }
        Node::Branch { children, value } => {
            if curr_k.is_empty() {
                if value.is_empty() {
                    return Ok(None);
                }

                trace!("Deleting value of branch");
                let updated_node = normalize_branch(db, children.clone(), Vec::new())?;
                return Ok(Some((updated_node, value.clone())));
            }

            let nibble = curr_k.pop_next_nibble_front();
            trace!("Delete traversed Branch nibble {:x}", nibble);

            delete_intern(db, &children[nibble as usize], curr_k)?.map_or(
                Ok(None),
                |(updated_child, value_deleted)| {
                    let mut updated_children = children.clone();
                    updated_children[nibble as usize] = updated_child;

                    // If the child we recursively called is deleted, then we may need to reduce
                    // this branch to an extension/leaf.
                    let updated_node = normalize_branch(db, updated_children, value.clone())?;
                    Ok(Some((updated_node, value_deleted)))
                },
            )
        }
        Node::Extension {
            nibbles: ext_nibbles,
            child,
        } => {
            trace!("Delete traversed Extension (nibbles: {:?})", ext_nibbles);

            if !curr_k.starts_with(ext_nibbles) {
                return Ok(None);
            }

            let curr_k = curr_k.truncate_n_nibbles_front(ext_nibbles.count());
            delete_intern(db, child, curr_k)?.map_or(Ok(None), |(updated_child, value_deleted)| {
                let updated_node = collapse_ext_node_if_needed(ext_nibbles, &updated_child);
                Ok(Some((updated_node, value_deleted)))
            })
        }
        Node::Leaf { nibbles, value } => {
            trace!("Delete traversed Leaf (nibbles: {:?})", nibbles);
            Ok((*nibbles == curr_k).then(|| {
                trace!("Deleting leaf ({:x})", nibbles);
                (Node::Empty.into(), value.clone())
            }))
        }
    }
}

/// Rebuilds a branch after one of its children or its value was removed,
/// collapsing it if it no longer needs to be a branch.
fn normalize_branch(
    db: &CheckpointDb,
    children: [WrappedNode; 16],
    value: Vec<u8>,
) -> TrieOpResult<WrappedNode> {
    match (get_num_non_empty_children(&children), value.is_empty()) {
        (0, true) => Ok(Node::Empty.into()),
        (0, false) => {
            trace!("Branch with only a value became a leaf");
            Ok(leaf(Nibbles::default(), value))
        }
        (1, true) => {
            let Some((child_nibble, non_empty_node)) = get_single_non_empty_child(&children) else {
                return Ok(branch(children, value));
            };

            // The child may still be a reference that we need to look into.
            let resolved = resolve(db, non_empty_node)?;

            trace!(
                "Branch collapsed. Single remaining child in slot {:x} ({}) gets merged with the nibble.",
                child_nibble,
                TrieNodeType::from(&resolved)
            );

            Ok(merge_prefix_into_node(
                Nibbles::from_nibble(child_nibble),
                non_empty_node,
                &resolved,
            ))
        }
        _ => Ok(branch(children, value)),
    }
}

fn collapse_ext_node_if_needed(ext_nibbles: &Nibbles, child: &WrappedNode) -> WrappedNode {
    trace!(
        "Collapsing extension node ({:x}) with child {}...",
        ext_nibbles,
        TrieNodeType::from(child)
    );

    merge_prefix_into_node(ext_nibbles.clone(), child, child)
}

/// Places `prefix` in front of `resolved` (the loaded form of `child`).
/// Branches (and anything still unloaded) get an extension pointing at the
/// original `child` reference; leaves and extensions absorb the prefix.
fn merge_prefix_into_node(
    prefix: Nibbles,
    child: &WrappedNode,
    resolved: &WrappedNode,
) -> WrappedNode {
    match resolved.as_ref() {
        Node::Empty => Node::Empty.into(),
        Node::Hash(_) | Node::Branch { .. } => extension(prefix, child.clone()),
        Node::Extension {
            nibbles: other_ext_nibbles,
            child: other_ext_child,
        } => extension(
            prefix.merge_nibbles(other_ext_nibbles),
            other_ext_child.clone(),
        ),
        Node::Leaf {
            nibbles: leaf_nibbles,
            value,
        } => leaf(prefix.merge_nibbles(leaf_nibbles), value.clone()),
    }
}

fn get_pre_and_postfixes_for_existing_and_new_nodes(
    existing_node_nibbles: &Nibbles,
    new_node_nibbles: &Nibbles,
) -> ExistingAndNewNodePreAndPost {
    let nib_idx_of_difference =
        Nibbles::find_nibble_idx_that_differs_between_nibbles_different_lengths(
            existing_node_nibbles,
            new_node_nibbles,
        );

    let (common_prefix, existing_postfix) =
        existing_node_nibbles.split_at_idx(nib_idx_of_difference);
    let new_postfix = new_node_nibbles.split_at_idx_postfix(nib_idx_of_difference);

    ExistingAndNewNodePreAndPost {
        common_prefix,
        existing_postfix,
        new_postfix,
    }
}

fn place_branch_and_potentially_ext_prefix(
    info: &ExistingAndNewNodePreAndPost,
    existing_node: WrappedNode,
    new_node: InsertEntry,
) -> WrappedNode {
    let mut children = new_branch_child_arr();
    let mut value = vec![];

    match check_if_existing_or_new_node_should_go_in_branch_value_field(
        info,
        existing_node,
        new_node,
    ) {
        ExistingOrNewBranchValuePlacement::BranchValue(branch_v, (nib, node)) => {
            children[nib as usize] = node;
            value = branch_v;
        }
        ExistingOrNewBranchValuePlacement::BothBranchChildren((nib_1, node_1), (nib_2, node_2)) => {
            children[nib_1 as usize] = node_1;
            children[nib_2 as usize] = node_2;
        }
    }

    let branch = branch(children, value);

    match info.common_prefix.count() {
        0 => branch,
        _ => extension(info.common_prefix.clone(), branch),
    }
}

/// Check if the new leaf or existing node (either leaf/extension) should go
/// into the value field of the new branch.
fn check_if_existing_or_new_node_should_go_in_branch_value_field(
    info: &ExistingAndNewNodePreAndPost,
    existing_node: WrappedNode,
    new_node_entry: InsertEntry,
) -> ExistingOrNewBranchValuePlacement {
    // Guaranteed that both postfixes are not equal at this point.
    match (
        info.existing_postfix.count(),
        info.new_postfix.count(),
        existing_node.as_ref(),
    ) {
        (0, _, Node::Leaf { value, .. }) => ExistingOrNewBranchValuePlacement::BranchValue(
            value.clone(),
            ins_entry_into_leaf_and_nibble(info, new_node_entry),
        ),
        (_, 0, _) => ExistingOrNewBranchValuePlacement::BranchValue(
            new_node_entry.v,
            (info.existing_postfix.get_nibble(0), existing_node),
        ),
        (_, _, _) => ExistingOrNewBranchValuePlacement::BothBranchChildren(
            (info.existing_postfix.get_nibble(0), existing_node),
            ins_entry_into_leaf_and_nibble(info, new_node_entry),
        ),
    }
}

fn ins_entry_into_leaf_and_nibble(
    info: &ExistingAndNewNodePreAndPost,
    entry: InsertEntry,
) -> (Nibble, WrappedNode) {
    let new_first_nibble = info.new_postfix.get_nibble(0);
    let new_node = leaf(info.new_postfix.truncate_n_nibbles_front(1), entry.v);

    (new_first_nibble, new_node)
}

/// An iterator over all the key-value pairs of a trie, in lexicographic key
/// order. Nodes are loaded from the store as the iteration reaches them, so
/// every item is fallible.
#[derive(Debug)]
pub struct TrieIter<'a> {
    db: &'a CheckpointDb,
    trie_stack: Vec<(Nibbles, WrappedNode)>,
}

impl<'a> TrieIter<'a> {
    pub(crate) fn new(db: &'a CheckpointDb, root: WrappedNode) -> Self {
        Self {
            db,
            trie_stack: vec![(Nibbles::default(), root)],
        }
    }
}

impl Iterator for TrieIter<'_> {
    type Item = TrieOpResult<(Nibbles, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((curr_key, node)) = self.trie_stack.pop() {
            match node.as_ref() {
                Node::Empty => (),
                Node::Hash(h) => match load_node(self.db, *h) {
                    Ok(loaded) => self.trie_stack.push((curr_key, loaded)),
                    Err(err) => {
                        self.trie_stack.clear();
                        return Some(Err(err));
                    }
                },
                Node::Branch { children, value } => {
                    // Pushed in reverse so that the lowest nibble is visited first.
                    for (nib, child) in children.iter().enumerate().rev() {
                        if !child.is_empty() {
                            self.trie_stack
                                .push((curr_key.merge_nibble(nib as Nibble), child.clone()));
                        }
                    }

                    // The branch value sorts before everything below it.
                    if !value.is_empty() {
                        return Some(Ok((curr_key, value.clone())));
                    }
                }
                Node::Extension { nibbles, child } => {
                    self.trie_stack
                        .push((curr_key.merge_nibbles(nibbles), child.clone()));
                }
                Node::Leaf { nibbles, value } => {
                    return Some(Ok((curr_key.merge_nibbles(nibbles), value.clone())));
                }
            }
        }

        None
    }
}
