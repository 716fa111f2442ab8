//! Definition of the in-memory trie [`Node`].
//!
//! Nodes are immutable once built. Every mutation of a trie builds new nodes
//! along the touched path and leaves the old ones untouched, so a node can be
//! shared freely between tries (and between a trie and its copies).

use std::sync::Arc;

use ethereum_types::H256;

use crate::nibbles::{Nibble, Nibbles};

/// Alias for a node that is a child of an extension or branch node.
pub type WrappedNode = Arc<Node>;

/// A trie node.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum Node {
    /// An empty trie (or an empty branch slot).
    #[default]
    Empty,
    /// A node that is referenced by the digest of its encoding and has not
    /// been loaded from the store yet.
    Hash(H256),
    /// A branch node, which consists of 16 children and an optional value.
    Branch {
        /// A slice containing the 16 children of this branch node.
        children: [WrappedNode; 16],
        /// The payload of this node. Empty when the branch holds no value.
        value: Vec<u8>,
    },
    /// An extension node, which consists of a list of nibbles and a single
    /// child.
    Extension {
        /// The path of this extension.
        nibbles: Nibbles,
        /// The child of this extension node.
        child: WrappedNode,
    },
    /// A leaf node, which consists of a list of nibbles and a value.
    Leaf {
        /// The path of this leaf node.
        nibbles: Nibbles,
        /// The payload of this node
        value: Vec<u8>,
    },
}

impl Node {
    /// Returns `true` for [`Node::Empty`].
    pub const fn is_empty(&self) -> bool {
        matches!(self, Node::Empty)
    }
}

pub(crate) fn branch(children: [WrappedNode; 16], value: Vec<u8>) -> WrappedNode {
    Node::Branch { children, value }.into()
}

pub(crate) fn extension(nibbles: Nibbles, child: WrappedNode) -> WrappedNode {
    Node::Extension { nibbles, child }.into()
}

pub(crate) fn leaf(nibbles: Nibbles, value: Vec<u8>) -> WrappedNode {
    Node::Leaf { nibbles, value }.into()
}

pub(crate) fn new_branch_child_arr() -> [WrappedNode; 16] {
    let empty: WrappedNode = Node::Empty.into();
    std::array::from_fn(|_| empty.clone())
}

pub(crate) fn get_num_non_empty_children(children: &[WrappedNode; 16]) -> usize {
    children.iter().filter(|c| !c.is_empty()).count()
}

/// Returns the only non-empty child of a branch along with its nibble, or
/// `None` if there is not exactly one.
pub(crate) fn get_single_non_empty_child(
    children: &[WrappedNode; 16],
) -> Option<(Nibble, &WrappedNode)> {
    let mut non_empty = children
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.is_empty())
        .map(|(n, c)| (n as Nibble, c));

    match (non_empty.next(), non_empty.next()) {
        (Some(only), None) => Some(only),
        _ => None,
    }
}
