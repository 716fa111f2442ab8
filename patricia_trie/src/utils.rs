//! Various types and logic that don't fit well into any other module.

use std::{
    fmt::{self, Display},
    ops::BitAnd,
};

use num_traits::PrimInt;

use crate::{
    nibbles::{Nibble, Nibbles},
    node::{Node, WrappedNode},
};

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
/// Simplified trie node type to make logging cleaner.
pub enum TrieNodeType {
    /// Empty node.
    Empty,

    /// Hash node.
    Hash,

    /// Branch node.
    Branch,

    /// Extension node.
    Extension,

    /// Leaf node.
    Leaf,
}

impl From<&WrappedNode> for TrieNodeType {
    fn from(value: &WrappedNode) -> Self {
        value.as_ref().into()
    }
}

impl From<&Node> for TrieNodeType {
    fn from(node: &Node) -> Self {
        match node {
            Node::Empty => Self::Empty,
            Node::Hash(_) => Self::Hash,
            Node::Branch { .. } => Self::Branch,
            Node::Extension { .. } => Self::Extension,
            Node::Leaf { .. } => Self::Leaf,
        }
    }
}

impl Display for TrieNodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TrieNodeType::Empty => "Empty",
            TrieNodeType::Hash => "Hash",
            TrieNodeType::Branch => "Branch",
            TrieNodeType::Extension => "Extension",
            TrieNodeType::Leaf => "Leaf",
        };

        write!(f, "{}", s)
    }
}

pub(crate) fn is_even<T: PrimInt + BitAnd<Output = T>>(num: T) -> bool {
    (num & T::one()) == T::zero()
}

/// Minimal key information of "segments" (nodes) used to construct trie
/// "traces" of a trie query. Unlike [`TrieNodeType`], this type also contains
/// the key piece of the node if applicable.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum PathSegment {
    /// Empty node.
    Empty,

    /// Branch node along with the nibble of the child taken. `None` if the
    /// query ended at the branch (its value slot was read).
    Branch(Option<Nibble>),

    /// Extension node along with the key piece of the node.
    Extension(Nibbles),

    /// Leaf node along wth the key piece of the node.
    Leaf(Nibbles),
}

/// A vector of path segments representing a path in the trie.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct TriePath(pub Vec<PathSegment>);

impl Display for TriePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let num_elems = self.0.len();

        // For everything but the last elem.
        for seg in self.0.iter().take(num_elems.saturating_sub(1)) {
            write!(f, "{} --> ", seg)?;
        }

        // Avoid the extra `-->` for the last elem.
        if let Some(seg) = self.0.last() {
            write!(f, "{}", seg)?;
        }

        Ok(())
    }
}

impl Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Empty => write!(f, "Empty"),
            PathSegment::Branch(Some(nib)) => write!(f, "Branch({:x})", nib),
            PathSegment::Branch(None) => write!(f, "Branch(value)"),
            PathSegment::Extension(nibs) => write!(f, "Extension({})", nibs),
            PathSegment::Leaf(nibs) => write!(f, "Leaf({})", nibs),
        }
    }
}

impl PathSegment {
    /// Get the node type of the [`PathSegment`].
    pub const fn node_type(&self) -> TrieNodeType {
        match self {
            PathSegment::Empty => TrieNodeType::Empty,
            PathSegment::Branch(_) => TrieNodeType::Branch,
            PathSegment::Extension(_) => TrieNodeType::Extension,
            PathSegment::Leaf(_) => TrieNodeType::Leaf,
        }
    }
}
