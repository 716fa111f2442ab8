//! Summaries of how a trie is laid out in its store.
//!
//! Every node reachable from the root is visited. A node referenced by digest
//! that is not in the store is counted as missing rather than failing the
//! walk, so partial tries built from proofs can be inspected as well.

use std::fmt::{self, Display};

use crate::{
    codec::decode_node,
    node::{Node, WrappedNode},
    trie::Trie,
    trie_ops::TrieOpResult,
};

/// Node and storage statistics of a trie.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TrieStats {
    name: Option<String>,
    nodes: NodeCounts,
    storage: StorageCounts,
    depth: DepthStats,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
struct NodeCounts {
    branch: usize,
    branch_values: usize,
    extension: usize,
    leaf: usize,
}

/// How the nodes are held: as their own store entries or inside a parent.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
struct StorageCounts {
    stored: usize,
    embedded: usize,
    missing: usize,
    encoded_bytes: usize,
    value_bytes: usize,
}

/// Depth counts nodes from the root (depth 0), not key nibbles.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
struct DepthStats {
    max_depth: usize,
    min_leaf_depth: Option<usize>,
    leaf_depth_sum: usize,
}

impl TrieStats {
    /// Number of values, held either by leaves or by branches.
    pub const fn values(&self) -> usize {
        self.nodes.leaf + self.nodes.branch_values
    }

    /// Number of nodes that have their own entry in the store.
    pub const fn stored_nodes(&self) -> usize {
        self.storage.stored
    }

    /// Number of nodes embedded in their parent's encoding.
    pub const fn embedded_nodes(&self) -> usize {
        self.storage.embedded
    }

    /// Number of digest references whose node is not in the store.
    pub const fn missing_nodes(&self) -> usize {
        self.storage.missing
    }

    /// Returns `true` if every referenced node could be loaded.
    pub const fn is_complete(&self) -> bool {
        self.storage.missing == 0
    }

    /// Total size of the encodings of all stored nodes.
    pub const fn encoded_bytes(&self) -> usize {
        self.storage.encoded_bytes
    }

    /// The depth of the deepest node.
    pub const fn max_depth(&self) -> usize {
        self.depth.max_depth
    }

    /// Average depth of the leaves, if there are any.
    pub fn avg_leaf_depth(&self) -> Option<f64> {
        (self.nodes.leaf > 0)
            .then(|| self.depth.leaf_depth_sum as f64 / self.nodes.leaf as f64)
    }

    fn record_depth(&mut self, depth: usize) {
        self.depth.max_depth = self.depth.max_depth.max(depth);
    }

    fn record_leaf(&mut self, depth: usize, value: &[u8]) {
        self.nodes.leaf += 1;
        self.storage.value_bytes += value.len();
        self.depth.leaf_depth_sum += depth;
        self.depth.min_leaf_depth = Some(
            self.depth
                .min_leaf_depth
                .map_or(depth, |min_depth| min_depth.min(depth)),
        );
    }
}

impl Display for TrieStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => writeln!(f, "Trie stats ({}):", name)?,
            None => writeln!(f, "Trie stats:")?,
        }

        writeln!(
            f,
            "Nodes: {} branches ({} with a value), {} extensions, {} leaves",
            self.nodes.branch, self.nodes.branch_values, self.nodes.extension, self.nodes.leaf
        )?;
        writeln!(
            f,
            "Store: {} stored ({} bytes), {} embedded, {} missing, {} value bytes",
            self.storage.stored,
            self.storage.encoded_bytes,
            self.storage.embedded,
            self.storage.missing,
            self.storage.value_bytes
        )?;

        write!(f, "Depth: max {}", self.depth.max_depth)?;
        match (self.depth.min_leaf_depth, self.avg_leaf_depth()) {
            (Some(min), Some(avg)) => writeln!(f, ", leaves from {} (average {:.2})", min, avg),
            _ => writeln!(f),
        }
    }
}

/// Walks `trie` and collects its statistics.
pub fn get_trie_stats(trie: &Trie) -> TrieOpResult<TrieStats> {
    get_trie_stats_common(trie, None)
}

/// Like [`get_trie_stats`], with a name that is shown when the stats are
/// printed.
pub fn get_trie_stats_with_name(trie: &Trie, name: String) -> TrieOpResult<TrieStats> {
    get_trie_stats_common(trie, Some(name))
}

fn get_trie_stats_common(trie: &Trie, name: Option<String>) -> TrieOpResult<TrieStats> {
    let mut stats = TrieStats {
        name,
        ..Default::default()
    };

    let mut stack: Vec<(WrappedNode, usize)> = vec![(trie.root_ref(), 0)];
    while let Some((node, depth)) = stack.pop() {
        let node = match node.as_ref() {
            Node::Empty => continue,
            Node::Hash(h) => match trie.db.get(h.as_bytes())? {
                Some(bytes) => {
                    stats.storage.stored += 1;
                    stats.storage.encoded_bytes += bytes.len();
                    WrappedNode::new(decode_node(&bytes)?)
                }
                None => {
                    stats.storage.missing += 1;
                    continue;
                }
            },
            _ => {
                stats.storage.embedded += 1;
                node.clone()
            }
        };

        stats.record_depth(depth);
        match node.as_ref() {
            Node::Branch { children, value } => {
                stats.nodes.branch += 1;
                if !value.is_empty() {
                    stats.nodes.branch_values += 1;
                    stats.storage.value_bytes += value.len();
                }

                stack.extend(
                    children
                        .iter()
                        .filter(|c| !c.is_empty())
                        .map(|c| (c.clone(), depth + 1)),
                );
            }
            Node::Extension { child, .. } => {
                stats.nodes.extension += 1;
                stack.push((child.clone(), depth + 1));
            }
            Node::Leaf { value, .. } => stats.record_leaf(depth, value),
            // A decoded node is never a bare reference, and an empty trie has
            // no stored root.
            Node::Empty | Node::Hash(_) => (),
        }
    }

    Ok(stats)
}
