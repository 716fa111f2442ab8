//! Specialized queries that users of the library may need that require
//! knowledge of the private internal trie state.

use crate::{
    checkpoint::CheckpointDb,
    codec::decode_node,
    nibbles::Nibbles,
    node::{Node, WrappedNode},
    trie::Trie,
    trie_ops::{TrieOpError, TrieOpResult},
    utils::{PathSegment, TriePath},
};

/// A node visited by a query.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct QueryNode {
    /// The node and the step the query took through it.
    pub segment: PathSegment,

    /// The stored encoding of the node if it is referenced by digest (which
    /// the root always is). `None` for nodes embedded in their parent.
    pub encoding: Option<Vec<u8>>,
}

/// An iterator for a trie query. Note that this iterator is lazy.
///
/// The last node yielded is the one the query ended at. It is included even if
/// the key diverges from it, since that is what proves the key is absent.
#[derive(Debug)]
pub struct TriePathIter<'a> {
    db: &'a CheckpointDb,

    /// The next node in the trie to query with the remaining key.
    curr_node: WrappedNode,

    /// The remaining part of the key as we traverse down the trie.
    curr_key: Nibbles,

    // Although wrapping `curr_node` in an option might be more "Rust like", the logic is a lot
    // cleaner with a bool.
    terminated: bool,
}

impl Iterator for TriePathIter<'_> {
    type Item = TrieOpResult<QueryNode>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.terminated {
            return None;
        }

        let res = self.step();
        if res.is_err() {
            self.terminated = true;
        }

        Some(res)
    }
}

impl TriePathIter<'_> {
    fn step(&mut self) -> TrieOpResult<QueryNode> {
        let mut encoding = None;

        if let Node::Hash(h) = self.curr_node.as_ref() {
            let h = *h;
            let bytes = self
                .db
                .get(h.as_bytes())?
                .ok_or(TrieOpError::MissingNode(h))?;

            self.curr_node = decode_node(&bytes)?.into();
            encoding = Some(bytes);
        }

        let node = self.curr_node.clone();
        let segment = match node.as_ref() {
            Node::Empty => {
                self.terminated = true;
                PathSegment::Empty
            }
            // A stored node is never just a reference to another one.
            Node::Hash(h) => return Err(TrieOpError::MissingNode(*h)),
            Node::Branch { children, .. } => {
                if self.curr_key.is_empty() {
                    // Our query key has ended. The answer is the branch value.
                    self.terminated = true;
                    PathSegment::Branch(None)
                } else {
                    let nib = self.curr_key.pop_next_nibble_front();
                    self.curr_node = children[nib as usize].clone();

                    PathSegment::Branch(Some(nib))
                }
            }
            Node::Extension { nibbles, child } => {
                match self.curr_key.starts_with(nibbles) {
                    false => {
                        // Only a partial match. Stop.
                        self.terminated = true;
                    }
                    true => {
                        self.curr_key = self.curr_key.truncate_n_nibbles_front(nibbles.count());
                        self.curr_node = child.clone();
                    }
                }

                PathSegment::Extension(nibbles.clone())
            }
            Node::Leaf { nibbles, .. } => {
                self.terminated = true;
                PathSegment::Leaf(nibbles.clone())
            }
        };

        Ok(QueryNode { segment, encoding })
    }
}

/// Returns all nodes in the trie that are traversed given a query (key).
///
/// The key goes through the same transformation as in [`Trie::get`], so in
/// secure mode it is hashed first.
pub fn path_for_query<'a>(trie: &'a Trie, k: &[u8]) -> TriePathIter<'a> {
    TriePathIter {
        db: &trie.db,
        curr_node: trie.root_ref(),
        curr_key: trie.key_nibbles(k),
        terminated: false,
    }
}

/// Collects the path a query for `k` takes, mainly for logging and debugging.
pub fn get_path_for_query(trie: &Trie, k: &[u8]) -> TrieOpResult<TriePath> {
    path_for_query(trie, k)
        .map(|res| res.map(|node| node.segment))
        .collect::<TrieOpResult<Vec<_>>>()
        .map(TriePath)
}

#[cfg(test)]
mod test {
    use super::{get_path_for_query, path_for_query};
    use crate::{
        nibbles::Nibbles,
        testing_utils::{common_setup, new_test_trie},
        trie::TrieOpts,
        trie_ops::TrieOpResult,
        utils::PathSegment,
    };

    fn nibs(nibs: &[u8]) -> Nibbles {
        Nibbles::from_nibbles(nibs)
    }

    #[test]
    fn query_of_empty_trie_ends_at_empty() -> TrieOpResult<()> {
        common_setup();
        let trie = new_test_trie(TrieOpts::default());

        let path = get_path_for_query(&trie, b"key")?;
        assert_eq!(path.0, vec![PathSegment::Empty]);
        assert!(path_for_query(&trie, b"key").all(|n| n.unwrap().encoding.is_none()));

        Ok(())
    }

    #[test]
    fn query_follows_extension_branch_and_leaf() -> TrieOpResult<()> {
        common_setup();
        let mut trie = new_test_trie(TrieOpts::default());

        trie.put(&[0x12, 0x34], &[1; 40])?;
        trie.put(&[0x12, 0x56], &[2; 40])?;

        let path = get_path_for_query(&trie, &[0x12, 0x34])?;
        assert_eq!(
            path.0,
            vec![
                PathSegment::Extension(nibs(&[1, 2])),
                PathSegment::Branch(Some(3)),
                PathSegment::Leaf(nibs(&[4])),
            ]
        );
        assert_eq!(path.to_string(), "Extension(0x12) --> Branch(3) --> Leaf(0x4)");

        Ok(())
    }

    #[test]
    fn query_includes_the_node_the_key_diverges_at() -> TrieOpResult<()> {
        common_setup();
        let mut trie = new_test_trie(TrieOpts::default());

        trie.put(&[0x12, 0x34], &[1; 40])?;
        trie.put(&[0x12, 0x56], &[2; 40])?;

        // Diverges inside the extension.
        assert_eq!(
            get_path_for_query(&trie, &[0x13])?.0,
            vec![PathSegment::Extension(nibs(&[1, 2]))]
        );

        // Ends at the branch value slot.
        assert_eq!(
            get_path_for_query(&trie, &[0x12])?.0,
            vec![
                PathSegment::Extension(nibs(&[1, 2])),
                PathSegment::Branch(None)
            ]
        );

        // Diverges at the leaf.
        assert_eq!(
            get_path_for_query(&trie, &[0x12, 0x3f])?.0,
            vec![
                PathSegment::Extension(nibs(&[1, 2])),
                PathSegment::Branch(Some(3)),
                PathSegment::Leaf(nibs(&[4])),
            ]
        );

        Ok(())
    }

    #[test]
    fn only_stored_nodes_carry_encodings() -> TrieOpResult<()> {
        common_setup();
        let mut trie = new_test_trie(TrieOpts::default());

        // Small values keep both leaves inline in the branch.
        trie.put(&[0x12, 0x34], &[1])?;
        trie.put(&[0x12, 0x56], &[2])?;

        let nodes = path_for_query(&trie, &[0x12, 0x34]).collect::<TrieOpResult<Vec<_>>>()?;
        let stored: Vec<_> = nodes.iter().map(|n| n.encoding.is_some()).collect();

        // The root extension is stored (roots always are). The branch is
        // small enough to be inlined into it, and so is the leaf.
        assert_eq!(stored, vec![true, false, false]);

        Ok(())
    }
}
