use ethereum_types::H256;

use crate::{
    codec::{encode_node_with, EncodedNode, INLINE_THRESHOLD},
    db::DbOp,
    hasher::Hasher,
    node::{Node, WrappedNode},
};

/// Calculates the root digest of the trie under `root` and queues a store
/// write for every node that ends up referenced by digest.
///
/// Sub-tries that are still [`Node::Hash`] references are already stored and
/// are neither re-encoded nor written again. The root node is always written
/// (unless the trie is empty), even if its encoding is short enough to be
/// inlined, since nothing else holds it.
pub(crate) fn persist_trie(root: &WrappedNode, hasher: &dyn Hasher, ops: &mut Vec<DbOp>) -> H256 {
    match root.as_ref() {
        Node::Empty => hasher.hash(&rlp::NULL_RLP),
        Node::Hash(h) => *h,
        _ => {
            let bytes = encode_node_with(root, &mut |c| rlp_encode_and_hash_node(c, hasher, ops));
            let hash = hasher.hash(&bytes);
            ops.push(store_op(hash, bytes));

            hash
        }
    }
}

fn rlp_encode_and_hash_node(
    node: &WrappedNode,
    hasher: &dyn Hasher,
    ops: &mut Vec<DbOp>,
) -> EncodedNode {
    if let Node::Hash(h) = node.as_ref() {
        return EncodedNode::Hashed(*h);
    }

    let bytes = encode_node_with(node, &mut |c| rlp_encode_and_hash_node(c, hasher, ops));
    match bytes.len() >= INLINE_THRESHOLD {
        false => EncodedNode::Raw(bytes),
        true => {
            let hash = hasher.hash(&bytes);
            ops.push(store_op(hash, bytes));

            EncodedNode::Hashed(hash)
        }
    }
}

fn store_op(hash: H256, bytes: Vec<u8>) -> DbOp {
    DbOp::Put {
        key: hash.as_bytes().to_vec(),
        value: bytes,
    }
}
