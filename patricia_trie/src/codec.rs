//! Canonical RLP encoding of trie nodes and the matching decoder.
//!
//! The layout is the one used by Ethereum tries:
//! - `Empty` is the empty RLP string (`0x80`).
//! - `Leaf` is `[hex_prefix(path, true), value]`.
//! - `Extension` is `[hex_prefix(path, false), child]`.
//! - `Branch` is `[child_0, ..., child_15, value]`.
//!
//! A child whose own encoding is shorter than 32 bytes is embedded as is.
//! Larger children are referenced by the digest of their encoding.

use std::cmp::Ordering;

use ethereum_types::H256;
use rlp::{DecoderError, Rlp, RlpStream};
use thiserror::Error;

use crate::{
    hasher::Hasher,
    nibbles::{FromHexPrefixError, Nibbles},
    node::{Node, WrappedNode},
};

/// Encodings shorter than this are embedded into their parent instead of
/// being referenced by digest.
pub const INLINE_THRESHOLD: usize = 32;

/// Length of a digest reference.
const DIGEST_LEN: usize = 32;

/// How a node appears inside its parent's encoding.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum EncodedNode {
    /// Node that is RLPed but not hashed.
    Raw(Vec<u8>),
    /// Node that is hashed.
    Hashed(H256),
}

/// Errors raised when bytes do not describe a well formed node.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum NodeDecodeError {
    /// The bytes are not valid RLP.
    #[error("Invalid RLP in node encoding: {0}")]
    Rlp(#[from] DecoderError),

    /// The RLP item is followed by extra bytes.
    #[error("Node encoding has {0} trailing bytes")]
    TrailingBytes(usize),

    /// Only the empty string, 2 item lists and 17 item lists are nodes.
    #[error("Node encoding is a list of {0} items (expected 2 or 17)")]
    InvalidItemCount(usize),

    /// A non-empty RLP string is not a node.
    #[error("Node encoding is a non-empty RLP string")]
    NotAList,

    /// The path of a leaf or extension is not valid hex prefix encoding.
    #[error(transparent)]
    HexPrefix(#[from] FromHexPrefixError),

    /// An extension must cover at least one nibble.
    #[error("Extension node with an empty path")]
    EmptyExtensionPath,

    /// An extension must point at something.
    #[error("Extension node with an empty child")]
    EmptyExtensionChild,

    /// A child reference string that is neither empty nor a digest.
    #[error("Child reference of {0} bytes is neither empty nor a 32 byte digest")]
    InvalidChildReference(usize),

    /// A child embedded inline must be shorter than the inlining threshold.
    #[error("Inline child node of {0} bytes should have been referenced by digest")]
    InlineNodeTooLarge(usize),
}

/// Encodes `node`, computing the references to its children with `hasher`.
///
/// A [`Node::Hash`] has no encoding of its own and is encoded the way a
/// parent references it: as its digest.
pub fn encode_node(node: &Node, hasher: &dyn Hasher) -> Vec<u8> {
    encode_node_with(node, &mut |child| encode_child(child, hasher))
}

/// The digest of the canonical encoding of `node`, regardless of its size.
/// This is how trie roots are computed.
pub fn hash_node(node: &Node, hasher: &dyn Hasher) -> H256 {
    match node {
        Node::Hash(h) => *h,
        _ => hasher.hash(&encode_node(node, hasher)),
    }
}

/// Encodes a child as it appears inside its parent.
pub(crate) fn encode_child(child: &Node, hasher: &dyn Hasher) -> EncodedNode {
    match child {
        Node::Hash(h) => EncodedNode::Hashed(*h),
        _ => hash_bytes_if_large_enough(encode_node(child, hasher), hasher),
    }
}

pub(crate) fn hash_bytes_if_large_enough(bytes: Vec<u8>, hasher: &dyn Hasher) -> EncodedNode {
    match bytes.len() >= INLINE_THRESHOLD {
        false => EncodedNode::Raw(bytes),
        true => EncodedNode::Hashed(hasher.hash(&bytes)),
    }
}

/// Encodes `node` using `child_f` to produce the reference for each child.
pub(crate) fn encode_node_with<F>(node: &Node, child_f: &mut F) -> Vec<u8>
where
    F: FnMut(&WrappedNode) -> EncodedNode,
{
    match node {
        Node::Empty => rlp::NULL_RLP.to_vec(),
        Node::Hash(h) => rlp::encode(h).to_vec(),
        Node::Branch { children, value } => {
            let mut stream = RlpStream::new_list(17);

            for c in children.iter() {
                append_to_stream(&mut stream, child_f(c));
            }

            match value.is_empty() {
                false => stream.append(value),
                true => stream.append_empty_data(),
            };

            stream.out().to_vec()
        }
        Node::Extension { nibbles, child } => {
            let mut stream = RlpStream::new_list(2);

            stream.append(&nibbles.to_hex_prefix_encoding(false));
            append_to_stream(&mut stream, child_f(child));

            stream.out().to_vec()
        }
        Node::Leaf { nibbles, value } => {
            let mut stream = RlpStream::new_list(2);

            stream.append(&nibbles.to_hex_prefix_encoding(true));
            stream.append(value);

            stream.out().to_vec()
        }
    }
}

fn append_to_stream(s: &mut RlpStream, node: EncodedNode) {
    match node {
        EncodedNode::Raw(b) => s.append_raw(&b, 1),
        EncodedNode::Hashed(h) => s.append(&h),
    };
}

/// Decodes a node from its canonical encoding.
///
/// Children referenced by digest come back as [`Node::Hash`]. Inline
/// children are decoded recursively.
pub fn decode_node(bytes: &[u8]) -> Result<Node, NodeDecodeError> {
    let rlp = Rlp::new(bytes);

    let info = rlp.payload_info()?;
    let item_len = info.header_len + info.value_len;

    match item_len.cmp(&bytes.len()) {
        Ordering::Less => Err(NodeDecodeError::TrailingBytes(bytes.len() - item_len)),
        Ordering::Greater => Err(DecoderError::RlpIsTooShort.into()),
        Ordering::Equal => decode_item(&rlp),
    }
}

fn decode_item(rlp: &Rlp) -> Result<Node, NodeDecodeError> {
    if rlp.is_data() {
        return match rlp.data()?.is_empty() {
            true => Ok(Node::Empty),
            false => Err(NodeDecodeError::NotAList),
        };
    }

    match rlp.item_count()? {
        2 => parse_short_node(rlp),
        17 => parse_branch_node(rlp),
        n => Err(NodeDecodeError::InvalidItemCount(n)),
    }
}

/// Parses a leaf or extension node, telling them apart by the hex prefix
/// flags.
fn parse_short_node(rlp: &Rlp) -> Result<Node, NodeDecodeError> {
    let (nibbles, is_leaf) = Nibbles::from_hex_prefix_encoding(rlp.at(0)?.data()?)?;

    match is_leaf {
        true => Ok(Node::Leaf {
            nibbles,
            value: rlp.at(1)?.data()?.to_vec(),
        }),
        false => {
            if nibbles.is_empty() {
                return Err(NodeDecodeError::EmptyExtensionPath);
            }

            let child = parse_child_node(&rlp.at(1)?)?;
            if child.is_empty() {
                return Err(NodeDecodeError::EmptyExtensionChild);
            }

            Ok(Node::Extension {
                nibbles,
                child: child.into(),
            })
        }
    }
}

fn parse_branch_node(rlp: &Rlp) -> Result<Node, NodeDecodeError> {
    let mut children: [WrappedNode; 16] = crate::node::new_branch_child_arr();
    for (i, child) in children.iter_mut().enumerate() {
        *child = parse_child_node(&rlp.at(i)?)?.into();
    }

    Ok(Node::Branch {
        children,
        value: rlp.at(16)?.data()?.to_vec(),
    })
}

fn parse_child_node(rlp: &Rlp) -> Result<Node, NodeDecodeError> {
    if rlp.is_list() {
        let raw = rlp.as_raw();
        if raw.len() >= INLINE_THRESHOLD {
            return Err(NodeDecodeError::InlineNodeTooLarge(raw.len()));
        }

        return decode_item(rlp);
    }

    let data = rlp.data()?;
    match data.len() {
        0 => Ok(Node::Empty),
        DIGEST_LEN => Ok(Node::Hash(H256::from_slice(data))),
        n => Err(NodeDecodeError::InvalidChildReference(n)),
    }
}
