//! An authenticated key-value store built on a Merkle Patricia Trie.
//!
//! All the contents of a [`Trie`][trie::Trie] are committed to by a single
//! 32 byte root digest. Nodes are content addressed: each one is stored in a
//! [`Database`][db::Database] under the digest of its canonical RLP
//! encoding, so any two tries with the same entries have the same root, and
//! old roots stay readable after later changes.
//!
//! On top of plain get/put/delete the trie supports:
//! - Nested checkpoints that can be committed or reverted as a whole (see
//!   [`Trie::checkpoint`][trie::Trie::checkpoint]).
//! - A "secure" mode where keys are hashed before use.
//! - [Merkle proofs][proof] of inclusion and exclusion that can be checked
//!   against a root without access to the store.
//!
//! With Keccak-256 (the default digest) roots and proofs are identical to
//! those of Ethereum's state tries.

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_debug_implementations)]
#![deny(missing_docs)]

pub mod checkpoint;
pub mod codec;
pub mod db;
pub mod hasher;
pub mod nibbles;
pub mod node;
pub mod proof;
pub mod special_query;
pub mod trie;
mod trie_hashing;
pub mod trie_ops;
pub mod utils;

#[cfg(feature = "trie_debug")]
pub mod debug_tools;

#[cfg(test)]
pub(crate) mod testing_utils;

pub use db::{Database, MemoryDb, ROOT_DB_KEY};
pub use hasher::{DigestAlgorithm, Hasher};
pub use proof::Proof;
pub use trie::{BatchOp, Trie, TrieOpts};
pub use trie_ops::{TrieOpError, TrieOpResult};
