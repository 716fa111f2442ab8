//! Digest functions used for content addressing trie nodes and for hashing
//! keys in secure mode.

use std::{
    fmt::{self, Debug},
    sync::Arc,
};

use ethereum_types::H256;
use keccak_hash::keccak;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256 as Sha256Core};

/// A cryptographic digest function producing fixed size (32 byte) digests.
///
/// The same `Hasher` must be used for the whole lifetime of a trie (and by
/// anyone verifying proofs against its roots), since every node reference is
/// a digest computed with it.
pub trait Hasher: Debug + Send + Sync {
    /// Hashes `data`.
    fn hash(&self, data: &[u8]) -> H256;
}

/// Keccak-256, the digest Ethereum tries use.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Keccak256;

impl Hasher for Keccak256 {
    fn hash(&self, data: &[u8]) -> H256 {
        keccak(data)
    }
}

/// SHA-256.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Sha256;

impl Hasher for Sha256 {
    fn hash(&self, data: &[u8]) -> H256 {
        H256::from_slice(&Sha256Core::digest(data))
    }
}

/// A [`Hasher`] backed by an arbitrary function. Mostly useful for supplying a
/// custom key hashing function for secure tries.
#[derive(Clone)]
pub struct FnHasher(Arc<dyn Fn(&[u8]) -> H256 + Send + Sync>);

impl FnHasher {
    /// Wraps `f` as a [`Hasher`].
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[u8]) -> H256 + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }
}

impl Debug for FnHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnHasher")
    }
}

impl Hasher for FnHasher {
    fn hash(&self, data: &[u8]) -> H256 {
        (self.0)(data)
    }
}

/// The built in digest algorithms a trie can be constructed with.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum DigestAlgorithm {
    /// [`Keccak256`].
    #[default]
    Keccak256,
    /// [`Sha256`].
    Sha256,
}

impl DigestAlgorithm {
    /// Creates the [`Hasher`] for this algorithm.
    pub fn hasher(self) -> Arc<dyn Hasher> {
        match self {
            DigestAlgorithm::Keccak256 => Arc::new(Keccak256),
            DigestAlgorithm::Sha256 => Arc::new(Sha256),
        }
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::{DigestAlgorithm, FnHasher, Hasher, Keccak256, Sha256};

    #[test]
    fn keccak_of_empty_rlp_is_the_empty_trie_root() {
        assert_eq!(
            Keccak256.hash(&rlp::NULL_RLP).0,
            hex!("56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421")
        );
    }

    #[test]
    fn sha256_matches_known_digest() {
        assert_eq!(
            Sha256.hash(b"").0,
            hex!("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
        );
    }

    #[test]
    fn algorithms_produce_distinct_hashers() {
        let data = b"some data";

        assert_eq!(
            DigestAlgorithm::Keccak256.hasher().hash(data),
            Keccak256.hash(data)
        );
        assert_eq!(DigestAlgorithm::Sha256.hasher().hash(data), Sha256.hash(data));
        assert_ne!(Keccak256.hash(data), Sha256.hash(data));
    }

    #[test]
    fn digest_algorithm_can_be_loaded_from_config() {
        let algo: DigestAlgorithm = serde_json::from_str("\"Sha256\"").unwrap();
        assert_eq!(algo, DigestAlgorithm::Sha256);
        assert_eq!(
            serde_json::to_string(&DigestAlgorithm::default()).unwrap(),
            "\"Keccak256\""
        );
    }

    #[test]
    fn fn_hasher_calls_the_wrapped_function() {
        let h = FnHasher::new(|data| Sha256.hash(data));
        assert_eq!(h.hash(b"abc"), Sha256.hash(b"abc"));
    }
}
