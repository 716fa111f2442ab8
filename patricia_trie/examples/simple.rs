//! Simple example showing off the basics of the library.

use std::sync::Arc;

use patricia_trie::{
    nibbles::Nibbles, proof::verify_proof, trie_ops::TrieOpResult, BatchOp, MemoryDb, Trie,
    TrieOpts,
};

fn main() -> TrieOpResult<()> {
    // Construct an empty trie backed by an in-memory store:
    let db = Arc::new(MemoryDb::new());
    let mut trie = Trie::new(db.clone(), TrieOpts::default())?;
    assert_eq!(trie.root(), trie.empty_root());

    // Elements can be inserted into the trie by calling `put` directly:
    trie.put(b"hello", b"world!")?;

    // Or several at once with a batch:
    trie.batch(vec![
        BatchOp::Put {
            key: b"doge".to_vec(),
            value: b"coin".to_vec(),
        },
        BatchOp::Put {
            key: b"dog".to_vec(),
            value: b"puppy".to_vec(),
        },
    ])?;

    // Tries can be queried:
    assert_eq!(trie.get(b"dog")?, Some(b"puppy".to_vec()));
    assert_eq!(trie.get(b"cat")?, None);

    // The root commits to every entry. Any two tries with the same entries have
    // the same root:
    let root = trie.root();
    println!("root: {root:x}");

    // Entries are iterated in key order:
    let keys = trie
        .items()
        .map(|res| res.map(|(k, _)| k))
        .collect::<TrieOpResult<Vec<_>>>()?;
    println!("keys: {keys:?}");

    // Changes can be grouped under a checkpoint and then thrown away:
    trie.checkpoint();
    trie.put(b"dog", b"woof")?;
    trie.del(b"hello")?;
    trie.revert()?;
    assert_eq!(trie.root(), root);
    assert_eq!(trie.get(b"hello")?, Some(b"world!".to_vec()));

    // Values can be deleted:
    let del_val = trie.remove(b"doge")?;
    assert_eq!(del_val, Some(b"coin".to_vec()));
    assert_eq!(trie.get(b"doge")?, None);

    // Proofs let someone holding only the root check a value without access to
    // the store. They work for absent keys too:
    let proof = trie.create_proof(b"dog")?;
    assert_eq!(
        trie.verify_proof(trie.root(), b"dog", &proof)?,
        Some(b"puppy".to_vec())
    );

    let absent = trie.create_proof(b"doge")?;
    assert_eq!(trie.verify_proof(trie.root(), b"doge", &absent)?, None);

    // The free function takes the key as nibbles, so it can be used without a
    // trie at all:
    let hasher = trie.hasher().clone();
    let val = verify_proof(
        hasher.as_ref(),
        trie.root(),
        Nibbles::from_bytes_be(b"dog"),
        &proof,
    )?;
    assert_eq!(val, Some(b"puppy".to_vec()));

    // Old roots stay readable since nodes are never removed from the store:
    let old = Trie::new(db, TrieOpts::default().with_root(root))?;
    assert_eq!(old.get(b"doge")?, Some(b"coin".to_vec()));

    // In secure mode keys are hashed first, which keeps the trie balanced no
    // matter what the keys look like:
    let mut secure = Trie::new(
        Arc::new(MemoryDb::new()),
        TrieOpts::default().with_key_hashing(true),
    )?;
    secure.put(b"dog", b"puppy")?;
    assert_eq!(secure.get(b"dog")?, Some(b"puppy".to_vec()));
    assert_ne!(secure.root(), trie.root());

    Ok(())
}
