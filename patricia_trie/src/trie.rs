//! The [`Trie`] handle, which ties the trie logic to a backing store.

use std::sync::Arc;

use ethereum_types::H256;
use log::{debug, trace};

use crate::{
    checkpoint::CheckpointDb,
    db::{Database, ROOT_DB_KEY},
    hasher::{DigestAlgorithm, Hasher},
    nibbles::Nibbles,
    node::{Node, WrappedNode},
    trie_hashing::persist_trie,
    trie_ops::{
        load_node, trie_delete, trie_get, trie_insert, TrieIter, TrieOpError, TrieOpResult,
    },
};

const DIGEST_LEN: usize = 32;

/// Options a [`Trie`] is created with.
#[derive(Clone, Debug, Default)]
pub struct TrieOpts {
    /// Hash every key before it is used as a path ("secure" trie). Keys are
    /// then spread evenly over the trie and all paths have the same length.
    pub use_key_hashing: bool,

    /// The function keys are hashed with when `use_key_hashing` is set.
    /// Defaults to the node digest function.
    pub key_hashing_function: Option<Arc<dyn Hasher>>,

    /// Store the current root under [`ROOT_DB_KEY`] after every change, and
    /// load it from there when the trie is created.
    pub use_root_persistence: bool,

    /// The digest function nodes are content addressed with.
    pub digest_algorithm: DigestAlgorithm,

    /// Capacity of the LRU cache in front of the store. `0` disables it.
    pub cache_size: usize,

    /// The root to open the trie at. Its node must already be in the store.
    pub root: Option<H256>,
}

impl TrieOpts {
    /// Sets [`TrieOpts::use_key_hashing`].
    pub fn with_key_hashing(mut self, use_key_hashing: bool) -> Self {
        self.use_key_hashing = use_key_hashing;
        self
    }

    /// Sets [`TrieOpts::key_hashing_function`].
    pub fn with_key_hashing_function<H: Hasher + 'static>(mut self, hasher: H) -> Self {
        self.key_hashing_function = Some(Arc::new(hasher));
        self
    }

    /// Sets [`TrieOpts::use_root_persistence`].
    pub fn with_root_persistence(mut self, use_root_persistence: bool) -> Self {
        self.use_root_persistence = use_root_persistence;
        self
    }

    /// Sets [`TrieOpts::digest_algorithm`].
    pub fn with_digest_algorithm(mut self, digest_algorithm: DigestAlgorithm) -> Self {
        self.digest_algorithm = digest_algorithm;
        self
    }

    /// Sets [`TrieOpts::cache_size`].
    pub fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = cache_size;
        self
    }

    /// Sets [`TrieOpts::root`].
    pub fn with_root(mut self, root: H256) -> Self {
        self.root = Some(root);
        self
    }
}

/// A single operation of a [`Trie::batch`].
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum BatchOp {
    /// Insert or replace a value.
    Put {
        /// The key.
        key: Vec<u8>,
        /// The value. An empty value deletes the key.
        value: Vec<u8>,
    },
    /// Remove a key.
    Del {
        /// The key.
        key: Vec<u8>,
    },
}

/// A Merkle Patricia Trie on top of a [`Database`].
///
/// Only the root digest lives in the handle. Nodes are loaded from the store
/// as operations need them, and every mutation writes the nodes it creates
/// back through the checkpoint layer.
#[derive(Debug)]
pub struct Trie {
    pub(crate) db: CheckpointDb,
    pub(crate) hasher: Arc<dyn Hasher>,
    /// `Some` iff keys are hashed before use.
    pub(crate) key_hasher: Option<Arc<dyn Hasher>>,
    pub(crate) opts: TrieOpts,
    pub(crate) empty_root: H256,
    pub(crate) root: H256,
}

impl Trie {
    /// Creates a trie on `db`.
    ///
    /// The trie starts out at `opts.root` if given. Otherwise, with root
    /// persistence enabled, it starts at the root stored under
    /// [`ROOT_DB_KEY`], and at the empty root if there is none.
    pub fn new(db: Arc<dyn Database>, opts: TrieOpts) -> TrieOpResult<Self> {
        let hasher = opts.digest_algorithm.hasher();
        let empty_root = hasher.hash(&rlp::NULL_RLP);
        let key_hasher = opts.use_key_hashing.then(|| {
            opts.key_hashing_function
                .clone()
                .unwrap_or_else(|| hasher.clone())
        });

        let mut trie = Self {
            db: CheckpointDb::new(db, opts.cache_size),
            hasher,
            key_hasher,
            opts,
            empty_root,
            root: empty_root,
        };

        match trie.opts.root {
            Some(root) => trie.set_root(root)?,
            None if trie.opts.use_root_persistence => {
                if let Some(root) = trie.load_persisted_root()? {
                    trie.root = root;
                }
            }
            None => (),
        }

        debug!("Opened trie at root {:x}", trie.root);
        Ok(trie)
    }

    /// The current root digest.
    pub const fn root(&self) -> H256 {
        self.root
    }

    /// The root digest of a trie without entries.
    pub const fn empty_root(&self) -> H256 {
        self.empty_root
    }

    /// The options the trie was created with.
    pub const fn opts(&self) -> &TrieOpts {
        &self.opts
    }

    /// The store behind the trie.
    pub fn database(&self) -> &Arc<dyn Database> {
        self.db.database()
    }

    /// The digest function nodes are addressed with.
    pub fn hasher(&self) -> &Arc<dyn Hasher> {
        &self.hasher
    }

    /// Moves the trie to another root.
    ///
    /// Fails with [`TrieOpError::MissingRoot`] if the store has no node for
    /// `root`.
    pub fn set_root(&mut self, root: H256) -> TrieOpResult<()> {
        if !self.check_root(root)? {
            return Err(TrieOpError::MissingRoot(root));
        }

        debug!("Setting root from {:x} to {:x}", self.root, root);
        self.root = root;
        self.persist_root()
    }

    /// Returns `true` if the node for `root` is in the store.
    pub fn check_root(&self, root: H256) -> TrieOpResult<bool> {
        if root == self.empty_root {
            return Ok(true);
        }

        Ok(self.db.get(root.as_bytes())?.is_some())
    }

    /// The root node, loaded from the store.
    pub fn root_node(&self) -> TrieOpResult<WrappedNode> {
        if self.root == self.empty_root {
            return Ok(Node::Empty.into());
        }

        load_node(&self.db, self.root).map_err(|err| match err {
            TrieOpError::MissingNode(h) => TrieOpError::MissingRoot(h),
            err => err,
        })
    }

    /// The key a raw key is stored under: its hash in secure mode, the key
    /// itself otherwise.
    pub fn applied_key(&self, key: &[u8]) -> Vec<u8> {
        match &self.key_hasher {
            Some(key_hasher) => key_hasher.hash(key).as_bytes().to_vec(),
            None => key.to_vec(),
        }
    }

    pub(crate) fn key_nibbles(&self, key: &[u8]) -> Nibbles {
        match &self.key_hasher {
            Some(key_hasher) => Nibbles::from_bytes_be(key_hasher.hash(key).as_bytes()),
            None => Nibbles::from_bytes_be(key),
        }
    }

    /// The root as an (unloaded) node that the trie logic can start from.
    pub(crate) fn root_ref(&self) -> WrappedNode {
        match self.root == self.empty_root {
            false => Node::Hash(self.root).into(),
            true => Node::Empty.into(),
        }
    }

    /// Gets the value stored under `key`, if any.
    pub fn get(&self, key: &[u8]) -> TrieOpResult<Option<Vec<u8>>> {
        trie_get(&self.db, &self.root_ref(), self.key_nibbles(key))
    }

    /// Stores `value` under `key`. An empty `value` removes `key`.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> TrieOpResult<()> {
        self.check_key_is_allowed(key)?;

        if value.is_empty() {
            return self.del(key);
        }

        let updated_root = trie_insert(
            &self.db,
            &self.root_ref(),
            self.key_nibbles(key),
            value.to_vec(),
        )?;

        self.persist_updated_root(updated_root)
    }

    /// Removes `key` from the trie. Removing an absent key is a no-op.
    pub fn del(&mut self, key: &[u8]) -> TrieOpResult<()> {
        self.remove(key).map(|_| ())
    }

    /// Removes `key` from the trie and returns the value it had.
    pub fn remove(&mut self, key: &[u8]) -> TrieOpResult<Option<Vec<u8>>> {
        self.check_key_is_allowed(key)?;

        match trie_delete(&self.db, &self.root_ref(), self.key_nibbles(key))? {
            Some((updated_root, deleted_val)) => {
                self.persist_updated_root(updated_root)?;
                Ok(Some(deleted_val))
            }
            None => Ok(None),
        }
    }

    /// Stores `value` under `key`, or removes `key` if `value` is `None`.
    pub fn update(&mut self, key: &[u8], value: Option<&[u8]>) -> TrieOpResult<()> {
        match value {
            Some(value) => self.put(key, value),
            None => self.del(key),
        }
    }

    /// Applies `ops` in order. Stops at the first failing operation; the ones
    /// before it stay applied.
    pub fn batch<I>(&mut self, ops: I) -> TrieOpResult<()>
    where
        I: IntoIterator<Item = BatchOp>,
    {
        for op in ops {
            match op {
                BatchOp::Put { key, value } => self.put(&key, &value)?,
                BatchOp::Del { key } => self.del(&key)?,
            }
        }

        Ok(())
    }

    /// Returns an iterator over every key-value pair in the trie, in
    /// lexicographic key order. In secure mode the keys are the hashed keys.
    pub fn items(&self) -> TrieIter<'_> {
        TrieIter::new(&self.db, self.root_ref())
    }

    /// Starts a new checkpoint. Changes from here on can be committed or
    /// reverted as a whole.
    pub fn checkpoint(&mut self) {
        self.db.checkpoint(self.root);
    }

    /// Keeps the changes since the last checkpoint.
    ///
    /// Once the outermost checkpoint is committed, its changes are written to
    /// the store.
    pub fn commit(&mut self) -> TrieOpResult<()> {
        self.db.commit()?;
        self.persist_root()
    }

    /// Drops the changes since the last checkpoint and restores the root the
    /// trie had when it was taken.
    pub fn revert(&mut self) -> TrieOpResult<()> {
        self.root = self.db.revert()?;
        self.persist_root()
    }

    /// Returns `true` if there is at least one active checkpoint.
    pub fn has_checkpoints(&self) -> bool {
        self.db.has_checkpoints()
    }

    /// Drops every checkpoint without writing anything to the store.
    ///
    /// The root is left as is, so this should be followed by a
    /// [`Trie::set_root`] to a root that is in the store.
    pub fn flush_checkpoints(&mut self) {
        self.db.flush_checkpoints();
    }

    /// Creates a handle to the same trie. The copy shares the store and gets
    /// its own view of the pending checkpoints, so neither handle sees the
    /// other's later changes until they are committed.
    pub fn copy(&self) -> Self {
        self.copy_intern(true)
    }

    /// Like [`Trie::copy`], but the copy starts without checkpoints. It only
    /// sees what is already in the store.
    pub fn copy_without_checkpoints(&self) -> Self {
        self.copy_intern(false)
    }

    fn copy_intern(&self, include_checkpoints: bool) -> Self {
        Self {
            db: self.db.copy(include_checkpoints),
            hasher: self.hasher.clone(),
            key_hasher: self.key_hasher.clone(),
            opts: self.opts.clone(),
            empty_root: self.empty_root,
            root: self.root,
        }
    }

    /// Writes the current root under [`ROOT_DB_KEY`] if root persistence is
    /// enabled.
    pub fn persist_root(&mut self) -> TrieOpResult<()> {
        if self.opts.use_root_persistence {
            self.db
                .put(ROOT_DB_KEY.to_vec(), self.root.as_bytes().to_vec())?;
        }

        Ok(())
    }

    fn load_persisted_root(&self) -> TrieOpResult<Option<H256>> {
        match self.db.get(ROOT_DB_KEY)? {
            Some(bytes) if bytes.len() == DIGEST_LEN => Ok(Some(H256::from_slice(&bytes))),
            Some(bytes) => Err(TrieOpError::Backend(
                format!(
                    "Persisted root is {} bytes long (expected {})",
                    bytes.len(),
                    DIGEST_LEN
                )
                .into(),
            )),
            None => Ok(None),
        }
    }

    fn check_key_is_allowed(&self, key: &[u8]) -> TrieOpResult<()> {
        match self.opts.use_root_persistence && key == ROOT_DB_KEY {
            false => Ok(()),
            true => Err(TrieOpError::InvalidKey),
        }
    }

    /// Encodes and stores the nodes created by a mutation and moves the trie
    /// to the new root.
    pub(crate) fn persist_updated_root(&mut self, updated_root: WrappedNode) -> TrieOpResult<()> {
        let mut ops = Vec::new();
        let root = persist_trie(&updated_root, self.hasher.as_ref(), &mut ops);
        trace!("Writing {} nodes for new root {:x}", ops.len(), root);

        self.db.batch(ops)?;
        self.root = root;

        self.persist_root()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ethereum_types::H256;

    use super::{BatchOp, Trie, TrieOpts};
    use crate::{
        db::{Database, MemoryDb, ROOT_DB_KEY},
        hasher::{FnHasher, Hasher, Keccak256, Sha256},
        nibbles::Nibbles,
        testing_utils::{
            common_setup, generate_n_random_variable_entries, new_test_trie, FailingBatchDb,
        },
        trie_ops::{TrieOpError, TrieOpResult},
    };

    #[test]
    fn put_with_empty_value_deletes() -> TrieOpResult<()> {
        common_setup();
        let mut trie = new_test_trie(TrieOpts::default());

        trie.put(b"key", b"value")?;
        trie.put(b"key", b"")?;

        assert_eq!(trie.get(b"key")?, None);
        assert_eq!(trie.root(), trie.empty_root());

        Ok(())
    }

    #[test]
    fn update_and_batch() -> TrieOpResult<()> {
        common_setup();
        let mut trie = new_test_trie(TrieOpts::default());

        trie.update(b"a", Some(b"1".as_slice()))?;
        trie.update(b"b", Some(b"2".as_slice()))?;
        trie.update(b"a", None)?;
        assert_eq!(trie.get(b"a")?, None);
        assert_eq!(trie.get(b"b")?, Some(b"2".to_vec()));

        trie.batch([
            BatchOp::Put {
                key: b"c".to_vec(),
                value: b"3".to_vec(),
            },
            BatchOp::Del { key: b"b".to_vec() },
        ])?;
        assert_eq!(trie.get(b"b")?, None);
        assert_eq!(trie.get(b"c")?, Some(b"3".to_vec()));

        Ok(())
    }

    #[test]
    fn reserved_key_is_only_rejected_with_root_persistence() -> TrieOpResult<()> {
        common_setup();

        let mut persisting = new_test_trie(TrieOpts::default().with_root_persistence(true));
        let err = persisting.put(ROOT_DB_KEY, b"bar").unwrap_err();
        assert!(matches!(err, TrieOpError::InvalidKey));
        assert_eq!(
            err.to_string(),
            "Attempted to set '__root__' key but it is not allowed."
        );
        assert!(matches!(
            persisting.del(ROOT_DB_KEY),
            Err(TrieOpError::InvalidKey)
        ));

        let mut plain = new_test_trie(TrieOpts::default());
        plain.put(ROOT_DB_KEY, b"bar")?;
        assert_eq!(plain.get(ROOT_DB_KEY)?, Some(b"bar".to_vec()));

        Ok(())
    }

    #[test]
    fn persisted_root_is_loaded_on_open() -> TrieOpResult<()> {
        common_setup();
        let db = Arc::new(MemoryDb::new());
        let opts = TrieOpts::default().with_root_persistence(true);

        let mut trie = Trie::new(db.clone(), opts.clone())?;
        trie.put(b"key", b"value")?;
        assert_eq!(db.get(ROOT_DB_KEY)?, Some(trie.root().as_bytes().to_vec()));

        let reopened = Trie::new(db.clone(), opts)?;
        assert_eq!(reopened.root(), trie.root());
        assert_eq!(reopened.get(b"key")?, Some(b"value".to_vec()));

        // Without persistence the stored root is ignored.
        let plain = Trie::new(db, TrieOpts::default())?;
        assert_eq!(plain.root(), plain.empty_root());

        Ok(())
    }

    #[test]
    fn set_root_requires_the_root_node() -> TrieOpResult<()> {
        common_setup();
        let mut trie = new_test_trie(TrieOpts::default());

        trie.put(b"key", b"value")?;
        let root = trie.root();
        trie.put(b"key", b"other value")?;

        // Old roots stay reachable.
        assert!(trie.check_root(root)?);
        trie.set_root(root)?;
        assert_eq!(trie.get(b"key")?, Some(b"value".to_vec()));

        let missing = H256::repeat_byte(0x42);
        assert!(!trie.check_root(missing)?);
        assert!(matches!(
            trie.set_root(missing),
            Err(TrieOpError::MissingRoot(h)) if h == missing
        ));

        let empty_root = trie.empty_root();
        trie.set_root(empty_root)?;
        assert_eq!(trie.get(b"key")?, None);

        Ok(())
    }

    #[test]
    fn opening_at_a_root() -> TrieOpResult<()> {
        common_setup();
        let db = Arc::new(MemoryDb::new());

        let mut trie = Trie::new(db.clone(), TrieOpts::default())?;
        trie.put(b"key", b"value")?;

        let opened = Trie::new(db.clone(), TrieOpts::default().with_root(trie.root()))?;
        assert_eq!(opened.get(b"key")?, Some(b"value".to_vec()));

        assert!(matches!(
            Trie::new(db, TrieOpts::default().with_root(H256::repeat_byte(1))),
            Err(TrieOpError::MissingRoot(_))
        ));

        Ok(())
    }

    #[test]
    fn missing_nodes_are_reported() -> TrieOpResult<()> {
        common_setup();
        let db = Arc::new(MemoryDb::new());
        let mut trie = Trie::new(db.clone(), TrieOpts::default())?;

        for (k, v) in generate_n_random_variable_entries(50, 2) {
            trie.put(&k, &v)?;
        }

        db.delete(trie.root().as_bytes())?;

        assert!(matches!(trie.get(b"x"), Err(TrieOpError::MissingNode(_))));
        assert!(matches!(trie.root_node(), Err(TrieOpError::MissingRoot(_))));
        assert!(matches!(
            trie.items().next(),
            Some(Err(TrieOpError::MissingNode(_)))
        ));

        Ok(())
    }

    #[test]
    fn secure_and_plain_roots_differ() -> TrieOpResult<()> {
        common_setup();
        let mut plain = new_test_trie(TrieOpts::default());
        let mut secure = new_test_trie(TrieOpts::default().with_key_hashing(true));

        plain.put(b"foo", b"bar")?;
        secure.put(b"foo", b"bar")?;

        assert_ne!(plain.root(), secure.root());
        assert_eq!(secure.get(b"foo")?, Some(b"bar".to_vec()));

        // The entry is stored under the hashed key.
        let (key, _) = secure.items().next().unwrap()?;
        assert_eq!(key, Nibbles::from_bytes_be(Keccak256.hash(b"foo").as_bytes()));
        assert_eq!(secure.applied_key(b"foo"), Keccak256.hash(b"foo").as_bytes());

        Ok(())
    }

    #[test]
    fn custom_key_hashing_function_is_used() -> TrieOpResult<()> {
        common_setup();
        let mut trie = new_test_trie(
            TrieOpts::default()
                .with_key_hashing(true)
                .with_key_hashing_function(FnHasher::new(|data| Sha256.hash(data))),
        );

        trie.put(b"key1", b"value1")?;
        assert_eq!(trie.applied_key(b"key1"), Sha256.hash(b"key1").as_bytes());

        // The same trie built by hand from the hashed key.
        let mut plain = new_test_trie(TrieOpts::default());
        plain.put(Sha256.hash(b"key1").as_bytes(), b"value1")?;
        assert_eq!(trie.root(), plain.root());

        Ok(())
    }

    #[test]
    fn checkpoint_then_revert_restores_the_trie() -> TrieOpResult<()> {
        common_setup();
        let mut trie = new_test_trie(TrieOpts::default());
        trie.put(b"a", b"1")?;
        let root = trie.root();

        trie.checkpoint();
        trie.put(b"b", b"2")?;
        trie.del(b"a")?;
        trie.revert()?;

        assert!(!trie.has_checkpoints());
        assert_eq!(trie.root(), root);
        assert_eq!(trie.get(b"a")?, Some(b"1".to_vec()));
        assert_eq!(trie.get(b"b")?, None);

        Ok(())
    }

    #[test]
    fn checkpoint_then_commit_equals_plain_put() -> TrieOpResult<()> {
        common_setup();
        let db = Arc::new(MemoryDb::new());
        let mut trie = Trie::new(db.clone(), TrieOpts::default())?;
        let mut plain = new_test_trie(TrieOpts::default());

        trie.checkpoint();
        trie.put(b"a", b"1")?;
        assert!(db.is_empty());
        trie.commit()?;
        assert!(!db.is_empty());

        plain.put(b"a", b"1")?;
        assert_eq!(trie.root(), plain.root());

        // The committed nodes are in the store.
        let reopened = Trie::new(db, TrieOpts::default().with_root(trie.root()))?;
        assert_eq!(reopened.get(b"a")?, Some(b"1".to_vec()));

        Ok(())
    }

    #[test]
    fn nested_checkpoints() -> TrieOpResult<()> {
        common_setup();
        let mut trie = new_test_trie(TrieOpts::default());
        trie.put(b"base", b"0")?;
        let original = trie.root();

        trie.checkpoint();
        trie.put(b"a", b"1")?;
        let after_first = trie.root();
        trie.checkpoint();
        trie.put(b"b", b"2")?;

        trie.revert()?;
        assert_eq!(trie.root(), after_first);
        trie.revert()?;
        assert_eq!(trie.root(), original);

        trie.checkpoint();
        trie.put(b"a", b"1")?;
        trie.checkpoint();
        trie.put(b"b", b"2")?;
        let both = trie.root();
        trie.commit()?;
        trie.commit()?;

        assert_eq!(trie.root(), both);
        assert_eq!(trie.get(b"a")?, Some(b"1".to_vec()));
        assert_eq!(trie.get(b"b")?, Some(b"2".to_vec()));

        // Committing both is the same as never having checkpointed.
        let mut plain = new_test_trie(TrieOpts::default());
        plain.put(b"base", b"0")?;
        plain.put(b"a", b"1")?;
        plain.put(b"b", b"2")?;
        assert_eq!(trie.root(), plain.root());

        // And every node made it to the store.
        let reopened = Trie::new(
            trie.database().clone(),
            TrieOpts::default().with_root(trie.root()),
        )?;
        assert_eq!(reopened.get(b"b")?, Some(b"2".to_vec()));

        assert!(matches!(trie.commit(), Err(TrieOpError::NoCheckpoint)));
        assert!(matches!(trie.revert(), Err(TrieOpError::NoCheckpoint)));

        Ok(())
    }

    #[test]
    fn failed_commit_can_be_retried() -> TrieOpResult<()> {
        common_setup();
        let db = Arc::new(FailingBatchDb::default());
        let mut trie = Trie::new(db.clone(), TrieOpts::default().with_cache_size(16))?;

        trie.checkpoint();
        trie.put(b"key", b"value")?;
        let root = trie.root();

        db.fail_next_batch();
        assert!(matches!(trie.commit(), Err(TrieOpError::Backend(_))));
        assert!(trie.has_checkpoints());
        assert_eq!(trie.root(), root);
        assert!(matches!(
            Trie::new(db.clone(), TrieOpts::default().with_root(root)),
            Err(TrieOpError::MissingRoot(_))
        ));

        trie.commit()?;
        assert!(!trie.has_checkpoints());

        let reopened = Trie::new(db, TrieOpts::default().with_root(root))?;
        assert_eq!(reopened.get(b"key")?, Some(b"value".to_vec()));

        Ok(())
    }

    #[test]
    fn revert_restores_persisted_root() -> TrieOpResult<()> {
        common_setup();
        let db = Arc::new(MemoryDb::new());
        let mut trie = Trie::new(db.clone(), TrieOpts::default().with_root_persistence(true))?;
        trie.put(b"a", b"1")?;
        let root = trie.root();

        trie.checkpoint();
        trie.put(b"b", b"2")?;
        trie.revert()?;

        assert_eq!(db.get(ROOT_DB_KEY)?, Some(root.as_bytes().to_vec()));

        Ok(())
    }

    #[test]
    fn copies_are_independent() -> TrieOpResult<()> {
        common_setup();
        let mut trie = new_test_trie(TrieOpts::default());
        trie.put(b"key1", b"value1")?;
        trie.checkpoint();
        trie.put(b"key2", b"value2")?;

        let mut copy = trie.copy();
        assert!(copy.has_checkpoints());
        assert_eq!(copy.get(b"key1")?, Some(b"value1".to_vec()));
        assert_eq!(copy.get(b"key2")?, Some(b"value2".to_vec()));

        copy.put(b"key3", b"value3")?;
        assert_eq!(trie.get(b"key3")?, None);
        assert_ne!(trie.root(), copy.root());

        // Without the checkpoints the copy cannot load the uncommitted nodes.
        let bare = trie.copy_without_checkpoints();
        assert!(!bare.has_checkpoints());
        assert!(matches!(bare.get(b"key2"), Err(TrieOpError::MissingNode(_))));

        Ok(())
    }

    #[test]
    fn flush_checkpoints_discards_pending_changes() -> TrieOpResult<()> {
        common_setup();
        let db = Arc::new(MemoryDb::new());
        let mut trie = Trie::new(db.clone(), TrieOpts::default())?;
        trie.put(b"a", b"1")?;
        let root = trie.root();
        let stored = db.len();

        trie.checkpoint();
        trie.put(b"b", b"2")?;
        trie.flush_checkpoints();
        trie.set_root(root)?;

        assert!(!trie.has_checkpoints());
        assert_eq!(db.len(), stored);
        assert_eq!(trie.get(b"b")?, None);

        Ok(())
    }

    #[test]
    fn cache_does_not_change_results() -> TrieOpResult<()> {
        common_setup();
        let mut cached = new_test_trie(TrieOpts::default().with_cache_size(16));
        let mut plain = new_test_trie(TrieOpts::default());

        for (k, v) in generate_n_random_variable_entries(300, 4) {
            cached.put(&k, &v)?;
            plain.put(&k, &v)?;
            assert_eq!(cached.get(&k)?, Some(v));
        }

        assert_eq!(cached.root(), plain.root());

        Ok(())
    }
}
