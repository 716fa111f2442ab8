//! The byte oriented key-value store that trie nodes are persisted in.

use std::{collections::HashMap, error::Error, fmt::Debug};

use parking_lot::RwLock;

/// Opaque error raised by a [`Database`] implementation.
pub type DbError = Box<dyn Error + Send + Sync>;

/// Result type returned by [`Database`] operations.
pub type DbResult<T> = Result<T, DbError>;

/// The key the trie root is stored under when root persistence is enabled.
/// It is 8 bytes long so it can never collide with a 32 byte node digest.
pub const ROOT_DB_KEY: &[u8] = b"__root__";

/// A single write in a batch.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DbOp {
    /// Store `value` under `key`.
    Put {
        /// The key.
        key: Vec<u8>,
        /// The value.
        value: Vec<u8>,
    },
    /// Remove `key`.
    Del {
        /// The key.
        key: Vec<u8>,
    },
}

/// A persistent map from byte keys to byte values.
///
/// Only exact-match lookups are needed. Implementations are shared between
/// a trie and all of its copies, so they must handle concurrent access.
pub trait Database: Debug + Send + Sync {
    /// Returns the value stored under `key`, if any.
    fn get(&self, key: &[u8]) -> DbResult<Option<Vec<u8>>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> DbResult<()>;

    /// Removes `key`. Removing an absent key is not an error.
    fn delete(&self, key: &[u8]) -> DbResult<()>;

    /// Applies `ops` in order. Stores that can write atomically should
    /// override this.
    fn batch(&self, ops: Vec<DbOp>) -> DbResult<()> {
        for op in ops {
            match op {
                DbOp::Put { key, value } => self.put(key, value)?,
                DbOp::Del { key } => self.delete(&key)?,
            }
        }

        Ok(())
    }
}

/// A [`Database`] that lives in memory.
#[derive(Debug, Default)]
pub struct MemoryDb {
    db: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryDb {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in the store.
    pub fn len(&self) -> usize {
        self.db.read().len()
    }

    /// Returns `true` if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.db.read().is_empty()
    }
}

impl Database for MemoryDb {
    fn get(&self, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        Ok(self.db.read().get(key).cloned())
    }

    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> DbResult<()> {
        self.db.write().insert(key, value);
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> DbResult<()> {
        self.db.write().remove(key);
        Ok(())
    }

    fn batch(&self, ops: Vec<DbOp>) -> DbResult<()> {
        let mut db = self.db.write();

        for op in ops {
            match op {
                DbOp::Put { key, value } => db.insert(key, value),
                DbOp::Del { key } => db.remove(&key),
            };
        }

        Ok(())
    }
}
