//! Nested transactions over a [`Database`].
//!
//! A [`CheckpointDb`] keeps a stack of overlay frames on top of the backend.
//! While at least one frame is active every write lands in the top frame and
//! nothing reaches the backend until the outermost frame is committed. Reads
//! look through the frames from the top down before falling through to the
//! backend.

use std::{
    collections::HashMap,
    fmt::{self, Debug},
    num::NonZeroUsize,
    sync::Arc,
};

use ethereum_types::H256;
use log::debug;
use lru::LruCache;
use parking_lot::Mutex;

use crate::{
    db::{Database, DbOp, DbResult},
    trie_ops::{TrieOpError, TrieOpResult},
};

/// Pending writes of a frame. `None` marks a deletion.
type KeyValueMap = HashMap<Vec<u8>, Option<Vec<u8>>>;

/// One frame of the checkpoint stack.
#[derive(Clone, Debug)]
struct Checkpoint {
    /// Shared between copies of the stack until one of them writes.
    key_value_map: Arc<KeyValueMap>,
    /// The trie root when the frame was created.
    root: H256,
}

/// A [`Database`] wrapper with a stack of checkpoints and an optional LRU read
/// cache for values that are in the backend.
pub struct CheckpointDb {
    db: Arc<dyn Database>,
    checkpoints: Vec<Checkpoint>,
    cache: Option<Mutex<LruCache<Vec<u8>, Vec<u8>>>>,
}

impl Debug for CheckpointDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckpointDb")
            .field("db", &self.db)
            .field("checkpoints", &self.checkpoints.len())
            .field("cache_size", &self.cache_size())
            .finish()
    }
}

impl CheckpointDb {
    /// Wraps `db`. A `cache_size` of `0` disables the read cache.
    pub fn new(db: Arc<dyn Database>, cache_size: usize) -> Self {
        Self {
            db,
            checkpoints: Vec::new(),
            cache: NonZeroUsize::new(cache_size).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    /// The backend behind the checkpoints.
    pub fn database(&self) -> &Arc<dyn Database> {
        &self.db
    }

    /// Capacity of the read cache (`0` if disabled).
    pub fn cache_size(&self) -> usize {
        self.cache
            .as_ref()
            .map(|c| c.lock().cap().get())
            .unwrap_or(0)
    }

    /// Returns `true` if there is at least one active checkpoint.
    pub fn has_checkpoints(&self) -> bool {
        !self.checkpoints.is_empty()
    }

    /// The number of active (nested) checkpoints.
    pub fn checkpoint_count(&self) -> usize {
        self.checkpoints.len()
    }

    /// Pushes a new frame remembering `root`.
    pub fn checkpoint(&mut self, root: H256) {
        self.checkpoints.push(Checkpoint {
            key_value_map: Arc::default(),
            root,
        });

        debug!(
            "Entered checkpoint {} (root: {:x})",
            self.checkpoints.len(),
            root
        );
    }

    /// Pops the top frame and merges its writes into the frame below, or
    /// writes them to the backend if it was the last one.
    ///
    /// If the backend write fails the frame stays in place, so the commit can
    /// be retried (or the frame reverted).
    pub fn commit(&mut self) -> TrieOpResult<()> {
        let depth = self.checkpoints.len();

        match depth {
            0 => Err(TrieOpError::NoCheckpoint),
            1 => {
                let ops = self.checkpoints[0]
                    .key_value_map
                    .iter()
                    .map(|(key, value)| match value {
                        Some(value) => DbOp::Put {
                            key: key.clone(),
                            value: value.clone(),
                        },
                        None => DbOp::Del { key: key.clone() },
                    })
                    .collect::<Vec<_>>();
                debug!("Committing {} writes to the backend", ops.len());

                self.db.batch(ops.clone())?;
                self.update_cache_for_ops(&ops);
                self.checkpoints.clear();

                Ok(())
            }
            _ => {
                let Some(Checkpoint { key_value_map, .. }) = self.checkpoints.pop() else {
                    return Err(TrieOpError::NoCheckpoint);
                };
                let key_value_map =
                    Arc::try_unwrap(key_value_map).unwrap_or_else(|m| (*m).clone());
                debug!(
                    "Committing {} writes into checkpoint {}",
                    key_value_map.len(),
                    depth - 1
                );

                if let Some(parent) = self.checkpoints.last_mut() {
                    Arc::make_mut(&mut parent.key_value_map).extend(key_value_map);
                }

                Ok(())
            }
        }
    }

    /// Discards the top frame and returns the root it was created with.
    pub fn revert(&mut self) -> TrieOpResult<H256> {
        let Checkpoint { root, .. } = self.checkpoints.pop().ok_or(TrieOpError::NoCheckpoint)?;
        debug!(
            "Reverted checkpoint {} (restoring root: {:x})",
            self.checkpoints.len() + 1,
            root
        );

        Ok(root)
    }

    /// Drops every frame without writing anything to the backend.
    pub fn flush_checkpoints(&mut self) {
        self.checkpoints.clear();
    }

    /// Looks `key` up in the frames (top down), the cache and the backend.
    pub fn get(&self, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        for checkpoint in self.checkpoints.iter().rev() {
            if let Some(value) = checkpoint.key_value_map.get(key) {
                return Ok(value.clone());
            }
        }

        if let Some(cache) = &self.cache {
            if let Some(value) = cache.lock().get(key) {
                return Ok(Some(value.clone()));
            }
        }

        let value = self.db.get(key)?;
        if let (Some(cache), Some(value)) = (&self.cache, &value) {
            cache.lock().put(key.to_vec(), value.clone());
        }

        Ok(value)
    }

    /// Stores `value` under `key` in the top frame, or in the backend if there
    /// is no active checkpoint.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> DbResult<()> {
        match self.checkpoints.last_mut() {
            Some(checkpoint) => {
                Arc::make_mut(&mut checkpoint.key_value_map).insert(key, Some(value));
                Ok(())
            }
            None => {
                self.db.put(key.clone(), value.clone())?;
                if let Some(cache) = &self.cache {
                    cache.lock().put(key, value);
                }

                Ok(())
            }
        }
    }

    /// Removes `key` in the top frame, or from the backend if there is no
    /// active checkpoint.
    pub fn del(&mut self, key: &[u8]) -> DbResult<()> {
        match self.checkpoints.last_mut() {
            Some(checkpoint) => {
                Arc::make_mut(&mut checkpoint.key_value_map).insert(key.to_vec(), None);
                Ok(())
            }
            None => {
                if let Some(cache) = &self.cache {
                    cache.lock().pop(key);
                }
                self.db.delete(key)
            }
        }
    }

    /// Applies `ops` in order with the same rules as [`Self::put`] and
    /// [`Self::del`].
    pub fn batch(&mut self, ops: Vec<DbOp>) -> DbResult<()> {
        if !self.has_checkpoints() {
            self.db.batch(ops.clone())?;
            self.update_cache_for_ops(&ops);
            return Ok(());
        }

        for op in ops {
            match op {
                DbOp::Put { key, value } => self.put(key, value)?,
                DbOp::Del { key } => self.del(&key)?,
            }
        }

        Ok(())
    }

    /// Creates a handle on the same backend. The frames are shared copy on
    /// write, so neither side sees the other's later writes. The copy gets its
    /// own (empty) cache.
    pub fn copy(&self, include_checkpoints: bool) -> Self {
        let mut copy = Self::new(self.db.clone(), self.cache_size());
        if include_checkpoints {
            copy.checkpoints = self.checkpoints.clone();
        }

        copy
    }

    fn update_cache_for_ops(&self, ops: &[DbOp]) {
        let Some(cache) = &self.cache else {
            return;
        };

        let mut cache = cache.lock();
        for op in ops {
            match op {
                DbOp::Put { key, value } => {
                    cache.put(key.clone(), value.clone());
                }
                DbOp::Del { key } => {
                    cache.pop(key);
                }
            }
        }
    }
}
