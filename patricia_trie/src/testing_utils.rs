use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use rand::{rngs::StdRng, Rng, RngCore, SeedableRng};

use crate::{
    db::{Database, DbOp, DbResult, MemoryDb},
    trie::{Trie, TrieOpts},
};

/// Keys this short collide often. Tests that check that every inserted value is
/// retrievable need to dedupe the generated entries first.
const MIN_BYTES_FOR_VAR_KEY: usize = 1;
const MAX_BYTES_FOR_VAR_KEY: usize = 6;

const FIXED_KEY_BYTES: usize = 32;
const MAX_VALUE_BYTES: usize = 48;

pub(crate) type TestInsertEntry = (Vec<u8>, Vec<u8>);

pub(crate) fn common_setup() {
    // Try init since multiple tests calling `init` will cause an error.
    let _ = pretty_env_logger::try_init();
}

/// An in-memory store whose next `batch` call fails once armed.
#[derive(Debug, Default)]
pub(crate) struct FailingBatchDb {
    inner: MemoryDb,
    fail_next_batch: AtomicBool,
}

impl FailingBatchDb {
    pub(crate) fn fail_next_batch(&self) {
        self.fail_next_batch.store(true, Ordering::SeqCst);
    }
}

impl Database for FailingBatchDb {
    fn get(&self, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> DbResult<()> {
        self.inner.put(key, value)
    }

    fn delete(&self, key: &[u8]) -> DbResult<()> {
        self.inner.delete(key)
    }

    fn batch(&self, ops: Vec<DbOp>) -> DbResult<()> {
        if self.fail_next_batch.swap(false, Ordering::SeqCst) {
            return Err("disk full".into());
        }

        self.inner.batch(ops)
    }
}

/// A trie on a fresh in-memory store.
pub(crate) fn new_test_trie(opts: TrieOpts) -> Trie {
    Trie::new(Arc::new(MemoryDb::new()), opts).unwrap()
}

/// Entries with 32 byte keys, the shape of keys in a secure trie.
pub(crate) fn generate_n_random_fixed_entries(
    n: usize,
    seed: u64,
) -> impl Iterator<Item = TestInsertEntry> {
    gen_n_random_entries_common(n, seed, |rng| gen_bytes(rng, FIXED_KEY_BYTES))
}

/// Entries with short keys of varying length, so that plenty of keys are
/// prefixes of others and end up in branch values.
pub(crate) fn generate_n_random_variable_entries(
    n: usize,
    seed: u64,
) -> impl Iterator<Item = TestInsertEntry> {
    gen_n_random_entries_common(n, seed, |rng| {
        let len = rng.gen_range(MIN_BYTES_FOR_VAR_KEY..=MAX_BYTES_FOR_VAR_KEY);
        gen_bytes(rng, len)
    })
}

fn gen_n_random_entries_common<F>(
    n: usize,
    seed: u64,
    mut key_f: F,
) -> impl Iterator<Item = TestInsertEntry>
where
    F: FnMut(&mut StdRng) -> Vec<u8>,
{
    let mut rng = StdRng::seed_from_u64(seed);

    (0..n).map(move |_| {
        let k = key_f(&mut rng);
        let v_len = rng.gen_range(1..=MAX_VALUE_BYTES);

        (k, gen_bytes(&mut rng, v_len))
    })
}

fn gen_bytes(rng: &mut StdRng, len: usize) -> Vec<u8> {
    let mut bytes = vec![0; len];
    rng.fill_bytes(&mut bytes);

    bytes
}
