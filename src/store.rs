use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

type Key = String;
type Field = String;

/// The Store holds two independent key spaces: plain strings and hashes of field/value pairs.
/// Each space sits behind its own read/write lock, so hash traffic never waits on string traffic
/// and readers of the same space proceed in parallel. Cloning is cheap, every clone shares the
/// same maps.
///
/// Values are copied in and out, callers never hold a reference into the maps past a call.
#[derive(Clone, Default)]
pub struct Store {
    inner: Arc<InnerStore>,
}

#[derive(Default)]
struct InnerStore {
    strings: RwLock<HashMap<Key, Bytes>>,
    hashes: RwLock<HashMap<Key, HashMap<Field, Bytes>>>,
}

impl Store {
    pub fn new() -> Store {
        Store::default()
    }

    pub fn set(&self, key: Key, value: Bytes) {
        self.strings_mut().insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.strings().get(key).cloned()
    }

    pub fn hset(&self, key: Key, field: Field, value: Bytes) {
        self.hashes_mut()
            .entry(key)
            .or_default()
            .insert(field, value);
    }

    pub fn hget(&self, key: &str, field: &str) -> Option<Bytes> {
        self.hashes()
            .get(key)
            .and_then(|hash| hash.get(field))
            .cloned()
    }

    /// Snapshot of every field/value pair of the hash at `key`, empty if it does not exist.
    pub fn hgetall(&self, key: &str) -> Vec<(Field, Bytes)> {
        self.hashes()
            .get(key)
            .map(|hash| {
                hash.iter()
                    .map(|(field, value)| (field.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of keys in the string space.
    pub fn len(&self) -> usize {
        self.strings().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0 && self.hashes().is_empty()
    }

    /// Number of keys in the hash space.
    pub fn hash_len(&self) -> usize {
        self.hashes().len()
    }

    // A panic while holding a lock cannot leave a map half-updated (every mutation is a single
    // insert), so a poisoned lock is still safe to use.

    fn strings(&self) -> RwLockReadGuard<'_, HashMap<Key, Bytes>> {
        self.inner
            .strings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn strings_mut(&self) -> RwLockWriteGuard<'_, HashMap<Key, Bytes>> {
        self.inner
            .strings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn hashes(&self) -> RwLockReadGuard<'_, HashMap<Key, HashMap<Field, Bytes>>> {
        self.inner
            .hashes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn hashes_mut(&self) -> RwLockWriteGuard<'_, HashMap<Key, HashMap<Field, Bytes>>> {
        self.inner
            .hashes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
