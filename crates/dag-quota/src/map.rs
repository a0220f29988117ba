//! Concurrent keyed maps backing the forest and the ledger.
//!
//! Entries are shared `Arc`s: callers lock the entry itself, never the map.
//! Insertion is idempotent so concurrent observers of the same key end up
//! holding the same entry.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;

/// Associative store with atomic insert-if-absent.
pub trait ConcurrentMap<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Option<Arc<V>>;

    /// Return the existing entry, or insert the one built by `make`.
    fn get_or_insert_with(&self, key: K, make: &mut dyn FnMut() -> V) -> Arc<V>;

    /// Insert or replace an entry.
    fn insert(&self, key: K, value: V) -> Arc<V>;

    /// Point-in-time copy of all entries.
    fn entries(&self) -> Vec<(K, Arc<V>)>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lock-striped map over `dashmap` shards.
pub struct ShardedMap<K, V>
where
    K: Eq + Hash,
{
    inner: DashMap<K, Arc<V>>,
}

impl<K, V> ShardedMap<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }
}

impl<K, V> Default for ShardedMap<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> ConcurrentMap<K, V> for ShardedMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Send + Sync,
{
    fn get(&self, key: &K) -> Option<Arc<V>> {
        self.inner.get(key).map(|entry| Arc::clone(entry.value()))
    }

    fn get_or_insert_with(&self, key: K, make: &mut dyn FnMut() -> V) -> Arc<V> {
        Arc::clone(self.inner.entry(key).or_insert_with(|| Arc::new(make())).value())
    }

    fn insert(&self, key: K, value: V) -> Arc<V> {
        let value = Arc::new(value);
        self.inner.insert(key, Arc::clone(&value));
        value
    }

    fn entries(&self) -> Vec<(K, Arc<V>)> {
        self.inner
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}
