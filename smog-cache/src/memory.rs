//! A store that keeps everything in local memory for the lifetime of the process.

use async_trait::async_trait;
use dashmap::DashMap;
use smog_cities::{Store, StoreError};
use std::{fmt::Debug, hash::Hash};

/// An in-memory store.
///
/// Entries are never evicted. The map is sharded, so it can be shared by every
/// worker of the web server without a global lock.
#[derive(Debug)]
pub struct MemoryStore<K, V>
where
    K: Eq + Hash,
{
    /// A name for logs, such as "descriptions".
    name: String,

    /// The items stored in the cache.
    items: DashMap<K, V>,
}

impl<K, V> MemoryStore<K, V>
where
    K: Eq + Hash,
{
    /// Create an empty store.
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            items: DashMap::new(),
        }
    }

    /// The number of entries in the store.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the store has no entries.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
impl<K, V> Store<K, V> for MemoryStore<K, V>
where
    K: Eq + Hash + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn name(&self) -> String {
        format!("MemoryStore({})", self.name)
    }

    async fn get(&self, key: &K) -> Result<Option<V>, StoreError> {
        // Clone the value out so the shard lock is released before returning.
        let value = self.items.get(key).map(|entry| entry.value().clone());
        tracing::trace!(
            r#type = "cache.memory.get",
            store = %self.name,
            ?key,
            hit = value.is_some(),
            "memory cache lookup"
        );
        Ok(value)
    }

    async fn insert(&self, key: K, value: V) -> Result<(), StoreError> {
        tracing::trace!(r#type = "cache.memory.insert", store = %self.name, ?key, "inserting into cache");
        self.items.insert(key, value);
        Ok(())
    }
}
