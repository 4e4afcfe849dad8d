//! Backing sink abstraction for the batching cache.
//!
//! The sink is the authoritative key/value store the cache writes through to,
//! typically a client for a remote or partitioned store. Methods take `&self`
//! because flush workers share one sink across threads.

use crate::error::Result;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

/// Trait for the store behind a [`BatchingCache`](crate::BatchingCache).
pub trait BackingSink<K, V>: Send + Sync {
    /// Get a value by key
    fn get(&self, key: &K) -> Result<Option<V>>;

    /// Insert or update a value, returning the previous one
    fn put(&self, key: K, value: V) -> Result<Option<V>>;

    /// Write a whole batch. Called once per flush.
    fn put_all(&self, entries: &FxHashMap<K, V>) -> Result<()>;

    /// Delete a key and return the old value if it existed
    fn remove(&self, key: &K) -> Result<Option<V>>;

    /// Drop every entry
    fn clear(&self) -> Result<()>;

    /// Every stored entry, for the cache's bulk accessors
    fn entries(&self) -> Result<Vec<(K, V)>>;

    /// Check if a key exists
    fn contains_key(&self, key: &K) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// Sink operation counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkStats {
    /// Total number of keys
    pub key_count: usize,
    /// Single-key operations performed
    pub operations_count: u64,
    /// `put_all` calls received
    pub bulk_writes: u64,
}

/// In-memory sink backed by a hash map.
///
/// Useful as the store in tests and demos, or in front of nothing at all
/// when only the read-your-writes buffering is wanted.
#[derive(Debug)]
pub struct MemorySink<K, V> {
    data: RwLock<FxHashMap<K, V>>,
    operations: AtomicU64,
    bulk_writes: AtomicU64,
}

impl<K, V> MemorySink<K, V> {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(FxHashMap::default()),
            operations: AtomicU64::new(0),
            bulk_writes: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    pub fn stats(&self) -> SinkStats {
        SinkStats {
            key_count: self.len(),
            operations_count: self.operations.load(Ordering::Relaxed),
            bulk_writes: self.bulk_writes.load(Ordering::Relaxed),
        }
    }
}

impl<K, V> Default for MemorySink<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> BackingSink<K, V> for MemorySink<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, key: &K) -> Result<Option<V>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn put(&self, key: K, value: V) -> Result<Option<V>> {
        self.operations.fetch_add(1, Ordering::Relaxed);
        Ok(self.data.write().insert(key, value))
    }

    fn put_all(&self, entries: &FxHashMap<K, V>) -> Result<()> {
        self.bulk_writes.fetch_add(1, Ordering::Relaxed);
        let mut data = self.data.write();
        data.extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    fn remove(&self, key: &K) -> Result<Option<V>> {
        self.operations.fetch_add(1, Ordering::Relaxed);
        Ok(self.data.write().remove(key))
    }

    fn clear(&self) -> Result<()> {
        self.data.write().clear();
        Ok(())
    }

    fn entries(&self) -> Result<Vec<(K, V)>> {
        Ok(self
            .data
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn contains_key(&self, key: &K) -> Result<bool> {
        Ok(self.data.read().contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_basic_ops() {
        let sink: MemorySink<String, u32> = MemorySink::new();

        assert_eq!(sink.put("a".to_string(), 1).unwrap(), None);
        assert_eq!(sink.put("a".to_string(), 2).unwrap(), Some(1));
        assert_eq!(sink.get(&"a".to_string()).unwrap(), Some(2));
        assert!(sink.contains_key(&"a".to_string()).unwrap());

        assert_eq!(sink.remove(&"a".to_string()).unwrap(), Some(2));
        assert_eq!(sink.remove(&"a".to_string()).unwrap(), None);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_memory_sink_bulk_write() {
        let sink: MemorySink<u32, u32> = MemorySink::new();
        let batch: FxHashMap<u32, u32> = (0..10).map(|i| (i, i * 10)).collect();

        sink.put_all(&batch).unwrap();

        let stats = sink.stats();
        assert_eq!(stats.key_count, 10);
        assert_eq!(stats.bulk_writes, 1);
        assert_eq!(stats.operations_count, 0);
        assert_eq!(sink.entries().unwrap().len(), 10);

        sink.clear().unwrap();
        assert!(sink.is_empty());
    }
}
