//! Cache builder for flexible configuration
//!
//! Collects the sink and batching settings and validates them once, when the
//! cache is built.

use crate::cache::{BackingSink, BatchingCache};
use crate::config::BatchConfig;
use crate::error::Result;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

/// Builder for a [`BatchingCache`].
///
/// ```rust
/// use quadcache::{CacheBuilder, MemorySink};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let cache = CacheBuilder::new(Arc::new(MemorySink::<u64, String>::new()))
///     .batch_size(500)
///     .flush_interval(Duration::from_millis(200))
///     .caller_sends(false)
///     .build()?;
/// assert!(cache.config().async_mode);
/// # Ok::<(), quadcache::QuadCacheError>(())
/// ```
pub struct CacheBuilder<K, V> {
    sink: Arc<dyn BackingSink<K, V>>,
    config: BatchConfig,
}

impl<K, V> CacheBuilder<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Start from the default batching settings.
    pub fn new(sink: Arc<dyn BackingSink<K, V>>) -> Self {
        Self {
            sink,
            config: BatchConfig::default(),
        }
    }

    /// Replace all batching settings at once.
    pub fn config(mut self, config: BatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size;
        self
    }

    /// Timer period. `Duration::ZERO` disables timed flushes.
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.config = self.config.with_flush_interval(interval);
        self
    }

    pub fn async_mode(mut self, async_mode: bool) -> Self {
        self.config.async_mode = async_mode;
        self
    }

    /// `true` makes the writing thread perform the sink write (sync mode),
    /// `false` hands flushes to the worker pool.
    pub fn caller_sends(self, caller_sends: bool) -> Self {
        self.async_mode(!caller_sends)
    }

    pub fn worker_threads(mut self, worker_threads: usize) -> Self {
        self.config.worker_threads = worker_threads;
        self
    }

    pub fn queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.config.queue_capacity = queue_capacity;
        self
    }

    /// Validate the settings and start the timer and workers.
    pub fn build(self) -> Result<BatchingCache<K, V>> {
        BatchingCache::new(self.sink, self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemorySink;
    use crate::error::QuadCacheError;

    fn sink() -> Arc<MemorySink<String, u32>> {
        Arc::new(MemorySink::new())
    }

    #[test]
    fn test_builder_default() {
        let cache = CacheBuilder::new(sink()).build().unwrap();
        assert_eq!(cache.config(), &BatchConfig::default());
    }

    #[test]
    fn test_caller_sends_toggles_mode() {
        let builder = CacheBuilder::new(sink()).caller_sends(false);
        assert!(builder.config.async_mode);

        let builder = builder.caller_sends(true);
        assert!(!builder.config.async_mode);
    }

    #[test]
    fn test_builder_settings_reach_cache() {
        let store = sink();
        let cache = CacheBuilder::new(store.clone())
            .batch_size(2)
            .flush_interval(Duration::ZERO)
            .worker_threads(1)
            .queue_capacity(1)
            .build()
            .unwrap();

        cache.put("a".to_string(), 1).unwrap();
        assert!(store.is_empty());
        cache.put("b".to_string(), 2).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let result = CacheBuilder::new(sink()).batch_size(0).build();
        assert!(matches!(result, Err(QuadCacheError::InvalidConfig(_))));

        let result = CacheBuilder::new(sink())
            .async_mode(true)
            .queue_capacity(0)
            .build();
        assert!(result.is_err());
    }
}
