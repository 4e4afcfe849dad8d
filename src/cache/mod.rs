//! Write-coalescing cache in front of a slower backing sink.
//!
//! Writes land in an in-memory staging map and reach the sink in bulk, either
//! when the map reaches `batch_size` entries or when the flush timer fires.
//! Reads see staged values immediately (read-your-writes).
//!
//! In sync mode the thread that triggers a flush performs the sink write and
//! blocks for its duration. In async mode the staging map is swapped for a
//! fresh one and the old generation is handed, as an immutable snapshot, to a
//! bounded worker pool. Only one such generation is in flight at a time: a
//! flush that finds the previous generation still being written waits for it
//! first, so the sink always receives batches in staging order. If the pool
//! refuses the job the producer writes the batch itself.
//!
//! # Failed async flushes
//!
//! A worker that cannot write its batch logs the error, fails the batch's
//! [`FlushHandle`] and parks the batch as a dead letter. Nothing is retried
//! automatically; callers inspect [`BatchingCache::drain_dead_letters`] and
//! decide.

mod pool;
mod sink;
mod stats;
mod timer;

pub use pool::FlushHandle;
pub use sink::{BackingSink, MemorySink, SinkStats};
pub use stats::CacheStats;

use crate::config::BatchConfig;
use crate::error::{QuadCacheError, Result};
use parking_lot::{Mutex, RwLock};
use pool::{FlushPool, Job};
use rustc_hash::{FxHashMap, FxHashSet};
use stats::CacheCounters;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use timer::FlushTimer;

/// Staged generation that has been handed to a worker but not yet written.
struct InFlight<K, V> {
    generation: u64,
    snapshot: Arc<FxHashMap<K, V>>,
    handle: FlushHandle,
}

/// State shared with flush workers. Holds no reference to the pool so a
/// worker can never be the one to tear it down.
struct FlushContext<K, V> {
    sink: Arc<dyn BackingSink<K, V>>,
    in_flight: Mutex<Vec<InFlight<K, V>>>,
    dead_letters: Mutex<Vec<FxHashMap<K, V>>>,
    counters: CacheCounters,
}

impl<K, V> FlushContext<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn in_flight_batches(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Newest in-flight value for `key`.
    fn in_flight_value(&self, key: &K) -> Option<V> {
        self.in_flight
            .lock()
            .iter()
            .rev()
            .find_map(|flight| flight.snapshot.get(key).cloned())
    }

    /// Write one async generation and retire it. Runs on a worker, or on the
    /// producer when the pool refuses the job.
    fn write_snapshot(&self, generation: u64, snapshot: Arc<FxHashMap<K, V>>, handle: FlushHandle) {
        let started = Instant::now();
        let outcome = self.sink.put_all(&snapshot);

        // Retire before completing so anyone woken by the handle already sees
        // the entries in the sink and not here.
        self.in_flight
            .lock()
            .retain(|flight| flight.generation != generation);

        match outcome {
            Ok(()) => {
                self.counters.record_flush(snapshot.len(), started.elapsed());
                log::debug!(
                    "Flushed batch {} ({} entries) in {:?}",
                    generation,
                    snapshot.len(),
                    started.elapsed()
                );
                handle.complete(Ok(()));
            }
            Err(e) => {
                self.counters.record_failure();
                log::error!(
                    "Async flush of batch {} ({} entries) failed, parking as dead letter: {}",
                    generation,
                    snapshot.len(),
                    e
                );
                let batch = Arc::try_unwrap(snapshot).unwrap_or_else(|shared| (*shared).clone());
                self.dead_letters.lock().push(batch);
                handle.complete(Err(e.to_string()));
            }
        }
    }

    /// Wait for in-flight generations; only those holding `key` when given.
    fn settle(&self, key: Option<&K>) {
        let handles: Vec<FlushHandle> = self
            .in_flight
            .lock()
            .iter()
            .filter(|flight| key.is_none_or(|k| flight.snapshot.contains_key(k)))
            .map(|flight| flight.handle.clone())
            .collect();

        for handle in handles {
            // Failures are already parked as dead letters.
            let _ = handle.wait();
        }
    }
}

struct CacheCore<K, V> {
    staging: RwLock<FxHashMap<K, V>>,
    ctx: Arc<FlushContext<K, V>>,
    pool: Option<FlushPool>,
    config: BatchConfig,
    generation: AtomicU64,
    closed: AtomicBool,
}

impl<K, V> CacheCore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn flush(&self) -> Result<Option<FlushHandle>> {
        let mut staging = self.staging.write();
        self.flush_locked(&mut staging)
    }

    fn flush_if_full(&self, staging: &mut FxHashMap<K, V>) -> Result<()> {
        if staging.len() >= self.config.batch_size {
            self.flush_locked(staging)?;
        }
        Ok(())
    }

    /// Caller holds the staging write lock.
    fn flush_locked(&self, staging: &mut FxHashMap<K, V>) -> Result<Option<FlushHandle>> {
        if staging.is_empty() {
            return Ok(None);
        }

        let batch_len = staging.len();
        self.ctx.counters.record_batch(batch_len);

        let Some(pool) = &self.pool else {
            let started = Instant::now();
            return match self.ctx.sink.put_all(staging) {
                Ok(()) => {
                    staging.clear();
                    self.ctx.counters.record_flush(batch_len, started.elapsed());
                    log::debug!("Flushed {} entries in {:?}", batch_len, started.elapsed());
                    Ok(Some(FlushHandle::finished(batch_len)))
                }
                Err(e) => {
                    self.ctx.counters.record_failure();
                    Err(QuadCacheError::FlushFailed(e.to_string()))
                }
            };
        };

        // At most one prior generation in flight, so batches reach the sink
        // in the order they were staged. Waiting here is the backpressure.
        if self.ctx.in_flight_batches() > 0 {
            self.ctx.counters.record_backpressure_wait();
            self.ctx.settle(None);
        }

        let snapshot = Arc::new(std::mem::take(staging));
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let handle = FlushHandle::pending(batch_len);

        self.ctx.in_flight.lock().push(InFlight {
            generation,
            snapshot: Arc::clone(&snapshot),
            handle: handle.clone(),
        });

        let ctx = Arc::clone(&self.ctx);
        let job_handle = handle.clone();
        let job: Job = Box::new(move || ctx.write_snapshot(generation, snapshot, job_handle));

        if let Err(job) = pool.try_submit(job) {
            log::debug!(
                "Flush pool rejected batch {} ({} entries), writing on caller",
                generation,
                batch_len
            );
            self.ctx.counters.record_caller_run();
            job();
        }

        Ok(Some(handle))
    }

    /// Merged view of one key: staging, then in-flight, then the sink.
    fn lookup(&self, staging: &FxHashMap<K, V>, key: &K) -> Result<Option<V>> {
        if let Some(value) = staging.get(key) {
            return Ok(Some(value.clone()));
        }
        if let Some(value) = self.ctx.in_flight_value(key) {
            return Ok(Some(value));
        }
        self.ctx.sink.get(key)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(QuadCacheError::Closed);
        }
        Ok(())
    }
}

/// Read-your-writes cache that batches writes into a [`BackingSink`].
///
/// # Examples
///
/// ```rust
/// use quadcache::{BatchConfig, BatchingCache, MemorySink};
/// use std::sync::Arc;
///
/// let sink = Arc::new(MemorySink::<&str, i32>::new());
/// let cache = BatchingCache::new(sink.clone(), BatchConfig::default().with_batch_size(2))?;
///
/// cache.put("a", 1)?;
/// assert_eq!(cache.get(&"a")?, Some(1));
/// assert!(sink.is_empty());
///
/// cache.put("b", 2)?;
/// assert_eq!(sink.len(), 2);
/// # Ok::<(), quadcache::QuadCacheError>(())
/// ```
pub struct BatchingCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    core: Arc<CacheCore<K, V>>,
    timer: Mutex<Option<FlushTimer>>,
}

impl<K, V> BatchingCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(sink: Arc<dyn BackingSink<K, V>>, config: BatchConfig) -> Result<Self> {
        config.validate()?;

        let pool = if config.async_mode {
            Some(FlushPool::new(config.worker_threads, config.queue_capacity)?)
        } else {
            None
        };

        let core = Arc::new(CacheCore {
            staging: RwLock::new(FxHashMap::default()),
            ctx: Arc::new(FlushContext {
                sink,
                in_flight: Mutex::new(Vec::new()),
                dead_letters: Mutex::new(Vec::new()),
                counters: CacheCounters::default(),
            }),
            pool,
            config,
            generation: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        });

        let timer = match core.config.flush_interval() {
            Some(interval) => Some(Self::spawn_timer(Arc::downgrade(&core), interval)?),
            None => None,
        };

        Ok(Self {
            core,
            timer: Mutex::new(timer),
        })
    }

    fn spawn_timer(core: Weak<CacheCore<K, V>>, interval: std::time::Duration) -> Result<FlushTimer> {
        FlushTimer::spawn(interval, move || {
            let Some(core) = core.upgrade() else {
                return false;
            };
            // Sync failures keep the batch staged for the next trigger.
            if let Err(e) = core.flush() {
                log::warn!("Timed flush failed, entries stay staged: {}", e);
            }
            true
        })
    }

    pub fn config(&self) -> &BatchConfig {
        &self.core.config
    }

    /// Staged value if present, otherwise the sink's.
    pub fn get(&self, key: &K) -> Result<Option<V>> {
        self.core.ctx.counters.record_get();
        let staging = self.core.staging.read();
        self.core.lookup(&staging, key)
    }

    pub fn contains_key(&self, key: &K) -> Result<bool> {
        let staging = self.core.staging.read();
        if staging.contains_key(key) || self.core.ctx.in_flight_value(key).is_some() {
            return Ok(true);
        }
        self.core.ctx.sink.contains_key(key)
    }

    /// Stage a write. Flushes before returning once `batch_size` is reached;
    /// in sync mode a failed flush is returned here and the entries stay
    /// staged.
    pub fn put(&self, key: K, value: V) -> Result<()> {
        self.core.ensure_open()?;
        self.core.ctx.counters.record_puts(1);

        let mut staging = self.core.staging.write();
        staging.insert(key, value);
        self.core.flush_if_full(&mut staging)
    }

    pub fn put_all<I>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        self.core.ensure_open()?;

        let mut staging = self.core.staging.write();
        let before = staging.len();
        let mut added = 0;
        for (key, value) in entries {
            staging.insert(key, value);
            added += 1;
        }
        self.core.ctx.counters.record_puts(added);
        log::trace!("Staged {} entries ({} before)", added, before);
        self.core.flush_if_full(&mut staging)
    }

    /// Stage `value` only if no value exists anywhere for `key`.
    /// Returns the existing value otherwise.
    pub fn put_if_absent(&self, key: K, value: V) -> Result<Option<V>> {
        self.core.ensure_open()?;

        let mut staging = self.core.staging.write();
        let existing = self.core.lookup(&staging, &key)?;
        if existing.is_none() {
            self.core.ctx.counters.record_puts(1);
            staging.insert(key, value);
            self.core.flush_if_full(&mut staging)?;
        }
        Ok(existing)
    }

    /// Stage `value` only if `key` currently has a value. Returns that value.
    pub fn replace(&self, key: K, value: V) -> Result<Option<V>> {
        self.core.ensure_open()?;

        let mut staging = self.core.staging.write();
        let existing = self.core.lookup(&staging, &key)?;
        if existing.is_some() {
            self.core.ctx.counters.record_puts(1);
            staging.insert(key, value);
            self.core.flush_if_full(&mut staging)?;
        }
        Ok(existing)
    }

    /// Remove `key` from staging and from the sink. Waits for any in-flight
    /// flush carrying the key so it cannot reappear afterwards.
    pub fn remove(&self, key: &K) -> Result<Option<V>> {
        let mut staging = self.core.staging.write();
        self.core.ctx.settle(Some(key));

        let staged = staging.remove(key);
        let stored = self.core.ctx.sink.remove(key)?;
        Ok(staged.or(stored))
    }

    /// Drop everything staged, in flight and in the sink.
    pub fn clear(&self) -> Result<()> {
        let mut staging = self.core.staging.write();
        self.core.ctx.settle(None);

        staging.clear();
        self.core.ctx.sink.clear()
    }

    /// Merged snapshot of sink and staged entries, staging taking precedence.
    pub fn entries(&self) -> Result<FxHashMap<K, V>> {
        let staging = self.core.staging.read();
        let mut merged: FxHashMap<K, V> = self.core.ctx.sink.entries()?.into_iter().collect();

        for flight in self.core.ctx.in_flight.lock().iter() {
            merged.extend(flight.snapshot.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        merged.extend(staging.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(merged)
    }

    pub fn key_set(&self) -> Result<FxHashSet<K>> {
        Ok(self.entries()?.into_keys().collect())
    }

    pub fn values(&self) -> Result<Vec<V>> {
        Ok(self.entries()?.into_values().collect())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.entries()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Push staged entries to the sink now.
    ///
    /// Returns `None` if nothing was staged. In sync mode the returned handle
    /// is already finished; in async mode wait on it to observe the write.
    pub fn flush(&self) -> Result<Option<FlushHandle>> {
        self.core.flush()
    }

    /// Entries staged and not yet handed to the sink.
    pub fn pending_len(&self) -> usize {
        self.core.staging.read().len()
    }

    /// Async generations currently being written.
    pub fn in_flight_batches(&self) -> usize {
        self.core.ctx.in_flight_batches()
    }

    pub fn stats(&self) -> CacheStats {
        self.core.ctx.counters.snapshot()
    }

    /// Take the batches whose async flush failed, oldest first.
    pub fn drain_dead_letters(&self) -> Vec<FxHashMap<K, V>> {
        std::mem::take(&mut *self.core.ctx.dead_letters.lock())
    }

    pub fn is_closed(&self) -> bool {
        self.core.closed.load(Ordering::Acquire)
    }

    /// Stop the timer, flush what is staged and wait for every worker.
    ///
    /// Writes after `close` fail with [`QuadCacheError::Closed`]; reads keep
    /// working. Calling it again is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.core.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        if let Some(mut timer) = self.timer.lock().take() {
            timer.stop();
        }

        let outcome = match self.core.flush() {
            Ok(Some(handle)) => handle.wait(),
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        };

        if let Some(pool) = &self.core.pool {
            pool.shutdown();
        }

        log::debug!("Batching cache closed");
        outcome
    }
}

impl<K, V> BatchingCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    /// Stage `value` only if the current value equals `expected`.
    pub fn replace_if(&self, key: K, expected: &V, value: V) -> Result<bool> {
        self.core.ensure_open()?;

        let mut staging = self.core.staging.write();
        let matches = self.core.lookup(&staging, &key)?.as_ref() == Some(expected);
        if matches {
            self.core.ctx.counters.record_puts(1);
            staging.insert(key, value);
            self.core.flush_if_full(&mut staging)?;
        }
        Ok(matches)
    }

    /// Remove `key` only if its current value equals `expected`.
    pub fn remove_if(&self, key: &K, expected: &V) -> Result<bool> {
        let mut staging = self.core.staging.write();
        self.core.ctx.settle(Some(key));

        if self.core.lookup(&staging, key)?.as_ref() != Some(expected) {
            return Ok(false);
        }
        staging.remove(key);
        self.core.ctx.sink.remove(key)?;
        Ok(true)
    }
}

impl<K, V> Drop for BatchingCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("Final flush on drop failed: {}", e);
        }
    }
}

impl<K, V> fmt::Debug for BatchingCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchingCache")
            .field("config", &self.core.config)
            .field("pending", &self.pending_len())
            .field("stats", &self.stats())
            .finish()
    }
}
