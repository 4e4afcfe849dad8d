//! Batching cache counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Point-in-time view of the cache counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries written by `put`, `put_all` and the conditional writes.
    pub puts: u64,
    pub gets: u64,
    /// Flushes that reached the sink successfully.
    pub flushes: u64,
    pub flushed_entries: u64,
    pub failed_flushes: u64,
    /// Async flushes executed on the producing thread because the worker
    /// pool refused them.
    pub caller_run_flushes: u64,
    /// Async flushes that had to wait for the previous generation to land.
    pub backpressure_waits: u64,
    /// Size of the most recent batch handed to the sink.
    pub last_batch_size: u64,
    /// Sink time of the most recent successful flush.
    pub last_flush_duration: Duration,
    /// Sink time summed over all successful flushes.
    pub total_flush_time: Duration,
}

#[derive(Debug, Default)]
pub(crate) struct CacheCounters {
    puts: AtomicU64,
    gets: AtomicU64,
    flushes: AtomicU64,
    flushed_entries: AtomicU64,
    failed_flushes: AtomicU64,
    caller_run_flushes: AtomicU64,
    backpressure_waits: AtomicU64,
    last_batch_size: AtomicU64,
    last_flush_micros: AtomicU64,
    total_flush_micros: AtomicU64,
}

fn as_micros(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX)
}

impl CacheCounters {
    pub(crate) fn record_puts(&self, count: usize) {
        self.puts.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_get(&self) {
        self.gets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_batch(&self, size: usize) {
        self.last_batch_size.store(size as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_flush(&self, size: usize, elapsed: Duration) {
        let micros = as_micros(elapsed);
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.flushed_entries
            .fetch_add(size as u64, Ordering::Relaxed);
        self.last_flush_micros.store(micros, Ordering::Relaxed);
        self.total_flush_micros.fetch_add(micros, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failed_flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_caller_run(&self) {
        self.caller_run_flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_backpressure_wait(&self) {
        self.backpressure_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            puts: self.puts.load(Ordering::Relaxed),
            gets: self.gets.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            flushed_entries: self.flushed_entries.load(Ordering::Relaxed),
            failed_flushes: self.failed_flushes.load(Ordering::Relaxed),
            caller_run_flushes: self.caller_run_flushes.load(Ordering::Relaxed),
            backpressure_waits: self.backpressure_waits.load(Ordering::Relaxed),
            last_batch_size: self.last_batch_size.load(Ordering::Relaxed),
            last_flush_duration: Duration::from_micros(
                self.last_flush_micros.load(Ordering::Relaxed),
            ),
            total_flush_time: Duration::from_micros(
                self.total_flush_micros.load(Ordering::Relaxed),
            ),
        }
    }
}
