//! Configuration for the spatial index and the batching cache.
//!
//! Every type here is serde-serializable so deployments can load settings from
//! JSON (or TOML with the `toml` feature) instead of wiring them in code.

use crate::error::{QuadCacheError, Result};
use quadcache_types::envelope::Envelope;
use serde::de::Error;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Deepest tree the index will build. Past this the cells are far below
/// floating point noise for degree coordinates.
pub const MAX_TREE_DEPTH: u8 = 32;

/// Quad-tree index configuration.
///
/// The default depth of 16 over the world envelope gives a smallest cell of
/// roughly 611 meters at the equator (earth circumference / 2^16).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Levels below the root the tree may grow.
    #[serde(default = "IndexConfig::default_max_depth")]
    pub max_depth: u8,

    /// Root envelope. Geometries must fit inside it to be indexed.
    #[serde(default = "Envelope::world")]
    pub bounds: Envelope,
}

impl IndexConfig {
    const fn default_max_depth() -> u8 {
        16
    }

    pub fn with_max_depth(mut self, max_depth: u8) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_bounds(mut self, bounds: Envelope) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_depth > MAX_TREE_DEPTH {
            return Err(QuadCacheError::InvalidConfig(format!(
                "max_depth must be at most {}, got {}",
                MAX_TREE_DEPTH, self.max_depth
            )));
        }

        if !self.bounds.is_finite() {
            return Err(QuadCacheError::InvalidConfig(
                "Index bounds must be finite".to_string(),
            ));
        }

        if self.bounds.width() <= 0.0 || self.bounds.height() <= 0.0 {
            return Err(QuadCacheError::InvalidConfig(
                "Index bounds must have a positive area".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_depth: Self::default_max_depth(),
            bounds: Envelope::world(),
        }
    }
}

/// Batching cache configuration.
///
/// # Example
///
/// ```rust
/// use quadcache::BatchConfig;
///
/// let json = r#"{
///     "batch_size": 500,
///     "flush_interval_ms": 250,
///     "async_mode": true
/// }"#;
/// let config: BatchConfig = serde_json::from_str(json).unwrap();
/// assert_eq!(config.worker_threads, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Staged entry count that triggers a flush.
    #[serde(default = "BatchConfig::default_batch_size")]
    pub batch_size: usize,

    /// Period of the background flush timer. Zero disables the timer.
    #[serde(default = "BatchConfig::default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Hand flushes to the worker pool instead of writing on the caller.
    #[serde(default)]
    pub async_mode: bool,

    /// Worker threads in the flush pool (async mode only).
    #[serde(default = "BatchConfig::default_worker_threads")]
    pub worker_threads: usize,

    /// Jobs the flush pool queues before refusing; refused flushes run on
    /// the caller.
    #[serde(default = "BatchConfig::default_queue_capacity")]
    pub queue_capacity: usize,
}

impl BatchConfig {
    const fn default_batch_size() -> usize {
        100
    }

    const fn default_flush_interval_ms() -> u64 {
        1000
    }

    const fn default_worker_threads() -> usize {
        2
    }

    const fn default_queue_capacity() -> usize {
        4
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_async_mode(mut self, async_mode: bool) -> Self {
        self.async_mode = async_mode;
        self
    }

    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Flush timer period, `None` when the timer is disabled.
    pub fn flush_interval(&self) -> Option<Duration> {
        (self.flush_interval_ms > 0).then(|| Duration::from_millis(self.flush_interval_ms))
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(QuadCacheError::InvalidConfig(
                "batch_size must be greater than zero".to_string(),
            ));
        }

        if self.async_mode {
            if self.worker_threads == 0 {
                return Err(QuadCacheError::InvalidConfig(
                    "worker_threads must be greater than zero in async mode".to_string(),
                ));
            }
            if self.queue_capacity == 0 {
                return Err(QuadCacheError::InvalidConfig(
                    "queue_capacity must be greater than zero in async mode".to_string(),
                ));
            }
        }

        Ok(())
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: Self::default_batch_size(),
            flush_interval_ms: Self::default_flush_interval_ms(),
            async_mode: false,
            worker_threads: Self::default_worker_threads(),
            queue_capacity: Self::default_queue_capacity(),
        }
    }
}

/// Combined configuration for an application running both components.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub batch: BatchConfig,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        self.index.validate()?;
        self.batch.validate()
    }

    /// Load configuration from JSON string
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        let config: Config = serde_json::from_str(json)?;
        config.validate().map_err(serde_json::Error::custom)?;
        Ok(config)
    }

    /// Save configuration as JSON string
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load configuration from TOML string (requires toml feature)
    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> std::result::Result<Self, toml::de::Error> {
        let config: Config = toml::from_str(toml_str)?;
        config.validate().map_err(toml::de::Error::custom)?;
        Ok(config)
    }

    /// Save configuration as TOML string (requires toml feature)
    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.index.max_depth, 16);
        assert_eq!(config.index.bounds, Envelope::world());
        assert_eq!(config.batch.batch_size, 100);
        assert_eq!(config.batch.flush_interval_ms, 1000);
        assert!(!config.batch.async_mode);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config {
            index: IndexConfig::default()
                .with_max_depth(8)
                .with_bounds(Envelope::new(-10.0, 10.0, -5.0, 5.0)),
            batch: BatchConfig::default()
                .with_batch_size(10)
                .with_flush_interval(Duration::from_millis(50))
                .with_async_mode(true),
        };

        let json = config.to_json().unwrap();
        let deserialized = Config::from_json(&json).unwrap();
        assert_eq!(deserialized, config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = Config::from_json(r#"{ "batch": { "batch_size": 7 } }"#).unwrap();
        assert_eq!(config.batch.batch_size, 7);
        assert_eq!(config.batch.queue_capacity, 4);
        assert_eq!(config.index, IndexConfig::default());
    }

    #[test]
    fn test_invalid_json_rejected() {
        assert!(Config::from_json(r#"{ "batch": { "batch_size": 0 } }"#).is_err());
        assert!(Config::from_json(r#"{ "index": { "max_depth": 64 } }"#).is_err());
    }

    #[test]
    fn test_async_requires_workers() {
        let config = BatchConfig::default()
            .with_async_mode(true)
            .with_worker_threads(0);
        assert!(matches!(
            config.validate(),
            Err(QuadCacheError::InvalidConfig(_))
        ));

        // Worker settings are ignored in sync mode.
        assert!(config.with_async_mode(false).validate().is_ok());
    }

    #[test]
    fn test_degenerate_bounds_rejected() {
        let config = IndexConfig::default().with_bounds(Envelope::from_point(1.0, 1.0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_flush_interval_zero_disables_timer() {
        let config = BatchConfig::default().with_flush_interval(Duration::ZERO);
        assert!(config.flush_interval().is_none());
        assert_eq!(
            BatchConfig::default().flush_interval(),
            Some(Duration::from_secs(1))
        );
    }

    #[cfg(feature = "toml")]
    #[test]
    fn test_toml_roundtrip() {
        let config = Config::default();
        let text = config.to_toml().unwrap();
        assert_eq!(Config::from_toml(&text).unwrap(), config);
    }
}
