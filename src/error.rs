//! Error types for the index and the batching cache.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, QuadCacheError>;

#[derive(Debug, Error)]
pub enum QuadCacheError {
    /// Geometry that cannot be indexed or queried (non-finite, out of bounds).
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The backing sink rejected an operation.
    #[error("Backing sink error: {0}")]
    Sink(String),

    /// A bulk write of staged entries did not reach the backing sink.
    #[error("Flush failed: {0}")]
    FlushFailed(String),

    #[error("Failed to spawn worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    #[error("Cache is closed")]
    Closed,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
