//! Concurrent quad-tree index over keyed geometries, plus a write-coalescing
//! cache for the store those geometries come from.
//!
//! ```rust
//! use quadcache::prelude::*;
//! use std::sync::Arc;
//!
//! // Index positions, resolve hits against a batched store.
//! let index = SpatialIndex::new(|p: &(f64, f64)| -> Result<Envelope> {
//!     Ok(Envelope::from_point(p.0, p.1))
//! });
//! let store = BatchingCache::new(
//!     Arc::new(MemorySink::<u32, (f64, f64)>::new()),
//!     BatchConfig::default(),
//! )?;
//!
//! let position = (-74.0060, 40.7128);
//! store.put(1, position)?;
//! index.upsert(1, &position)?;
//!
//! let hits = index.query(&Envelope::new(-75.0, -73.0, 40.0, 41.0))?;
//! for id in hits {
//!     assert_eq!(store.get(&id)?, Some(position));
//! }
//! # Ok::<(), quadcache::QuadCacheError>(())
//! ```

pub mod builder;
pub mod cache;
pub mod config;
pub mod error;
#[cfg(feature = "geojson")]
pub mod geojson;
pub mod geometry;
pub mod index;

pub use builder::CacheBuilder;
pub use cache::{BackingSink, BatchingCache, CacheStats, FlushHandle, MemorySink, SinkStats};
pub use config::{BatchConfig, Config, IndexConfig, MAX_TREE_DEPTH};
pub use error::{QuadCacheError, Result};
pub use geometry::{Geometry, GeometryExtractor};
pub use index::{IndexStats, SpatialIndex};

pub use quadcache_types::envelope::{Envelope, Quadrant};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{CacheBuilder, QuadCacheError, Result};

    pub use crate::{BatchingCache, SpatialIndex};

    pub use crate::{BackingSink, MemorySink};

    pub use crate::{BatchConfig, Config, IndexConfig};

    pub use crate::{Envelope, Geometry, GeometryExtractor};

    pub use std::time::Duration;
}
