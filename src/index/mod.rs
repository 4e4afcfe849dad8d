//! Mutable, concurrent quad-tree index over keyed geometries.
//!
//! The index keeps only keys and geometries. Values are handed to the
//! configured [`GeometryExtractor`] on upsert and never retained, so callers
//! resolve query hits against their own store.
//!
//! # Known limitation
//!
//! Coordinates are treated as a flat plane. Geometries or query regions that
//! cross the antimeridian (±180° longitude) or enclose a pole are not split
//! into pieces; they are indexed and queried as the single (wrong) box their
//! raw coordinates describe. Callers that need those cases must cut the shape
//! themselves before handing it over.

mod quad;

pub use quad::IndexStats;

use crate::config::IndexConfig;
use crate::error::{QuadCacheError, Result};
use crate::geometry::{Geometry, GeometryExtractor, validate_envelope};
use parking_lot::RwLock;
use quad::QuadTree;
use quadcache_types::envelope::Envelope;
use rustc_hash::FxHashSet;
use std::fmt;
use std::hash::Hash;

/// Thread-safe quad-tree index mapping keys to geometries.
///
/// One readers-writer lock guards the whole tree: `upsert`, `remove`,
/// `clear` and `rebuild` take it exclusively, `query` and the read accessors
/// share it. Operations on the same key are therefore linearised.
///
/// # Examples
///
/// ```rust
/// use quadcache::{Envelope, IndexConfig, Result, SpatialIndex};
///
/// struct Vehicle { lng: f64, lat: f64 }
///
/// let index = SpatialIndex::with_config(
///     IndexConfig::default().with_max_depth(4),
///     |v: &Vehicle| -> Result<Envelope> { Ok(Envelope::from_point(v.lng, v.lat)) },
/// )?;
///
/// index.upsert("a", &Vehicle { lng: 10.0, lat: 10.0 })?;
///
/// let hits = index.query(&Envelope::new(0.0, 20.0, 0.0, 20.0))?;
/// assert!(hits.contains("a"));
/// assert!(index.query(&Envelope::new(30.0, 40.0, 30.0, 40.0))?.is_empty());
/// # Ok::<(), quadcache::QuadCacheError>(())
/// ```
pub struct SpatialIndex<K, V, G> {
    tree: RwLock<QuadTree<K, G>>,
    extractor: Box<dyn GeometryExtractor<V, G>>,
    config: IndexConfig,
}

impl<K, V, G> SpatialIndex<K, V, G>
where
    K: Eq + Hash + Clone + Send + Sync,
    G: Geometry,
{
    /// Index over the world envelope with the default depth.
    pub fn new(extractor: impl GeometryExtractor<V, G> + 'static) -> Self {
        let config = IndexConfig::default();
        Self {
            tree: RwLock::new(QuadTree::new(config.bounds, config.max_depth)),
            extractor: Box::new(extractor),
            config,
        }
    }

    pub fn with_config(
        config: IndexConfig,
        extractor: impl GeometryExtractor<V, G> + 'static,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            tree: RwLock::new(QuadTree::new(config.bounds, config.max_depth)),
            extractor: Box::new(extractor),
            config,
        })
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Extract and validate a geometry without touching the tree.
    fn prepare(&self, value: &V) -> Result<G> {
        let geometry = self.extractor.extract(value)?;
        let envelope = geometry.envelope();
        validate_envelope(&envelope)?;

        if !self.config.bounds.contains(&envelope) {
            return Err(QuadCacheError::InvalidGeometry(format!(
                "Envelope {:?} lies outside index bounds {:?}",
                envelope, self.config.bounds
            )));
        }

        Ok(geometry)
    }

    /// Insert or replace the geometry indexed under `key`.
    ///
    /// The geometry is extracted and validated before the lock is taken; a
    /// rejected value leaves any previous entry for `key` in place.
    pub fn upsert(&self, key: K, value: &V) -> Result<()> {
        let geometry = self.prepare(value)?;

        let mut tree = self.tree.write();
        tree.remove(&key);
        tree.insert(key, geometry);
        Ok(())
    }

    /// Upsert many entries under one exclusive lock.
    ///
    /// Every value is validated first; if any is rejected nothing is written.
    pub fn upsert_all<'a, I>(&self, entries: I) -> Result<usize>
    where
        I: IntoIterator<Item = (K, &'a V)>,
        V: 'a,
    {
        let prepared = self.prepare_all(entries)?;
        let count = prepared.len();

        let mut tree = self.tree.write();
        for (key, geometry) in prepared {
            tree.remove(&key);
            tree.insert(key, geometry);
        }
        Ok(count)
    }

    fn prepare_all<'a, I>(&self, entries: I) -> Result<Vec<(K, G)>>
    where
        I: IntoIterator<Item = (K, &'a V)>,
        V: 'a,
    {
        entries
            .into_iter()
            .map(|(key, value)| Ok((key, self.prepare(value)?)))
            .collect()
    }

    /// Remove `key` from the index. Returns whether it was present.
    pub fn remove(&self, key: &K) -> bool {
        self.tree.write().remove(key).is_some()
    }

    /// Remove every listed key. Returns how many were present.
    pub fn remove_all<'a, I>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = &'a K>,
        K: 'a,
    {
        let mut tree = self.tree.write();
        keys.into_iter()
            .filter(|key| tree.remove(key).is_some())
            .count()
    }

    /// Keys whose geometry intersects `region`.
    ///
    /// Bounding boxes only prune the walk; every candidate is confirmed with
    /// the exact [`Geometry::intersects`] test.
    pub fn query(&self, region: &G) -> Result<FxHashSet<K>> {
        let envelope = region.envelope();
        if let Err(e) = validate_envelope(&envelope) {
            log::warn!("Rejecting spatial query: {}", e);
            return Err(e);
        }

        Ok(self.tree.read().query(region))
    }

    /// Drop every entry and all tree nodes.
    pub fn clear(&self) {
        let mut tree = self.tree.write();
        let dropped = tree.len();
        tree.clear();
        log::debug!("Cleared spatial index ({} entries dropped)", dropped);
    }

    /// Replace the whole contents with `entries` in one exclusive step.
    ///
    /// Used for full re-synchronisation: readers see either the old data or
    /// the new data, never a half-built tree. On a rejected value the index
    /// is left as it was.
    pub fn rebuild<'a, I>(&self, entries: I) -> Result<usize>
    where
        I: IntoIterator<Item = (K, &'a V)>,
        V: 'a,
    {
        let prepared = self.prepare_all(entries)?;
        let count = prepared.len();

        let mut tree = self.tree.write();
        tree.clear();
        for (key, geometry) in prepared {
            tree.remove(&key);
            tree.insert(key, geometry);
        }
        log::debug!("Rebuilt spatial index with {} entries", tree.len());
        Ok(count)
    }

    /// Snapshot of every indexed key.
    pub fn key_set(&self) -> FxHashSet<K> {
        self.tree.read().keys()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.tree.read().contains_key(key)
    }

    /// Geometry currently indexed under `key`.
    pub fn geometry(&self, key: &K) -> Option<G> {
        self.tree.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.tree.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bounds(&self) -> Envelope {
        self.tree.read().bounds()
    }

    pub fn stats(&self) -> IndexStats {
        self.tree.read().stats()
    }
}

#[cfg(feature = "geojson")]
impl<K, V> SpatialIndex<K, V, geo::Geometry<f64>>
where
    K: Eq + Hash + Clone + Send + Sync,
{
    /// Query with a region given as a GeoJSON geometry or feature.
    pub fn query_geojson(&self, geojson: &str) -> Result<FxHashSet<K>> {
        let region = crate::geojson::geometry_from_geojson(geojson)?;
        self.query(&region)
    }

    /// Geometry indexed under `key`, serialized as a GeoJSON geometry.
    pub fn geometry_geojson(&self, key: &K) -> Result<Option<String>> {
        self.geometry(key)
            .map(|geometry| crate::geojson::geometry_to_geojson(&geometry))
            .transpose()
    }
}

impl<K, V, G> fmt::Debug for SpatialIndex<K, V, G>
where
    K: Eq + Hash + Clone + Send + Sync,
    G: Geometry,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpatialIndex")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}
