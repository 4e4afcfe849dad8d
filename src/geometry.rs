//! Geometry capability consumed by the spatial index.
//!
//! The index only ever asks a shape for its envelope and whether it
//! intersects another shape of the same kind. Real geometry math comes from
//! the `geo` crate; the impls below just adapt its types.

use crate::error::{QuadCacheError, Result};
use geo::{BoundingRect, Intersects};
use quadcache_types::envelope::Envelope;

/// A shape the index can store and query with.
pub trait Geometry: Clone + Send + Sync {
    /// Axis-aligned bounding box. Shapes without extent (empty collections)
    /// report a non-finite envelope and are rejected by the index.
    fn envelope(&self) -> Envelope;

    /// Exact intersection test, boundary inclusive.
    fn intersects(&self, other: &Self) -> bool;
}

/// Turns a cached value into the geometry it should be indexed under.
///
/// Bound once when the index is built. Any `Fn(&V) -> Result<G>` closure
/// works:
///
/// ```rust
/// use quadcache::{GeometryExtractor, Result};
///
/// struct Vehicle { lng: f64, lat: f64 }
///
/// let extractor = |v: &Vehicle| -> Result<geo::Point<f64>> { Ok(geo::Point::new(v.lng, v.lat)) };
/// let point = extractor.extract(&Vehicle { lng: 1.0, lat: 2.0 }).unwrap();
/// assert_eq!(point.y(), 2.0);
/// ```
pub trait GeometryExtractor<V, G>: Send + Sync {
    fn extract(&self, value: &V) -> Result<G>;
}

impl<V, G, F> GeometryExtractor<V, G> for F
where
    F: Fn(&V) -> Result<G> + Send + Sync,
{
    fn extract(&self, value: &V) -> Result<G> {
        self(value)
    }
}

fn unbounded() -> Envelope {
    Envelope::from_point(f64::NAN, f64::NAN)
}

/// Reject envelopes the tree cannot place.
pub fn validate_envelope(envelope: &Envelope) -> Result<()> {
    if !envelope.is_finite() {
        return Err(QuadCacheError::InvalidGeometry(format!(
            "Envelope must be finite, got: {:?}",
            envelope
        )));
    }
    Ok(())
}

impl Geometry for Envelope {
    fn envelope(&self) -> Envelope {
        *self
    }

    fn intersects(&self, other: &Self) -> bool {
        Envelope::intersects(self, other)
    }
}

impl Geometry for geo::Geometry<f64> {
    fn envelope(&self) -> Envelope {
        self.bounding_rect()
            .map(|rect| Envelope::from_rect(&rect))
            .unwrap_or_else(unbounded)
    }

    fn intersects(&self, other: &Self) -> bool {
        Intersects::intersects(self, other)
    }
}

impl Geometry for geo::Point<f64> {
    fn envelope(&self) -> Envelope {
        Envelope::from_point(self.x(), self.y())
    }

    fn intersects(&self, other: &Self) -> bool {
        self == other
    }
}

impl Geometry for geo::Polygon<f64> {
    fn envelope(&self) -> Envelope {
        self.bounding_rect()
            .map(|rect| Envelope::from_rect(&rect))
            .unwrap_or_else(unbounded)
    }

    fn intersects(&self, other: &Self) -> bool {
        Intersects::intersects(self, other)
    }
}

impl Geometry for geo::Rect<f64> {
    fn envelope(&self) -> Envelope {
        Envelope::from_rect(self)
    }

    fn intersects(&self, other: &Self) -> bool {
        Intersects::intersects(self, other)
    }
}
