use geo::{Point, Rect};
use serde::{Deserialize, Serialize};

/// A 2D axis-aligned bounding box.
///
/// Field order follows the `(min_x, max_x, min_y, max_y)` convention used by
/// the index. Containment and intersection are inclusive of the boundary, so
/// two boxes sharing an edge intersect and a box contains itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

/// One of the four equal subdivisions of an envelope, split at its midpoint.
///
/// ```text
/// NorthWest | NorthEast
/// ----------+----------
/// SouthWest | SouthEast
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quadrant {
    NorthWest = 0,
    NorthEast = 1,
    SouthWest = 2,
    SouthEast = 3,
}

impl Quadrant {
    /// Order in which child quadrants are tried during descent.
    ///
    /// A shape sitting exactly on a split line fits more than one child; the
    /// first match in this order wins, every time.
    pub const DESCENT_ORDER: [Quadrant; 4] = [
        Quadrant::SouthEast,
        Quadrant::SouthWest,
        Quadrant::NorthEast,
        Quadrant::NorthWest,
    ];

    /// Slot index of this quadrant in a node's child array.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl Envelope {
    /// Create a new envelope. Swapped bounds are normalised.
    ///
    /// # Examples
    ///
    /// ```
    /// use quadcache_types::envelope::Envelope;
    ///
    /// let a = Envelope::new(10.0, 0.0, 5.0, -5.0);
    /// assert_eq!(a.min_x, 0.0);
    /// assert_eq!(a.max_y, 5.0);
    /// ```
    pub fn new(x1: f64, x2: f64, y1: f64, y2: f64) -> Self {
        Self {
            min_x: x1.min(x2),
            max_x: x1.max(x2),
            min_y: y1.min(y2),
            max_y: y1.max(y2),
        }
    }

    /// The whole longitude/latitude plane, `[-180, 180] x [-90, 90]`.
    pub fn world() -> Self {
        Self::new(-180.0, 180.0, -90.0, 90.0)
    }

    /// A degenerate envelope covering a single coordinate.
    pub fn from_point(x: f64, y: f64) -> Self {
        Self {
            min_x: x,
            max_x: x,
            min_y: y,
            max_y: y,
        }
    }

    /// Create an envelope from a `geo::Rect`.
    pub fn from_rect(rect: &Rect<f64>) -> Self {
        Self::new(rect.min().x, rect.max().x, rect.min().y, rect.max().y)
    }

    /// Convert into a `geo::Rect`.
    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            geo::coord! { x: self.min_x, y: self.min_y },
            geo::coord! { x: self.max_x, y: self.max_y },
        )
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Get the center point of the envelope.
    pub fn center(&self) -> Point<f64> {
        Point::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// All four bounds are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.min_x.is_finite()
            && self.max_x.is_finite()
            && self.min_y.is_finite()
            && self.max_y.is_finite()
    }

    /// Check if a coordinate lies inside or on the boundary.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Check if `other` lies entirely inside this envelope (boundary inclusive).
    pub fn contains(&self, other: &Envelope) -> bool {
        other.min_x >= self.min_x
            && other.max_x <= self.max_x
            && other.min_y >= self.min_y
            && other.max_y <= self.max_y
    }

    /// Check if this envelope intersects with another (touching counts).
    pub fn intersects(&self, other: &Envelope) -> bool {
        !(self.max_x < other.min_x
            || self.min_x > other.max_x
            || self.max_y < other.min_y
            || self.min_y > other.max_y)
    }

    /// The sub-envelope for `quadrant`, split at the midpoint.
    pub fn quadrant(&self, quadrant: Quadrant) -> Envelope {
        let mid_x = (self.min_x + self.max_x) / 2.0;
        let mid_y = (self.min_y + self.max_y) / 2.0;

        match quadrant {
            Quadrant::NorthWest => Envelope::new(self.min_x, mid_x, mid_y, self.max_y),
            Quadrant::NorthEast => Envelope::new(mid_x, self.max_x, mid_y, self.max_y),
            Quadrant::SouthWest => Envelope::new(self.min_x, mid_x, self.min_y, mid_y),
            Quadrant::SouthEast => Envelope::new(mid_x, self.max_x, self.min_y, mid_y),
        }
    }

    /// Grow the envelope by `amount` in every direction.
    pub fn expand(&self, amount: f64) -> Self {
        Self::new(
            self.min_x - amount,
            self.max_x + amount,
            self.min_y - amount,
            self.max_y + amount,
        )
    }
}

impl From<Rect<f64>> for Envelope {
    fn from(rect: Rect<f64>) -> Self {
        Self::from_rect(&rect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quadrants_tile_parent() {
        let world = Envelope::world();
        let nw = world.quadrant(Quadrant::NorthWest);
        let se = world.quadrant(Quadrant::SouthEast);

        assert_eq!(nw, Envelope::new(-180.0, 0.0, 0.0, 90.0));
        assert_eq!(se, Envelope::new(0.0, 180.0, -90.0, 0.0));

        let area: f64 = Quadrant::DESCENT_ORDER
            .iter()
            .map(|q| {
                let e = world.quadrant(*q);
                e.width() * e.height()
            })
            .sum();
        assert_eq!(area, world.width() * world.height());
    }

    #[test]
    fn test_contains_is_inclusive() {
        let outer = Envelope::new(0.0, 10.0, 0.0, 10.0);
        assert!(outer.contains(&outer));
        assert!(outer.contains(&Envelope::from_point(10.0, 0.0)));
        assert!(!outer.contains(&Envelope::new(5.0, 10.5, 0.0, 1.0)));
    }

    #[test]
    fn test_intersects() {
        let a = Envelope::new(0.0, 10.0, 0.0, 10.0);
        let touching = Envelope::new(10.0, 20.0, 0.0, 10.0);
        let apart = Envelope::new(10.1, 20.0, 0.0, 10.0);

        assert!(a.intersects(&touching));
        assert!(touching.intersects(&a));
        assert!(!a.intersects(&apart));
    }

    #[test]
    fn test_non_finite_detected() {
        let bad = Envelope::from_point(f64::NAN, 1.0);
        assert!(!bad.is_finite());
        assert!(Envelope::world().is_finite());
    }

    #[test]
    fn test_rect_roundtrip_normalises() {
        let rect = Rect::new(geo::coord! { x: 5.0, y: 5.0 }, geo::coord! { x: -5.0, y: -1.0 });
        let envelope = Envelope::from(rect);
        assert_eq!(envelope, Envelope::new(-5.0, 5.0, -1.0, 5.0));
        assert_eq!(Envelope::from_rect(&envelope.to_rect()), envelope);
    }
}
