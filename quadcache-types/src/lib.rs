//! # quadcache-types
//!
//! Plain spatial primitives shared by the spatio-quadcache index.
//!
//! - **Envelope**: axis-aligned bounding box with inclusive containment and
//!   intersection tests
//! - **Quadrant**: the four midpoint subdivisions of an envelope
//!
//! Coordinates are flat degrees (x = longitude, y = latitude). Nothing here
//! knows about the antimeridian or the poles.
//!
//! ## Examples
//!
//! ```rust
//! use quadcache_types::envelope::{Envelope, Quadrant};
//!
//! let world = Envelope::world();
//! let north_east = world.quadrant(Quadrant::NorthEast);
//! assert_eq!(north_east, Envelope::new(0.0, 180.0, 0.0, 90.0));
//! assert!(world.contains(&north_east));
//! ```

pub mod envelope;
