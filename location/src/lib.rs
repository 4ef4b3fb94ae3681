//! Canonical location model shared by every placematch crate.
//!
//! A [`Location`] is built once per source record and treated as immutable
//! value data afterwards. Its [`Location::geohash`] is derived from the
//! centroid and is the sharding key for matching runs.

pub mod error;
pub mod geohash;
pub mod location;

pub use error::LocationError;
pub use geohash::GEOHASH_PRECISION;
pub use location::{Location, Point, RESERVED_GEOHASH_KEY};
