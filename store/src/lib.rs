//! Location store interface and implementations.
//!
//! A store is append-only storage of [`Location`]s queryable by exact ID
//! and by geohash bucket. Provides an in-memory implementation for tests,
//! a redb-based implementation for persistence, and a no-op store.

pub mod error;
pub mod memory;
pub mod null;
pub mod redb;
pub mod registry;

use std::fmt;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use null::NullStore;
pub use placematch_location::Location;
pub use crate::redb::RedbStore;
pub use registry::{StoreConstructor, StoreRegistry};

/// Iterator over the locations of one geohash bucket.
pub type LocationIter<'a> = Box<dyn Iterator<Item = StoreResult<Location>> + Send + 'a>;

/// Location store trait.
///
/// Stores are written during ingestion and read concurrently during
/// comparison runs, so implementations must be safe for concurrent reads.
pub trait LocationStore: Send + Sync {
    /// Upsert a location keyed by its ID. Adding the same ID again replaces
    /// the earlier row, including its geohash bucket membership.
    fn add(&self, location: &Location) -> StoreResult<()>;

    /// Get a location by ID. Returns [`StoreError::NotFound`] if absent.
    fn get_by_id(&self, id: &str) -> StoreResult<Location>;

    /// Iterate the locations whose derived geohash equals `geohash`,
    /// in store-defined order.
    fn scan_geohash(&self, geohash: &str) -> StoreResult<LocationIter<'_>>;

    /// Call `visit` once per distinct geohash present in the store.
    fn get_geohashes(&self, visit: &mut dyn FnMut(&str) -> StoreResult<()>) -> StoreResult<()>;

    /// Call `visit` once per location in the `geohash` bucket. Stops at and
    /// returns the first error from either the store or `visit`.
    fn get_with_geohash(
        &self,
        geohash: &str,
        visit: &mut dyn FnMut(Location) -> StoreResult<()>,
    ) -> StoreResult<()> {
        for loc in self.scan_geohash(geohash)? {
            visit(loc?)?;
        }
        Ok(())
    }

    /// Release backing resources.
    fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}

impl fmt::Debug for dyn LocationStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LocationStore {{ ... }}")
    }
}
