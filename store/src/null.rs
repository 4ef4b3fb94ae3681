//! A store that accepts writes and never returns anything.
//!
//! Useful as a sink for dry-run ingestion and as a placeholder target.

use placematch_location::Location;

use crate::error::{StoreError, StoreResult};
use crate::{LocationIter, LocationStore};

#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

impl LocationStore for NullStore {
    fn add(&self, _location: &Location) -> StoreResult<()> {
        Ok(())
    }

    fn get_by_id(&self, id: &str) -> StoreResult<Location> {
        Err(StoreError::NotFound(id.to_string()))
    }

    fn scan_geohash(&self, _geohash: &str) -> StoreResult<LocationIter<'_>> {
        Ok(Box::new(std::iter::empty()))
    }

    fn get_geohashes(&self, _visit: &mut dyn FnMut(&str) -> StoreResult<()>) -> StoreResult<()> {
        Ok(())
    }
}
