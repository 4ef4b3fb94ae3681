//! In-memory location store for tests and small datasets.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use placematch_location::Location;

use crate::error::{StoreError, StoreResult, storage};
use crate::{LocationIter, LocationStore};

#[derive(Default)]
struct Inner {
    by_id: HashMap<String, Location>,
    by_geohash: BTreeMap<String, BTreeSet<String>>,
}

/// A location store backed by a HashMap plus a geohash bucket index.
///
/// Clones share the same underlying data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored locations.
    pub fn len(&self) -> usize {
        self.inner.read().map(|g| g.by_id.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LocationStore for MemoryStore {
    fn add(&self, location: &Location) -> StoreResult<()> {
        let mut guard = self.inner.write().map_err(storage)?;
        let inner = &mut *guard;
        let geohash = location.geohash();

        if let Some(old_hash) = inner.by_id.get(location.id()).map(Location::geohash) {
            if old_hash != geohash {
                if let Some(bucket) = inner.by_geohash.get_mut(&old_hash) {
                    bucket.remove(location.id());
                    if bucket.is_empty() {
                        inner.by_geohash.remove(&old_hash);
                    }
                }
            }
        }

        inner
            .by_geohash
            .entry(geohash)
            .or_default()
            .insert(location.id().to_string());
        inner
            .by_id
            .insert(location.id().to_string(), location.clone());
        Ok(())
    }

    fn get_by_id(&self, id: &str) -> StoreResult<Location> {
        let inner = self.inner.read().map_err(storage)?;
        inner
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn scan_geohash(&self, geohash: &str) -> StoreResult<LocationIter<'_>> {
        let inner = self.inner.read().map_err(storage)?;
        let rows: Vec<StoreResult<Location>> = match inner.by_geohash.get(geohash) {
            Some(ids) => ids
                .iter()
                .filter_map(|id| inner.by_id.get(id).cloned())
                .map(Ok)
                .collect(),
            None => Vec::new(),
        };
        Ok(Box::new(rows.into_iter()))
    }

    fn get_geohashes(&self, visit: &mut dyn FnMut(&str) -> StoreResult<()>) -> StoreResult<()> {
        let hashes: Vec<String> = {
            let inner = self.inner.read().map_err(storage)?;
            inner.by_geohash.keys().cloned().collect()
        };
        for h in &hashes {
            visit(h)?;
        }
        Ok(())
    }
}
