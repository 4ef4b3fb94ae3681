//! Redb-based persistent location store.
//!
//! Table layout:
//!
//! ```text
//! locations:      {id}                 -> msgpack Location
//! geohash_index:  {geohash}\x1f{id}    -> empty
//! ```
//!
//! The index keys sort by geohash first, so a bucket is one contiguous
//! range and distinct geohashes fall out of a single ordered scan.

use std::collections::VecDeque;
use std::ops::Bound;
use std::path::Path;

use ::redb::{Database, ReadableTable, TableDefinition};
use placematch_location::Location;

use crate::error::{StoreError, StoreResult, storage};
use crate::{LocationIter, LocationStore};

const LOCATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("locations");
const GEOHASH_INDEX: TableDefinition<&str, &[u8]> = TableDefinition::new("geohash_index");

/// Separator between geohash and ID in index keys. IDs may contain ':'.
const SEP: char = '\x1f';

/// Rows fetched per read transaction while scanning a bucket.
const PAGE_SIZE: usize = 256;

fn index_key(geohash: &str, id: &str) -> String {
    format!("{geohash}{SEP}{id}")
}

fn bucket_prefix(geohash: &str) -> String {
    format!("{geohash}{SEP}")
}

fn encode(location: &Location) -> StoreResult<Vec<u8>> {
    rmp_serde::to_vec_named(location).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode(data: &[u8]) -> StoreResult<Location> {
    rmp_serde::from_slice(data).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// A persistent location store backed by redb.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open or create a redb store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = Database::create(path).map_err(storage)?;

        // Create the tables if they don't exist
        let tx = db.begin_write().map_err(storage)?;
        {
            tx.open_table(LOCATIONS).map_err(storage)?;
            tx.open_table(GEOHASH_INDEX).map_err(storage)?;
        }
        tx.commit().map_err(storage)?;

        Ok(Self { db })
    }

    /// Read the next page of a bucket, starting after `cursor`.
    fn read_page(
        &self,
        prefix: &str,
        cursor: Option<&str>,
    ) -> StoreResult<(Vec<Location>, Option<String>, bool)> {
        let tx = self.db.begin_read().map_err(storage)?;
        let index = tx.open_table(GEOHASH_INDEX).map_err(storage)?;
        let locations = tx.open_table(LOCATIONS).map_err(storage)?;

        let start = match cursor {
            Some(c) => Bound::Excluded(c),
            None => Bound::Included(prefix),
        };
        let range = index
            .range::<&str>((start, Bound::Unbounded))
            .map_err(storage)?;

        let mut page = Vec::new();
        let mut last = None;
        let mut exhausted = true;
        for item in range {
            let (key, _) = item.map_err(storage)?;
            let key = key.value();
            let Some(id) = key.strip_prefix(prefix) else {
                break;
            };
            if page.len() == PAGE_SIZE {
                exhausted = false;
                break;
            }
            let row = locations
                .get(id)
                .map_err(storage)?
                .ok_or_else(|| StoreError::Storage(format!("dangling index entry for {id}")))?;
            page.push(decode(row.value())?);
            last = Some(key.to_string());
        }
        Ok((page, last, exhausted))
    }
}

/// Paged iterator over one geohash bucket. Each page is read in its own
/// transaction so a bucket is never materialized all at once.
struct BucketIter<'a> {
    store: &'a RedbStore,
    prefix: String,
    cursor: Option<String>,
    buf: VecDeque<Location>,
    done: bool,
}

impl Iterator for BucketIter<'_> {
    type Item = StoreResult<Location>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.is_empty() && !self.done {
            match self.store.read_page(&self.prefix, self.cursor.as_deref()) {
                Ok((page, last, exhausted)) => {
                    self.buf.extend(page);
                    if last.is_some() {
                        self.cursor = last;
                    }
                    self.done = exhausted;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        self.buf.pop_front().map(Ok)
    }
}

impl LocationStore for RedbStore {
    fn add(&self, location: &Location) -> StoreResult<()> {
        let data = encode(location)?;
        let geohash = location.geohash();

        let tx = self.db.begin_write().map_err(storage)?;
        {
            let mut locations = tx.open_table(LOCATIONS).map_err(storage)?;
            let mut index = tx.open_table(GEOHASH_INDEX).map_err(storage)?;

            let old_hash = match locations.get(location.id()).map_err(storage)? {
                Some(old) => Some(decode(old.value())?.geohash()),
                None => None,
            };
            if let Some(old_hash) = old_hash {
                if old_hash != geohash {
                    index
                        .remove(index_key(&old_hash, location.id()).as_str())
                        .map_err(storage)?;
                }
            }

            locations
                .insert(location.id(), data.as_slice())
                .map_err(storage)?;
            index
                .insert(index_key(&geohash, location.id()).as_str(), b"".as_slice())
                .map_err(storage)?;
        }
        tx.commit().map_err(storage)?;
        Ok(())
    }

    fn get_by_id(&self, id: &str) -> StoreResult<Location> {
        let tx = self.db.begin_read().map_err(storage)?;
        let table = tx.open_table(LOCATIONS).map_err(storage)?;

        match table.get(id).map_err(storage)? {
            Some(value) => decode(value.value()),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    fn scan_geohash(&self, geohash: &str) -> StoreResult<LocationIter<'_>> {
        Ok(Box::new(BucketIter {
            store: self,
            prefix: bucket_prefix(geohash),
            cursor: None,
            buf: VecDeque::new(),
            done: false,
        }))
    }

    fn get_geohashes(&self, visit: &mut dyn FnMut(&str) -> StoreResult<()>) -> StoreResult<()> {
        let tx = self.db.begin_read().map_err(storage)?;
        let index = tx.open_table(GEOHASH_INDEX).map_err(storage)?;

        let mut last: Option<String> = None;
        for item in index.iter().map_err(storage)? {
            let (key, _) = item.map_err(storage)?;
            let key = key.value();
            let Some((geohash, _)) = key.split_once(SEP) else {
                continue;
            };
            if last.as_deref() == Some(geohash) {
                continue;
            }
            visit(geohash)?;
            last = Some(geohash.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use placematch_location::Point;
    use tempfile::tempdir;

    fn loc(id: &str, lon: f64, lat: f64) -> Location {
        Location::new(id, format!("place {id}"), Point::new(lon, lat))
            .unwrap()
            .with_address("1 Main St")
    }

    fn bucket(store: &RedbStore, geohash: &str) -> Vec<String> {
        store
            .scan_geohash(geohash)
            .unwrap()
            .map(|l| l.unwrap().id().to_string())
            .collect()
    }

    #[test]
    fn test_redb_basic() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("test.redb")).unwrap();

        let l = loc("wof:id=1", -73.60033, 45.524115).with_custom("src", "wof");
        store.add(&l).unwrap();
        assert_eq!(store.get_by_id("wof:id=1").unwrap(), l);
        assert!(matches!(
            store.get_by_id("wof:id=2"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_redb_idempotent_and_moves() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("test.redb")).unwrap();

        let montreal = loc("a:1", -73.60033, 45.524115);
        store.add(&montreal).unwrap();
        store.add(&montreal).unwrap();
        assert_eq!(bucket(&store, "f25dv"), vec!["a:1"]);

        store.add(&loc("a:1", -79.3832, 43.6532)).unwrap();
        assert!(bucket(&store, "f25dv").is_empty());
        assert_eq!(bucket(&store, "dpz83"), vec!["a:1"]);
    }

    #[test]
    fn test_redb_geohashes_distinct() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("test.redb")).unwrap();

        store.add(&loc("a:1", -73.60033, 45.524115)).unwrap();
        store.add(&loc("a:2", -73.5875, 45.52)).unwrap();
        store.add(&loc("a:3", -79.3832, 43.6532)).unwrap();

        let mut hashes = Vec::new();
        store
            .get_geohashes(&mut |h| {
                hashes.push(h.to_string());
                Ok(())
            })
            .unwrap();
        assert_eq!(hashes, vec!["dpz83", "f25dv"]);
    }

    #[test]
    fn test_redb_scan_spans_pages() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("test.redb")).unwrap();

        let n = PAGE_SIZE * 2 + 7;
        for i in 0..n {
            store
                .add(&loc(&format!("a:{i:04}"), -73.60033, 45.524115))
                .unwrap();
        }
        // A neighbouring bucket must not leak into the scan.
        store.add(&loc("b:1", -79.3832, 43.6532)).unwrap();

        let ids = bucket(&store, "f25dv");
        assert_eq!(ids.len(), n);
        assert_eq!(ids.first().map(String::as_str), Some("a:0000"));
    }

    #[test]
    fn test_redb_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.redb");
        {
            let store = RedbStore::open(&path).unwrap();
            store.add(&loc("a:1", -73.60033, 45.524115)).unwrap();
        }
        let store = RedbStore::open(&path).unwrap();
        assert_eq!(bucket(&store, "f25dv"), vec!["a:1"]);
    }
}
