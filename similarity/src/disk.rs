//! Vectors kept in a redb file inside a per-shard temporary directory.
//!
//! The directory lives exactly as long as the index: it is removed on
//! [`VectorStore::close`] or when the store is dropped, whichever comes
//! first, so no exit path leaves shard files behind.

use std::path::{Path, PathBuf};

use ::redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use crate::error::{SimilarityError, storage};
use crate::index::Neighbor;
use crate::vectors::{VectorStore, by_distance, cosine_distance};

const VECTORS: TableDefinition<&str, &[u8]> = TableDefinition::new("vectors");

/// Placeholder substituted with the shard's geohash in path templates.
pub const GEOHASH_PLACEHOLDER: &str = "{geohash}";

#[derive(Serialize, Deserialize)]
struct VectorRow {
    content: String,
    vector: Vec<f32>,
}

struct Backing {
    db: Database,
    dir: TempDir,
}

pub struct RedbVectors {
    dim: usize,
    backing: Mutex<Option<Backing>>,
}

impl RedbVectors {
    /// Create a store for `geohash`.
    ///
    /// With a `template` such as `/var/tmp/pm-{geohash}`, the placeholder is
    /// replaced by the geohash and the result names the parent directory and
    /// prefix of the temporary directory. A random suffix keeps two stores
    /// for the same shard apart.
    pub fn create(dim: usize, geohash: &str, template: Option<&str>) -> Result<Self, SimilarityError> {
        let (parent, prefix) = match template {
            Some(t) => split_template(&t.replace(GEOHASH_PLACEHOLDER, geohash)),
            None => (std::env::temp_dir(), format!("placematch-{geohash}-")),
        };
        std::fs::create_dir_all(&parent).map_err(storage)?;
        let dir = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir_in(&parent)
            .map_err(storage)?;

        let db = Database::create(dir.path().join("vectors.redb")).map_err(storage)?;
        let tx = db.begin_write().map_err(storage)?;
        {
            tx.open_table(VECTORS).map_err(storage)?;
        }
        tx.commit().map_err(storage)?;

        Ok(Self {
            dim,
            backing: Mutex::new(Some(Backing { db, dir })),
        })
    }

    /// Directory holding the shard file, while open.
    pub fn path(&self) -> Option<PathBuf> {
        self.backing.lock().as_ref().map(|b| b.dir.path().to_path_buf())
    }
}

fn split_template(path: &str) -> (PathBuf, String) {
    let p = Path::new(path);
    let parent = match p.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => std::env::temp_dir(),
    };
    let name = p
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "placematch".to_string());
    (parent, format!("{name}-"))
}

impl VectorStore for RedbVectors {
    fn insert(&self, id: &str, content: &str, vector: &[f32]) -> Result<(), SimilarityError> {
        if vector.len() != self.dim {
            return Err(SimilarityError::DimensionMismatch {
                got: vector.len(),
                want: self.dim,
            });
        }
        let row = rmp_serde::to_vec(&VectorRow {
            content: content.to_string(),
            vector: vector.to_vec(),
        })
        .map_err(storage)?;

        let guard = self.backing.lock();
        let backing = guard.as_ref().ok_or(SimilarityError::Closed)?;
        let tx = backing.db.begin_write().map_err(storage)?;
        {
            let mut table = tx.open_table(VECTORS).map_err(storage)?;
            table.insert(id, row.as_slice()).map_err(storage)?;
        }
        tx.commit().map_err(storage)?;
        Ok(())
    }

    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<Neighbor>, SimilarityError> {
        let guard = self.backing.lock();
        let backing = guard.as_ref().ok_or(SimilarityError::Closed)?;
        if top_k == 0 {
            return Ok(vec![]);
        }

        let tx = backing.db.begin_read().map_err(storage)?;
        let table = tx.open_table(VECTORS).map_err(storage)?;

        let mut results = Vec::new();
        for item in table.iter().map_err(storage)? {
            let (id, data) = item.map_err(storage)?;
            let row: VectorRow = rmp_serde::from_slice(data.value()).map_err(storage)?;
            results.push(Neighbor {
                id: id.value().to_string(),
                similarity: cosine_distance(query, &row.vector),
                content: row.content,
            });
        }
        results.sort_by(by_distance);
        results.truncate(top_k);
        Ok(results)
    }

    fn len(&self) -> usize {
        let guard = self.backing.lock();
        let Some(backing) = guard.as_ref() else {
            return 0;
        };
        let Ok(tx) = backing.db.begin_read() else {
            return 0;
        };
        let Ok(table) = tx.open_table(VECTORS) else {
            return 0;
        };
        table.len().map(|n| n as usize).unwrap_or(0)
    }

    fn close(&self) -> Result<(), SimilarityError> {
        let Some(Backing { db, dir }) = self.backing.lock().take() else {
            return Ok(());
        };
        drop(db);
        dir.close().map_err(storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_search_close() {
        let v = RedbVectors::create(2, "f25dv", None).unwrap();
        v.insert("a", "A", &[1.0, 0.0]).unwrap();
        v.insert("b", "B", &[0.0, 1.0]).unwrap();
        assert_eq!(v.len(), 2);

        let hits = v.search(&[1.0, 0.1], 1).unwrap();
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[0].content, "A");

        let dir = v.path().unwrap();
        assert!(dir.exists());
        v.close().unwrap();
        assert!(!dir.exists());
        assert!(matches!(v.search(&[1.0, 0.0], 1), Err(SimilarityError::Closed)));
        v.close().unwrap();
    }

    #[test]
    fn test_drop_removes_dir() {
        let v = RedbVectors::create(2, "f25dv", None).unwrap();
        let dir = v.path().unwrap();
        drop(v);
        assert!(!dir.exists());
    }

    #[test]
    fn test_template_substitutes_geohash() {
        let root = tempfile::tempdir().unwrap();
        let template = format!("{}/shards/pm-{{geohash}}", root.path().display());
        let a = RedbVectors::create(2, "f25dv", Some(&template)).unwrap();
        let b = RedbVectors::create(2, "f25dv", Some(&template)).unwrap();

        let pa = a.path().unwrap();
        assert!(pa.starts_with(root.path().join("shards")));
        assert!(pa.file_name().unwrap().to_string_lossy().starts_with("pm-f25dv-"));
        assert_ne!(pa, b.path().unwrap());
    }

    #[test]
    fn test_dimension_mismatch() {
        let v = RedbVectors::create(3, "s0000", None).unwrap();
        assert!(matches!(
            v.insert("a", "A", &[1.0]),
            Err(SimilarityError::DimensionMismatch { got: 1, want: 3 })
        ));
    }
}
