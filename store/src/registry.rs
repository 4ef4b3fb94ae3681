//! Scheme-keyed store constructors.
//!
//! A store is selected by a URI-like configuration string:
//!
//! ```text
//! memory://                  process-local, empty on open
//! redb:///var/lib/pm.redb    redb file (absolute path)
//! redb://data/pm.redb        redb file (relative path)
//! null://                    accepts writes, returns nothing
//! ```
//!
//! The registry is assembled once at startup and is read-only afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{StoreError, StoreResult};
use crate::{LocationStore, MemoryStore, NullStore, RedbStore};

/// Builds a store from the part of the URI after `scheme://`.
pub type StoreConstructor = fn(&str) -> StoreResult<Arc<dyn LocationStore>>;

pub struct StoreRegistry {
    constructors: HashMap<&'static str, StoreConstructor>,
}

impl StoreRegistry {
    /// An empty registry. Use [`StoreRegistry::default`] for the built-in
    /// backends.
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Register a constructor for `scheme`, replacing any existing one.
    pub fn with(mut self, scheme: &'static str, ctor: StoreConstructor) -> Self {
        self.constructors.insert(scheme, ctor);
        self
    }

    /// Registered schemes, sorted.
    pub fn schemes(&self) -> Vec<&'static str> {
        let mut s: Vec<_> = self.constructors.keys().copied().collect();
        s.sort_unstable();
        s
    }

    /// Open the store described by `uri`.
    pub fn open(&self, uri: &str) -> StoreResult<Arc<dyn LocationStore>> {
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| StoreError::Config(format!("missing scheme in {uri:?}")))?;
        let ctor = self.constructors.get(scheme).ok_or_else(|| {
            StoreError::Config(format!(
                "unknown store scheme {scheme:?} (known: {})",
                self.schemes().join(", ")
            ))
        })?;
        ctor(rest)
    }
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::empty()
            .with("memory", open_memory)
            .with("redb", open_redb)
            .with("null", open_null)
    }
}

fn open_memory(_: &str) -> StoreResult<Arc<dyn LocationStore>> {
    Ok(Arc::new(MemoryStore::new()))
}

fn open_null(_: &str) -> StoreResult<Arc<dyn LocationStore>> {
    Ok(Arc::new(NullStore))
}

fn open_redb(path: &str) -> StoreResult<Arc<dyn LocationStore>> {
    if path.is_empty() {
        return Err(StoreError::Config("redb store requires a path".into()));
    }
    Ok(Arc::new(RedbStore::open(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_schemes() {
        assert_eq!(
            StoreRegistry::default().schemes(),
            vec!["memory", "null", "redb"]
        );
    }

    #[test]
    fn test_open_redb() {
        let dir = tempdir().unwrap();
        let uri = format!("redb://{}", dir.path().join("s.redb").display());
        assert!(StoreRegistry::default().open(&uri).is_ok());
    }

    #[test]
    fn test_config_errors() {
        let reg = StoreRegistry::default();
        assert!(matches!(reg.open("memory"), Err(StoreError::Config(_))));
        assert!(matches!(reg.open("pg://x"), Err(StoreError::Config(_))));
        assert!(matches!(reg.open("redb://"), Err(StoreError::Config(_))));
    }

    #[test]
    fn test_custom_constructor() {
        let reg = StoreRegistry::empty().with("mem", open_memory);
        assert!(reg.open("mem://").is_ok());
        assert!(reg.open("memory://").is_err());
    }
}
