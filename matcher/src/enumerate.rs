use std::collections::BTreeSet;

use placematch_store::{LocationStore, StoreResult};

/// Collect the distinct geohashes of `store`, sorted.
///
/// The set is small next to the record count (one entry per populated
/// cell), so it is buffered in full.
pub fn enumerate_shards(store: &dyn LocationStore) -> StoreResult<Vec<String>> {
    let mut seen = BTreeSet::new();
    store.get_geohashes(&mut |g| {
        seen.insert(g.to_string());
        Ok(())
    })?;
    Ok(seen.into_iter().collect())
}
