//! Reusable per-shard indices for record-at-a-time matching.
//!
//! [`ShardCache`] keeps populated indices keyed by geohash, bounded by total
//! cost (source records indexed). Admission and eviction are
//! frequency-aware: moka's TinyLFU policy keeps access counts in a sketch
//! that is halved periodically, and evicts least recently used entries
//! among the ones it may drop. Concurrent misses for one geohash share a
//! single build.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::StreamExt;
use moka::future::Cache;
use moka::notification::RemovalCause;
use placematch_location::Location;
use placematch_similarity::{IndexFactory, SimilarityIndex, Threshold};
use placematch_store::LocationStore;
use tracing::{debug, warn};

use crate::error::{MatchError, MatchResult};
use crate::row::MatchRow;
use crate::shard::{build_index, first_match, match_row};
use crate::sink::MatchSink;

/// Default total cost: source records held across all cached shards.
pub const DEFAULT_MAX_COST: usize = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub max_cost: usize,
    /// Rebuild entries older than this on next access.
    pub ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_cost: DEFAULT_MAX_COST,
            ttl: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub builds: u64,
    pub evictions: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    builds: AtomicU64,
    evictions: AtomicU64,
}

/// A populated index shared by every caller of its shard.
///
/// The index is released when the last holder drops it, so an evicted
/// shard stays usable by queries already running against it.
pub struct CachedShard {
    pub index: Arc<dyn SimilarityIndex>,
    pub source_count: usize,
}

impl CachedShard {
    fn cost(&self) -> u32 {
        u32::try_from(self.source_count.max(1)).unwrap_or(u32::MAX)
    }
}

/// ShardCache holds populated indices for the shards of one source store.
pub struct ShardCache {
    source: Arc<dyn LocationStore>,
    factory: Arc<dyn IndexFactory>,
    shards: Cache<String, Arc<CachedShard>>,
    counters: Arc<Counters>,
}

impl ShardCache {
    pub fn new(
        source: Arc<dyn LocationStore>,
        factory: Arc<dyn IndexFactory>,
        config: CacheConfig,
    ) -> Self {
        let counters = Arc::new(Counters::default());
        let listener = counters.clone();
        let mut builder = Cache::builder()
            .max_capacity(config.max_cost as u64)
            .weigher(|_: &String, shard: &Arc<CachedShard>| shard.cost())
            .eviction_listener(move |geohash: Arc<String>, _, cause| match cause {
                RemovalCause::Size => {
                    listener.evictions.fetch_add(1, Ordering::Relaxed);
                    debug!(geohash = %geohash, "shard index evicted");
                }
                RemovalCause::Expired => debug!(geohash = %geohash, "shard index expired"),
                _ => {}
            });
        if let Some(ttl) = config.ttl {
            builder = builder.time_to_live(ttl);
        }

        Self {
            source,
            factory,
            shards: builder.build(),
            counters,
        }
    }

    pub fn factory(&self) -> &dyn IndexFactory {
        self.factory.as_ref()
    }

    /// Return the populated index for `geohash`, building it on a miss.
    ///
    /// A failed build is not cached; the next call retries it.
    pub async fn get(&self, geohash: &str) -> MatchResult<Arc<CachedShard>> {
        let result = self
            .shards
            .entry_by_ref(geohash)
            .or_try_insert_with(self.build(geohash))
            .await;

        match result {
            Ok(entry) => {
                let counter = if entry.is_fresh() {
                    &self.counters.misses
                } else {
                    &self.counters.hits
                };
                counter.fetch_add(1, Ordering::Relaxed);
                Ok(entry.into_value())
            }
            Err(e) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                Err(Arc::try_unwrap(e).unwrap_or_else(MatchError::Shared))
            }
        }
    }

    async fn build(&self, geohash: &str) -> MatchResult<Arc<CachedShard>> {
        self.counters.builds.fetch_add(1, Ordering::Relaxed);
        let (index, source_count) =
            build_index(self.factory.as_ref(), self.source.as_ref(), geohash).await?;
        debug!(geohash, source_count, "shard index built");
        Ok(Arc::new(CachedShard {
            index: Arc::from(index),
            source_count,
        }))
    }

    /// Apply pending evictions and refresh [`total_cost`](Self::total_cost)
    /// and [`len`](Self::len), which otherwise lag behind inserts.
    pub async fn run_pending_tasks(&self) {
        self.shards.run_pending_tasks().await;
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            builds: self.counters.builds.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }

    /// Total cost of the cached entries.
    pub fn total_cost(&self) -> usize {
        self.shards.weighted_size() as usize
    }

    /// Whether a built index for `geohash` is cached.
    pub fn contains(&self, geohash: &str) -> bool {
        self.shards.contains_key(geohash)
    }

    pub fn len(&self) -> usize {
        self.shards.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Totals of a [`CachedMatcher::compare_all`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompareReport {
    pub compared: usize,
    pub matched: usize,
    pub failed: usize,
}

/// CachedMatcher compares one target record at a time against the cached
/// index of its geohash.
pub struct CachedMatcher {
    cache: ShardCache,
    threshold: Threshold,
    sink: Arc<dyn MatchSink>,
}

impl CachedMatcher {
    pub fn new(cache: ShardCache, sink: Arc<dyn MatchSink>) -> Self {
        let threshold = cache.factory().threshold();
        Self {
            cache,
            threshold,
            sink,
        }
    }

    /// Override the threshold value, keeping the backend's direction.
    pub fn with_threshold(mut self, value: f32) -> Self {
        self.threshold.value = value;
        self
    }

    pub fn cache(&self) -> &ShardCache {
        &self.cache
    }

    /// Match `target` against the source records of its geohash. A match
    /// is written to the sink and returned.
    pub async fn compare(&self, target: &Location) -> MatchResult<Option<MatchRow>> {
        let geohash = target.geohash();
        let shard = self.cache.get(&geohash).await?;
        if shard.source_count == 0 {
            return Ok(None);
        }
        let Some(neighbor) = first_match(shard.index.as_ref(), self.threshold, target).await?
        else {
            return Ok(None);
        };
        let row = match_row(&geohash, neighbor, target);
        self.sink.write(&row)?;
        Ok(Some(row))
    }

    /// Compare every target, up to `concurrency` at a time. Failures are
    /// logged and counted.
    pub async fn compare_all<I>(&self, targets: I, concurrency: usize) -> CompareReport
    where
        I: IntoIterator<Item = Location>,
    {
        futures::stream::iter(targets)
            .map(|target| async move {
                let result = self.compare(&target).await;
                (target, result)
            })
            .buffer_unordered(concurrency.max(1))
            .fold(CompareReport::default(), |mut report, (target, result)| async move {
                report.compared += 1;
                match result {
                    Ok(Some(_)) => report.matched += 1,
                    Ok(None) => {}
                    Err(e) => {
                        report.failed += 1;
                        warn!(id = target.id(), error = %e, "compare failed");
                    }
                }
                report
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use placematch_location::Point;
    use placematch_similarity::TrigramFactory;
    use placematch_store::MemoryStore;

    use crate::sink::MemorySink;

    fn loc(id: &str, name: &str, lon: f64, lat: f64) -> Location {
        Location::new(id, name, Point::new(lon, lat)).unwrap()
    }

    /// One source record in each of three distinct cells.
    fn three_cells() -> (Arc<MemoryStore>, Vec<String>) {
        let store = MemoryStore::new();
        let locs = [
            loc("s:1", "Open Da Night", -73.60033, 45.524115),
            loc("s:2", "CN Tower", -79.3832, 43.6532),
            loc("s:3", "Tour Eiffel", 2.2945, 48.8584),
        ];
        for l in &locs {
            store.add(l).unwrap();
        }
        (Arc::new(store), locs.iter().map(Location::geohash).collect())
    }

    fn cache(store: Arc<MemoryStore>, config: CacheConfig) -> ShardCache {
        ShardCache::new(store, Arc::new(TrigramFactory::new(5, 0.5)), config)
    }

    #[tokio::test]
    async fn test_hit_after_miss() {
        let (store, cells) = three_cells();
        let c = cache(store, CacheConfig::default());
        let a = c.get(&cells[0]).await.unwrap();
        let b = c.get(&cells[0]).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.source_count, 1);
        assert_eq!(
            c.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                builds: 1,
                evictions: 0
            }
        );
        c.run_pending_tasks().await;
        assert_eq!(c.total_cost(), 1);
        assert_eq!(c.len(), 1);
    }

    #[tokio::test]
    async fn test_cost_bound() {
        let (store, cells) = three_cells();
        let c = cache(
            store,
            CacheConfig {
                max_cost: 2,
                ttl: None,
            },
        );
        for cell in &cells {
            assert_eq!(c.get(cell).await.unwrap().source_count, 1);
        }
        c.run_pending_tasks().await;

        assert!(c.total_cost() <= 2);
        assert!(c.len() <= 2);
        assert!(c.stats().evictions >= 1);
    }

    #[tokio::test]
    async fn test_frequent_shard_stays() {
        let (store, cells) = three_cells();
        let c = cache(
            store,
            CacheConfig {
                max_cost: 1,
                ttl: None,
            },
        );
        c.get(&cells[0]).await.unwrap();
        c.run_pending_tasks().await;
        for _ in 0..8 {
            c.get(&cells[0]).await.unwrap();
        }
        c.run_pending_tasks().await;

        // A one-off shard is still built and served, but not kept.
        let once = c.get(&cells[1]).await.unwrap();
        assert_eq!(once.source_count, 1);
        c.run_pending_tasks().await;

        assert!(c.contains(&cells[0]));
        assert!(!c.contains(&cells[1]));
        assert_eq!(c.total_cost(), 1);
    }

    #[tokio::test]
    async fn test_ttl_rebuilds() {
        let (store, cells) = three_cells();
        let c = cache(
            store,
            CacheConfig {
                max_cost: 10,
                ttl: Some(Duration::from_millis(20)),
            },
        );
        let a = c.get(&cells[0]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        let b = c.get(&cells[0]).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(c.stats().builds, 2);
        assert_eq!(c.stats().misses, 2);
    }

    #[tokio::test]
    async fn test_compare_writes_sink() {
        let (store, _) = three_cells();
        let sink = Arc::new(MemorySink::new());
        let m = CachedMatcher::new(cache(store, CacheConfig::default()), sink.clone());

        let hit = m
            .compare(&loc("t:1", "Open Da Night", -73.6001, 45.5242))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.source_id, "s:1");
        assert!(
            m.compare(&loc("t:2", "Open Da Night", 151.2153, -33.8568))
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn test_compare_all() {
        let (store, _) = three_cells();
        let m = CachedMatcher::new(
            cache(store, CacheConfig::default()),
            Arc::new(MemorySink::new()),
        );
        let targets = vec![
            loc("t:1", "Open Da Night", -73.6001, 45.5242),
            loc("t:2", "CN Tower", -79.3832, 43.6532),
            loc("t:3", "Somewhere Else", -79.3832, 43.6532),
        ];
        let report = m.compare_all(targets, 4).await;
        assert_eq!(
            report,
            CompareReport {
                compared: 3,
                matched: 2,
                failed: 0
            }
        );
        assert_eq!(m.cache().stats().builds, 2);
    }
}
