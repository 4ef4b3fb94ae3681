//! The per-shard matching pipeline.
//!
//! For one geohash: populate a fresh similarity index with the source
//! bucket, then stream the target bucket through it, keeping at most one
//! match per target record.

use std::sync::Arc;

use placematch_location::Location;
use placematch_similarity::{IndexFactory, Neighbor, SimilarityIndex, Threshold};
use placematch_store::LocationStore;
use tracing::{debug, warn};

use crate::error::MatchResult;
use crate::row::MatchRow;
use crate::sink::MatchSink;

/// Per-shard counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShardStats {
    pub geohash: String,
    /// Source records added to the shard's index.
    pub source_count: usize,
    /// Target records queried against the index.
    pub target_count: usize,
    /// Rows written to the sink.
    pub matches: usize,
}

/// Create an index for `geohash` and add every source record of that bucket.
///
/// Returns the index and the number of records added. On failure the index
/// is closed before the error is returned.
pub async fn build_index(
    factory: &dyn IndexFactory,
    source: &dyn LocationStore,
    geohash: &str,
) -> MatchResult<(Box<dyn SimilarityIndex>, usize)> {
    let index = factory.create(geohash)?;
    match populate(index.as_ref(), source, geohash).await {
        Ok(n) => Ok((index, n)),
        Err(e) => {
            close_quietly(index.as_ref(), geohash).await;
            Err(e)
        }
    }
}

async fn populate(
    index: &dyn SimilarityIndex,
    source: &dyn LocationStore,
    geohash: &str,
) -> MatchResult<usize> {
    let mut n = 0;
    for loc in source.scan_geohash(geohash)? {
        index.add(&loc?).await?;
        n += 1;
    }
    if n > 0 {
        index.flush().await?;
    }
    Ok(n)
}

/// Query `index` with `target` and return the first neighbor that satisfies
/// `threshold` and is not the target itself.
pub async fn first_match(
    index: &dyn SimilarityIndex,
    threshold: Threshold,
    target: &Location,
) -> MatchResult<Option<Neighbor>> {
    let neighbors = index.query(target).await?;
    Ok(neighbors
        .into_iter()
        .find(|n| n.id != target.id() && threshold.accepts(n.similarity)))
}

pub(crate) fn match_row(geohash: &str, neighbor: Neighbor, target: &Location) -> MatchRow {
    MatchRow {
        geohash: geohash.to_string(),
        source_id: neighbor.id,
        target_id: target.id().to_string(),
        source_content: neighbor.content,
        target_content: target.content(),
        similarity: neighbor.similarity,
    }
}

async fn close_quietly(index: &dyn SimilarityIndex, geohash: &str) {
    if let Err(e) = index.close().await {
        warn!(geohash, error = %e, "close shard index");
    }
}

/// ShardMatcher runs the pipeline for one geohash at a time. It is shared
/// by every worker of a sweep.
pub struct ShardMatcher {
    source: Arc<dyn LocationStore>,
    target: Arc<dyn LocationStore>,
    factory: Arc<dyn IndexFactory>,
    threshold: Threshold,
    sink: Arc<dyn MatchSink>,
}

impl ShardMatcher {
    /// The threshold defaults to the one `factory` was configured with.
    pub fn new(
        source: Arc<dyn LocationStore>,
        target: Arc<dyn LocationStore>,
        factory: Arc<dyn IndexFactory>,
        sink: Arc<dyn MatchSink>,
    ) -> Self {
        let threshold = factory.threshold();
        Self {
            source,
            target,
            factory,
            threshold,
            sink,
        }
    }

    /// Override the threshold value, keeping the backend's direction.
    pub fn with_threshold(mut self, value: f32) -> Self {
        self.threshold.value = value;
        self
    }

    pub fn threshold(&self) -> Threshold {
        self.threshold
    }

    pub fn target(&self) -> &dyn LocationStore {
        self.target.as_ref()
    }

    /// Match every target record of `geohash` against that shard's source
    /// records. The shard's index is closed on every exit path.
    pub async fn match_shard(&self, geohash: &str) -> MatchResult<ShardStats> {
        let (index, source_count) =
            build_index(self.factory.as_ref(), self.source.as_ref(), geohash).await?;

        let mut stats = ShardStats {
            geohash: geohash.to_string(),
            source_count,
            ..Default::default()
        };
        let result = if source_count == 0 {
            Ok(())
        } else {
            self.stream_targets(index.as_ref(), &mut stats).await
        };
        close_quietly(index.as_ref(), geohash).await;
        result?;

        debug!(
            geohash,
            sources = stats.source_count,
            targets = stats.target_count,
            matches = stats.matches,
            "shard done"
        );
        Ok(stats)
    }

    async fn stream_targets(
        &self,
        index: &dyn SimilarityIndex,
        stats: &mut ShardStats,
    ) -> MatchResult<()> {
        for target in self.target.scan_geohash(&stats.geohash)? {
            let target = target?;
            stats.target_count += 1;
            if let Some(neighbor) = first_match(index, self.threshold, &target).await? {
                self.sink.write(&match_row(&stats.geohash, neighbor, &target))?;
                stats.matches += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use placematch_location::Point;
    use placematch_similarity::TrigramFactory;
    use placematch_store::MemoryStore;

    use crate::sink::MemorySink;

    fn loc(id: &str, name: &str) -> Location {
        Location::new(id, name, Point::new(-73.60033, 45.524115)).unwrap()
    }

    fn store(locs: &[Location]) -> Arc<MemoryStore> {
        let s = MemoryStore::new();
        for l in locs {
            s.add(l).unwrap();
        }
        Arc::new(s)
    }

    #[tokio::test]
    async fn test_first_qualifying_skips_self() {
        let index = TrigramFactory::new(5, 0.5).create("f25dv").unwrap();
        index.add(&loc("x:1", "Open Da Night")).await.unwrap();
        index.add(&loc("x:2", "Open Da Nite")).await.unwrap();

        let hit = first_match(index.as_ref(), Threshold::min_score(0.3), &loc("x:1", "Open Da Night"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.id, "x:2");
    }

    #[tokio::test]
    async fn test_match_shard_counts() {
        let source = store(&[loc("wof:id=1", "Open Da Night"), loc("wof:id=2", "Cafe Olympico")]);
        let target = store(&[
            loc("ovtr:id=1", "Open Da Night"),
            loc("ovtr:id=2", "Dépanneur Beaubien"),
        ]);
        let sink = Arc::new(MemorySink::new());
        let m = ShardMatcher::new(
            source,
            target,
            Arc::new(TrigramFactory::new(5, 0.5)),
            sink.clone(),
        );

        let stats = m.match_shard("f25dv").await.unwrap();
        assert_eq!(stats.source_count, 2);
        assert_eq!(stats.target_count, 2);
        assert_eq!(stats.matches, 1);

        let rows = sink.rows();
        assert_eq!(rows[0].source_id, "wof:id=1");
        assert_eq!(rows[0].target_id, "ovtr:id=1");
        assert_eq!(rows[0].geohash, "f25dv");
        assert_eq!(rows[0].similarity, 1.0);
    }

    #[tokio::test]
    async fn test_empty_source_skips_targets() {
        let target = store(&[loc("ovtr:id=1", "Open Da Night")]);
        let sink = Arc::new(MemorySink::new());
        let m = ShardMatcher::new(
            Arc::new(MemoryStore::new()),
            target,
            Arc::new(TrigramFactory::new(5, 0.5)),
            sink.clone(),
        );
        let stats = m.match_shard("f25dv").await.unwrap();
        assert_eq!(stats.source_count, 0);
        assert_eq!(stats.target_count, 0);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_with_threshold_keeps_direction() {
        let m = ShardMatcher::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryStore::new()),
            Arc::new(TrigramFactory::new(5, 0.5)),
            Arc::new(MemorySink::new()),
        )
        .with_threshold(0.9);
        assert_eq!(m.threshold(), Threshold::min_score(0.9));
    }
}
