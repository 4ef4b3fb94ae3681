use std::fmt;

use placematch_location::Location;

use crate::error::SimilarityError;

/// Neighbor is one ranked result of [`SimilarityIndex::query`].
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    /// ID of the indexed location.
    pub id: String,
    /// Content the location was indexed with.
    pub content: String,
    /// Score in the backend's units; see [`Direction`].
    pub similarity: f32,
}

/// Which way a backend's similarity values point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Lower is more similar. A neighbor matches if `similarity <= threshold`.
    Distance,
    /// Higher is more similar. A neighbor matches if `similarity >= threshold`.
    Score,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Distance => f.write_str("distance"),
            Direction::Score => f.write_str("score"),
        }
    }
}

/// A similarity cut-off together with the direction it applies in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold {
    pub value: f32,
    pub direction: Direction,
}

impl Threshold {
    /// Match when `distance <= value`.
    pub fn max_distance(value: f32) -> Self {
        Self {
            value,
            direction: Direction::Distance,
        }
    }

    /// Match when `score >= value`.
    pub fn min_score(value: f32) -> Self {
        Self {
            value,
            direction: Direction::Score,
        }
    }

    /// Report whether `similarity` satisfies this threshold. NaN never does.
    pub fn accepts(&self, similarity: f32) -> bool {
        match self.direction {
            Direction::Distance => similarity <= self.value,
            Direction::Score => similarity >= self.value,
        }
    }

    /// Report whether `self` admits strictly fewer values than `other`.
    /// Thresholds with different directions are not comparable.
    pub fn is_stricter_than(&self, other: &Threshold) -> bool {
        if self.direction != other.direction {
            return false;
        }
        match self.direction {
            Direction::Distance => self.value < other.value,
            Direction::Score => self.value > other.value,
        }
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            Direction::Distance => write!(f, "distance <= {}", self.value),
            Direction::Score => write!(f, "score >= {}", self.value),
        }
    }
}

/// SimilarityIndex is an ephemeral nearest-neighbor store scoped to one
/// shard.
///
/// All implementations must be safe for concurrent use (Send + Sync).
#[async_trait::async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// Index the location's content. May be buffered; buffered adds are
    /// visible to every later `query` on the same instance.
    async fn add(&self, location: &Location) -> Result<(), SimilarityError>;

    /// Make every buffered add durable, surfacing any deferred add error.
    async fn flush(&self) -> Result<(), SimilarityError> {
        Ok(())
    }

    /// Return up to `k` neighbors of the location's content, most similar
    /// first by the backend's convention.
    async fn query(&self, location: &Location) -> Result<Vec<Neighbor>, SimilarityError>;

    /// Number of locations added so far.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release ephemeral backing storage. Later calls fail with
    /// [`SimilarityError::Closed`]. Dropping an index releases it as well.
    async fn close(&self) -> Result<(), SimilarityError>;
}

/// IndexFactory creates one [`SimilarityIndex`] per shard.
///
/// Indices created for different geohashes never share storage, so shards
/// can be built concurrently.
pub trait IndexFactory: Send + Sync {
    /// Create an empty index scoped to `geohash`.
    fn create(&self, geohash: &str) -> Result<Box<dyn SimilarityIndex>, SimilarityError>;

    /// The configured threshold, in this backend's direction.
    fn threshold(&self) -> Threshold;

    /// The backend's similarity direction.
    fn direction(&self) -> Direction {
        self.threshold().direction
    }
}
