//! Geohash-sharded matching between two location stores.
//!
//! Both stores are partitioned by the 5-character geohash of each record's
//! centroid, so only records in the same cell are ever compared. Per shard,
//! the source records are loaded into a disposable similarity index and
//! every target record is queried against it; the first neighbor that meets
//! the threshold (and is not the target itself) becomes a [`MatchRow`].
//!
//! Two drivers share that pipeline:
//!
//! - [`Sweep`] walks every shard of the target store on a bounded worker
//!   pool.
//! - [`CachedMatcher`] compares records one at a time, reusing per-shard
//!   indices held in a [`ShardCache`].

pub mod cache;
pub mod enumerate;
pub mod error;
pub mod orchestrator;
pub mod row;
pub mod shard;
pub mod sink;

pub use cache::{CacheConfig, CacheStats, CachedMatcher, CachedShard, CompareReport, ShardCache};
pub use enumerate::enumerate_shards;
pub use error::{MatchError, MatchResult};
pub use orchestrator::{Outcome, RunReport, Sweep, default_workers};
pub use row::{CSV_HEADER, MatchRow};
pub use shard::{ShardMatcher, ShardStats, build_index, first_match};
pub use sink::{CsvSink, MatchSink, MemorySink};
