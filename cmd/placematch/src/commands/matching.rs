use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use placematch_ingest::{FormatRegistry, IngestError, ParseOptions, RecordIter};
use placematch_location::Location;
use placematch_matcher::{CacheConfig, CachedMatcher, ShardCache, default_workers};
use placematch_similarity::IndexRegistry;
use placematch_store::{LocationStore, StoreRegistry};
use tracing::{debug, info, warn};

use super::{Status, cancel_on_ctrl_c, open_sink};
use crate::config::{Config, require};

#[derive(Args)]
pub struct MatchCommand {
    /// Source store URI
    #[arg(long)]
    pub source: Option<String>,

    /// Similarity index URI
    #[arg(long)]
    pub index: Option<String>,

    /// Threshold value in the index's direction
    #[arg(long)]
    pub threshold: Option<f32>,

    /// Input format: geojson, geojsonl or csv
    #[arg(long, default_value = "geojson")]
    pub format: String,

    /// ID namespace of the input records
    #[arg(long)]
    pub namespace: String,

    /// Accept records without an address
    #[arg(long)]
    pub allow_missing_address: bool,

    /// Maximum source records held across cached shard indices
    #[arg(long)]
    pub cache_cost: Option<usize>,

    /// Rebuild cached shard indices older than N seconds
    #[arg(long)]
    pub cache_ttl: Option<u64>,

    /// Concurrent comparisons (default: 2 x CPUs)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Match output file (default: stdout)
    #[arg(short = 'o', long)]
    pub output: Option<String>,

    /// Input files
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

impl MatchCommand {
    pub async fn run(&self, cfg: &Config) -> Result<Status> {
        let source = StoreRegistry::default().open(&require(
            self.source.as_deref(),
            cfg.source.as_deref(),
            "source",
        )?)?;
        let factory = IndexRegistry::default().open(&require(
            self.index.as_deref(),
            cfg.index.as_deref(),
            "index",
        )?)?;
        let reader = FormatRegistry::default().reader(&self.format)?;
        let sink = open_sink(self.output.as_deref().or(cfg.output.as_deref()))?;

        let mut cache_cfg = CacheConfig::default();
        if let Some(cost) = self.cache_cost.or(cfg.cache.max_cost) {
            cache_cfg.max_cost = cost;
        }
        cache_cfg.ttl = self.cache_ttl.or(cfg.cache.ttl).map(Duration::from_secs);

        let cache = ShardCache::new(source.clone(), factory, cache_cfg);
        let mut matcher = CachedMatcher::new(cache, sink);
        if let Some(t) = self.threshold.or(cfg.threshold) {
            matcher = matcher.with_threshold(t);
        }
        let workers = self
            .workers
            .or(cfg.workers)
            .filter(|n| *n > 0)
            .unwrap_or_else(default_workers);

        let mut opts = ParseOptions::new(&self.namespace);
        if self.allow_missing_address {
            opts = opts.allow_missing_address();
        }

        let cancel = cancel_on_ctrl_c();
        let mut skipped = 0;
        let mut failed = 0;
        for path in &self.files {
            if cancel.is_cancelled() {
                break;
            }
            let file = std::fs::File::open(path)
                .with_context(|| format!("open {}", path.display()))?;
            let mut read_error = None;
            let records = locations(
                reader(Box::new(file), opts.clone()),
                &mut skipped,
                &mut read_error,
            )
            .take_while(|_| !cancel.is_cancelled());
            let report = matcher.compare_all(records, workers).await;
            failed += report.failed;
            if let Some(e) = read_error {
                return Err(e).with_context(|| format!("read {}", path.display()));
            }
            info!(
                file = %path.display(),
                compared = report.compared,
                matched = report.matched,
                failed = report.failed,
                "matched"
            );
        }

        let stats = matcher.cache().stats();
        info!(
            hits = stats.hits,
            misses = stats.misses,
            builds = stats.builds,
            evictions = stats.evictions,
            skipped,
            "match finished"
        );
        source.close()?;

        if cancel.is_cancelled() {
            return Ok(Status::Cancelled);
        }
        Ok(Status::degraded_if(skipped > 0 || failed > 0))
    }
}

/// Parsed locations of `records`. Unusable records are logged and counted
/// in `skipped`; an I/O error ends the stream and is left in `read_error`.
fn locations<'a>(
    records: RecordIter,
    skipped: &'a mut usize,
    read_error: &'a mut Option<IngestError>,
) -> impl Iterator<Item = Location> + 'a {
    records
        .map_while(move |record| match record {
            Ok(loc) => Some(Some(loc)),
            Err(IngestError::Parse(e)) => {
                if e.is_invalid() {
                    debug!(error = %e, "skip record");
                } else {
                    warn!(error = %e, "skip record");
                }
                *skipped += 1;
                Some(None)
            }
            Err(e) => {
                *read_error = Some(e);
                None
            }
        })
        .flatten()
}
