use std::time::Duration;

use anyhow::{Result, bail};
use clap::Args;
use placematch_location::{GEOHASH_PRECISION, geohash};
use placematch_matcher::{ShardMatcher, Sweep};
use placematch_similarity::IndexRegistry;
use placematch_store::{LocationStore, StoreRegistry};
use tracing::info;

use super::{Status, cancel_on_ctrl_c, open_sink};
use crate::config::{Config, require};

#[derive(Args)]
pub struct CompareCommand {
    /// Source store URI
    #[arg(long)]
    pub source: Option<String>,

    /// Target store URI
    #[arg(long)]
    pub target: Option<String>,

    /// Similarity index URI, e.g. "trigram://?min-score=0.5"
    #[arg(long)]
    pub index: Option<String>,

    /// Threshold value in the index's direction
    #[arg(long)]
    pub threshold: Option<f32>,

    /// Concurrent shards (default: 2 x CPUs)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Match output file (default: stdout)
    #[arg(short = 'o', long)]
    pub output: Option<String>,

    /// Log progress every N seconds
    #[arg(long)]
    pub progress: Option<u64>,

    /// Only these geohashes (repeatable)
    #[arg(long = "geohash")]
    pub geohashes: Vec<String>,
}

impl CompareCommand {
    pub async fn run(&self, cfg: &Config) -> Result<Status> {
        let selected = selected_shards(&self.geohashes)?;
        let stores = StoreRegistry::default();
        let source = stores.open(&require(
            self.source.as_deref(),
            cfg.source.as_deref(),
            "source",
        )?)?;
        let target = stores.open(&require(
            self.target.as_deref(),
            cfg.target.as_deref(),
            "target",
        )?)?;
        let factory = IndexRegistry::default().open(&require(
            self.index.as_deref(),
            cfg.index.as_deref(),
            "index",
        )?)?;
        let sink = open_sink(self.output.as_deref().or(cfg.output.as_deref()))?;

        let mut matcher = ShardMatcher::new(source.clone(), target.clone(), factory, sink);
        if let Some(t) = self.threshold.or(cfg.threshold) {
            matcher = matcher.with_threshold(t);
        }
        info!(threshold = %matcher.threshold(), "compare");

        let mut sweep = Sweep::new(matcher)
            .with_workers(self.workers.or(cfg.workers).unwrap_or(0))
            .with_cancel(cancel_on_ctrl_c());
        if let Some(secs) = self.progress.or(cfg.progress).filter(|s| *s > 0) {
            sweep = sweep.with_progress(Duration::from_secs(secs));
        }

        let report = match selected {
            Some(shards) => sweep.run_shards(shards).await,
            None => sweep.run().await?,
        };

        source.close()?;
        target.close()?;
        Ok(report.outcome().into())
    }
}

/// Validate `--geohash` values. A malformed key names no shard, so it is
/// rejected before any store is opened.
fn selected_shards(geohashes: &[String]) -> Result<Option<Vec<String>>> {
    if geohashes.is_empty() {
        return Ok(None);
    }
    let mut shards = Vec::with_capacity(geohashes.len());
    for g in geohashes {
        if !geohash::is_valid(g) {
            bail!("invalid --geohash {g:?}: want {GEOHASH_PRECISION} lowercase geohash characters");
        }
        if !shards.contains(g) {
            shards.push(g.clone());
        }
    }
    Ok(Some(shards))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_selected_shards() {
        assert_eq!(selected_shards(&[]).unwrap(), None);
        assert_eq!(
            selected_shards(&strings(&["f25dv", "dpz83", "f25dv"])).unwrap(),
            Some(strings(&["f25dv", "dpz83"]))
        );
    }

    #[test]
    fn test_selected_shards_rejects_malformed() {
        for bad in ["f25d", "f25dvp", "F25DV", "f25da"] {
            let err = selected_shards(&strings(&["f25dv", bad])).unwrap_err();
            assert!(err.to_string().contains(bad), "{err}");
        }
    }
}
