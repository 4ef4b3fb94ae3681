//! Concurrent sweep over every shard of the target store.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::enumerate::enumerate_shards;
use crate::error::{MatchError, MatchResult};
use crate::shard::{ShardMatcher, ShardStats};

/// Default worker count: twice the available parallelism.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() * 2)
        .unwrap_or(2)
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every shard completed.
    Clean,
    /// The run finished but some shards failed.
    Degraded,
    /// Cancelled before every shard was dispatched.
    Cancelled,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Clean => f.write_str("clean"),
            Outcome::Degraded => f.write_str("degraded"),
            Outcome::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Summary of a sweep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    /// Shards enumerated.
    pub total: usize,
    /// Shards that finished without error.
    pub completed: usize,
    /// Shards that failed; each was logged.
    pub failed: usize,
    /// Shards never dispatched because the run was cancelled.
    pub skipped: usize,
    /// Rows written across all completed shards.
    pub matches: usize,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn outcome(&self) -> Outcome {
        if self.skipped > 0 {
            Outcome::Cancelled
        } else if self.failed > 0 {
            Outcome::Degraded
        } else {
            Outcome::Clean
        }
    }

    fn record(&mut self, result: MatchResult<ShardStats>, geohash: &str) {
        match result {
            Ok(stats) => {
                self.completed += 1;
                self.matches += stats.matches;
            }
            Err(e) => {
                self.failed += 1;
                warn!(geohash, error = %e, "shard failed");
            }
        }
    }
}

/// Sweep dispatches one task per shard onto a bounded worker pool and
/// waits for all of them.
pub struct Sweep {
    matcher: Arc<ShardMatcher>,
    workers: usize,
    progress: Option<Duration>,
    cancel: CancellationToken,
}

impl Sweep {
    pub fn new(matcher: ShardMatcher) -> Self {
        Self {
            matcher: Arc::new(matcher),
            workers: default_workers(),
            progress: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Zero keeps the default.
    pub fn with_workers(mut self, n: usize) -> Self {
        if n > 0 {
            self.workers = n;
        }
        self
    }

    /// Log progress every `every`.
    pub fn with_progress(mut self, every: Duration) -> Self {
        self.progress = Some(every);
        self
    }

    /// Stop dispatching new shards once `token` is cancelled. Shards
    /// already running are left to finish.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Sweep every geohash present in the target store.
    pub async fn run(&self) -> MatchResult<RunReport> {
        let shards = enumerate_shards(self.matcher.target())?;
        Ok(self.run_shards(shards).await)
    }

    /// Sweep the given geohashes.
    pub async fn run_shards(&self, shards: Vec<String>) -> RunReport {
        let started = Instant::now();
        let total = shards.len();
        let processed = Arc::new(AtomicUsize::new(0));
        let done = CancellationToken::new();

        if let Some(every) = self.progress {
            spawn_ticker(every, total, processed.clone(), started, done.clone());
        }

        let sem = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();
        let mut report = RunReport {
            total,
            ..Default::default()
        };

        let mut names = HashMap::new();
        let mut dispatched = 0;
        for geohash in shards {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                permit = sem.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };
            dispatched += 1;

            let matcher = self.matcher.clone();
            let name = geohash.clone();
            let handle = tasks.spawn(async move {
                let result = matcher.match_shard(&geohash).await;
                drop(permit);
                result
            });
            names.insert(handle.id(), name);

            while let Some(joined) = tasks.try_join_next_with_id() {
                collect(&mut report, &mut names, &processed, joined);
            }
        }
        report.skipped = total - dispatched;
        if report.skipped > 0 {
            info!(skipped = report.skipped, "cancelled; waiting for in-flight shards");
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            collect(&mut report, &mut names, &processed, joined);
        }
        done.cancel();

        report.elapsed = started.elapsed();
        info!(
            total = report.total,
            completed = report.completed,
            failed = report.failed,
            skipped = report.skipped,
            matches = report.matches,
            "sweep finished in {:.1?}",
            report.elapsed
        );
        report
    }
}

/// Record one finished shard task, panicked or not.
fn collect(
    report: &mut RunReport,
    names: &mut HashMap<task::Id, String>,
    processed: &AtomicUsize,
    joined: Result<(task::Id, MatchResult<ShardStats>), task::JoinError>,
) {
    processed.fetch_add(1, Ordering::Relaxed);
    let (id, result) = match joined {
        Ok((id, result)) => (id, result),
        Err(e) => {
            let id = e.id();
            let geohash = names.get(&id).cloned().unwrap_or_default();
            (id, Err(MatchError::Panicked { geohash }))
        }
    };
    let geohash = names.remove(&id).unwrap_or_default();
    report.record(result, &geohash);
}

fn spawn_ticker(
    every: Duration,
    total: usize,
    processed: Arc<AtomicUsize>,
    started: Instant,
    done: CancellationToken,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = done.cancelled() => return,
                _ = ticker.tick() => {
                    info!(
                        "processed {}/{} shards in {:.1?}",
                        processed.load(Ordering::Relaxed),
                        total,
                        started.elapsed()
                    );
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome() {
        let mut r = RunReport {
            total: 3,
            completed: 3,
            ..Default::default()
        };
        assert_eq!(r.outcome(), Outcome::Clean);
        r.completed = 2;
        r.failed = 1;
        assert_eq!(r.outcome(), Outcome::Degraded);
        r.skipped = 1;
        assert_eq!(r.outcome(), Outcome::Cancelled);
    }

    #[tokio::test]
    async fn test_collect_panicked_shard() {
        let mut tasks: JoinSet<MatchResult<ShardStats>> = JoinSet::new();
        let mut names = HashMap::new();
        let h = tasks.spawn(async {
            if std::hint::black_box(true) {
                panic!("shard blew up");
            }
            Ok(ShardStats::default())
        });
        names.insert(h.id(), "f25dv".to_string());
        let h = tasks.spawn(async {
            Ok(ShardStats {
                geohash: "dpz83".into(),
                matches: 2,
                ..Default::default()
            })
        });
        names.insert(h.id(), "dpz83".to_string());

        let processed = AtomicUsize::new(0);
        let mut report = RunReport {
            total: 2,
            ..Default::default()
        };
        while let Some(joined) = tasks.join_next_with_id().await {
            collect(&mut report, &mut names, &processed, joined);
        }

        assert_eq!(processed.load(Ordering::Relaxed), 2);
        assert!(names.is_empty());
        assert_eq!(report.completed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.matches, 2);
        assert_eq!(report.outcome(), Outcome::Degraded);
    }

    #[test]
    fn test_default_workers() {
        assert!(default_workers() >= 2);
        assert_eq!(default_workers() % 2, 0);
    }
}
