//! CLI commands module.

mod compare;
mod ingest;
mod matching;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use placematch_matcher::{CsvSink, MatchSink, Outcome};
use tokio_util::sync::CancellationToken;

pub use compare::CompareCommand;
pub use ingest::IngestCommand;
pub use matching::MatchCommand;

/// How a command finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Clean,
    /// Finished, but some records or shards were skipped.
    Degraded,
    Cancelled,
}

impl Status {
    pub fn exit_code(self) -> ExitCode {
        match self {
            Status::Clean => ExitCode::SUCCESS,
            Status::Degraded => ExitCode::from(2),
            Status::Cancelled => ExitCode::from(130),
        }
    }

    fn degraded_if(skipped: bool) -> Self {
        if skipped { Status::Degraded } else { Status::Clean }
    }
}

impl From<Outcome> for Status {
    fn from(o: Outcome) -> Self {
        match o {
            Outcome::Clean => Status::Clean,
            Outcome::Degraded => Status::Degraded,
            Outcome::Cancelled => Status::Cancelled,
        }
    }
}

/// CSV sink on `output`, or on stdout.
fn open_sink(output: Option<&str>) -> Result<Arc<dyn MatchSink>> {
    Ok(match output {
        Some(path) => {
            Arc::new(CsvSink::create(path).with_context(|| format!("create output {path}"))?)
        }
        None => Arc::new(CsvSink::new(std::io::stdout())),
    })
}

/// A token cancelled on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; finishing in-flight work");
            child.cancel();
        }
    });
    token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_outcome() {
        assert_eq!(Status::from(Outcome::Clean), Status::Clean);
        assert_eq!(Status::from(Outcome::Degraded), Status::Degraded);
        assert_eq!(Status::from(Outcome::Cancelled), Status::Cancelled);
        assert_eq!(Status::degraded_if(true), Status::Degraded);
        assert_eq!(Status::degraded_if(false), Status::Clean);
    }
}
