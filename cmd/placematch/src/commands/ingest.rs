use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use placematch_ingest::{FormatRegistry, IngestReport, ParseOptions, ingest};
use placematch_store::{LocationStore, StoreRegistry};
use tracing::info;

use super::Status;

#[derive(Args)]
pub struct IngestCommand {
    /// Store URI (memory://, redb:///path/to/file.redb, null://)
    #[arg(long)]
    pub store: String,

    /// Input format: geojson, geojsonl or csv
    #[arg(long, default_value = "geojson")]
    pub format: String,

    /// ID namespace, e.g. "wof" gives IDs like "wof:id=123"
    #[arg(long)]
    pub namespace: String,

    /// Accept records without an address
    #[arg(long)]
    pub allow_missing_address: bool,

    /// Input files
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

impl IngestCommand {
    pub fn run(&self) -> Result<Status> {
        let store = StoreRegistry::default().open(&self.store)?;
        let formats = FormatRegistry::default();
        let reader = formats.reader(&self.format)?;

        let mut opts = ParseOptions::new(&self.namespace);
        if self.allow_missing_address {
            opts = opts.allow_missing_address();
        }

        let mut total = IngestReport::default();
        for path in &self.files {
            let file = std::fs::File::open(path)
                .with_context(|| format!("open {}", path.display()))?;
            let report = ingest(store.as_ref(), reader(Box::new(file), opts.clone()))
                .with_context(|| format!("ingest {}", path.display()))?;
            info!(
                file = %path.display(),
                added = report.added,
                skipped = report.skipped,
                "ingested"
            );
            total.merge(report);
        }
        store.close()?;

        info!(added = total.added, skipped = total.skipped, "ingest finished");
        Ok(Status::degraded_if(total.skipped > 0))
    }
}
