use placematch_location::Location;
use placematch_store::LocationStore;
use tracing::{debug, warn};

use crate::error::{IngestError, IngestResult};

/// Counts from one ingestion pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Locations written to the store.
    pub added: usize,
    /// Records skipped because they did not parse.
    pub skipped: usize,
}

impl IngestReport {
    pub fn merge(&mut self, other: IngestReport) {
        self.added += other.added;
        self.skipped += other.skipped;
    }
}

/// Add every parsed record to `store`.
///
/// Records that fail to parse are logged and skipped. I/O and store errors
/// stop the pass.
pub fn ingest<I>(store: &dyn LocationStore, records: I) -> IngestResult<IngestReport>
where
    I: IntoIterator<Item = Result<Location, IngestError>>,
{
    let mut report = IngestReport::default();
    for record in records {
        match record {
            Ok(loc) => {
                store.add(&loc)?;
                report.added += 1;
            }
            Err(IngestError::Parse(e)) => {
                if e.is_invalid() {
                    debug!(error = %e, "skip record");
                } else {
                    warn!(error = %e, "skip record");
                }
                report.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(report)
}
