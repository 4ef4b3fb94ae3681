use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use placematch_location::Location;

use crate::error::{IngestError, IngestResult};
use crate::options::ParseOptions;
use crate::{geojson, rows};

/// Parsed records of one input, in input order.
pub type RecordIter = Box<dyn Iterator<Item = Result<Location, IngestError>> + Send>;

/// End `records` after the first I/O error. A failing stream tends to
/// fail again on every read, so nothing useful follows it.
pub(crate) fn stop_after_io_error<I>(records: I) -> RecordIter
where
    I: Iterator<Item = Result<Location, IngestError>> + Send + 'static,
{
    let mut failed = false;
    Box::new(records.map_while(move |record| {
        if failed {
            return None;
        }
        failed = matches!(record, Err(IngestError::Io(_)));
        Some(record)
    }))
}

/// Turns a byte stream into parsed records.
pub type ReaderConstructor = fn(Box<dyn Read + Send>, ParseOptions) -> RecordIter;

/// Input formats keyed by name.
pub struct FormatRegistry {
    readers: HashMap<&'static str, ReaderConstructor>,
}

impl FormatRegistry {
    pub fn empty() -> Self {
        Self {
            readers: HashMap::new(),
        }
    }

    pub fn with(mut self, name: &'static str, reader: ReaderConstructor) -> Self {
        self.readers.insert(name, reader);
        self
    }

    pub fn formats(&self) -> Vec<&'static str> {
        let mut f: Vec<_> = self.readers.keys().copied().collect();
        f.sort_unstable();
        f
    }

    pub fn reader(&self, format: &str) -> IngestResult<ReaderConstructor> {
        self.readers.get(format).copied().ok_or_else(|| {
            IngestError::Config(format!(
                "unknown format {format:?} (known: {})",
                self.formats().join(", ")
            ))
        })
    }

    /// Open `path` and parse it as `format`.
    pub fn open(
        &self,
        format: &str,
        path: impl AsRef<Path>,
        opts: ParseOptions,
    ) -> IngestResult<RecordIter> {
        let reader = self.reader(format)?;
        let file = File::open(path)?;
        Ok(reader(Box::new(file), opts))
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::empty()
            .with("geojson", geojson::read_collection)
            .with("geojsonl", geojson::read_lines)
            .with("csv", rows::read_rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formats() {
        let reg = FormatRegistry::default();
        assert_eq!(reg.formats(), vec!["csv", "geojson", "geojsonl"]);
        assert!(matches!(reg.reader("shp"), Err(IngestError::Config(_))));
    }

    #[test]
    fn test_open_missing_file() {
        let err = FormatRegistry::default()
            .open("csv", "/nonexistent/places.csv", ParseOptions::new("x"))
            .err()
            .unwrap();
        assert!(matches!(err, IngestError::Io(_)));
    }
}
