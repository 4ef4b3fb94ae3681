use std::fs::File;
use std::io::Write;
use std::path::Path;

use parking_lot::Mutex;

use crate::error::MatchResult;
use crate::row::{CSV_HEADER, MatchRow};

/// MatchSink receives match rows from concurrently running shards.
///
/// Rows arrive in no particular order across shards. Implementations
/// serialize writes themselves.
pub trait MatchSink: Send + Sync {
    fn write(&self, row: &MatchRow) -> MatchResult<()>;
}

struct CsvState<W: Write> {
    writer: csv::Writer<W>,
    wrote_header: bool,
}

/// CsvSink writes rows as CSV. The header is written once, right before
/// the first row, and every row is flushed as it is written.
pub struct CsvSink<W: Write + Send> {
    state: Mutex<CsvState<W>>,
}

impl<W: Write + Send> CsvSink<W> {
    pub fn new(w: W) -> Self {
        Self {
            state: Mutex::new(CsvState {
                writer: csv::WriterBuilder::new().has_headers(false).from_writer(w),
                wrote_header: false,
            }),
        }
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(self) -> MatchResult<W> {
        let state = self.state.into_inner();
        state
            .writer
            .into_inner()
            .map_err(|e| crate::MatchError::Sink(e.error().to_string()))
    }
}

impl CsvSink<File> {
    /// Create (or truncate) `path` and write rows to it.
    pub fn create(path: impl AsRef<Path>) -> MatchResult<Self> {
        Ok(Self::new(File::create(path)?))
    }
}

impl<W: Write + Send> MatchSink for CsvSink<W> {
    fn write(&self, row: &MatchRow) -> MatchResult<()> {
        let mut state = self.state.lock();
        if !state.wrote_header {
            state.writer.write_record(CSV_HEADER)?;
            state.wrote_header = true;
        }
        state.writer.serialize(row)?;
        state.writer.flush()?;
        Ok(())
    }
}

/// MemorySink collects rows in memory.
#[derive(Default)]
pub struct MemorySink {
    rows: Mutex<Vec<MatchRow>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows written so far, in write order.
    pub fn rows(&self) -> Vec<MatchRow> {
        self.rows.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MatchSink for MemorySink {
    fn write(&self, row: &MatchRow) -> MatchResult<()> {
        self.rows.lock().push(row.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn row(n: usize) -> MatchRow {
        MatchRow {
            geohash: "f25dv".into(),
            source_id: format!("wof:id={n}"),
            target_id: format!("ovtr:id={n}"),
            source_content: "Open Da Night, 124 rue St. Viateur o. Montreal".into(),
            target_content: "Open Da Night".into(),
            similarity: 0.5,
        }
    }

    #[test]
    fn test_no_rows_no_header() {
        let sink = CsvSink::new(Vec::new());
        assert!(sink.into_inner().unwrap().is_empty());
    }

    #[test]
    fn test_header_once_and_quoting() {
        let sink = CsvSink::new(Vec::new());
        sink.write(&row(1)).unwrap();
        sink.write(&row(2)).unwrap();
        let out = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "geohash,source_id,target_id,source,target,similarity");
        assert_eq!(
            lines[1],
            "f25dv,wof:id=1,ovtr:id=1,\"Open Da Night, 124 rue St. Viateur o. Montreal\",Open Da Night,0.5"
        );
    }

    #[test]
    fn test_concurrent_writes_keep_rows_whole() {
        let sink = Arc::new(CsvSink::new(Vec::new()));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let sink = sink.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        sink.write(&row(t * 100 + i)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let sink = Arc::into_inner(sink).unwrap();
        let out = sink.into_inner().unwrap();
        let mut rdr = csv::Reader::from_reader(out.as_slice());
        assert_eq!(rdr.headers().unwrap().len(), 6);
        let n = rdr.records().map(|r| r.unwrap()).filter(|r| r.len() == 6).count();
        assert_eq!(n, 400);
    }

    #[test]
    fn test_memory_sink() {
        let sink = MemorySink::new();
        assert!(sink.is_empty());
        sink.write(&row(1)).unwrap();
        assert_eq!(sink.rows(), vec![row(1)]);
    }
}
