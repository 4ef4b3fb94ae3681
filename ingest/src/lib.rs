//! Ingestion of GeoJSON and CSV inputs into a location store.
//!
//! Each input format turns a byte stream into parsed [`Location`]s. Records
//! that cannot become a location are reported as [`ParseError`]s and
//! skipped by [`ingest`], so one bad row never aborts a load.
//!
//! [`Location`]: placematch_location::Location

pub mod error;
pub mod format;
pub mod geojson;
pub mod ingest;
pub mod options;
pub mod rows;

pub use error::{IngestError, IngestResult, ParseError};
pub use format::{FormatRegistry, ReaderConstructor, RecordIter};
pub use geojson::parse_feature;
pub use ingest::{IngestReport, ingest};
pub use options::ParseOptions;
pub use rows::parse_row;
