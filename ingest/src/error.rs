use placematch_location::LocationError;
use placematch_store::StoreError;
use thiserror::Error;

/// Failure to turn one input record into a location.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// The record is well-formed but unusable (missing identity, geometry
    /// or address). Ingestion skips it.
    #[error("ingest: invalid record: {0}")]
    Invalid(String),

    /// The record could not be decoded at all.
    #[error("ingest: malformed record: {0}")]
    Malformed(String),
}

impl ParseError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        ParseError::Invalid(msg.into())
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, ParseError::Invalid(_))
    }
}

impl From<LocationError> for ParseError {
    fn from(e: LocationError) -> Self {
        match e {
            LocationError::Invalid(msg) => ParseError::Invalid(msg),
        }
    }
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("ingest: io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ingest: {0}")]
    Parse(#[from] ParseError),

    #[error("ingest: store error: {0}")]
    Store(#[from] StoreError),

    #[error("ingest: invalid config: {0}")]
    Config(String),
}

pub type IngestResult<T> = Result<T, IngestError>;
