use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocationError {
    /// The record cannot become a location. Ingestion skips these.
    #[error("location: invalid record: {0}")]
    Invalid(String),
}

impl LocationError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        LocationError::Invalid(msg.into())
    }
}
