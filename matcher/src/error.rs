use std::sync::Arc;

use placematch_similarity::SimilarityError;
use placematch_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("matcher: store error: {0}")]
    Store(#[from] StoreError),

    #[error("matcher: similarity error: {0}")]
    Similarity(#[from] SimilarityError),

    #[error("matcher: sink error: {0}")]
    Sink(String),

    #[error("matcher: shard {geohash} panicked")]
    Panicked { geohash: String },

    /// A build failure reported to every caller that waited on it.
    #[error(transparent)]
    Shared(Arc<MatchError>),
}

impl From<csv::Error> for MatchError {
    fn from(e: csv::Error) -> Self {
        MatchError::Sink(e.to_string())
    }
}

impl From<std::io::Error> for MatchError {
    fn from(e: std::io::Error) -> Self {
        MatchError::Sink(e.to_string())
    }
}

pub type MatchResult<T> = Result<T, MatchError>;
