use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimilarityError {
    #[error("similarity: embed error: {0}")]
    Embed(String),

    #[error("similarity: storage error: {0}")]
    Storage(String),

    #[error("similarity: dimension mismatch: got {got}, want {want}")]
    DimensionMismatch { got: usize, want: usize },

    #[error("similarity: index is closed")]
    Closed,

    #[error("similarity: invalid config: {0}")]
    Config(String),
}

impl From<placematch_embed::EmbedError> for SimilarityError {
    fn from(e: placematch_embed::EmbedError) -> Self {
        SimilarityError::Embed(e.to_string())
    }
}

pub(crate) fn storage<E: std::fmt::Display>(e: E) -> SimilarityError {
    SimilarityError::Storage(e.to_string())
}
