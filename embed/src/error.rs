use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbedError {
    /// Blank text has nothing to embed.
    #[error("embed: empty input")]
    EmptyInput,

    #[error("embed: request failed: {0}")]
    Request(String),

    #[error("embed: HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("embed: decode response: {0}")]
    Decode(String),

    #[error("embed: response lacks index {0}")]
    MissingIndex(usize),

    #[error("embed: response index {index} outside batch of {batch_size}")]
    UnexpectedIndex { index: usize, batch_size: usize },

    #[error("embed: dimension mismatch: got {got}, want {want}")]
    DimensionMismatch { got: usize, want: usize },
}
